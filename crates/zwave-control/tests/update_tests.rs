//! Update distribution between the topology authority and a secondary
//! controller, driven frame by frame through two controllers.

mod support;

use support::{Harness, controller_info, exchange, id, mask, slave_info};
use zwave_control::directory::NodeDirectory;
use zwave_control::{ControlError, Notification, ReplayState, Role, TimerKind, TxStatus};
use zwave_core::constants::{NodesExistStatus, NodesExistType, TransferStatus};
use zwave_core::{NodeInfo, ProtocolFrame};

/// Authority at node 1 knowing slaves 3 and 4, which hear each other.
fn authority() -> Harness {
    let mut a = Harness::authority();
    a.put(3, slave_info());
    a.put(4, slave_info());
    a.link(3, 4);
    a
}

/// Secondary controller at node 2 following authority 1.
fn secondary() -> Harness {
    let mut b = Harness::new(2, Role::SecondaryController, controller_info());
    b.put(1, controller_info());
    b.controller.set_authority(Some(id(1)));
    b.drain();
    b.take_notifications();
    b
}

fn update_results(h: &mut Harness) -> Vec<Result<TransferStatus, ControlError>> {
    h.take_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::NetworkUpdate { result, .. } => Some(result),
            _ => None,
        })
        .collect()
}

/// Run one complete update request; returns the frames the authority sent.
fn update(a: &mut Harness, b: &mut Harness) -> usize {
    b.controller.request_network_update();
    b.drain();
    exchange(a, b)
}

fn register_from(a: &mut Harness, origin: u16, node: u16, info: NodeInfo) {
    a.receive(
        origin,
        ProtocolFrame::NewNodeRegistered {
            node_id: id(node),
            info,
        },
    );
}

#[test]
fn first_update_is_a_snapshot() {
    let mut a = authority();
    let mut b = secondary();
    b.put(7, slave_info());

    update(&mut a, &mut b);

    assert_eq!(
        a.frames_sent(|f| matches!(f, ProtocolFrame::NodesExist { .. })),
        1
    );
    assert!(b.exists(3) && b.exists(4));
    assert!(!b.exists(7), "unknown to the authority, pruned");
    assert_eq!(b.neighbors(3), mask(&[4]));
    assert_eq!(update_results(&mut b), vec![Ok(TransferStatus::Done)]);
    assert_eq!(a.controller.cursor_of(id(2)), Some(a.controller.update_log().cursor()));
    assert_eq!(a.controller.replay_state(), ReplayState::Idle);
    assert!(!b.controller.is_updating());
}

#[test]
fn caught_up_requester_gets_only_the_end_marker() {
    let mut a = authority();
    let mut b = secondary();
    update(&mut a, &mut b);
    b.take_notifications();

    assert_eq!(update(&mut a, &mut b), 1);
    assert_eq!(
        a.sent.last().map(|tx| &tx.frame),
        Some(&ProtocolFrame::TransferEnd {
            status: TransferStatus::Done
        })
    );
    assert_eq!(update_results(&mut b), vec![Ok(TransferStatus::Done)]);
}

#[test]
fn incremental_replay_after_registration() {
    let mut a = authority();
    let mut b = secondary();
    update(&mut a, &mut b);
    b.take_notifications();

    // Another controller reports a new node and the removal of node 4.
    register_from(&mut a, 9, 5, slave_info());
    register_from(&mut a, 9, 4, NodeInfo::removed());
    assert_eq!(a.controller.update_log().cursor(), 2);
    assert_eq!(a.controller.out_of_date_controllers(), vec![id(2)]);
    assert!(!a.exists(4));

    // Two entries, each a node frame and a range frame, then the end marker.
    assert_eq!(update(&mut a, &mut b), 5);
    assert!(b.exists(5));
    assert!(!b.exists(4));
    assert!(!b.neighbors(3).contains(id(4)));
    assert_eq!(a.controller.cursor_of(id(2)), Some(2));
    assert!(a.controller.out_of_date_controllers().is_empty());
    assert_eq!(update_results(&mut b), vec![Ok(TransferStatus::Done)]);
}

#[test]
fn replay_is_idempotent() {
    let mut a = authority();
    let mut b = secondary();
    update(&mut a, &mut b);
    register_from(&mut a, 9, 5, slave_info());

    // The node frame lands, then the link drops before the range frame.
    b.controller.request_network_update();
    b.drain();
    assert!(support::relay(&mut b, &mut a));
    assert!(support::relay(&mut a, &mut b));
    let before = b.controller.directory().get(id(5));
    assert!(before.is_some());
    b.fire(TimerKind::NetworkUpdate);
    a.complete(TxStatus::NoAck);
    assert_eq!(a.controller.cursor_of(id(2)), Some(0));
    b.take_notifications();

    // The same entry is replayed and applied a second time.
    assert_eq!(update(&mut a, &mut b), 3);
    assert_eq!(b.controller.directory().get(id(5)), before);
    assert_eq!(update_results(&mut b), vec![Ok(TransferStatus::Done)]);
}

#[test]
fn falling_too_far_behind_forces_a_snapshot() {
    let mut a = authority();
    let mut b = secondary();
    update(&mut a, &mut b);

    for node in 10..=75 {
        register_from(&mut a, 9, node, slave_info());
    }
    update(&mut a, &mut b);

    assert_eq!(
        a.frames_sent(|f| matches!(f, ProtocolFrame::NodesExist { .. })),
        2
    );
    assert!(b.exists(75));
    assert_eq!(a.controller.cursor_of(id(2)), Some(66));
}

#[test]
fn registrations_reach_the_authority() {
    let mut a = authority();
    let mut b = secondary();
    b.put(3, slave_info());

    let mut refreshed = slave_info();
    refreshed.command_classes.push(0x70);
    b.receive(3, ProtocolFrame::NodeInfo(refreshed.clone()));
    assert!(b.controller.pending_updates().contains(id(3)));

    exchange(&mut a, &mut b);

    assert!(b.controller.pending_updates().is_empty());
    assert_eq!(
        a.controller.directory().info(id(3)).map(|i| i.command_classes),
        Some(refreshed.command_classes)
    );
    assert_eq!(a.controller.update_log().cursor(), 2);
}

#[test]
fn change_during_registration_is_sent_again() {
    let mut a = authority();
    let mut b = secondary();
    b.put(3, slave_info());

    let mut first = slave_info();
    first.command_classes.push(0x70);
    b.receive(3, ProtocolFrame::NodeInfo(first.clone()));
    assert_eq!(
        b.in_flight_frame(),
        Some(&ProtocolFrame::NewNodeRegistered {
            node_id: id(3),
            info: first,
        })
    );

    let mut second = slave_info();
    second.command_classes.push(0x71);
    b.receive(3, ProtocolFrame::NodeInfo(second.clone()));
    exchange(&mut a, &mut b);

    assert!(b.controller.pending_updates().is_empty());
    assert_eq!(a.controller.directory().info(id(3)), Some(second));
    assert_eq!(
        b.frames_sent(|f| matches!(f, ProtocolFrame::NewNodeRegistered { .. })),
        2
    );
}

#[test]
fn unreachable_authority_backs_off() {
    let mut b = secondary();
    b.put(3, slave_info());
    let mut refreshed = slave_info();
    refreshed.command_classes.push(0x70);
    b.receive(3, ProtocolFrame::NodeInfo(refreshed));

    let base = b.controller.config().timing.pending_base;
    b.complete(TxStatus::NoAck);
    assert_eq!(b.timers.get(&TimerKind::PendingScan), Some(&base));

    b.fire(TimerKind::PendingScan);
    assert!(matches!(
        b.in_flight_frame(),
        Some(ProtocolFrame::NewNodeRegistered { .. })
    ));
    b.complete(TxStatus::NoAck);
    assert_eq!(b.timers.get(&TimerKind::PendingScan), Some(&(base * 2)));
    assert!(b.controller.pending_updates().contains(id(3)));
}

#[test]
fn busy_authority_asks_second_requester_to_wait() {
    let mut a = authority();
    a.receive(2, ProtocolFrame::AutomaticControllerUpdateStart);
    a.receive(9, ProtocolFrame::AutomaticControllerUpdateStart);
    a.ack();
    assert_eq!(a.controller.replay_state(), ReplayState::AwaitNodesExistReply);
    let tx = a.in_flight().cloned().unwrap();
    assert_eq!(tx.destination, id(9));
    assert_eq!(
        tx.frame,
        ProtocolFrame::TransferEnd {
            status: TransferStatus::Wait
        }
    );
}

#[test]
fn non_authority_declines_replay() {
    let mut b = secondary();
    b.receive(5, ProtocolFrame::AutomaticControllerUpdateStart);
    let tx = b.in_flight().cloned().unwrap();
    assert_eq!(tx.destination, id(5));
    assert_eq!(
        tx.frame,
        ProtocolFrame::TransferEnd {
            status: TransferStatus::Disabled
        }
    );
}

#[test]
fn unacknowledged_replay_frame_aborts() {
    let mut a = authority();
    a.receive(2, ProtocolFrame::AutomaticControllerUpdateStart);
    a.complete(TxStatus::NoAck);
    assert_eq!(a.controller.replay_state(), ReplayState::Idle);
    assert_eq!(a.controller.cursor_of(id(2)), None);
}

#[test]
fn missing_nodes_exist_reply_times_out() {
    let mut a = authority();
    a.receive(2, ProtocolFrame::AutomaticControllerUpdateStart);
    a.ack();
    a.fire(TimerKind::Replay);
    assert_eq!(a.controller.replay_state(), ReplayState::Idle);

    // A late reply is ignored.
    a.receive(
        2,
        ProtocolFrame::NodesExistReply {
            kind: NodesExistType::All,
            status: NodesExistStatus::Done,
        },
    );
    assert!(a.in_flight().is_none());
}

#[test]
fn silent_authority_aborts_the_request() {
    let mut b = secondary();
    b.controller.request_network_update();
    b.drain();
    b.ack();
    b.fire(TimerKind::NetworkUpdate);
    let notifications = b.take_notifications();
    assert!(notifications.iter().any(|n| matches!(
        n,
        Notification::NetworkUpdate {
            result: Ok(TransferStatus::Abort),
            ..
        }
    )));
    assert!(notifications.contains(&Notification::RoutingCheckRestarted));
    assert!(!b.controller.is_updating());
}

#[test]
fn undelivered_request_fails() {
    let mut b = secondary();
    b.controller.request_network_update();
    b.drain();
    b.complete(TxStatus::NoAck);
    assert_eq!(update_results(&mut b), vec![Err(ControlError::NoAck)]);
}

#[test]
fn request_needs_a_remote_authority() {
    let mut a = authority();
    a.controller.request_network_update();
    a.drain();
    assert_eq!(update_results(&mut a), vec![Err(ControlError::NotAuthority)]);

    let mut lone = Harness::primary();
    lone.controller.request_network_update();
    lone.drain();
    assert_eq!(update_results(&mut lone), vec![Err(ControlError::NoAuthorityKnown)]);

    let mut b = secondary();
    b.controller.request_network_update();
    b.controller.request_network_update();
    b.drain();
    assert_eq!(update_results(&mut b), vec![Err(ControlError::Busy)]);
}

#[test]
fn authority_announcement_is_adopted() {
    let mut b = Harness::new(2, Role::SecondaryController, controller_info());
    b.put(1, controller_info());
    b.receive(
        1,
        ProtocolFrame::SucNodeId {
            node_id: id(1),
            capabilities: 0,
        },
    );
    assert_eq!(b.controller.network().authority(), Some(id(1)));
    assert_eq!(
        b.take_notifications(),
        vec![Notification::AuthorityChanged {
            authority: Some(id(1))
        }]
    );

    // An authority missing from the directory is treated as unknown.
    b.receive(
        1,
        ProtocolFrame::SucNodeId {
            node_id: id(40),
            capabilities: 0,
        },
    );
    assert_eq!(b.controller.network().authority(), None);
}

#[test]
fn becoming_authority_drops_pending_changes() {
    let mut b = secondary();
    b.put(3, slave_info());
    let mut refreshed = slave_info();
    refreshed.command_classes.push(0x70);
    b.receive(3, ProtocolFrame::NodeInfo(refreshed));
    assert!(!b.controller.pending_updates().is_empty());

    b.controller.set_authority(Some(id(2)));
    b.drain();
    assert!(b.controller.network().is_authority());
    assert!(b.controller.pending_updates().is_empty());
}
