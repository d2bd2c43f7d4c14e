//! Return-route assignment to routing end devices.

mod support;

use support::{Harness, flirs_info, id, slave_info};
use zwave_control::directory::NodeDirectory;
use zwave_control::{ControlError, Notification, PriorityRoute, ReturnRouteState, Role, TxStatus};
use zwave_core::{NodeId, ProtocolFrame, ReturnRouteFrame, SensorWakeup, Speed};

fn route_results(h: &mut Harness) -> Vec<Result<(), ControlError>> {
    h.take_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::ReturnRoute { result, .. } => Some(result),
            _ => None,
        })
        .collect()
}

fn slot_frames(h: &Harness) -> Vec<ReturnRouteFrame> {
    h.sent
        .iter()
        .filter_map(|tx| match &tx.frame {
            ProtocolFrame::AssignReturnRoute(slot) | ProtocolFrame::AssignSucReturnRoute(slot) => {
                Some(slot.clone())
            }
            _ => None,
        })
        .collect()
}

fn ack_all(h: &mut Harness) {
    h.drain();
    while h.in_flight().is_some() {
        h.ack();
    }
}

/// Source 2 and destination 3 are out of range of each other; repeaters
/// 4..=9 hear both.
fn dense() -> Harness {
    let mut h = Harness::primary();
    for n in 2..=9 {
        h.put(n, slave_info());
    }
    for repeater in 4..=9 {
        h.link(2, repeater);
        h.link(3, repeater);
    }
    h
}

#[test]
fn never_more_than_four_slots() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(3), None);
    assert_eq!(h.controller.return_route_state(), ReturnRouteState::Sending);
    ack_all(&mut h);

    let slots = slot_frames(&h);
    assert_eq!(slots.len(), 4);
    for (number, slot) in slots.iter().enumerate() {
        assert_eq!(usize::from(slot.route_number), number);
        assert_eq!(slot.destination, id(3));
        assert_eq!(slot.repeaters.len(), 1);
    }
    assert_eq!(route_results(&mut h), vec![Ok(())]);

    let routes = h.controller.directory().get(id(2)).unwrap().routes;
    assert_eq!(
        routes.get(&id(3)),
        Some(&vec![vec![id(4)], vec![id(5)], vec![id(6)], vec![id(7)]])
    );
    assert_eq!(h.controller.return_route_state(), ReturnRouteState::Idle);
}

#[test]
fn direct_route_when_destination_has_no_neighbors() {
    let mut h = Harness::primary();
    for n in 2..=4 {
        h.put(n, slave_info());
    }
    h.link(2, 4);
    h.controller.assign_return_route(id(2), id(3), None);
    ack_all(&mut h);

    let slots = slot_frames(&h);
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0].destination, id(3));
    assert!(slots[0].repeaters.is_empty());
    assert_eq!(slots[0].speed, Speed::Kbps40);
    assert!(slots[1..].iter().all(ReturnRouteFrame::is_clear));
    assert_eq!(route_results(&mut h), vec![Ok(())]);
}

#[test]
fn priority_route_takes_first_slot_and_marker_follows() {
    let mut h = dense();
    let priority = PriorityRoute {
        repeaters: vec![id(9)],
        speed: Speed::Kbps9_6,
    };
    h.controller
        .assign_return_route(id(2), id(3), Some(priority));
    ack_all(&mut h);

    let slots = slot_frames(&h);
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0].repeaters, vec![id(9)]);
    assert_eq!(slots[0].speed, Speed::Kbps9_6);
    assert_eq!(
        h.sent.last().map(|tx| &tx.frame),
        Some(&ProtocolFrame::AssignReturnRoutePriority {
            destination: id(3),
            route_number: 0
        })
    );
    assert_eq!(route_results(&mut h), vec![Ok(())]);
}

#[test]
fn priority_route_through_unknown_node_is_rejected() {
    let mut h = dense();
    let priority = PriorityRoute {
        repeaters: vec![id(40)],
        speed: Speed::Kbps40,
    };
    h.controller
        .assign_return_route(id(2), id(3), Some(priority));
    assert!(h.in_flight().is_none());
    assert_eq!(
        route_results(&mut h),
        vec![Err(ControlError::NodeNotFound(id(40)))]
    );
}

#[test]
fn first_slot_failure_is_a_transmit_failure() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(3), None);
    h.complete(TxStatus::NoAck);
    assert_eq!(route_results(&mut h), vec![Err(ControlError::TransmitFailed)]);
    assert!(h.controller.directory().get(id(2)).unwrap().routes.is_empty());
}

#[test]
fn later_slot_failure_is_incomplete_route() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(3), None);
    h.ack();
    h.complete(TxStatus::Failed);
    assert_eq!(route_results(&mut h), vec![Err(ControlError::NoRoute)]);
}

#[test]
fn unreachable_destination_has_no_route() {
    let mut h = Harness::primary();
    for n in 2..=5 {
        h.put(n, slave_info());
    }
    h.link(2, 4);
    h.link(3, 5);
    h.controller.assign_return_route(id(2), id(3), None);
    assert!(h.sent.is_empty());
    assert_eq!(route_results(&mut h), vec![Err(ControlError::NoRoute)]);
}

#[test]
fn delete_clears_every_slot() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(3), None);
    ack_all(&mut h);
    h.take_notifications();
    let before = slot_frames(&h).len();

    h.controller.delete_return_route(id(2), false);
    ack_all(&mut h);

    let cleared = &slot_frames(&h)[before..];
    assert_eq!(cleared.len(), 4);
    assert!(cleared.iter().all(ReturnRouteFrame::is_clear));
    assert_eq!(route_results(&mut h), vec![Ok(())]);
    assert!(h.controller.directory().get(id(2)).unwrap().routes.is_empty());
}

#[test]
fn authority_routes_use_the_authority_frames() {
    let mut h = Harness::authority();
    h.put(2, slave_info());
    h.link(1, 2);
    h.controller.assign_suc_return_route(id(2), None);
    ack_all(&mut h);

    let suc_slots = h.frames_sent(|f| matches!(f, ProtocolFrame::AssignSucReturnRoute(_)));
    assert_eq!(suc_slots, 4);
    assert_eq!(h.frames_sent(|f| matches!(f, ProtocolFrame::AssignReturnRoute(_))), 0);
    assert_eq!(route_results(&mut h), vec![Ok(())]);

    h.controller.delete_return_route(id(2), true);
    ack_all(&mut h);
    assert_eq!(route_results(&mut h), vec![Ok(())]);
    let routes = h.controller.directory().get(id(2)).unwrap().routes;
    assert!(!routes.contains_key(&id(1)));
}

#[test]
fn authority_routes_need_an_authority() {
    let mut h = Harness::primary();
    h.put(2, slave_info());
    h.controller.assign_suc_return_route(id(2), None);
    h.controller.delete_return_route(id(2), true);
    assert_eq!(
        route_results(&mut h),
        vec![
            Err(ControlError::NoAuthorityKnown),
            Err(ControlError::NoAuthorityKnown)
        ]
    );
}

#[test]
fn sleeping_source_is_beamed() {
    let mut h = Harness::primary();
    h.put(2, flirs_info());
    h.put(3, slave_info());
    h.controller.assign_return_route(id(2), id(3), None);
    h.drain();
    let tx = h.in_flight().cloned().unwrap();
    assert_eq!(tx.destination, id(2));
    assert_eq!(tx.wakeup, Some(SensorWakeup::Ms1000));
    let ProtocolFrame::AssignReturnRoute(slot) = tx.frame else {
        panic!("expected a route slot");
    };
    assert_eq!(slot.source_wakeup, Some(SensorWakeup::Ms1000));
}

#[test]
fn stop_reports_stopped_once() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(3), None);
    assert!(h.controller.stop_return_route());
    assert!(!h.controller.stop_return_route());
    // The frame already on air completes without effect.
    h.ack();
    assert_eq!(route_results(&mut h), vec![Err(ControlError::Stopped)]);
    assert_eq!(slot_frames(&h).len(), 1);
}

#[test]
fn second_job_is_busy() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(3), None);
    h.controller.assign_return_route(id(4), id(3), None);
    assert_eq!(route_results(&mut h), vec![Err(ControlError::Busy)]);
}

#[test]
fn end_devices_cannot_assign_routes() {
    let mut h = Harness::new(7, Role::RoutingSlave, slave_info());
    h.put(2, slave_info());
    h.put(3, slave_info());
    h.controller.assign_return_route(id(2), id(3), None);
    assert_eq!(route_results(&mut h), vec![Err(ControlError::NotSupported)]);
}

#[test]
fn same_source_and_destination_is_rejected() {
    let mut h = dense();
    h.controller.assign_return_route(id(2), id(2), None);
    h.controller.assign_return_route(NodeId::new(60), id(2), None);
    assert_eq!(
        route_results(&mut h),
        vec![
            Err(ControlError::NotSupported),
            Err(ControlError::NodeNotFound(NodeId::new(60)))
        ]
    );
}
