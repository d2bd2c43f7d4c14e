//! Scripted driver for the sans-IO controller.
#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use zwave_control::directory::commit_neighbors;
use zwave_control::{
    Action, Channel, ControlConfig, Controller, MemoryDirectory, NetworkState, NodeDirectory,
    NodeRecord, Notification, Role, RxInfo, TimerKind, Transmission, TxStatus,
};
use zwave_core::constants::{
    BASIC_TYPE_ROUTING_SLAVE, BASIC_TYPE_STATIC_CONTROLLER, CAPABILITY_LISTENING,
    CAPABILITY_ROUTING, CAPABILITY_SPEED_40K, SECURITY_CONTROLLER, SECURITY_ROUTING_SLAVE,
    SECURITY_SENSOR_1000MS, SECURITY_SPECIFIC_DEVICE,
};
use zwave_core::{DeviceType, HomeId, NodeId, NodeInfo, NodeMask, ProtocolFrame};

pub const HOME: HomeId = HomeId::from_u32(0xC0FF_EE01);
pub const FOREIGN: HomeId = HomeId::from_u32(0x1234_5678);

pub fn id(n: u16) -> NodeId {
    NodeId::new(n)
}

pub fn mask(ids: &[u16]) -> NodeMask {
    ids.iter().map(|&n| id(n)).collect()
}

pub fn controller_info() -> NodeInfo {
    NodeInfo {
        capability: CAPABILITY_LISTENING | CAPABILITY_ROUTING | CAPABILITY_SPEED_40K,
        security: SECURITY_CONTROLLER | SECURITY_SPECIFIC_DEVICE,
        reserved: 0,
        device: DeviceType {
            basic: BASIC_TYPE_STATIC_CONTROLLER,
            generic: 0x02,
            specific: 0x01,
        },
        command_classes: vec![0x20, 0x86],
    }
}

pub fn slave_info() -> NodeInfo {
    NodeInfo {
        capability: CAPABILITY_LISTENING | CAPABILITY_ROUTING | CAPABILITY_SPEED_40K,
        security: SECURITY_ROUTING_SLAVE | SECURITY_SPECIFIC_DEVICE,
        reserved: 0,
        device: DeviceType {
            basic: BASIC_TYPE_ROUTING_SLAVE,
            generic: 0x10,
            specific: 0x01,
        },
        command_classes: vec![0x25, 0x86],
    }
}

/// Battery device woken by a 1000 ms beam.
pub fn flirs_info() -> NodeInfo {
    NodeInfo {
        capability: CAPABILITY_ROUTING | CAPABILITY_SPEED_40K,
        security: SECURITY_ROUTING_SLAVE | SECURITY_SPECIFIC_DEVICE | SECURITY_SENSOR_1000MS,
        ..slave_info()
    }
}

pub struct Harness {
    pub controller: Controller<MemoryDirectory>,
    pub sent: Vec<Transmission>,
    pub notifications: Vec<Notification>,
    pub timers: HashMap<TimerKind, Duration>,
}

impl Harness {
    pub fn with_network(network: NetworkState) -> Self {
        let controller = Controller::new(network, ControlConfig::default(), MemoryDirectory::new());
        let mut harness = Self {
            controller,
            sent: Vec::new(),
            notifications: Vec::new(),
            timers: HashMap::new(),
        };
        harness.drain();
        harness
    }

    pub fn new(node: u16, role: Role, info: NodeInfo) -> Self {
        Self::with_network(NetworkState::new(HOME, id(node), role, info))
    }

    /// Node 1, primary controller, no authority known.
    pub fn primary() -> Self {
        Self::new(1, Role::Controller, controller_info())
    }

    /// Node 1, primary controller acting as topology authority.
    pub fn authority() -> Self {
        let mut harness = Self::primary();
        harness.controller.set_authority(Some(id(1)));
        harness.drain();
        harness.notifications.clear();
        harness
    }

    pub fn put(&mut self, node: u16, info: NodeInfo) {
        self.controller
            .directory_mut()
            .put(id(node), NodeRecord::new(id(node), info));
    }

    pub fn link(&mut self, a: u16, b: u16) {
        let directory = self.controller.directory_mut();
        let mut neighbors = directory.neighbors(id(a));
        neighbors.insert(id(b));
        commit_neighbors(directory, id(a), &neighbors);
    }

    pub fn neighbors(&self, node: u16) -> NodeMask {
        self.controller.directory().neighbors(id(node))
    }

    pub fn exists(&self, node: u16) -> bool {
        self.controller.directory().exists(id(node))
    }

    pub fn drain(&mut self) {
        for action in self.controller.poll_actions() {
            match action {
                Action::Transmit(tx) => self.sent.push(tx),
                Action::StartTimer { timer, after } => {
                    self.timers.insert(timer, after);
                }
                Action::StopTimer(timer) => {
                    self.timers.remove(&timer);
                }
                Action::Notify(notification) => self.notifications.push(notification),
            }
        }
    }

    pub fn receive_from(&mut self, rx: RxInfo, frame: ProtocolFrame) {
        let payload = frame.encode().expect("frame encodes");
        self.controller.receive_frame(rx, &payload);
        self.drain();
    }

    /// Frame from a member of this network on the classic channel.
    pub fn receive(&mut self, source: u16, frame: ProtocolFrame) {
        self.receive_from(
            RxInfo {
                source: id(source),
                home_id: HOME,
                channel: Channel::Classic,
            },
            frame,
        );
    }

    pub fn in_flight(&self) -> Option<&Transmission> {
        let tag = self.controller.in_flight()?;
        self.sent.iter().rev().find(|tx| tx.tag == tag)
    }

    pub fn in_flight_frame(&self) -> Option<&ProtocolFrame> {
        self.in_flight().map(|tx| &tx.frame)
    }

    /// Report the in-flight transmission and return it.
    pub fn complete(&mut self, status: TxStatus) -> Transmission {
        self.drain();
        let tx = self.in_flight().cloned().expect("a frame in flight");
        self.controller.tx_complete(tx.tag, status);
        self.drain();
        tx
    }

    pub fn ack(&mut self) -> Transmission {
        self.complete(TxStatus::Ok)
    }

    pub fn fire(&mut self, timer: TimerKind) {
        assert!(self.timers.remove(&timer).is_some(), "{timer:?} not running");
        self.controller.timer_expired(timer);
        self.drain();
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.drain();
        std::mem::take(&mut self.notifications)
    }

    pub fn frames_sent(&self, pred: impl Fn(&ProtocolFrame) -> bool) -> usize {
        self.sent.iter().filter(|tx| pred(&tx.frame)).count()
    }
}

/// Deliver `from`'s in-flight frame to `to` and acknowledge it at `from`.
/// Returns `false` when `from` has nothing addressed to `to`.
pub fn relay(from: &mut Harness, to: &mut Harness) -> bool {
    let to_id = to.controller.network().node_id;
    let Some(tx) = from.in_flight().cloned() else {
        return false;
    };
    if tx.destination != to_id {
        return false;
    }
    let rx = RxInfo {
        source: from.controller.network().node_id,
        home_id: HOME,
        channel: tx.channel,
    };
    to.receive_from(rx, tx.frame.clone());
    from.ack();
    true
}

/// Relay in both directions until neither side has anything for the other.
/// Returns the number of frames `a` sent to `b`.
pub fn exchange(a: &mut Harness, b: &mut Harness) -> usize {
    let mut from_a = 0;
    loop {
        if relay(a, b) {
            from_a += 1;
            continue;
        }
        if relay(b, a) {
            continue;
        }
        return from_a;
    }
}
