//! Shared context passed to every component on each event.
//!
//! Components never hold references to each other. They talk to the outside
//! world through the [`Outbox`] and to each other through [`Handoff`]s, which
//! the controller drains after every event.

use std::collections::VecDeque;
use std::time::Duration;

use zwave_core::{NodeId, NodeMask, ProtocolFrame, SensorWakeup, Speed};

use crate::action::{Action, Channel, Handle, Notification, Owner, TimerKind, Transmission, TxTag};
use crate::config::ControlConfig;
use crate::directory::NodeDirectory;
use crate::error::ControlError;
use crate::role::NetworkState;
use crate::update::ChangeKind;

pub(crate) struct Ctx<'a> {
    pub directory: &'a mut dyn NodeDirectory,
    pub network: &'a mut NetworkState,
    pub config: &'a ControlConfig,
    pub out: &'a mut Outbox,
}

/// Who asked for a discovery or a return-route assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Caller(Handle),
    Inclusion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DiscoveryOutcome {
    Done(NodeMask),
    Pending,
    Failed(ControlError),
}

/// Cross-component requests raised while handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Handoff {
    StartDiscovery { node: NodeId, origin: Origin },
    DiscoveryFinished { node: NodeId, outcome: DiscoveryOutcome },
    AbortDiscovery,
    StartSucReturnRoute { node: NodeId },
    ReturnRouteFinished { result: Result<(), ControlError> },
    AbortReturnRoute,
    RegisterChange { change: ChangeKind, node: NodeId },
}

/// A frame about to be queued, before the outbox tags it.
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    destination: NodeId,
    frame: ProtocolFrame,
    channel: Channel,
    speed: Option<Speed>,
    wakeup: Option<SensorWakeup>,
    direct: bool,
}

impl Outgoing {
    pub fn to(destination: NodeId, frame: ProtocolFrame) -> Self {
        let channel = match frame {
            ProtocolFrame::LongRange(_) => Channel::LongRange,
            _ => Channel::Classic,
        };
        Self {
            destination,
            frame,
            channel,
            speed: None,
            wakeup: None,
            direct: false,
        }
    }

    pub fn at(mut self, speed: Speed) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn beam(mut self, wakeup: Option<SensorWakeup>) -> Self {
        self.wakeup = wakeup;
        self
    }

    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct Outbox {
    actions: Vec<Action>,
    queue: VecDeque<Transmission>,
    handoffs: VecDeque<Handoff>,
    seq: u64,
}

impl Outbox {
    /// Queue a frame behind the single transmit slot.
    pub fn send(&mut self, owner: Owner, epoch: u32, out: Outgoing) -> TxTag {
        self.seq = self.seq.wrapping_add(1);
        let tag = TxTag {
            owner,
            epoch,
            seq: self.seq,
        };
        tracing::trace!(frame = out.frame.name(), to = %out.destination, ?owner, "queue frame");
        self.queue.push_back(Transmission {
            tag,
            destination: out.destination,
            frame: out.frame,
            channel: out.channel,
            speed: out.speed,
            wakeup: out.wakeup,
            direct: out.direct,
        });
        tag
    }

    /// Drop queued frames of `owner` that have not reached the radio yet.
    pub fn cancel(&mut self, owner: Owner) {
        self.queue.retain(|tx| tx.tag.owner != owner);
    }

    pub fn start_timer(&mut self, timer: TimerKind, after: Duration) {
        self.actions.push(Action::StartTimer { timer, after });
    }

    pub fn stop_timer(&mut self, timer: TimerKind) {
        self.actions.push(Action::StopTimer(timer));
    }

    pub fn notify(&mut self, notification: Notification) {
        self.actions.push(Action::Notify(notification));
    }

    pub fn handoff(&mut self, handoff: Handoff) {
        self.handoffs.push_back(handoff);
    }

    pub fn next_handoff(&mut self) -> Option<Handoff> {
        self.handoffs.pop_front()
    }

    pub fn next_transmission(&mut self) -> Option<Transmission> {
        self.queue.pop_front()
    }

    /// Emit a transmission that has been granted the transmit slot.
    pub fn grant(&mut self, tx: Transmission) {
        self.actions.push(Action::Transmit(tx));
    }

    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
