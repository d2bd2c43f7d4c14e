//! Events consumed and actions produced by the control plane.
//!
//! The control plane performs no I/O. A driver feeds it [`Event`]s (received
//! frames, transmit-complete callbacks, timer expiries) and executes the
//! [`Action`]s it emits.

use std::time::Duration;

use zwave_core::constants::TransferStatus;
use zwave_core::{HomeId, NodeId, NodeMask, ProtocolFrame, SensorWakeup, Speed};

use crate::error::ControlError;

/// Identifies one caller-initiated operation in notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

/// Radio channel a frame travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Classic,
    LongRange,
}

/// Component that queued a transmission and receives its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Assign,
    Discovery,
    Probe,
    ReturnRoute,
    /// Authority side of a replay.
    Replay,
    /// Requester side of a network update.
    UpdateRequest,
    /// Pending-update propagation to the authority.
    Registration,
    Dispatcher,
}

/// Routes a transmit-complete callback back to the operation that sent the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxTag {
    pub owner: Owner,
    pub epoch: u32,
    pub seq: u64,
}

/// Delivery status reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    Ok,
    NoAck,
    Failed,
}

impl TxStatus {
    pub fn is_ok(self) -> bool {
        self == TxStatus::Ok
    }

    pub(crate) fn into_error(self) -> ControlError {
        match self {
            TxStatus::NoAck => ControlError::NoAck,
            _ => ControlError::TransmitFailed,
        }
    }
}

/// A single frame handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub tag: TxTag,
    pub destination: NodeId,
    pub frame: ProtocolFrame,
    pub channel: Channel,
    /// Fixed data rate; `None` lets the transport choose.
    pub speed: Option<Speed>,
    /// Wake-up beam to precede the frame with.
    pub wakeup: Option<SensorWakeup>,
    /// Send without routing or explore fallback.
    pub direct: bool,
}

/// Metadata of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    pub source: NodeId,
    pub home_id: HomeId,
    pub channel: Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Assign,
    Discovery,
    Probe,
    NetworkUpdate,
    Replay,
    PendingScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Frame { rx: RxInfo, payload: Vec<u8> },
    TxComplete { tag: TxTag, status: TxStatus },
    TimerExpired(TimerKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Transmit(Transmission),
    /// Start or restart a timer; a running timer of the same kind is replaced.
    StartTimer {
        timer: TimerKind,
        after: Duration,
    },
    StopTimer(TimerKind),
    Notify(Notification),
}

/// Role of a node being added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Controller,
    Slave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InclusionStatus {
    LearnReady,
    NodeFound,
    Adding { node: NodeId, role: NodeRole },
    ProtocolDone { node: NodeId },
    Done { node: NodeId },
    Failed(ControlError),
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionStatus {
    LearnReady,
    NodeFound,
    Removing { node: NodeId, role: NodeRole },
    Done { node: NodeId },
    Failed(ControlError),
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborUpdateStatus {
    Started,
    Done { neighbors: NodeMask },
    /// Discovery timed out with nothing found; the node is marked for a later retry.
    Pending,
    Failed(ControlError),
}

/// Callback delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Inclusion {
        handle: Handle,
        status: InclusionStatus,
    },
    Exclusion {
        handle: Handle,
        status: ExclusionStatus,
    },
    NeighborUpdate {
        handle: Handle,
        node: NodeId,
        status: NeighborUpdateStatus,
    },
    ReturnRoute {
        handle: Handle,
        source: NodeId,
        result: Result<(), ControlError>,
    },
    NetworkUpdate {
        handle: Handle,
        result: Result<TransferStatus, ControlError>,
    },
    AuthorityChanged {
        authority: Option<NodeId>,
    },
    /// A replay stalled and the local routing table must be re-validated.
    RoutingCheckRestarted,
}
