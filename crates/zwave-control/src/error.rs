//! Caller-visible error taxonomy of the control plane.
//!
//! Malformed frames never appear here: they are logged and dropped by the
//! dispatcher because they may be noise from a foreign network.

use zwave_core::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("an operation of the same class is already in flight")]
    Busy,

    #[error("no acknowledgment from the destination")]
    NoAck,

    #[error("transmission failed")]
    TransmitFailed,

    #[error("expected response never arrived")]
    Timeout,

    #[error("no route found at any speed tier")]
    NoRoute,

    #[error("this node is the topology authority")]
    NotAuthority,

    #[error("no topology authority is known")]
    NoAuthorityKnown,

    #[error("operation stopped by caller")]
    Stopped,

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("operation not supported by this node's role")]
    NotSupported,

    #[error("no free node id left")]
    IdSpaceExhausted,

    #[error("learn failed")]
    LearnFailed,
}
