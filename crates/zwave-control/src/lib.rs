//! Membership and topology control plane of a Z-Wave controller.
//!
//! Four cooperating state machines share one node directory:
//! - node-ID assignment (inclusion and exclusion),
//! - neighbor discovery, with the probing responder of the target side,
//! - return-route assignment,
//! - topology-authority update distribution.
//!
//! Nothing here performs I/O. A driver feeds [`Event`]s into the
//! [`Controller`] and executes the [`Action`]s it returns.

pub mod action;
pub mod assign;
pub mod config;
pub(crate) mod context;
pub mod controller;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod return_route;
pub mod role;
pub mod routing;
pub mod update;

pub use action::{
    Action, Channel, Event, ExclusionStatus, Handle, InclusionStatus, NeighborUpdateStatus,
    NodeRole, Notification, Owner, RxInfo, TimerKind, Transmission, TxStatus, TxTag,
};
pub use assign::{AllowedRoles, AssignState, ExclusionRequest, InclusionRequest};
pub use config::{ControlConfig, Retries, Timing};
pub use controller::Controller;
pub use directory::{MemoryDirectory, NodeDirectory, NodeRecord};
pub use discovery::DiscoveryPhase;
pub use error::ControlError;
pub use return_route::{PriorityRoute, ReturnRouteState};
pub use role::{NetworkState, Role, RolePolicy};
pub use update::{ChangeKind, PendingUpdates, ReplayState, UpdateLog, UpdateLogEntry};
