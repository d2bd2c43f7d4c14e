//! Tokio runtime for a Z-Wave controller.
//!
//! Wraps the sans-IO [`zwave_control::Controller`] in an event loop that
//! talks to a [`Radio`], keeps the controller's timers and forwards its
//! notifications. Configuration comes from TOML and logging goes through
//! `tracing`.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod radio;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{Node, NodeHandle};
pub use radio::{Inbound, Radio};
