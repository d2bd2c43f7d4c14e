//! Core types for the Z-Wave mesh membership and topology control plane.
//!
//! This crate provides the protocol primitives with no I/O: node addressing,
//! neighbor bitmaps, node-information normalization and the wire codec for
//! every frame the control plane exchanges.

pub mod constants;
pub mod error;
pub mod frame;
pub mod mask;
pub mod node_info;
pub mod types;

pub use error::FrameError;
pub use frame::{FindNodesInRange, LongRangeFrame, ProtocolFrame, ReturnRouteFrame};
pub use mask::NodeMask;
pub use node_info::{DeviceType, NodeInfo, SensorWakeup, Speed, SpeedSet};
pub use types::{HomeId, NodeId};
