//! Newtype wrappers for network addressing.
//!
//! Node IDs live in two disjoint ranges: classic IDs `1..=232` and
//! long-range IDs `256..=4000`. ID `0` is reserved for "unassigned" and is
//! the source address of a node that has not yet joined a network.

use core::fmt;

use crate::constants::{
    HIGHEST_LONG_RANGE_NODE_ID, HOME_ID_LENGTH, LOWEST_LONG_RANGE_NODE_ID, MAX_CLASSIC_NODES,
};
use crate::error::FrameError;

/// Numeric address of a mesh participant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[must_use]
pub struct NodeId(pub(crate) u16);

impl NodeId {
    /// The address of a node that holds no ID yet.
    pub const UNASSIGNED: NodeId = NodeId(0);

    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Build an ID and reject anything outside both address ranges.
    pub fn checked(id: u16) -> Result<Self, FrameError> {
        let node = Self(id);
        if node.is_valid() {
            Ok(node)
        } else {
            Err(FrameError::InvalidNodeId(id))
        }
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn is_unassigned(self) -> bool {
        self.0 == 0
    }

    pub const fn is_classic(self) -> bool {
        self.0 >= 1 && self.0 <= MAX_CLASSIC_NODES
    }

    pub const fn is_long_range(self) -> bool {
        self.0 >= LOWEST_LONG_RANGE_NODE_ID && self.0 <= HIGHEST_LONG_RANGE_NODE_ID
    }

    pub const fn is_valid(self) -> bool {
        self.is_classic() || self.is_long_range()
    }

    /// Single-byte wire form used by classic frames. Long-range IDs do not fit.
    pub fn to_classic_byte(self) -> Result<u8, FrameError> {
        if self.is_classic() || self.is_unassigned() {
            Ok(self.0 as u8)
        } else {
            Err(FrameError::InvalidNodeId(self.0))
        }
    }
}

impl From<u8> for NodeId {
    fn from(id: u8) -> Self {
        Self(u16::from(id))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// 4-byte network identifier shared by every node of one mesh.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct HomeId(pub(crate) [u8; HOME_ID_LENGTH]);

impl HomeId {
    pub const ZERO: HomeId = HomeId([0; HOME_ID_LENGTH]);

    pub const fn new(bytes: [u8; HOME_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub const fn is_zero(self) -> bool {
        self.as_u32() == 0
    }
}

impl AsRef<[u8]> for HomeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for HomeId {
    type Error = FrameError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; HOME_ID_LENGTH] =
            bytes.try_into().map_err(|_| FrameError::InvalidLength {
                expected: HOME_ID_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for HomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.as_u32())
    }
}

impl fmt::Debug for HomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HomeId({:08x})", self.as_u32())
    }
}
