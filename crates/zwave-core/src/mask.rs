//! Fixed-size bitmap with one bit per classic node ID.
//!
//! Bit `n - 1` (byte `(n - 1) / 8`, bit `(n - 1) % 8`) represents node `n`.
//! Long-range nodes are never neighbors in the classic mesh and cannot be
//! stored here.

use core::fmt;

use crate::constants::{MAX_CLASSIC_NODES, NODE_MASK_LENGTH};
use crate::error::FrameError;
use crate::types::NodeId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct NodeMask(pub(crate) [u8; NODE_MASK_LENGTH]);

impl NodeMask {
    pub const fn new() -> Self {
        Self([0; NODE_MASK_LENGTH])
    }

    fn position(id: NodeId) -> Option<(usize, u8)> {
        if !id.is_classic() {
            return None;
        }
        let bit = usize::from(id.get() - 1);
        Some((bit / 8, 1 << (bit % 8)))
    }

    /// Set the bit for `id`. Returns `false` when the ID is not classic.
    pub fn insert(&mut self, id: NodeId) -> bool {
        match Self::position(id) {
            Some((byte, bit)) => {
                self.0[byte] |= bit;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: NodeId) {
        if let Some((byte, bit)) = Self::position(id) {
            self.0[byte] &= !bit;
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        Self::position(id).is_some_and(|(byte, bit)| self.0[byte] & bit != 0)
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn clear(&mut self) {
        self.0 = [0; NODE_MASK_LENGTH];
    }

    pub fn union(&self, other: &NodeMask) -> NodeMask {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a |= b;
        }
        out
    }

    pub fn intersection(&self, other: &NodeMask) -> NodeMask {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a &= b;
        }
        out
    }

    pub fn difference(&self, other: &NodeMask) -> NodeMask {
        let mut out = *self;
        for (a, b) in out.0.iter_mut().zip(other.0.iter()) {
            *a &= !b;
        }
        out
    }

    /// Node IDs with their bit set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        (1..=MAX_CLASSIC_NODES)
            .map(NodeId::new)
            .filter(move |id| self.contains(*id))
    }

    pub fn as_bytes(&self) -> &[u8; NODE_MASK_LENGTH] {
        &self.0
    }

    /// Wire form: bytes up to and including the last non-zero byte.
    pub fn to_trimmed_bytes(&self) -> Vec<u8> {
        let len = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        self.0[..len].to_vec()
    }

    /// Parse a mask of up to [`NODE_MASK_LENGTH`] bytes; missing trailing bytes are zero.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > NODE_MASK_LENGTH {
            return Err(FrameError::InvalidMaskLength(bytes.len()));
        }
        let mut mask = Self::new();
        mask.0[..bytes.len()].copy_from_slice(bytes);
        Ok(mask)
    }
}

impl FromIterator<NodeId> for NodeMask {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut mask = NodeMask::new();
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}

impl fmt::Debug for NodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.get())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u16]) -> NodeMask {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn bit_layout_matches_wire() {
        let mask = ids(&[1, 6, 9]);
        assert_eq!(mask.to_trimmed_bytes(), vec![0x21, 0x01]);
    }

    #[test]
    fn rejects_long_range_and_zero() {
        let mut mask = NodeMask::new();
        assert!(!mask.insert(NodeId::new(0)));
        assert!(!mask.insert(NodeId::new(300)));
        assert!(mask.is_empty());
    }

    #[test]
    fn highest_classic_id_fits() {
        let mut mask = NodeMask::new();
        assert!(mask.insert(NodeId::new(232)));
        assert_eq!(mask.to_trimmed_bytes().len(), NODE_MASK_LENGTH);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![NodeId::new(232)]);
    }

    #[test]
    fn set_operations() {
        let a = ids(&[1, 2, 3]);
        let b = ids(&[2, 3, 4]);
        assert_eq!(a.union(&b), ids(&[1, 2, 3, 4]));
        assert_eq!(a.intersection(&b), ids(&[2, 3]));
        assert_eq!(a.difference(&b), ids(&[1]));
        assert_eq!(a.count(), 3);
    }

    #[test]
    fn from_wire_short_and_too_long() {
        let mask = NodeMask::from_wire(&[0x01]).unwrap();
        assert!(mask.contains(NodeId::new(1)));
        assert_eq!(
            NodeMask::from_wire(&[0u8; 30]),
            Err(FrameError::InvalidMaskLength(30))
        );
    }

    #[test]
    fn empty_mask_trims_to_nothing() {
        assert!(NodeMask::new().to_trimmed_bytes().is_empty());
    }

    #[test]
    fn debug_lists_ids() {
        assert_eq!(format!("{:?}", ids(&[3, 10])), "{3, 10}");
    }
}
