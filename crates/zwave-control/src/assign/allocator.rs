//! Free-ID ring scan for classic and long-range node IDs.

use zwave_core::NodeId;
use zwave_core::constants::{HIGHEST_LONG_RANGE_NODE_ID, LOWEST_LONG_RANGE_NODE_ID, MAX_CLASSIC_NODES};

use crate::directory::NodeDirectory;
use crate::error::ControlError;

/// Remembers the last handed-out ID per space so consecutive inclusions do
/// not reuse an ID that was just freed.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last_classic: u16,
    last_long_range: u16,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_classic(
        &mut self,
        directory: &dyn NodeDirectory,
        own: NodeId,
    ) -> Result<NodeId, ControlError> {
        let id = scan(1, MAX_CLASSIC_NODES, self.last_classic, directory, own)?;
        self.last_classic = id.get();
        Ok(id)
    }

    pub fn next_long_range(
        &mut self,
        directory: &dyn NodeDirectory,
        own: NodeId,
    ) -> Result<NodeId, ControlError> {
        let id = scan(
            LOWEST_LONG_RANGE_NODE_ID,
            HIGHEST_LONG_RANGE_NODE_ID,
            self.last_long_range,
            directory,
            own,
        )?;
        self.last_long_range = id.get();
        Ok(id)
    }
}

/// Walk `low..=high` once, starting after `last` and wrapping.
fn scan(
    low: u16,
    high: u16,
    last: u16,
    directory: &dyn NodeDirectory,
    own: NodeId,
) -> Result<NodeId, ControlError> {
    let span = high - low + 1;
    let start = if (low..=high).contains(&last) {
        last - low + 1
    } else {
        0
    };
    (0..span)
        .map(|i| NodeId::new(low + (start + i) % span))
        .find(|id| *id != own && !directory.exists(*id))
        .ok_or(ControlError::IdSpaceExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MemoryDirectory, NodeRecord};
    use zwave_core::NodeInfo;

    fn occupy(d: &mut MemoryDirectory, ids: impl IntoIterator<Item = u16>) {
        for n in ids {
            d.put(NodeId::new(n), NodeRecord::new(NodeId::new(n), NodeInfo::default()));
        }
    }

    #[test]
    fn skips_present_ids_and_self() {
        let mut d = MemoryDirectory::new();
        occupy(&mut d, [2, 3]);
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.next_classic(&d, NodeId::new(1)).unwrap(), NodeId::new(4));
    }

    #[test]
    fn continues_after_last_assigned() {
        let d = MemoryDirectory::new();
        let mut alloc = IdAllocator::new();
        let own = NodeId::new(1);
        assert_eq!(alloc.next_classic(&d, own).unwrap(), NodeId::new(2));
        // ID 2 was never committed, the ring still moves on.
        assert_eq!(alloc.next_classic(&d, own).unwrap(), NodeId::new(3));
    }

    #[test]
    fn wraps_around_the_ring() {
        let mut d = MemoryDirectory::new();
        occupy(&mut d, [1]);
        let mut alloc = IdAllocator {
            last_classic: MAX_CLASSIC_NODES,
            last_long_range: 0,
        };
        assert_eq!(alloc.next_classic(&d, NodeId::new(1)).unwrap(), NodeId::new(2));
    }

    #[test]
    fn exhausted_classic_space() {
        let mut d = MemoryDirectory::new();
        occupy(&mut d, 2..=MAX_CLASSIC_NODES);
        let mut alloc = IdAllocator::new();
        assert_eq!(
            alloc.next_classic(&d, NodeId::new(1)),
            Err(ControlError::IdSpaceExhausted)
        );
    }

    #[test]
    fn long_range_ring_starts_at_256() {
        let mut d = MemoryDirectory::new();
        occupy(&mut d, [256]);
        let mut alloc = IdAllocator::new();
        let id = alloc.next_long_range(&d, NodeId::new(1)).unwrap();
        assert_eq!(id, NodeId::new(257));
        assert!(id.is_long_range());
    }
}
