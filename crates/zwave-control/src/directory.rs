//! Node directory: per-node records consulted and mutated by the control plane.
//!
//! Persistence is someone else's concern; the trait is the seam, and
//! [`MemoryDirectory`] is the in-process implementation used by the runtime
//! and by tests.

use std::collections::BTreeMap;

use zwave_core::{NodeId, NodeInfo, NodeMask};

/// Return routes stored on a node, keyed by destination.
pub type RouteTable = BTreeMap<NodeId, Vec<Vec<NodeId>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub info: NodeInfo,
    pub neighbors: NodeMask,
    /// Neighbor discovery timed out or failed and should be retried.
    pub pending_discovery: bool,
    /// Return routes last pushed to this node.
    pub routes: RouteTable,
}

impl NodeRecord {
    pub fn new(id: NodeId, info: NodeInfo) -> Self {
        Self {
            id,
            info,
            neighbors: NodeMask::new(),
            pending_discovery: false,
            routes: RouteTable::new(),
        }
    }
}

pub trait NodeDirectory {
    fn exists(&self, id: NodeId) -> bool;

    fn get(&self, id: NodeId) -> Option<NodeRecord>;

    fn put(&mut self, id: NodeId, record: NodeRecord);

    fn remove(&mut self, id: NodeId) -> Option<NodeRecord>;

    /// All present node IDs in ascending order.
    fn ids(&self) -> Vec<NodeId>;

    fn neighbors(&self, id: NodeId) -> NodeMask {
        self.get(id).map(|r| r.neighbors).unwrap_or_default()
    }

    fn set_neighbors(&mut self, id: NodeId, neighbors: NodeMask) {
        if let Some(mut record) = self.get(id) {
            record.neighbors = neighbors;
            self.put(id, record);
        }
    }

    fn info(&self, id: NodeId) -> Option<NodeInfo> {
        self.get(id).map(|r| r.info)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    records: BTreeMap<NodeId, NodeRecord>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl NodeDirectory for MemoryDirectory {
    fn exists(&self, id: NodeId) -> bool {
        self.records.contains_key(&id)
    }

    fn get(&self, id: NodeId) -> Option<NodeRecord> {
        self.records.get(&id).cloned()
    }

    fn put(&mut self, id: NodeId, record: NodeRecord) {
        self.records.insert(id, record);
    }

    fn remove(&mut self, id: NodeId) -> Option<NodeRecord> {
        self.records.remove(&id)
    }

    fn ids(&self) -> Vec<NodeId> {
        self.records.keys().copied().collect()
    }

    fn neighbors(&self, id: NodeId) -> NodeMask {
        self.records.get(&id).map(|r| r.neighbors).unwrap_or_default()
    }

    fn set_neighbors(&mut self, id: NodeId, neighbors: NodeMask) {
        if let Some(record) = self.records.get_mut(&id) {
            record.neighbors = neighbors;
        }
    }
}

/// Bitmap of every present classic node.
pub fn existing_mask(directory: &dyn NodeDirectory) -> NodeMask {
    directory.ids().into_iter().filter(|id| id.is_classic()).collect()
}

/// Record `node`'s neighbor set and mirror it into every other row so the
/// adjacency stays symmetric.
pub fn commit_neighbors(directory: &mut dyn NodeDirectory, node: NodeId, neighbors: &NodeMask) {
    for other in directory.ids() {
        if other == node {
            continue;
        }
        let mut row = directory.neighbors(other);
        let before = row.contains(node);
        let after = neighbors.contains(other);
        if before != after {
            if after {
                row.insert(node);
            } else {
                row.remove(node);
            }
            directory.set_neighbors(other, row);
        }
    }
    let own: NodeMask = neighbors
        .iter()
        .filter(|id| *id != node && directory.exists(*id))
        .collect();
    directory.set_neighbors(node, own);
}

/// Remove `node` and every trace of it: neighbor bits in other rows and
/// stored routes that lead to it or through it.
pub fn purge_node(directory: &mut dyn NodeDirectory, node: NodeId) -> Option<NodeRecord> {
    let removed = directory.remove(node);
    for other in directory.ids() {
        let Some(mut record) = directory.get(other) else {
            continue;
        };
        let mut changed = false;
        if record.neighbors.contains(node) {
            record.neighbors.remove(node);
            changed = true;
        }
        if record.routes.remove(&node).is_some() {
            changed = true;
        }
        for routes in record.routes.values_mut() {
            let before = routes.len();
            routes.retain(|hops| !hops.contains(&node));
            changed |= routes.len() != before;
        }
        record.routes.retain(|_, routes| !routes.is_empty());
        if changed {
            directory.put(other, record);
        }
    }
    removed
}
