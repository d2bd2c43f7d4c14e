//! Nodes whose change has not reached the topology authority yet.

use std::collections::BTreeSet;
use std::time::Duration;

use zwave_core::NodeId;

#[derive(Debug, Clone, Default)]
pub struct PendingUpdates {
    nodes: BTreeSet<NodeId>,
    step: u32,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the node was already pending.
    pub fn insert(&mut self, node: NodeId) -> bool {
        self.nodes.insert(node)
    }

    pub fn remove(&mut self, node: NodeId) -> bool {
        self.nodes.remove(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn reset_backoff(&mut self) {
        self.step = 0;
    }

    /// Interval before the next scan, then grow the step up to `max_step`.
    pub fn next_backoff(&mut self, base: Duration, max_step: u32) -> Duration {
        let delay = base * 2u32.saturating_pow(self.step.min(max_step));
        self.step = (self.step + 1).min(max_step);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_appears_once() {
        let mut pending = PendingUpdates::new();
        assert!(pending.insert(NodeId::new(4)));
        assert!(!pending.insert(NodeId::new(4)));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn first_is_lowest_id() {
        let mut pending = PendingUpdates::new();
        pending.insert(NodeId::new(9));
        pending.insert(NodeId::new(3));
        assert_eq!(pending.first(), Some(NodeId::new(3)));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let mut pending = PendingUpdates::new();
        let base = Duration::from_secs(2);
        let delays: Vec<_> = (0..5).map(|_| pending.next_backoff(base, 2)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(8),
                Duration::from_secs(8),
            ]
        );
        pending.reset_backoff();
        assert_eq!(pending.next_backoff(base, 2), base);
    }
}
