//! Shortest-path search over the neighbor graph at one speed tier.
//!
//! Paths are enumerated by increasing repeater count; within one length the
//! depth-first walk visits repeaters in ascending ID order, so the first path
//! found is deterministic. A breadth-first distance map from the destination
//! prunes branches that cannot reach it in the remaining hops.

use std::collections::{BTreeMap, VecDeque};

use zwave_core::constants::MAX_REPEATERS;
use zwave_core::{NodeId, NodeMask, Speed};

use crate::directory::NodeDirectory;

/// Snapshot of the neighbor graph restricted to nodes usable at one speed.
pub struct RouteSearch {
    rows: BTreeMap<NodeId, NodeMask>,
    repeaters: NodeMask,
}

impl RouteSearch {
    pub fn new(directory: &dyn NodeDirectory, speed: Speed) -> Self {
        let mut rows = BTreeMap::new();
        let mut repeaters = NodeMask::new();
        for id in directory.ids() {
            let Some(record) = directory.get(id) else {
                continue;
            };
            if !id.is_classic() {
                continue;
            }
            if record.info.is_repeater() && record.info.speeds().contains(speed) {
                repeaters.insert(id);
            }
            rows.insert(id, record.neighbors);
        }
        Self { rows, repeaters }
    }

    fn adjacent(&self, a: NodeId, b: NodeId) -> bool {
        let forward = self.rows.get(&a).is_some_and(|row| row.contains(b));
        let backward = self.rows.get(&b).is_some_and(|row| row.contains(a));
        forward || backward
    }

    /// Hop distance from every reachable repeater to `destination`,
    /// travelling through repeaters only.
    fn distances_to(&self, destination: NodeId) -> BTreeMap<NodeId, usize> {
        let mut dist = BTreeMap::new();
        dist.insert(destination, 0);
        let mut queue = VecDeque::from([destination]);
        while let Some(node) = queue.pop_front() {
            let d = dist[&node];
            if d > MAX_REPEATERS {
                continue;
            }
            for next in self.repeaters.iter() {
                if !dist.contains_key(&next) && self.adjacent(node, next) {
                    dist.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        dist
    }

    /// First path from `source` to `destination` that is not in `exclude`.
    /// The returned vector lists the repeaters only; empty means direct.
    pub fn find(
        &self,
        source: NodeId,
        destination: NodeId,
        exclude: &[Vec<NodeId>],
    ) -> Option<Vec<NodeId>> {
        if source == destination {
            return None;
        }
        let dist = self.distances_to(destination);
        let mut path = Vec::with_capacity(MAX_REPEATERS);
        for hops in 0..=MAX_REPEATERS {
            if self.walk(source, source, destination, hops, &dist, &mut path, exclude) {
                return Some(path);
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        source: NodeId,
        current: NodeId,
        destination: NodeId,
        remaining: usize,
        dist: &BTreeMap<NodeId, usize>,
        path: &mut Vec<NodeId>,
        exclude: &[Vec<NodeId>],
    ) -> bool {
        if remaining == 0 {
            return self.adjacent(current, destination) && !exclude.contains(path);
        }
        for next in self.repeaters.iter() {
            if next == source || next == destination || path.contains(&next) {
                continue;
            }
            if !self.adjacent(current, next) {
                continue;
            }
            // `next` still needs `remaining - 1` repeaters plus the final hop.
            if dist.get(&next).is_none_or(|d| *d > remaining) {
                continue;
            }
            path.push(next);
            if self.walk(source, next, destination, remaining - 1, dist, path, exclude) {
                return true;
            }
            path.pop();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MemoryDirectory, NodeRecord, commit_neighbors};
    use zwave_core::NodeInfo;
    use zwave_core::constants::{CAPABILITY_LISTENING, CAPABILITY_ROUTING, CAPABILITY_SPEED_40K};

    fn id(n: u16) -> NodeId {
        NodeId::new(n)
    }

    fn repeater() -> NodeInfo {
        NodeInfo {
            capability: CAPABILITY_LISTENING | CAPABILITY_ROUTING | CAPABILITY_SPEED_40K,
            ..NodeInfo::default()
        }
    }

    /// Build a directory from an edge list; every node is a 40k repeater.
    fn graph(nodes: &[u16], edges: &[(u16, u16)]) -> MemoryDirectory {
        let mut d = MemoryDirectory::new();
        for &n in nodes {
            d.put(id(n), NodeRecord::new(id(n), repeater()));
        }
        for &n in nodes {
            let mask: NodeMask = edges
                .iter()
                .filter_map(|&(a, b)| match (a == n, b == n) {
                    (true, _) => Some(id(b)),
                    (_, true) => Some(id(a)),
                    _ => None,
                })
                .collect();
            commit_neighbors(&mut d, id(n), &mask);
        }
        d
    }

    #[test]
    fn direct_neighbors_route_without_repeaters() {
        let d = graph(&[1, 2], &[(1, 2)]);
        let search = RouteSearch::new(&d, Speed::Kbps40);
        assert_eq!(search.find(id(1), id(2), &[]), Some(vec![]));
    }

    #[test]
    fn shortest_path_wins() {
        // 1-2-3-5 and 1-4-5
        let d = graph(&[1, 2, 3, 4, 5], &[(1, 2), (2, 3), (3, 5), (1, 4), (4, 5)]);
        let search = RouteSearch::new(&d, Speed::Kbps40);
        assert_eq!(search.find(id(1), id(5), &[]), Some(vec![id(4)]));
    }

    #[test]
    fn ascending_id_breaks_ties() {
        let d = graph(&[1, 2, 3, 4], &[(1, 3), (3, 4), (1, 2), (2, 4)]);
        let search = RouteSearch::new(&d, Speed::Kbps40);
        assert_eq!(search.find(id(1), id(4), &[]), Some(vec![id(2)]));
    }

    #[test]
    fn excluded_paths_are_skipped() {
        let d = graph(&[1, 2, 3, 4], &[(1, 3), (3, 4), (1, 2), (2, 4)]);
        let search = RouteSearch::new(&d, Speed::Kbps40);
        let first = search.find(id(1), id(4), &[]).unwrap();
        let second = search.find(id(1), id(4), &[first.clone()]).unwrap();
        assert_eq!(second, vec![id(3)]);
        assert_eq!(search.find(id(1), id(4), &[first, second]), None);
    }

    #[test]
    fn non_repeaters_are_not_used() {
        let mut d = graph(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let mut middle = d.get(id(2)).unwrap();
        middle.info.capability &= !CAPABILITY_LISTENING;
        d.put(id(2), middle);
        let search = RouteSearch::new(&d, Speed::Kbps40);
        assert_eq!(search.find(id(1), id(3), &[]), None);
    }

    #[test]
    fn speed_filters_repeaters() {
        let d = graph(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let search = RouteSearch::new(&d, Speed::Kbps100);
        assert_eq!(search.find(id(1), id(3), &[]), None);
    }

    #[test]
    fn path_longer_than_four_repeaters_is_not_found() {
        let nodes = [1, 2, 3, 4, 5, 6, 7];
        let edges = [(1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7)];
        let d = graph(&nodes, &edges);
        let search = RouteSearch::new(&d, Speed::Kbps40);
        assert_eq!(search.find(id(1), id(7), &[]), None);
        assert_eq!(
            search.find(id(1), id(6), &[]),
            Some(vec![id(2), id(3), id(4), id(5)])
        );
    }
}
