//! Search state: an ordered sequence of candidates plus a contacted set
//! keyed by ID — no ordered-map is needed (Design Notes section 9).

use std::collections::HashSet;

use kadron_routing::NodeInfo;
use kadron_types::NodeId;

/// Ordered set of nodes sorted ascending by XOR distance to a target, with
/// a "contacted" sub-set tracked by ID. Nodes are unique by ID.
///
/// Nodes reported as *storing* the sought value during a FindValue search
/// are tracked separately and sort ahead of every merely-closer candidate,
/// regardless of distance (section 4.2 step 3).
pub struct ShortList {
    target: NodeId,
    candidates: Vec<NodeInfo>,
    contacted: HashSet<NodeId>,
    storing: HashSet<NodeId>,
}

impl ShortList {
    pub fn new(target: NodeId, seed: Vec<NodeInfo>) -> Self {
        let mut candidates: Vec<NodeInfo> = Vec::with_capacity(seed.len());
        for node in seed {
            if !candidates.iter().any(|c: &NodeInfo| c.node_id == node.node_id) {
                candidates.push(node);
            }
        }
        let mut list = Self {
            target,
            candidates,
            contacted: HashSet::new(),
            storing: HashSet::new(),
        };
        list.resort();
        list
    }

    /// Storing-first, then ascending distance within each group.
    fn resort(&mut self) {
        let target = self.target;
        let storing = &self.storing;
        self.candidates.sort_by(|a, b| {
            let a_storing = storing.contains(&a.node_id);
            let b_storing = storing.contains(&b.node_id);
            b_storing
                .cmp(&a_storing)
                .then_with(|| a.node_id.distance(&target).0.cmp(&b.node_id.distance(&target).0))
        });
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn head(&self) -> Option<NodeId> {
        self.candidates.first().map(|n| n.node_id)
    }

    /// Take up to `count` uncontacted candidates, marking them contacted.
    pub fn next_batch(&mut self, count: usize) -> Vec<NodeInfo> {
        let batch: Vec<NodeInfo> = self
            .candidates
            .iter()
            .filter(|n| !self.contacted.contains(&n.node_id))
            .take(count)
            .cloned()
            .collect();
        for node in &batch {
            self.contacted.insert(node.node_id);
        }
        batch
    }

    /// Take every remaining uncontacted candidate (the FindNode "queryRest" sweep).
    pub fn remaining_uncontacted(&mut self) -> Vec<NodeInfo> {
        let batch: Vec<NodeInfo> = self
            .candidates
            .iter()
            .filter(|n| !self.contacted.contains(&n.node_id))
            .cloned()
            .collect();
        for node in &batch {
            self.contacted.insert(node.node_id);
        }
        batch
    }

    pub fn has_uncontacted(&self) -> bool {
        self.candidates
            .iter()
            .any(|n| !self.contacted.contains(&n.node_id))
    }

    /// Drop a candidate, e.g. after a transport error.
    pub fn remove(&mut self, id: &NodeId) {
        self.candidates.retain(|n| &n.node_id != id);
    }

    /// Merge newly discovered nodes in, unique by ID, then re-sort.
    pub fn merge(&mut self, nodes: Vec<NodeInfo>) {
        for node in nodes {
            if !self.candidates.iter().any(|c| c.node_id == node.node_id) {
                self.candidates.push(node);
            }
        }
        self.resort();
    }

    /// Merge nodes that reported *storing* the sought value: they're
    /// flagged so every future re-sort keeps them ahead of merely-closer
    /// candidates, then merged as usual.
    pub fn merge_storing(&mut self, nodes: Vec<NodeInfo>) {
        for node in &nodes {
            self.storing.insert(node.node_id);
        }
        self.merge(nodes);
    }

    pub fn top(&self, count: usize) -> Vec<NodeInfo> {
        self.candidates.iter().take(count).cloned().collect()
    }

    pub fn all(&self) -> Vec<NodeInfo> {
        self.candidates.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Instant;

    fn node(byte: u8) -> NodeInfo {
        NodeInfo {
            node_id: NodeId::from([byte; 32]),
            addr: SocketAddr::from(([127, 0, 0, 1], 4000 + byte as u16)),
            public_key: [byte; 33],
            last_seen: Instant::now(),
        }
    }

    #[test]
    fn unique_by_id_on_construction_and_merge() {
        let target = NodeId::from([0xFF; 32]);
        let mut list = ShortList::new(target, vec![node(1), node(1), node(2)]);
        assert_eq!(list.len(), 2);
        list.merge(vec![node(2), node(3)]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn next_batch_does_not_repeat_contacted() {
        let target = NodeId::from([0xFF; 32]);
        let mut list = ShortList::new(target, vec![node(1), node(2), node(3)]);
        let first = list.next_batch(2);
        assert_eq!(first.len(), 2);
        let second = list.next_batch(2);
        assert_eq!(second.len(), 1);
        assert!(list.next_batch(2).is_empty());
    }

    #[test]
    fn remove_drops_candidate() {
        let target = NodeId::from([0xFF; 32]);
        let mut list = ShortList::new(target, vec![node(1), node(2)]);
        list.remove(&NodeId::from([1; 32]));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn storing_nodes_sort_ahead_of_merely_closer_ones() {
        let target = NodeId::from([0x00; 32]);
        // node(1) is numerically much closer to an all-zero target than
        // node(200), so a plain distance sort would always put it first.
        let mut list = ShortList::new(target, vec![node(1)]);
        list.merge_storing(vec![node(200)]);
        assert_eq!(
            list.top(2).first().unwrap().node_id,
            NodeId::from([200; 32])
        );
    }
}
