use std::collections::VecDeque;
use std::time::Instant;

use crate::table::NodeInfo;
use crate::K;

/// A single k-bucket holding up to `K` entries, ordered by last-seen time:
/// front is least-recently-seen, back is most-recently-seen.
#[derive(Clone, Debug)]
pub struct KBucket {
    entries: VecDeque<NodeInfo>,
}

impl Default for KBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl KBucket {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(K),
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= K
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.entries.iter()
    }

    fn find_index(&self, node_id: &kadron_types::NodeId) -> Option<usize> {
        self.entries.iter().position(|e| &e.node_id == node_id)
    }

    /// If `node_id` is present, move it to the back (MRU) and refresh its
    /// `last_seen` timestamp. Returns whether it was found.
    pub fn mark_seen(&mut self, node_id: &kadron_types::NodeId) -> bool {
        match self.find_index(node_id) {
            Some(idx) => {
                let mut entry = self.entries.remove(idx).expect("index just found");
                entry.last_seen = Instant::now();
                self.entries.push_back(entry);
                true
            }
            None => false,
        }
    }

    /// Append a new entry at the MRU position. Caller must ensure the
    /// bucket is not full.
    pub fn push_back(&mut self, mut node: NodeInfo) {
        node.last_seen = Instant::now();
        self.entries.push_back(node);
    }

    pub fn oldest(&self) -> Option<&NodeInfo> {
        self.entries.front()
    }

    pub fn pop_oldest(&mut self) -> Option<NodeInfo> {
        self.entries.pop_front()
    }

    pub fn remove(&mut self, node_id: &kadron_types::NodeId) -> Option<NodeInfo> {
        let idx = self.find_index(node_id)?;
        self.entries.remove(idx)
    }
}
