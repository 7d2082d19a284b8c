use std::net::SocketAddr;
use std::time::Instant;

use kadron_types::NodeId;
use rand::RngCore;

use crate::bucket::KBucket;
use crate::{K, NUM_BUCKETS};

/// A node known to the routing table.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub addr: SocketAddr,
    /// Compressed secp256k1 public key (33 bytes), used to recover the
    /// node's identity on inbound packets and to derive stream keys.
    pub public_key: [u8; 33],
    pub last_seen: Instant,
}

/// Result of [`RoutingTable::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Newly inserted into an empty slot.
    Inserted,
    /// Already present; moved to MRU position.
    Refreshed,
    /// Same ID as the local node; not inserted.
    Ignored,
    /// Bucket was full and `shouldEvict` returned false; candidate dropped.
    Discarded,
}

/// `B` k-buckets indexed by XOR-distance prefix length to the local node.
pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            buckets: (0..NUM_BUCKETS).map(|_| KBucket::new()).collect(),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Bucket index for `id`: `B - 1 - firstDifferingBit(self, id)`.
    /// `None` when `id` equals the local ID.
    pub fn bucket_index(&self, id: &NodeId) -> Option<usize> {
        self.local_id
            .first_differing_bit(id)
            .map(|bit| NUM_BUCKETS - 1 - bit)
    }

    /// Insert `node`. If already present, mark it seen (MRU) and return.
    /// Otherwise append if the bucket has room; if full, ask
    /// `should_evict(oldest, candidate)` whether to replace the oldest
    /// entry. `should_evict` must be pure with respect to the table (it may
    /// not mutate it).
    pub fn insert(
        &mut self,
        node: NodeInfo,
        should_evict: impl FnOnce(&NodeInfo, &NodeInfo) -> bool,
    ) -> InsertOutcome {
        if node.node_id == self.local_id {
            return InsertOutcome::Ignored;
        }
        let idx = match self.bucket_index(&node.node_id) {
            Some(idx) => idx,
            None => return InsertOutcome::Ignored,
        };
        let bucket = &mut self.buckets[idx];

        if bucket.mark_seen(&node.node_id) {
            return InsertOutcome::Refreshed;
        }

        if !bucket.is_full() {
            bucket.push_back(node);
            return InsertOutcome::Inserted;
        }

        let oldest = bucket.oldest().expect("full bucket has an oldest entry");
        if should_evict(oldest, &node) {
            let evicted = bucket.pop_oldest();
            bucket.push_back(node);
            tracing::debug!(bucket = idx, evicted = ?evicted.map(|e| e.node_id), "bucket full, evicted oldest entry");
            InsertOutcome::Inserted
        } else {
            tracing::debug!(bucket = idx, "bucket full, candidate discarded");
            InsertOutcome::Discarded
        }
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<NodeInfo> {
        let idx = self.bucket_index(id)?;
        let removed = self.buckets[idx].remove(id);
        if removed.is_some() {
            tracing::debug!(bucket = idx, "node removed from routing table");
        }
        removed
    }

    /// Move `id` to MRU and refresh its `last_seen`; no-op if absent.
    pub fn mark_as_seen(&mut self, id: &NodeId) {
        if let Some(idx) = self.bucket_index(id) {
            self.buckets[idx].mark_seen(id);
        }
    }

    /// Up to `count` nodes closest to `target`, stable-sorted ascending by
    /// distance. Starts at `target`'s bucket index and walks outward
    /// (i, i-1, i+1, i-2, i+2, ...) accumulating candidates, skipping
    /// `ignored` IDs and anything `filter` rejects.
    pub fn closest_contacts(
        &self,
        count: usize,
        target: &NodeId,
        filter: impl Fn(&NodeInfo) -> bool,
        ignored: &[NodeId],
    ) -> Vec<NodeInfo> {
        let start = self.bucket_index(target).unwrap_or(0);
        let mut collected: Vec<NodeInfo> = Vec::new();

        for idx in outward_indices(start, NUM_BUCKETS) {
            for entry in self.buckets[idx].iter() {
                if ignored.contains(&entry.node_id) {
                    continue;
                }
                if !filter(entry) {
                    continue;
                }
                collected.push(entry.clone());
            }
            if collected.len() >= count {
                break;
            }
        }

        collected.sort_by(|a, b| {
            a.node_id
                .distance(target)
                .0
                .cmp(&b.node_id.distance(target).0)
        });
        collected.truncate(count);
        collected
    }

    /// Produce an ID whose first differing bit with the local ID is at
    /// bucket `bucket` — upper bits mirror the local ID, the bit at that
    /// position is flipped, and remaining bits are random.
    pub fn random_id_in_bucket(&self, bucket: usize, rng: &mut impl RngCore) -> NodeId {
        let bit = NUM_BUCKETS - 1 - bucket;
        self.local_id.flip_at(bit, || (rng.next_u32() & 0xFF) as u8)
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_len(&self, idx: usize) -> usize {
        self.buckets[idx].len()
    }
}

fn outward_indices(start: usize, total: usize) -> Vec<usize> {
    let mut order = vec![start];
    let mut offset: isize = 1;
    loop {
        let lo = start as isize - offset;
        let hi = start as isize + offset;
        let mut pushed = false;
        if lo >= 0 {
            order.push(lo as usize);
            pushed = true;
        }
        if hi < total as isize {
            order.push(hi as usize);
            pushed = true;
        }
        if !pushed {
            break;
        }
        offset += 1;
    }
    order
}
