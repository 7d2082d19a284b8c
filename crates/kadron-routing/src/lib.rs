//! Kademlia-style routing table (section 4.1).
//!
//! Buckets are mutated only under a single exclusive lock by the caller
//! (the lock itself lives above this crate, per the concurrency model in
//! section 5); this crate provides the plain, single-threaded data
//! structure and its invariants.

pub mod bucket;
pub mod table;

pub use bucket::KBucket;
pub use table::{InsertOutcome, NodeInfo, RoutingTable};

/// Bucket capacity `K`.
pub const K: usize = 20;
/// Number of buckets, equal to the node-ID bit-length `B`.
pub const NUM_BUCKETS: usize = kadron_types::NODE_ID_BITS;
