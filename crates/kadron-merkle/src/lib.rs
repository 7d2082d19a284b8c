//! Content-addressed fragment verification (section 4.6).
//!
//! Builds a bottom-up Blake3 Merkle tree over fixed-size file fragments and
//! produces/verifies membership paths. Unlike a typical domain-separated
//! Merkle construction, leaves and inner nodes here are hashed with no
//! prefix at all, because the testable properties pin the exact digests:
//! the empty-input root is `Blake3("")` and a single-fragment root is the
//! plain hash of that fragment.

pub mod tree;

pub use tree::{MerkleTree, PathStep, HASH_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    #[error("fragment index {index} out of range (fragment count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("serialized buffer too short: expected at least {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("serialized buffer length {actual} does not match derived length {expected}")]
    BufferLengthMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, MerkleError>;
