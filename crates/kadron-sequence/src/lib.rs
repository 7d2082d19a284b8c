//! Per-peer sequence-number registry and expiry discipline (section 4.4),
//! plus the lite-session-ID variant that reuses the same expiry machinery.
//!
//! Global mutable state in the system this substrate replaces (a
//! module-level sequence map) becomes per-instance state here: every
//! [`SequenceManager`] owns its own map, and tests construct fresh
//! instances rather than relying on statics.

pub mod lite_id;
pub mod manager;
pub mod sweeper;

pub use lite_id::LiteIdManager;
pub use manager::{
    InvalidateCallback, Namespace, PeerKey, SequenceManager, ValidateOutcome, COMPRESSED_KEY_SIZE,
};
pub use sweeper::{run_lite_sweeper, run_sweeper};

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("sequence (peer, number) not found or already expired")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, SequenceError>;
