//! Iterative Store/FindNode/FindValue search engine over pluggable send
//! hooks (section 4.2), plus bucket-refresh scheduling. The routing table
//! itself lives in `kadron-routing`; this crate drives searches over it.

pub mod refresh;
pub mod search;
pub mod shortlist;

pub use refresh::refresh_targets;
pub use search::{
    announce, parse_key, run_search, FindValueResult, SearchAction, SearchConfig, SearchOutcome,
    SearchTransport,
};
pub use shortlist::ShortList;

/// Parallelism factor `alpha`.
pub const ALPHA: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, DhtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_three() {
        assert_eq!(ALPHA, 3);
    }
}
