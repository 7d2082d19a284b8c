//! # kadron-crypto
//!
//! Cryptographic primitives for the packet codec. No algorithm negotiation
//! is permitted — the cryptographic suite is fixed.
//!
//! ## Modules
//!
//! - [`secp256k1`] — compact recoverable ECDSA signing/recovery
//! - [`stream`] — unauthenticated ChaCha20 keystream encryption

pub mod secp256k1;
pub mod stream;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Signature verification or recovery failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
