//! Unauthenticated ChaCha20 keystream encryption (section 4.3).
//!
//! The packet codec needs plain stream-cipher XOR, not an AEAD: the
//! recoverable ECDSA signature already authenticates the cleartext, and
//! stream-encrypting the signature itself is what keeps it from acting as
//! a stable fingerprint across packets. An authentication tag would add
//! nothing here and would cost 16 bytes per packet for no benefit.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;

/// Key size for the stream cipher (256 bits).
pub const KEY_SIZE: usize = 32;
/// Nonce size consumed by `ChaCha20` (64 bits counter + 64 bits nonce = 96
/// bits total at the cipher level, built here from the packet's 4-byte
/// nonce prefix duplicated to 8 bytes, zero-extended to 12).
pub const NONCE_SIZE: usize = 12;

/// Build the 12-byte ChaCha20 nonce from the packet's 4-byte nonce prefix,
/// per section 4.3: "32-bit value duplicated to form an 8-byte stream-cipher
/// nonce".
pub fn expand_nonce(nonce_prefix: [u8; 4]) -> [u8; NONCE_SIZE] {
    let mut out = [0u8; NONCE_SIZE];
    out[0..4].copy_from_slice(&nonce_prefix);
    out[4..8].copy_from_slice(&nonce_prefix);
    out
}

/// XOR `data` in place with the keystream derived from `key` and
/// `nonce_prefix`. Encryption and decryption are the same operation.
pub fn apply_keystream(key: &[u8; KEY_SIZE], nonce_prefix: [u8; 4], data: &mut [u8]) {
    let nonce = expand_nonce(nonce_prefix);
    let mut cipher = ChaCha20::new(key.into(), &nonce.into());
    cipher.apply_keystream(data);
}
