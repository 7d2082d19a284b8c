//! Compact recoverable ECDSA over secp256k1 (section 4.3).
//!
//! The wire format carries no explicit sender identity: the signature
//! itself lets a verifier recover the signer's public key. This mirrors
//! the `k256`/`ecdsa` "recoverable signatures" flow directly rather than
//! a plain sign/verify pair.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// Length of a compact recoverable signature: 64-byte `r || s` plus a
/// 1-byte recovery id.
pub const SIGNATURE_SIZE: usize = 65;
/// Length of a compressed secp256k1 public key (`0x02`/`0x03` prefix + X coordinate).
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// A secp256k1 signing key. Zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey {
    inner: SigningKey,
}

/// A secp256k1 public key, stored in compressed form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

/// A compact recoverable ECDSA signature: 64 bytes `r || s` plus 1 byte
/// recovery id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub bytes: [u8; SIGNATURE_SIZE],
}

impl PrivateKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = SigningKey::from_bytes(bytes.into())
            .map_err(|_| CryptoError::InvalidInput("invalid secp256k1 scalar".into()))?;
        Ok(Self { inner })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// Sign `message` with a compact recoverable signature.
    pub fn sign_recoverable(&self, message: &[u8]) -> Result<RecoverableSignature> {
        let (signature, recovery_id): (EcdsaSignature, RecoveryId) = self
            .inner
            .sign_recoverable(message)
            .map_err(|_| CryptoError::SignatureVerification)?;

        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(RecoverableSignature { bytes })
    }
}

impl PublicKey {
    pub fn from_compressed(bytes: &[u8; COMPRESSED_PUBLIC_KEY_SIZE]) -> Result<Self> {
        let inner = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|_| CryptoError::InvalidInput("invalid compressed public key".into()))?;
        Ok(Self { inner })
    }

    pub fn to_compressed(&self) -> [u8; COMPRESSED_PUBLIC_KEY_SIZE] {
        let point = self.inner.to_encoded_point(true);
        let mut out = [0u8; COMPRESSED_PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// The X coordinate of the compressed encoding (compressed bytes minus
    /// the leading parity byte). Used as the packet-codec stream-cipher key.
    pub fn x_coordinate(&self) -> [u8; 32] {
        let compressed = self.to_compressed();
        let mut out = [0u8; 32];
        out.copy_from_slice(&compressed[1..]);
        out
    }

    /// Verify a plain (non-recoverable) signature against this key.
    pub fn verify_prehash(&self, prehash: &[u8; 32], signature: &EcdsaSignature) -> Result<()> {
        self.inner
            .verify_prehash(prehash, signature)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

/// Recover the signer's public key from a message and its recoverable
/// signature, and verify the signature in the same step.
pub fn recover(message: &[u8], signature: &RecoverableSignature) -> Result<PublicKey> {
    let sig = EcdsaSignature::from_slice(&signature.bytes[..64])
        .map_err(|_| CryptoError::SignatureVerification)?;
    let recid = RecoveryId::from_byte(signature.bytes[64])
        .ok_or(CryptoError::SignatureVerification)?;
    let inner = VerifyingKey::recover_from_msg(message, &sig, recid)
        .map_err(|_| CryptoError::SignatureVerification)?;
    Ok(PublicKey { inner })
}
