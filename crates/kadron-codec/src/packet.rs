//! Full packet layout: 4 nonce | 1 protocol | 1 command | 4 sequence | 2
//! payload size | payload | 0..20 random padding | 65 signature.
//!
//! Only the 4-byte nonce prefix travels in the clear. Everything after it —
//! header fields, payload, padding and the signature itself — is XORed with
//! a keystream derived from the receiver's public key, so the signature
//! never appears on the wire in the same bytes twice even for a repeated
//! message.

use kadron_crypto::secp256k1::{self, PrivateKey, PublicKey, RecoverableSignature};
use kadron_crypto::stream;
use rand::RngCore;

use crate::{CodecError, Result};

/// Bytes before the payload in the decrypted body: protocol(1) + command(1)
/// + sequence(4) + payload-size(2).
pub const PACKET_HEADER_SIZE: usize = 1 + 1 + 4 + 2;
/// Safe UDP MTU floor packets are padded below, per section 4.3.
pub const MTU_FLOOR: usize = 508;
/// Maximum random padding added to a packet.
pub const MAX_PADDING: usize = 20;
const NONCE_SIZE: usize = 4;

/// A decoded full packet (without its cryptographic envelope).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub protocol: u8,
    pub command: u8,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(protocol: u8, command: u8, sequence: u32, payload: Vec<u8>) -> Self {
        Self {
            protocol,
            command,
            sequence,
            payload,
        }
    }

    /// Sign, pad and stream-encrypt this packet for `receiver`, authenticated
    /// under `sender`'s key. Returns the full wire-ready byte string.
    pub fn encode(&self, sender: &PrivateKey, receiver: &PublicKey) -> Result<Vec<u8>> {
        if self.payload.len() > u16::MAX as usize {
            return Err(CodecError::PayloadTooLarge(self.payload.len()));
        }

        let mut rng = rand::thread_rng();
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);

        let padding_len = padding_for(self.payload.len());
        let mut padding = vec![0u8; padding_len];
        rng.fill_bytes(&mut padding);

        let mut cleartext =
            Vec::with_capacity(PACKET_HEADER_SIZE + self.payload.len() + padding_len);
        cleartext.push(self.protocol);
        cleartext.push(self.command);
        cleartext.extend_from_slice(&self.sequence.to_le_bytes());
        cleartext.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        cleartext.extend_from_slice(&self.payload);
        cleartext.extend_from_slice(&padding);

        let signature = sender.sign_recoverable(&cleartext)?;

        let mut body = cleartext;
        body.extend_from_slice(&signature.bytes);

        let key = receiver.x_coordinate();
        stream::apply_keystream(&key, nonce, &mut body);

        let mut wire = Vec::with_capacity(NONCE_SIZE + body.len());
        wire.extend_from_slice(&nonce);
        wire.extend_from_slice(&body);
        Ok(wire)
    }

    /// Decrypt and verify a wire packet received as `self_key`, returning
    /// the packet and the sender's recovered public key.
    pub fn decode(wire: &[u8], self_key: &PublicKey) -> Result<(Self, PublicKey)> {
        const SIGNATURE_SIZE: usize = secp256k1::SIGNATURE_SIZE;
        let min_len = NONCE_SIZE + PACKET_HEADER_SIZE + SIGNATURE_SIZE;
        if wire.len() < min_len {
            return Err(CodecError::InvalidLength {
                need: min_len,
                got: wire.len(),
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&wire[..NONCE_SIZE]);

        let mut body = wire[NONCE_SIZE..].to_vec();
        let key = self_key.x_coordinate();
        stream::apply_keystream(&key, nonce, &mut body);

        if body.len() < PACKET_HEADER_SIZE + SIGNATURE_SIZE {
            return Err(CodecError::InvalidLength {
                need: PACKET_HEADER_SIZE + SIGNATURE_SIZE,
                got: body.len(),
            });
        }

        let protocol = body[0];
        let command = body[1];
        let sequence = u32::from_le_bytes(body[2..6].try_into().expect("4 bytes"));
        let payload_size = u16::from_le_bytes(body[6..8].try_into().expect("2 bytes")) as usize;

        let sig_start = body.len() - SIGNATURE_SIZE;
        let padding_len = sig_start
            .checked_sub(PACKET_HEADER_SIZE + payload_size)
            .ok_or(CodecError::SizeOverflow(payload_size))?;
        if padding_len > MAX_PADDING {
            return Err(CodecError::SizeOverflow(payload_size));
        }

        let payload = body[PACKET_HEADER_SIZE..PACKET_HEADER_SIZE + payload_size].to_vec();

        let mut sig_bytes = [0u8; SIGNATURE_SIZE];
        sig_bytes.copy_from_slice(&body[sig_start..]);
        let signature = RecoverableSignature { bytes: sig_bytes };

        let cleartext = &body[..sig_start];
        let sender = secp256k1::recover(cleartext, &signature)
            .map_err(|_| CodecError::InvalidSignature)?;

        Ok((
            Packet {
                protocol,
                command,
                sequence,
                payload,
            },
            sender,
        ))
    }
}

/// Random padding length that brings the packet close to (but not over)
/// [`MTU_FLOOR`], capped at [`MAX_PADDING`].
fn padding_for(payload_len: usize) -> usize {
    const SIGNATURE_SIZE: usize = secp256k1::SIGNATURE_SIZE;
    let base = NONCE_SIZE + PACKET_HEADER_SIZE + payload_len + SIGNATURE_SIZE;
    if base >= MTU_FLOOR {
        0
    } else {
        (MTU_FLOOR - base).min(MAX_PADDING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (PrivateKey, PublicKey) {
        let sk = PrivateKey::generate();
        let pk = sk.public_key();
        (sk, pk)
    }

    #[test]
    fn encode_decode_roundtrip_recovers_sender() {
        let (sender_sk, sender_pk) = keypair();
        let (_receiver_sk, receiver_pk) = keypair();

        let packet = Packet::new(1, 7, 42, b"hello kadron".to_vec());
        let wire = packet.encode(&sender_sk, &receiver_pk).expect("encode");

        let (decoded, recovered) = Packet::decode(&wire, &receiver_pk).expect("decode");
        assert_eq!(decoded, packet);
        assert_eq!(recovered, sender_pk);
    }

    #[test]
    fn flipped_ciphertext_byte_fails_decode() {
        let (sender_sk, _sender_pk) = keypair();
        let (_receiver_sk, receiver_pk) = keypair();

        let packet = Packet::new(1, 1, 1, b"payload".to_vec());
        let mut wire = packet.encode(&sender_sk, &receiver_pk).expect("encode");

        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        // Either the signature fails to parse/recover, or it recovers a key
        // that does not match the true sender — assert via roundtrip below
        // that a flip never reproduces the original sender key silently.
        match Packet::decode(&wire, &receiver_pk) {
            Err(_) => {}
            Ok((_, recovered)) => assert_ne!(recovered, sender_sk.public_key()),
        }
    }

    #[test]
    fn truncated_wire_is_rejected() {
        let (sender_sk, _sender_pk) = keypair();
        let (_receiver_sk, receiver_pk) = keypair();
        let packet = Packet::new(1, 1, 1, b"x".to_vec());
        let wire = packet.encode(&sender_sk, &receiver_pk).expect("encode");
        let truncated = &wire[..wire.len() - 40];
        assert!(Packet::decode(truncated, &receiver_pk).is_err());
    }

    #[test]
    fn payload_over_u16_is_rejected_at_encode() {
        let (sender_sk, _sender_pk) = keypair();
        let (_receiver_sk, receiver_pk) = keypair();
        let packet = Packet::new(1, 1, 1, vec![0u8; u16::MAX as usize + 1]);
        assert!(matches!(
            packet.encode(&sender_sk, &receiver_pk),
            Err(CodecError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn padding_brings_small_packets_toward_mtu_floor() {
        let len = padding_for(10);
        assert!(len <= MAX_PADDING);
    }
}
