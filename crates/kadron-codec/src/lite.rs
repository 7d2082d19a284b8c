//! Lite packet variant: a session-ID-authenticated datagram that skips
//! per-packet signing and encryption entirely. Session IDs are pre-negotiated
//! out of band (by the full packet codec, typically via a Response message);
//! callers reject unsolicited session IDs themselves — this module only
//! handles the fixed wire framing.

use crate::{CodecError, Result};

/// Bytes before the payload: 16-byte session ID + 2-byte payload size.
pub const LITE_HEADER_SIZE: usize = 16 + 2;

/// A decoded lite packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LitePacket {
    pub session_id: [u8; 16],
    pub payload: Vec<u8>,
}

impl LitePacket {
    pub fn new(session_id: [u8; 16], payload: Vec<u8>) -> Self {
        Self {
            session_id,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > u16::MAX as usize {
            return Err(CodecError::PayloadTooLarge(self.payload.len()));
        }
        let mut wire = Vec::with_capacity(LITE_HEADER_SIZE + self.payload.len());
        wire.extend_from_slice(&self.session_id);
        wire.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        wire.extend_from_slice(&self.payload);
        Ok(wire)
    }

    pub fn decode(wire: &[u8]) -> Result<Self> {
        if wire.len() < LITE_HEADER_SIZE {
            return Err(CodecError::InvalidLength {
                need: LITE_HEADER_SIZE,
                got: wire.len(),
            });
        }
        let mut session_id = [0u8; 16];
        session_id.copy_from_slice(&wire[..16]);
        let payload_size = u16::from_le_bytes(wire[16..18].try_into().expect("2 bytes")) as usize;

        if wire.len() != LITE_HEADER_SIZE + payload_size {
            return Err(CodecError::SizeOverflow(payload_size));
        }

        Ok(Self {
            session_id,
            payload: wire[LITE_HEADER_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let packet = LitePacket::new([0x42; 16], b"lite payload".to_vec());
        let wire = packet.encode().expect("encode");
        let decoded = LitePacket::decode(&wire).expect("decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn mismatched_size_field_is_rejected() {
        let packet = LitePacket::new([0x01; 16], b"abc".to_vec());
        let mut wire = packet.encode().expect("encode");
        wire.truncate(wire.len() - 1);
        assert!(LitePacket::decode(&wire).is_err());
    }

    #[test]
    fn too_short_for_header_is_rejected() {
        assert!(LitePacket::decode(&[0u8; 10]).is_err());
    }
}
