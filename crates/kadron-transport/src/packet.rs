//! Data and control packet framing.
//!
//! Every packet on the wire shares a 16-byte header; the high bit of the
//! first word distinguishes data packets (the bit clear, remaining 31 bits
//! the [`PacketId`]) from control packets (the bit set, the next 15 bits a
//! [`ControlType`]). This is the same split UDT uses and the reason
//! [`PacketId`] reserves its own top bit.
//!
//! ## Data packet layout
//!
//! ```text
//! [0]  seq:31 (control bit clear)
//! [1]  boundary:2 | order:1 | msg_number:29
//! [2]  timestamp:32
//! [3]  dest_socket_id:32
//! [..] payload
//! ```
//!
//! ## Control packet layout
//!
//! ```text
//! [0]  control bit set | control_type:15 | reserved:16
//! [1]  additional_info:32
//! [2]  timestamp:32
//! [3]  dest_socket_id:32
//! [..] control information field (CIF), meaning depends on control_type
//! ```

use kadron_types::PacketId;

use crate::{Result, TransportError};

const HEADER_WORDS: usize = 4;
pub const HEADER_SIZE: usize = HEADER_WORDS * 4;
const CONTROL_BIT: u32 = 1 << 31;

/// Message boundary flags carried on a [`DataPacket`], mirroring how a
/// message may span, start, continue, or end a run of packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// The message spans multiple packets; this is the first.
    First,
    /// The message spans multiple packets; this is neither the first nor
    /// the last.
    Middle,
    /// The message spans multiple packets; this is the last.
    Last,
    /// The message fits entirely within this one packet.
    Only,
}

impl Boundary {
    fn bits(self) -> u32 {
        match self {
            Boundary::First => 0b10,
            Boundary::Middle => 0b00,
            Boundary::Last => 0b01,
            Boundary::Only => 0b11,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits {
            0b10 => Boundary::First,
            0b00 => Boundary::Middle,
            0b01 => Boundary::Last,
            _ => Boundary::Only,
        }
    }
}

/// A reliable data packet carrying one slice of an application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPacket {
    pub seq: PacketId,
    pub boundary: Boundary,
    /// Whether the receiver must deliver this message strictly in the
    /// order messages were sent (vs. as soon as all of its packets arrive).
    pub in_order: bool,
    /// Identifies which application message this packet belongs to; wraps
    /// at 2^29, independent of the packet sequence space.
    pub msg_number: u32,
    pub timestamp: u32,
    pub dest_socket_id: u32,
    pub payload: Vec<u8>,
}

const MSG_NUMBER_MASK: u32 = (1 << 29) - 1;

impl DataPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.seq.value().to_le_bytes());
        let word1 = (self.boundary.bits() << 30)
            | ((self.in_order as u32) << 29)
            | (self.msg_number & MSG_NUMBER_MASK);
        out.extend_from_slice(&word1.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.dest_socket_id.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransportError::MalformedPacket(format!(
                "need at least {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let word0 = read_u32(bytes, 0);
        if word0 & CONTROL_BIT != 0 {
            return Err(TransportError::MalformedPacket(
                "control bit set on data packet".into(),
            ));
        }
        let word1 = read_u32(bytes, 4);
        let timestamp = read_u32(bytes, 8);
        let dest_socket_id = read_u32(bytes, 12);
        Ok(DataPacket {
            seq: PacketId::new(word0),
            boundary: Boundary::from_bits(word1 >> 30),
            in_order: (word1 >> 29) & 1 == 1,
            msg_number: word1 & MSG_NUMBER_MASK,
            timestamp,
            dest_socket_id,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

/// Control packet subtype, following UDT's control-type numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlType {
    Handshake = 0,
    Keepalive = 1,
    Ack = 2,
    Nak = 3,
    Shutdown = 5,
    Ack2 = 6,
    MsgDropRequest = 7,
}

impl ControlType {
    fn from_u16(value: u16) -> Result<Self> {
        Ok(match value {
            0 => ControlType::Handshake,
            1 => ControlType::Keepalive,
            2 => ControlType::Ack,
            3 => ControlType::Nak,
            5 => ControlType::Shutdown,
            6 => ControlType::Ack2,
            7 => ControlType::MsgDropRequest,
            other => {
                return Err(TransportError::MalformedPacket(format!(
                    "unknown control type {other}"
                )))
            }
        })
    }
}

/// A control packet: handshake, keepalive, ACK/NAK/ACK2, shutdown, or a
/// message-drop request. The control information field (`cif`) is an
/// opaque byte blob whose layout is owned by the higher-level protocol
/// (handshake, ACK/NAK encoding) rather than this framing module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPacket {
    pub control_type: ControlType,
    pub additional_info: u32,
    pub timestamp: u32,
    pub dest_socket_id: u32,
    pub cif: Vec<u8>,
}

impl ControlPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.cif.len());
        let word0 = CONTROL_BIT | ((self.control_type as u32) << 16);
        out.extend_from_slice(&word0.to_le_bytes());
        out.extend_from_slice(&self.additional_info.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.dest_socket_id.to_le_bytes());
        out.extend_from_slice(&self.cif);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransportError::MalformedPacket(format!(
                "need at least {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let word0 = read_u32(bytes, 0);
        if word0 & CONTROL_BIT == 0 {
            return Err(TransportError::MalformedPacket(
                "control bit clear on control packet".into(),
            ));
        }
        let control_type = ControlType::from_u16(((word0 >> 16) & 0x7FFF) as u16)?;
        let additional_info = read_u32(bytes, 4);
        let timestamp = read_u32(bytes, 8);
        let dest_socket_id = read_u32(bytes, 12);
        Ok(ControlPacket {
            control_type,
            additional_info,
            timestamp,
            dest_socket_id,
            cif: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

/// Whether `bytes` is a control packet, without fully decoding it.
pub fn is_control(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && read_u32(bytes, 0) & CONTROL_BIT != 0
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_packet_roundtrip() {
        let pkt = DataPacket {
            seq: PacketId::new(12345),
            boundary: Boundary::First,
            in_order: true,
            msg_number: 99,
            timestamp: 555,
            dest_socket_id: 7,
            payload: b"hello".to_vec(),
        };
        let wire = pkt.encode();
        assert!(!is_control(&wire));
        assert_eq!(DataPacket::decode(&wire).expect("decode"), pkt);
    }

    #[test]
    fn control_packet_roundtrip() {
        let pkt = ControlPacket {
            control_type: ControlType::Nak,
            additional_info: 0,
            timestamp: 1,
            dest_socket_id: 2,
            cif: vec![1, 2, 3, 4],
        };
        let wire = pkt.encode();
        assert!(is_control(&wire));
        assert_eq!(ControlPacket::decode(&wire).expect("decode"), pkt);
    }

    #[test]
    fn boundary_bits_roundtrip_for_all_variants() {
        for boundary in [Boundary::First, Boundary::Middle, Boundary::Last, Boundary::Only] {
            assert_eq!(Boundary::from_bits(boundary.bits()), boundary);
        }
    }

    #[test]
    fn data_decode_rejects_control_bit() {
        let pkt = ControlPacket {
            control_type: ControlType::Keepalive,
            additional_info: 0,
            timestamp: 0,
            dest_socket_id: 0,
            cif: vec![],
        };
        assert!(DataPacket::decode(&pkt.encode()).is_err());
    }

    #[test]
    fn truncated_packet_is_rejected() {
        assert!(DataPacket::decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn unknown_control_type_is_rejected() {
        let mut wire = vec![0u8; HEADER_SIZE];
        let word0 = CONTROL_BIT | (99u32 << 16);
        wire[0..4].copy_from_slice(&word0.to_le_bytes());
        assert!(ControlPacket::decode(&wire).is_err());
    }
}
