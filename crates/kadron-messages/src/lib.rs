//! Typed on-the-wire layouts for Announcement, Response, Transfer,
//! Get-Block and Traverse (section 6). All integers are little-endian
//! except where noted; every message is a tagged variant over its own
//! command byte rather than an open inheritance hierarchy (Design Notes).

pub mod announcement;
pub mod get_block;
pub mod response;
pub mod traverse;
pub mod transfer;

pub use announcement::Announcement;
pub use get_block::GetBlock;
pub use response::Response;
pub use traverse::Traverse;
pub use transfer::Transfer;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message too short: need at least {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("trailing bytes declared by a length field overrun the buffer")]
    LengthOverrun,

    #[error("invalid UTF-8 in user-agent string")]
    InvalidUserAgent(#[from] std::str::Utf8Error),

    #[error("unknown control value {0}")]
    UnknownControl(u8),

    #[error("an IPv6 field encodes a 4-mapped IPv4 address")]
    Ipv4MappedIpv6,
}

pub type Result<T> = std::result::Result<T, MessageError>;

/// Shared 20-byte Announcement/Response header.
pub mod header {
    use crate::{MessageError, Result};

    pub const HEADER_SIZE: usize = 20;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Header {
        /// Low 4 bits only; the high nibble is reserved and always zero.
        pub protocol: u8,
        pub features: u8,
        pub actions: u8,
        pub blockchain_height: u32,
        pub blockchain_version: u64,
        pub internal_port: u16,
        pub external_port: u16,
    }

    impl Header {
        pub fn encode(&self, user_agent_len: u8) -> [u8; HEADER_SIZE] {
            let mut out = [0u8; HEADER_SIZE];
            out[0] = self.protocol & 0x0F;
            out[1] = self.features;
            out[2] = self.actions;
            out[3..7].copy_from_slice(&self.blockchain_height.to_le_bytes());
            out[7..15].copy_from_slice(&self.blockchain_version.to_le_bytes());
            out[15..17].copy_from_slice(&self.internal_port.to_le_bytes());
            out[17..19].copy_from_slice(&self.external_port.to_le_bytes());
            out[19] = user_agent_len;
            out
        }

        pub fn decode(bytes: &[u8]) -> Result<(Self, u8)> {
            if bytes.len() < HEADER_SIZE {
                return Err(MessageError::Truncated {
                    need: HEADER_SIZE,
                    got: bytes.len(),
                });
            }
            let header = Header {
                protocol: bytes[0] & 0x0F,
                features: bytes[1],
                actions: bytes[2],
                blockchain_height: u32::from_le_bytes(bytes[3..7].try_into().expect("4 bytes")),
                blockchain_version: u64::from_le_bytes(bytes[7..15].try_into().expect("8 bytes")),
                internal_port: u16::from_le_bytes(bytes[15..17].try_into().expect("2 bytes")),
                external_port: u16::from_le_bytes(bytes[17..19].try_into().expect("2 bytes")),
            };
            Ok((header, bytes[19]))
        }
    }
}
