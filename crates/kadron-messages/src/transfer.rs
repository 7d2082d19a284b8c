//! Transfer payload: fixed control/protocol/hash prefix, then a
//! control-dependent tail — a byte range for a fresh request, or embedded
//! data for an active transfer.

use crate::{MessageError, Result};

pub const CONTROL_REQUEST: u8 = 0;
pub const CONTROL_NOT_AVAILABLE: u8 = 1;
pub const CONTROL_ACTIVE: u8 = 2;
pub const CONTROL_TERMINATE: u8 = 3;

const PREFIX_SIZE: usize = 1 + 1 + 32;
const RANGE_SIZE: usize = 8 + 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transfer {
    Request {
        embedded_protocol: u8,
        hash: [u8; 32],
        offset: u64,
        limit: u64,
    },
    NotAvailable {
        embedded_protocol: u8,
        hash: [u8; 32],
    },
    Active {
        embedded_protocol: u8,
        hash: [u8; 32],
        data: Vec<u8>,
    },
    Terminate {
        embedded_protocol: u8,
        hash: [u8; 32],
    },
}

impl Transfer {
    fn prefix(&self) -> (u8, u8, [u8; 32]) {
        match self {
            Transfer::Request {
                embedded_protocol,
                hash,
                ..
            } => (CONTROL_REQUEST, *embedded_protocol, *hash),
            Transfer::NotAvailable {
                embedded_protocol,
                hash,
            } => (CONTROL_NOT_AVAILABLE, *embedded_protocol, *hash),
            Transfer::Active {
                embedded_protocol,
                hash,
                ..
            } => (CONTROL_ACTIVE, *embedded_protocol, *hash),
            Transfer::Terminate {
                embedded_protocol,
                hash,
            } => (CONTROL_TERMINATE, *embedded_protocol, *hash),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let (control, embedded_protocol, hash) = self.prefix();
        let mut out = Vec::with_capacity(PREFIX_SIZE + 16);
        out.push(control);
        out.push(embedded_protocol);
        out.extend_from_slice(&hash);

        match self {
            Transfer::Request { offset, limit, .. } => {
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&limit.to_le_bytes());
            }
            Transfer::Active { data, .. } => out.extend_from_slice(data),
            Transfer::NotAvailable { .. } | Transfer::Terminate { .. } => {}
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREFIX_SIZE {
            return Err(MessageError::Truncated {
                need: PREFIX_SIZE,
                got: bytes.len(),
            });
        }
        let control = bytes[0];
        let embedded_protocol = bytes[1];
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        let tail = &bytes[PREFIX_SIZE..];

        match control {
            CONTROL_REQUEST => {
                if tail.len() < RANGE_SIZE {
                    return Err(MessageError::Truncated {
                        need: PREFIX_SIZE + RANGE_SIZE,
                        got: bytes.len(),
                    });
                }
                let offset = u64::from_le_bytes(tail[0..8].try_into().expect("8 bytes"));
                let limit = u64::from_le_bytes(tail[8..16].try_into().expect("8 bytes"));
                Ok(Transfer::Request {
                    embedded_protocol,
                    hash,
                    offset,
                    limit,
                })
            }
            CONTROL_NOT_AVAILABLE => Ok(Transfer::NotAvailable {
                embedded_protocol,
                hash,
            }),
            CONTROL_ACTIVE => Ok(Transfer::Active {
                embedded_protocol,
                hash,
                data: tail.to_vec(),
            }),
            CONTROL_TERMINATE => Ok(Transfer::Terminate {
                embedded_protocol,
                hash,
            }),
            other => Err(MessageError::UnknownControl(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let msg = Transfer::Request {
            embedded_protocol: 1,
            hash: [0x11; 32],
            offset: 1024,
            limit: 4096,
        };
        let wire = msg.encode();
        assert_eq!(Transfer::decode(&wire).expect("decode"), msg);
    }

    #[test]
    fn active_roundtrip_with_embedded_data() {
        let msg = Transfer::Active {
            embedded_protocol: 2,
            hash: [0x22; 32],
            data: b"block bytes".to_vec(),
        };
        let wire = msg.encode();
        assert_eq!(Transfer::decode(&wire).expect("decode"), msg);
    }

    #[test]
    fn unknown_control_is_rejected() {
        let mut wire = vec![0u8; PREFIX_SIZE];
        wire[0] = 0xFF;
        assert!(matches!(
            Transfer::decode(&wire),
            Err(MessageError::UnknownControl(0xFF))
        ));
    }
}
