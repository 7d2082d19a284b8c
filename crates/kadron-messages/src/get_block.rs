//! Get-Block payload: a block-range request addressed to a target public
//! key, and the per-block stream header sent in reply.

use crate::{MessageError, Result};

pub const CONTROL_START: u8 = 0;

const PREFIX_SIZE: usize = 1 + 33;
const START_FIXED_SIZE: usize = 8 + 8 + 16 + 2;
pub const RANGE_SIZE: usize = 8 + 8;
pub const BLOCK_STREAM_HEADER_SIZE: usize = 1 + 16 + 8;

/// A half-open block-index range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

/// A Get-Block request. Only the `Start` control is defined by section 6;
/// any other control value is carried as an opaque tag with no payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GetBlock {
    Start {
        target: [u8; 33],
        block_count_limit: u64,
        max_block_size: u64,
        transfer_id: [u8; 16],
        ranges: Vec<Range>,
    },
    Other {
        control: u8,
        target: [u8; 33],
    },
}

impl GetBlock {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            GetBlock::Start {
                target,
                block_count_limit,
                max_block_size,
                transfer_id,
                ranges,
            } => {
                let mut out = Vec::with_capacity(
                    PREFIX_SIZE + START_FIXED_SIZE + ranges.len() * RANGE_SIZE,
                );
                out.push(CONTROL_START);
                out.extend_from_slice(target);
                out.extend_from_slice(&block_count_limit.to_le_bytes());
                out.extend_from_slice(&max_block_size.to_le_bytes());
                out.extend_from_slice(transfer_id);
                out.extend_from_slice(&(ranges.len() as u16).to_le_bytes());
                for range in ranges {
                    out.extend_from_slice(&range.start.to_le_bytes());
                    out.extend_from_slice(&range.end.to_le_bytes());
                }
                out
            }
            GetBlock::Other { control, target } => {
                let mut out = Vec::with_capacity(PREFIX_SIZE);
                out.push(*control);
                out.extend_from_slice(target);
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREFIX_SIZE {
            return Err(MessageError::Truncated {
                need: PREFIX_SIZE,
                got: bytes.len(),
            });
        }
        let control = bytes[0];
        let mut target = [0u8; 33];
        target.copy_from_slice(&bytes[1..34]);

        if control != CONTROL_START {
            return Ok(GetBlock::Other { control, target });
        }

        let tail = &bytes[PREFIX_SIZE..];
        if tail.len() < START_FIXED_SIZE {
            return Err(MessageError::Truncated {
                need: PREFIX_SIZE + START_FIXED_SIZE,
                got: bytes.len(),
            });
        }
        let block_count_limit = u64::from_le_bytes(tail[0..8].try_into().expect("8 bytes"));
        let max_block_size = u64::from_le_bytes(tail[8..16].try_into().expect("8 bytes"));
        let mut transfer_id = [0u8; 16];
        transfer_id.copy_from_slice(&tail[16..32]);
        let range_count =
            u16::from_le_bytes(tail[32..34].try_into().expect("2 bytes")) as usize;

        let ranges_bytes = &tail[START_FIXED_SIZE..];
        let ranges_need = range_count * RANGE_SIZE;
        if ranges_bytes.len() < ranges_need {
            return Err(MessageError::Truncated {
                need: PREFIX_SIZE + START_FIXED_SIZE + ranges_need,
                got: bytes.len(),
            });
        }
        let mut ranges = Vec::with_capacity(range_count);
        let mut offset = 0;
        for _ in 0..range_count {
            let start = u64::from_le_bytes(
                ranges_bytes[offset..offset + 8].try_into().expect("8 bytes"),
            );
            let end = u64::from_le_bytes(
                ranges_bytes[offset + 8..offset + 16]
                    .try_into()
                    .expect("8 bytes"),
            );
            ranges.push(Range { start, end });
            offset += RANGE_SIZE;
        }

        Ok(GetBlock::Start {
            target,
            block_count_limit,
            max_block_size,
            transfer_id,
            ranges,
        })
    }
}

/// Per-block stream header sent by the block source ahead of block bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockStreamHeader {
    pub availability: u8,
    pub range: Range,
    pub block_size: u64,
}

impl BlockStreamHeader {
    pub fn encode(&self) -> [u8; BLOCK_STREAM_HEADER_SIZE] {
        let mut out = [0u8; BLOCK_STREAM_HEADER_SIZE];
        out[0] = self.availability;
        out[1..9].copy_from_slice(&self.range.start.to_le_bytes());
        out[9..17].copy_from_slice(&self.range.end.to_le_bytes());
        out[17..25].copy_from_slice(&self.block_size.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOCK_STREAM_HEADER_SIZE {
            return Err(MessageError::Truncated {
                need: BLOCK_STREAM_HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let availability = bytes[0];
        let start = u64::from_le_bytes(bytes[1..9].try_into().expect("8 bytes"));
        let end = u64::from_le_bytes(bytes[9..17].try_into().expect("8 bytes"));
        let block_size = u64::from_le_bytes(bytes[17..25].try_into().expect("8 bytes"));
        Ok(BlockStreamHeader {
            availability,
            range: Range { start, end },
            block_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_roundtrip() {
        let msg = GetBlock::Start {
            target: [0x07; 33],
            block_count_limit: 10,
            max_block_size: 65536,
            transfer_id: [0x09; 16],
            ranges: vec![Range { start: 0, end: 4 }, Range { start: 8, end: 12 }],
        };
        let wire = msg.encode();
        assert_eq!(GetBlock::decode(&wire).expect("decode"), msg);
    }

    #[test]
    fn other_control_carries_no_payload() {
        let msg = GetBlock::Other {
            control: 5,
            target: [0x01; 33],
        };
        let wire = msg.encode();
        assert_eq!(GetBlock::decode(&wire).expect("decode"), msg);
    }

    #[test]
    fn block_stream_header_roundtrip() {
        let header = BlockStreamHeader {
            availability: 1,
            range: Range { start: 2, end: 6 },
            block_size: 32768,
        };
        let wire = header.encode();
        assert_eq!(BlockStreamHeader::decode(&wire).expect("decode"), header);
    }
}
