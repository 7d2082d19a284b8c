//! Announcement payload: header + user-agent string + variable action
//! sections selected by the actions bitmap.

use crate::header::{Header, HEADER_SIZE};
use crate::{MessageError, Result};

pub const ACTION_FIND_PEER: u8 = 0x01;
pub const ACTION_FIND_VALUE: u8 = 0x02;
pub const ACTION_INFO_STORE: u8 = 0x04;

/// One entry of an INFO_STORE section: a content hash, its size, and a
/// caller-defined content type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreEntry {
    pub hash: [u8; 32],
    pub size: u64,
    pub kind: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    pub protocol: u8,
    pub features: u8,
    pub blockchain_height: u32,
    pub blockchain_version: u64,
    pub internal_port: u16,
    pub external_port: u16,
    pub user_agent: String,
    pub find_peer: Option<Vec<[u8; 32]>>,
    pub find_value: Option<Vec<[u8; 32]>>,
    pub info_store: Option<Vec<StoreEntry>>,
}

impl Announcement {
    fn actions_bitmap(&self) -> u8 {
        let mut bits = 0u8;
        if self.find_peer.is_some() {
            bits |= ACTION_FIND_PEER;
        }
        if self.find_value.is_some() {
            bits |= ACTION_FIND_VALUE;
        }
        if self.info_store.is_some() {
            bits |= ACTION_INFO_STORE;
        }
        bits
    }

    pub fn encode(&self) -> Vec<u8> {
        let ua_bytes = self.user_agent.as_bytes();
        let ua_len = ua_bytes.len().min(u8::MAX as usize) as u8;

        let header = Header {
            protocol: self.protocol,
            features: self.features,
            actions: self.actions_bitmap(),
            blockchain_height: self.blockchain_height,
            blockchain_version: self.blockchain_version,
            internal_port: self.internal_port,
            external_port: self.external_port,
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + ua_len as usize + 64);
        out.extend_from_slice(&header.encode(ua_len));
        out.extend_from_slice(&ua_bytes[..ua_len as usize]);

        if let Some(hashes) = &self.find_peer {
            out.extend_from_slice(&(hashes.len() as u16).to_le_bytes());
            for hash in hashes {
                out.extend_from_slice(hash);
            }
        }
        if let Some(hashes) = &self.find_value {
            out.extend_from_slice(&(hashes.len() as u16).to_le_bytes());
            for hash in hashes {
                out.extend_from_slice(hash);
            }
        }
        if let Some(entries) = &self.info_store {
            out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for entry in entries {
                out.extend_from_slice(&entry.hash);
                out.extend_from_slice(&entry.size.to_le_bytes());
                out.push(entry.kind);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, ua_len) = Header::decode(bytes)?;
        let mut offset = HEADER_SIZE;

        let ua_len = ua_len as usize;
        if bytes.len() < offset + ua_len {
            return Err(MessageError::Truncated {
                need: offset + ua_len,
                got: bytes.len(),
            });
        }
        let user_agent = std::str::from_utf8(&bytes[offset..offset + ua_len])?.to_string();
        offset += ua_len;

        let find_peer = if header.actions & ACTION_FIND_PEER != 0 {
            Some(read_hash_list(bytes, &mut offset)?)
        } else {
            None
        };
        let find_value = if header.actions & ACTION_FIND_VALUE != 0 {
            Some(read_hash_list(bytes, &mut offset)?)
        } else {
            None
        };
        let info_store = if header.actions & ACTION_INFO_STORE != 0 {
            Some(read_store_list(bytes, &mut offset)?)
        } else {
            None
        };

        // Design note (b): trailing bytes past the last declared section are
        // deliberately tolerated here ("for future features"); only the
        // declared sections themselves are length-checked.

        Ok(Announcement {
            protocol: header.protocol,
            features: header.features,
            blockchain_height: header.blockchain_height,
            blockchain_version: header.blockchain_version,
            internal_port: header.internal_port,
            external_port: header.external_port,
            user_agent,
            find_peer,
            find_value,
            info_store,
        })
    }
}

fn read_count(bytes: &[u8], offset: &mut usize) -> Result<usize> {
    if bytes.len() < *offset + 2 {
        return Err(MessageError::Truncated {
            need: *offset + 2,
            got: bytes.len(),
        });
    }
    let count = u16::from_le_bytes(bytes[*offset..*offset + 2].try_into().expect("2 bytes"));
    *offset += 2;
    Ok(count as usize)
}

fn read_hash_list(bytes: &[u8], offset: &mut usize) -> Result<Vec<[u8; 32]>> {
    let count = read_count(bytes, offset)?;
    let need = *offset + count * 32;
    if bytes.len() < need {
        return Err(MessageError::Truncated {
            need,
            got: bytes.len(),
        });
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[*offset..*offset + 32]);
        out.push(hash);
        *offset += 32;
    }
    Ok(out)
}

fn read_store_list(bytes: &[u8], offset: &mut usize) -> Result<Vec<StoreEntry>> {
    const ENTRY_SIZE: usize = 32 + 8 + 1;
    let count = read_count(bytes, offset)?;
    let need = *offset + count * ENTRY_SIZE;
    if bytes.len() < need {
        return Err(MessageError::Truncated {
            need,
            got: bytes.len(),
        });
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[*offset..*offset + 32]);
        let size = u64::from_le_bytes(
            bytes[*offset + 32..*offset + 40]
                .try_into()
                .expect("8 bytes"),
        );
        let kind = bytes[*offset + 40];
        out.push(StoreEntry { hash, size, kind });
        *offset += ENTRY_SIZE;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }

    fn base(find_peer: Option<Vec<[u8; 32]>>, find_value: Option<Vec<[u8; 32]>>) -> Announcement {
        Announcement {
            protocol: 3,
            features: 0,
            blockchain_height: 0,
            blockchain_version: 0,
            internal_port: 0,
            external_port: 0,
            user_agent: "Debug Test/1.0".to_string(),
            find_peer,
            find_value,
            info_store: None,
        }
    }

    #[test]
    fn find_peer_and_find_value_roundtrip() {
        let announcement = base(
            Some(vec![hash_of(b"test")]),
            Some(vec![hash_of(b"test3")]),
        );
        let wire = announcement.encode();
        let decoded = Announcement::decode(&wire).expect("decode");
        assert_eq!(decoded.user_agent, "Debug Test/1.0");
        assert_eq!(decoded.find_peer, Some(vec![hash_of(b"test")]));
        assert_eq!(decoded.find_value, Some(vec![hash_of(b"test3")]));
        assert_eq!(decoded.info_store, None);
    }

    #[test]
    fn trailing_extra_bytes_are_tolerated() {
        let announcement = base(Some(vec![hash_of(b"test")]), None);
        let mut wire = announcement.encode();
        wire.extend_from_slice(b"future-feature-bytes");
        let decoded = Announcement::decode(&wire).expect("decode tolerates trailing bytes");
        assert_eq!(decoded.find_peer, Some(vec![hash_of(b"test")]));
    }

    #[test]
    fn truncated_hash_list_is_rejected() {
        let announcement = base(Some(vec![hash_of(b"test"), hash_of(b"test2")]), None);
        let mut wire = announcement.encode();
        wire.truncate(wire.len() - 10);
        assert!(Announcement::decode(&wire).is_err());
    }

    #[test]
    fn info_store_roundtrip() {
        let mut announcement = base(None, None);
        announcement.info_store = Some(vec![StoreEntry {
            hash: hash_of(b"block"),
            size: 4096,
            kind: 1,
        }]);
        let wire = announcement.encode();
        let decoded = Announcement::decode(&wire).expect("decode");
        assert_eq!(decoded.info_store, announcement.info_store);
    }
}
