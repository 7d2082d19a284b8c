//! Response payload: header + 6-byte section-count trailer + three
//! variable sections (peer records, embedded files, not-found hashes).

use crate::header::{Header, HEADER_SIZE};
use crate::{MessageError, Result};

pub const PEER_RECORD_SIZE: usize = 70;
const COUNTS_SIZE: usize = 6;

/// `reason` discriminant for a [`PeerRecord`].
pub const REASON_CLOSEST: u8 = 0;
pub const REASON_STORING: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    pub public_key: [u8; 33],
    pub ipv4: [u8; 4],
    pub ipv4_port: u16,
    pub ipv4_internal_port: u16,
    pub ipv4_external_port: u16,
    pub ipv6: [u8; 16],
    pub ipv6_port: u16,
    pub ipv6_internal_port: u16,
    pub ipv6_external_port: u16,
    pub last_contact_secs: u32,
    pub reason: u8,
}

impl PeerRecord {
    fn encode(&self) -> [u8; PEER_RECORD_SIZE] {
        let mut out = [0u8; PEER_RECORD_SIZE];
        let mut o = 0;
        out[o..o + 33].copy_from_slice(&self.public_key);
        o += 33;
        out[o..o + 4].copy_from_slice(&self.ipv4);
        o += 4;
        out[o..o + 2].copy_from_slice(&self.ipv4_port.to_le_bytes());
        o += 2;
        out[o..o + 2].copy_from_slice(&self.ipv4_internal_port.to_le_bytes());
        o += 2;
        out[o..o + 2].copy_from_slice(&self.ipv4_external_port.to_le_bytes());
        o += 2;
        out[o..o + 16].copy_from_slice(&self.ipv6);
        o += 16;
        out[o..o + 2].copy_from_slice(&self.ipv6_port.to_le_bytes());
        o += 2;
        out[o..o + 2].copy_from_slice(&self.ipv6_internal_port.to_le_bytes());
        o += 2;
        out[o..o + 2].copy_from_slice(&self.ipv6_external_port.to_le_bytes());
        o += 2;
        out[o..o + 4].copy_from_slice(&self.last_contact_secs.to_le_bytes());
        o += 4;
        out[o] = self.reason;
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        debug_assert_eq!(bytes.len(), PEER_RECORD_SIZE);
        let mut o = 0;
        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(&bytes[o..o + 33]);
        o += 33;
        let mut ipv4 = [0u8; 4];
        ipv4.copy_from_slice(&bytes[o..o + 4]);
        o += 4;
        let ipv4_port = u16::from_le_bytes(bytes[o..o + 2].try_into().expect("2 bytes"));
        o += 2;
        let ipv4_internal_port = u16::from_le_bytes(bytes[o..o + 2].try_into().expect("2 bytes"));
        o += 2;
        let ipv4_external_port = u16::from_le_bytes(bytes[o..o + 2].try_into().expect("2 bytes"));
        o += 2;
        let mut ipv6 = [0u8; 16];
        ipv6.copy_from_slice(&bytes[o..o + 16]);
        o += 16;
        let ipv6_port = u16::from_le_bytes(bytes[o..o + 2].try_into().expect("2 bytes"));
        o += 2;
        let ipv6_internal_port = u16::from_le_bytes(bytes[o..o + 2].try_into().expect("2 bytes"));
        o += 2;
        let ipv6_external_port = u16::from_le_bytes(bytes[o..o + 2].try_into().expect("2 bytes"));
        o += 2;
        let last_contact_secs = u32::from_le_bytes(bytes[o..o + 4].try_into().expect("4 bytes"));
        o += 4;
        let reason = bytes[o];

        if is_ipv4_mapped(&ipv6) {
            return Err(MessageError::Ipv4MappedIpv6);
        }

        Ok(PeerRecord {
            public_key,
            ipv4,
            ipv4_port,
            ipv4_internal_port,
            ipv4_external_port,
            ipv6,
            ipv6_port,
            ipv6_internal_port,
            ipv6_external_port,
            last_contact_secs,
            reason,
        })
    }
}

/// `::ffff:a.b.c.d` — a 4-mapped IPv4 address packed into the 16-byte IPv6
/// field, which section 6 declares invalid (callers should use the IPv4
/// field instead).
fn is_ipv4_mapped(ipv6: &[u8; 16]) -> bool {
    ipv6[0..10] == [0u8; 10] && ipv6[10] == 0xFF && ipv6[11] == 0xFF
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub hash: [u8; 32],
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub protocol: u8,
    pub features: u8,
    pub blockchain_height: u32,
    pub blockchain_version: u64,
    pub internal_port: u16,
    pub external_port: u16,
    pub user_agent: String,
    pub peers: Vec<PeerRecord>,
    pub embedded_files: Vec<EmbeddedFile>,
    pub not_found: Vec<[u8; 32]>,
}

impl Response {
    pub fn encode(&self) -> Vec<u8> {
        let ua_bytes = self.user_agent.as_bytes();
        let ua_len = ua_bytes.len().min(u8::MAX as usize) as u8;

        let header = Header {
            protocol: self.protocol,
            features: self.features,
            actions: 0,
            blockchain_height: self.blockchain_height,
            blockchain_version: self.blockchain_version,
            internal_port: self.internal_port,
            external_port: self.external_port,
        };

        let mut out = Vec::new();
        out.extend_from_slice(&header.encode(ua_len));
        out.extend_from_slice(&ua_bytes[..ua_len as usize]);

        out.extend_from_slice(&(self.peers.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.embedded_files.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.not_found.len() as u16).to_le_bytes());

        for peer in &self.peers {
            out.extend_from_slice(&peer.encode());
        }
        for file in &self.embedded_files {
            out.extend_from_slice(&file.hash);
            out.extend_from_slice(&(file.data.len() as u16).to_le_bytes());
            out.extend_from_slice(&file.data);
        }
        for hash in &self.not_found {
            out.extend_from_slice(hash);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, ua_len) = Header::decode(bytes)?;
        let mut offset = HEADER_SIZE;

        let ua_len = ua_len as usize;
        if bytes.len() < offset + ua_len + COUNTS_SIZE {
            return Err(MessageError::Truncated {
                need: offset + ua_len + COUNTS_SIZE,
                got: bytes.len(),
            });
        }
        let user_agent = std::str::from_utf8(&bytes[offset..offset + ua_len])?.to_string();
        offset += ua_len;

        let peer_count =
            u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("2 bytes")) as usize;
        let file_count = u16::from_le_bytes(
            bytes[offset + 2..offset + 4].try_into().expect("2 bytes"),
        ) as usize;
        let not_found_count = u16::from_le_bytes(
            bytes[offset + 4..offset + 6].try_into().expect("2 bytes"),
        ) as usize;
        offset += COUNTS_SIZE;

        let peers_need = offset + peer_count * PEER_RECORD_SIZE;
        if bytes.len() < peers_need {
            return Err(MessageError::Truncated {
                need: peers_need,
                got: bytes.len(),
            });
        }
        let mut peers = Vec::with_capacity(peer_count);
        for _ in 0..peer_count {
            peers.push(PeerRecord::decode(&bytes[offset..offset + PEER_RECORD_SIZE])?);
            offset += PEER_RECORD_SIZE;
        }

        let mut embedded_files = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            if bytes.len() < offset + 34 {
                return Err(MessageError::Truncated {
                    need: offset + 34,
                    got: bytes.len(),
                });
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[offset..offset + 32]);
            let size = u16::from_le_bytes(
                bytes[offset + 32..offset + 34].try_into().expect("2 bytes"),
            ) as usize;
            offset += 34;
            if bytes.len() < offset + size {
                return Err(MessageError::Truncated {
                    need: offset + size,
                    got: bytes.len(),
                });
            }
            let data = bytes[offset..offset + size].to_vec();
            offset += size;
            embedded_files.push(EmbeddedFile { hash, data });
        }

        let not_found_need = offset + not_found_count * 32;
        if bytes.len() < not_found_need {
            return Err(MessageError::Truncated {
                need: not_found_need,
                got: bytes.len(),
            });
        }
        let mut not_found = Vec::with_capacity(not_found_count);
        for _ in 0..not_found_count {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[offset..offset + 32]);
            not_found.push(hash);
            offset += 32;
        }

        Ok(Response {
            protocol: header.protocol,
            features: header.features,
            blockchain_height: header.blockchain_height,
            blockchain_version: header.blockchain_version,
            internal_port: header.internal_port,
            external_port: header.external_port,
            user_agent,
            peers,
            embedded_files,
            not_found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_peer(reason: u8) -> PeerRecord {
        PeerRecord {
            public_key: [0x02; 33],
            ipv4: [127, 0, 0, 1],
            ipv4_port: 4001,
            ipv4_internal_port: 4001,
            ipv4_external_port: 4002,
            ipv6: [0u8; 16],
            ipv6_port: 0,
            ipv6_internal_port: 0,
            ipv6_external_port: 0,
            last_contact_secs: 120,
            reason,
        }
    }

    #[test]
    fn roundtrip_with_all_sections() {
        let response = Response {
            protocol: 3,
            features: 0,
            blockchain_height: 100,
            blockchain_version: 1,
            internal_port: 1,
            external_port: 2,
            user_agent: "kadron/0.1".to_string(),
            peers: vec![sample_peer(REASON_CLOSEST), sample_peer(REASON_STORING)],
            embedded_files: vec![EmbeddedFile {
                hash: [0x09; 32],
                data: b"file-bytes".to_vec(),
            }],
            not_found: vec![[0x0A; 32]],
        };
        let wire = response.encode();
        let decoded = Response::decode(&wire).expect("decode");
        assert_eq!(decoded, response);
    }

    #[test]
    fn ipv4_mapped_ipv6_is_rejected() {
        let mut peer = sample_peer(REASON_CLOSEST);
        peer.ipv6[10] = 0xFF;
        peer.ipv6[11] = 0xFF;
        peer.ipv6[12..16].copy_from_slice(&[10, 0, 0, 1]);
        let response = Response {
            protocol: 1,
            features: 0,
            blockchain_height: 0,
            blockchain_version: 0,
            internal_port: 0,
            external_port: 0,
            user_agent: String::new(),
            peers: vec![peer],
            embedded_files: vec![],
            not_found: vec![],
        };
        let wire = response.encode();
        assert!(matches!(
            Response::decode(&wire),
            Err(MessageError::Ipv4MappedIpv6)
        ));
    }
}
