//! Traverse payload: a relayed, signed envelope carrying an embedded
//! packet plus both an IPv4 and an IPv6 candidate address for the target.

use crate::{MessageError, Result};

const FIXED_PREFIX_SIZE: usize = 33 + 33 + 8 + 2;
pub const SIGNATURE_SIZE: usize = 65;
const ADDR_SUFFIX_SIZE: usize = 4 + 2 + 2 + 16 + 2 + 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Traverse {
    pub target: [u8; 33],
    pub relay: [u8; 33],
    pub expiry: u64,
    pub embedded: Vec<u8>,
    pub signature: [u8; SIGNATURE_SIZE],
    pub ipv4: [u8; 4],
    pub ipv4_port: u16,
    pub ipv4_external_port: u16,
    pub ipv6: [u8; 16],
    pub ipv6_port: u16,
    pub ipv6_external_port: u16,
}

impl Traverse {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.embedded.len() > u16::MAX as usize {
            return Err(MessageError::LengthOverrun);
        }
        let mut out = Vec::with_capacity(
            FIXED_PREFIX_SIZE + self.embedded.len() + SIGNATURE_SIZE + ADDR_SUFFIX_SIZE,
        );
        out.extend_from_slice(&self.target);
        out.extend_from_slice(&self.relay);
        out.extend_from_slice(&self.expiry.to_le_bytes());
        out.extend_from_slice(&(self.embedded.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.embedded);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.ipv4);
        out.extend_from_slice(&self.ipv4_port.to_le_bytes());
        out.extend_from_slice(&self.ipv4_external_port.to_le_bytes());
        out.extend_from_slice(&self.ipv6);
        out.extend_from_slice(&self.ipv6_port.to_le_bytes());
        out.extend_from_slice(&self.ipv6_external_port.to_le_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_PREFIX_SIZE {
            return Err(MessageError::Truncated {
                need: FIXED_PREFIX_SIZE,
                got: bytes.len(),
            });
        }
        let mut target = [0u8; 33];
        target.copy_from_slice(&bytes[0..33]);
        let mut relay = [0u8; 33];
        relay.copy_from_slice(&bytes[33..66]);
        let expiry = u64::from_le_bytes(bytes[66..74].try_into().expect("8 bytes"));
        let embedded_size =
            u16::from_le_bytes(bytes[74..76].try_into().expect("2 bytes")) as usize;

        let tail_need = embedded_size + SIGNATURE_SIZE + ADDR_SUFFIX_SIZE;
        if bytes.len() < FIXED_PREFIX_SIZE + tail_need {
            return Err(MessageError::Truncated {
                need: FIXED_PREFIX_SIZE + tail_need,
                got: bytes.len(),
            });
        }

        let mut offset = FIXED_PREFIX_SIZE;
        let embedded = bytes[offset..offset + embedded_size].to_vec();
        offset += embedded_size;

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[offset..offset + SIGNATURE_SIZE]);
        offset += SIGNATURE_SIZE;

        let mut ipv4 = [0u8; 4];
        ipv4.copy_from_slice(&bytes[offset..offset + 4]);
        offset += 4;
        let ipv4_port = u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("2 bytes"));
        offset += 2;
        let ipv4_external_port =
            u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("2 bytes"));
        offset += 2;

        let mut ipv6 = [0u8; 16];
        ipv6.copy_from_slice(&bytes[offset..offset + 16]);
        offset += 16;
        let ipv6_port = u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("2 bytes"));
        offset += 2;
        let ipv6_external_port =
            u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("2 bytes"));

        Ok(Traverse {
            target,
            relay,
            expiry,
            embedded,
            signature,
            ipv4,
            ipv4_port,
            ipv4_external_port,
            ipv6,
            ipv6_port,
            ipv6_external_port,
        })
    }
}
