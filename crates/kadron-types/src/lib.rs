//! Shared primitive types used across the networking substrate.
//!
//! - [`NodeId`] — opaque fixed-length identifier with XOR distance.
//! - [`PacketId`] — UDT-style 31-bit wraparound sequence number.
//! - [`addr_serde`] — `SocketAddr` as a string for wire-adjacent structs.
//! - [`Clock`] — injectable time source so tests can control deadlines.

pub mod clock;
pub mod node_id;
pub mod packet_id;

pub use clock::{Clock, SystemClock};
pub use node_id::{NodeId, NODE_ID_BITS, NODE_ID_BYTES};
pub use packet_id::PacketId;

pub mod addr_serde {
    //! Serde support for `SocketAddr` as a string, used by any struct that
    //! needs to persist or exchange an address outside the raw wire layouts
    //! in section 6 (which encode addresses as explicit field lists instead).
    use std::net::SocketAddr;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
