//! # kadron-transport
//!
//! UDT-style reliable transport over UDP for the Kadron networking
//! substrate.
//!
//! This crate provides the connection-oriented layer above the raw wire
//! codec ([`kadron_codec`](../kadron_codec/index.html)):
//!
//! - **Connection lifecycle** — handshake, data exchange, shutdown/linger —
//!   via [`connection`]
//! - **Packet framing** — data and control packets sharing the 31-bit
//!   [`kadron_types::PacketId`] sequence space — via [`packet`]
//! - **Message reassembly** — datagram and streaming boundary handling,
//!   including out-of-order arrival — via [`reassembly`]
//! - **Send scheduling** — the ACK/NAK/ACK2 loop and loss-list bookkeeping
//!   that drives [`kadron_congestion::CongestionController`] — via
//!   [`sender`]
//!
//! ## Architecture
//!
//! ```text
//! Application message
//!     |
//!     v
//! MessageReassembler (reassembly.rs)  -- boundary flags, ordering
//!     |
//!     v
//! DataPacket (packet.rs)              -- PacketId + msgno + boundary bits
//!     |
//!     v
//! SendScheduler (sender.rs)           -- congestion-paced dispatch, ACK/NAK
//!     |
//!     v
//! Connection (connection.rs)          -- handshake, state machine, linger
//!     |
//!     v
//! UDP socket
//! ```

pub mod connection;
pub mod packet;
pub mod reassembly;
pub mod sender;

pub use connection::{Connection, ConnectionState, Mode};
pub use packet::{Boundary, ControlPacket, ControlType, DataPacket};
pub use reassembly::MessageReassembler;
pub use sender::{SchedulerState, SendScheduler};

/// Error types for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A wire-format packet was too short or otherwise malformed.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// An operation was attempted in a state that does not allow it, e.g.
    /// sending data before the handshake completes.
    #[error("invalid connection state: expected {expected}, got {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: ConnectionState,
    },

    /// The peer's handshake response rejected the connection.
    #[error("connection refused by peer")]
    Refused,

    /// The handshake did not complete within the connect timeout.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// A data exchange stalled long enough to declare the connection dead.
    #[error("connection timed out waiting for peer")]
    Timeout,

    /// A received packet failed structural validation (e.g. an
    /// out-of-range sequence number relative to the expected window).
    #[error("corrupted stream: {0}")]
    Corrupted(String),

    /// A message exceeded the configured maximum message size.
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
