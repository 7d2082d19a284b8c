//! Connection lifecycle: handshake, data exchange, shutdown/linger.
//!
//! ```text
//! Init --connect()--> Connecting --response--> Connected --close()--> Closed
//!                          |                        |
//!                          +--timeout-------> Timeout |
//!                          +--rejected------> Refused  +--bad packet--> Corrupted
//! ```

use std::time::Duration;

use kadron_metrics::{PacketCounters, PacketKind};
use kadron_types::{Clock, PacketId};
use rand::RngCore;

use crate::packet::{ControlPacket, ControlType};
use crate::{Result, TransportError};

/// Retry interval for an unacknowledged handshake request.
pub const HANDSHAKE_RETRY: Duration = Duration::from_millis(250);
/// Total time a connection attempt is allowed before giving up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// How long a closed connection lingers, accepting late packets, before
/// its state is fully discarded.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(10);

/// The state of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Connected,
    Closed,
    Refused,
    Corrupted,
    Timeout,
}

/// Wire mode negotiated during the handshake. Stream mode always frames
/// with `Boundary::Only` and ignores the order flag; datagram mode preserves
/// message boundaries and reassembles FIRST/MIDDLE/LAST runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Stream,
    Datagram,
}

impl Mode {
    fn to_u32(self) -> u32 {
        match self {
            Mode::Stream => 0,
            Mode::Datagram => 1,
        }
    }

    fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Mode::Stream),
            1 => Ok(Mode::Datagram),
            other => Err(TransportError::MalformedPacket(format!(
                "unknown connection mode {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct HandshakeInfo {
    version: u32,
    mode: Mode,
    max_packet_size: u32,
    max_flow_window: u32,
    initial_seq: PacketId,
    socket_id: u32,
}

const HANDSHAKE_CIF_SIZE: usize = 24;
const PROTOCOL_VERSION: u32 = 1;

impl HandshakeInfo {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDSHAKE_CIF_SIZE);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.mode.to_u32().to_le_bytes());
        out.extend_from_slice(&self.max_packet_size.to_le_bytes());
        out.extend_from_slice(&self.max_flow_window.to_le_bytes());
        out.extend_from_slice(&self.initial_seq.value().to_le_bytes());
        out.extend_from_slice(&self.socket_id.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HANDSHAKE_CIF_SIZE {
            return Err(TransportError::MalformedPacket(format!(
                "handshake CIF needs {HANDSHAKE_CIF_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let word = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().expect("4 bytes"));
        Ok(HandshakeInfo {
            version: word(0),
            mode: Mode::from_u32(word(4))?,
            max_packet_size: word(8),
            max_flow_window: word(12),
            initial_seq: PacketId::new(word(16)),
            socket_id: word(20),
        })
    }
}

/// One end of a reliable connection. This is a pure state machine: it
/// produces and consumes [`ControlPacket`]s but owns no socket, so its
/// transitions can be driven and tested without real network I/O.
pub struct Connection {
    pub state: ConnectionState,
    local_socket_id: u32,
    remote_socket_id: Option<u32>,
    local_initial_seq: PacketId,
    remote_initial_seq: Option<PacketId>,
    mode: Mode,
    max_packet_size: u32,
    max_flow_window: u32,
    connect_started_at: Option<std::time::Instant>,
    last_handshake_sent_at: Option<std::time::Instant>,
    counters: PacketCounters,
}

impl Connection {
    pub fn new(local_socket_id: u32, mode: Mode, max_packet_size: u32, max_flow_window: u32) -> Self {
        let initial_seq = PacketId::new(rand::thread_rng().next_u32());
        Self {
            state: ConnectionState::Init,
            local_socket_id,
            remote_socket_id: None,
            local_initial_seq: initial_seq,
            remote_initial_seq: None,
            mode,
            max_packet_size,
            max_flow_window,
            connect_started_at: None,
            last_handshake_sent_at: None,
            counters: PacketCounters::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Packet counters for this connection; share a periodic [`PacketCounters::log`]
    /// call from the owning task for diagnostic visibility.
    pub fn counters(&self) -> &PacketCounters {
        &self.counters
    }

    pub fn remote_socket_id(&self) -> Option<u32> {
        self.remote_socket_id
    }

    pub fn local_initial_seq(&self) -> PacketId {
        self.local_initial_seq
    }

    pub fn remote_initial_seq(&self) -> Option<PacketId> {
        self.remote_initial_seq
    }

    fn handshake_request(&self) -> ControlPacket {
        let info = HandshakeInfo {
            version: PROTOCOL_VERSION,
            mode: self.mode,
            max_packet_size: self.max_packet_size,
            max_flow_window: self.max_flow_window,
            initial_seq: self.local_initial_seq,
            socket_id: self.local_socket_id,
        };
        let cif = info.encode();
        self.counters
            .record_sent(PacketKind::Handshake, cif.len());
        ControlPacket {
            control_type: ControlType::Handshake,
            additional_info: 0,
            timestamp: 0,
            dest_socket_id: self.remote_socket_id.unwrap_or(0),
            cif,
        }
    }

    /// Begin connecting, producing the first handshake request to send.
    pub fn start_connect(&mut self, clock: &impl Clock) -> ControlPacket {
        self.state = ConnectionState::Connecting;
        let now = clock.now();
        self.connect_started_at = Some(now);
        self.last_handshake_sent_at = Some(now);
        tracing::debug!(socket_id = self.local_socket_id, "connection: Init -> Connecting");
        self.handshake_request()
    }

    /// Whether the caller should resend the handshake request now, and if
    /// so, the overall attempt has not yet timed out.
    pub fn poll_handshake_retry(&mut self, clock: &impl Clock) -> Option<ControlPacket> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        let now = clock.now();
        let started = self.connect_started_at?;
        if now.duration_since(started) >= CONNECT_TIMEOUT {
            self.state = ConnectionState::Timeout;
            return None;
        }
        let last_sent = self.last_handshake_sent_at?;
        if now.duration_since(last_sent) >= HANDSHAKE_RETRY {
            self.last_handshake_sent_at = Some(now);
            return Some(self.handshake_request());
        }
        None
    }

    /// Process a handshake response received while `Connecting`.
    pub fn on_handshake_response(&mut self, pkt: &ControlPacket) -> Result<()> {
        self.counters
            .record_received(PacketKind::Handshake, pkt.cif.len());
        if self.state != ConnectionState::Connecting {
            return Err(TransportError::InvalidState {
                expected: "Connecting",
                actual: self.state,
            });
        }
        if pkt.control_type != ControlType::Handshake {
            return Err(TransportError::MalformedPacket(
                "expected handshake control type".into(),
            ));
        }
        if pkt.additional_info == REJECTED_MARKER {
            self.state = ConnectionState::Refused;
            tracing::debug!(socket_id = self.local_socket_id, "connection: Connecting -> Refused (peer rejected)");
            return Err(TransportError::Refused);
        }
        let info = HandshakeInfo::decode(&pkt.cif)?;
        if info.version != PROTOCOL_VERSION || info.mode != self.mode {
            self.state = ConnectionState::Refused;
            tracing::debug!(
                socket_id = self.local_socket_id,
                peer_version = info.version,
                "connection: Connecting -> Refused (version or mode mismatch)"
            );
            return Err(TransportError::Refused);
        }
        self.remote_socket_id = Some(info.socket_id);
        self.remote_initial_seq = Some(info.initial_seq);
        self.max_flow_window = self.max_flow_window.min(info.max_flow_window);
        self.state = ConnectionState::Connected;
        tracing::debug!(socket_id = self.local_socket_id, "connection: Connecting -> Connected");
        Ok(())
    }

    /// Server side: accept an inbound handshake request, producing the
    /// response to send back. Returns `Refused` if the request's version or
    /// mode doesn't match what this side expects to speak; the caller
    /// should respond with [`Connection::reject`] in that case.
    pub fn accept(
        local_socket_id: u32,
        mode: Mode,
        max_packet_size: u32,
        max_flow_window: u32,
        req: &ControlPacket,
    ) -> Result<(Self, ControlPacket)> {
        if req.control_type != ControlType::Handshake {
            return Err(TransportError::MalformedPacket(
                "expected handshake control type".into(),
            ));
        }
        let info = HandshakeInfo::decode(&req.cif)?;
        if info.version != PROTOCOL_VERSION || info.mode != mode {
            tracing::debug!(
                socket_id = local_socket_id,
                peer_version = info.version,
                "connection: inbound handshake refused (version or mode mismatch)"
            );
            return Err(TransportError::Refused);
        }
        let mut conn = Self::new(local_socket_id, mode, max_packet_size, max_flow_window);
        conn.counters
            .record_received(PacketKind::Handshake, req.cif.len());
        conn.remote_socket_id = Some(info.socket_id);
        conn.remote_initial_seq = Some(info.initial_seq);
        conn.max_flow_window = conn.max_flow_window.min(info.max_flow_window);
        conn.state = ConnectionState::Connected;
        tracing::debug!(socket_id = local_socket_id, "connection: Init -> Connected (inbound)");
        let response = conn.handshake_request();
        Ok((conn, response))
    }

    /// Server side: reject an inbound handshake request.
    pub fn reject(local_socket_id: u32, mode: Mode, req: &ControlPacket) -> ControlPacket {
        ControlPacket {
            control_type: ControlType::Handshake,
            additional_info: REJECTED_MARKER,
            timestamp: 0,
            dest_socket_id: req.dest_socket_id,
            cif: HandshakeInfo {
                version: PROTOCOL_VERSION,
                mode,
                max_packet_size: 0,
                max_flow_window: 0,
                initial_seq: PacketId::ZERO,
                socket_id: local_socket_id,
            }
            .encode(),
        }
    }

    pub fn close(&mut self) {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Closed;
        }
    }

    pub fn mark_corrupted(&mut self) {
        self.state = ConnectionState::Corrupted;
    }
}

const REJECTED_MARKER: u32 = u32::MAX;
