//! Per-socket packet counters.
//!
//! Earlier revisions of this kind of instrumentation tend to reach for a
//! process-global counter table keyed by socket ID. That makes tests that
//! spin up more than one socket interfere with each other's counts, so here
//! each [`Connection`](crate) gets its own [`PacketCounters`] instance
//! instead — ordinary struct state, not a `static`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The packet kinds counted, matching `kadron_transport`'s control types
/// plus data packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Data,
    Handshake,
    Keepalive,
    Ack,
    Nak,
    Ack2,
    Shutdown,
    MsgDropRequest,
}

const KIND_COUNT: usize = 8;

impl PacketKind {
    fn index(self) -> usize {
        match self {
            PacketKind::Data => 0,
            PacketKind::Handshake => 1,
            PacketKind::Keepalive => 2,
            PacketKind::Ack => 3,
            PacketKind::Nak => 4,
            PacketKind::Ack2 => 5,
            PacketKind::Shutdown => 6,
            PacketKind::MsgDropRequest => 7,
        }
    }

    const ALL: [PacketKind; KIND_COUNT] = [
        PacketKind::Data,
        PacketKind::Handshake,
        PacketKind::Keepalive,
        PacketKind::Ack,
        PacketKind::Nak,
        PacketKind::Ack2,
        PacketKind::Shutdown,
        PacketKind::MsgDropRequest,
    ];
}

/// Packet counters for a single socket or connection. Cheap to construct
/// and safe to share behind an `Arc` if multiple tasks touch the same
/// connection.
#[derive(Default)]
pub struct PacketCounters {
    sent: [AtomicU64; KIND_COUNT],
    received: [AtomicU64; KIND_COUNT],
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    retransmissions: AtomicU64,
}

/// A point-in-time read of a [`PacketCounters`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent: [u64; KIND_COUNT],
    pub received: [u64; KIND_COUNT],
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub retransmissions: u64,
}

impl PacketCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, kind: PacketKind, bytes: usize) {
        self.sent[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, kind: PacketKind, bytes: usize) {
        self.received[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_retransmission(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut sent = [0u64; KIND_COUNT];
        let mut received = [0u64; KIND_COUNT];
        for kind in PacketKind::ALL {
            sent[kind.index()] = self.sent[kind.index()].load(Ordering::Relaxed);
            received[kind.index()] = self.received[kind.index()].load(Ordering::Relaxed);
        }
        CounterSnapshot {
            sent,
            received,
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
        }
    }

    /// Emit the current snapshot as a structured tracing event, for
    /// periodic diagnostic logging by the owning connection.
    pub fn log(&self, socket_id: u32) {
        let snap = self.snapshot();
        tracing::debug!(
            socket_id,
            bytes_sent = snap.bytes_sent,
            bytes_received = snap.bytes_received,
            retransmissions = snap.retransmissions,
            "packet counters"
        );
    }
}

impl CounterSnapshot {
    pub fn sent(&self, kind: PacketKind) -> u64 {
        self.sent[kind.index()]
    }

    pub fn received(&self, kind: PacketKind) -> u64 {
        self.received[kind.index()]
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} recv={} bytes_sent={} bytes_received={} retransmissions={}",
            self.sent.iter().sum::<u64>(),
            self.received.iter().sum::<u64>(),
            self.bytes_sent,
            self.bytes_received,
            self.retransmissions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent_per_instance() {
        let a = PacketCounters::new();
        let b = PacketCounters::new();
        a.record_sent(PacketKind::Data, 100);
        assert_eq!(a.snapshot().sent(PacketKind::Data), 1);
        assert_eq!(b.snapshot().sent(PacketKind::Data), 0);
    }

    #[test]
    fn snapshot_tracks_byte_totals() {
        let c = PacketCounters::new();
        c.record_sent(PacketKind::Data, 100);
        c.record_received(PacketKind::Ack, 20);
        let snap = c.snapshot();
        assert_eq!(snap.bytes_sent, 100);
        assert_eq!(snap.bytes_received, 20);
        assert_eq!(snap.sent(PacketKind::Data), 1);
        assert_eq!(snap.received(PacketKind::Ack), 1);
    }

    #[test]
    fn retransmission_counter_increments() {
        let c = PacketCounters::new();
        c.record_retransmission();
        c.record_retransmission();
        assert_eq!(c.snapshot().retransmissions, 2);
    }
}
