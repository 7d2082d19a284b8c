//! Send scheduling: flow-window-gated dispatch, the ACK/NAK/ACK2 loop, and
//! TTL-driven message drops, all paced by a
//! [`kadron_congestion::CongestionController`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use kadron_congestion::{CongestionController, SYN};
use kadron_types::PacketId;
use rand::Rng;

use crate::packet::{Boundary, DataPacket};

/// Scheduler states, mirroring where a connection's sender currently is in
/// its duty cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing queued.
    Idle,
    /// Actively dispatching new packets.
    Sending,
    /// Flow window is full; waiting on ACKs before sending more.
    Waiting,
    /// Working through the loss list before resuming new sends.
    ProcessDrop,
}

struct InFlight {
    packet: DataPacket,
    sent_at: Instant,
    expires_at: Option<Instant>,
}

/// A loss-list entry's resend throttle state: how many times it has been
/// resent, and when the last resend happened (`None` until the first one).
struct LossEntry {
    attempts: u32,
    last_resend: Option<Instant>,
}

impl LossEntry {
    fn new() -> Self {
        Self {
            attempts: 0,
            last_resend: None,
        }
    }

    /// Eligible once `max(SYN*attempts, last_resend+SYN*attempts)` has
    /// elapsed, per the reliable-transport resend throttle.
    fn eligible(&self, now: Instant) -> bool {
        match self.last_resend {
            None => true,
            Some(last) => now >= last + SYN * self.attempts.max(1),
        }
    }
}

/// Drives one connection's outgoing packet flow.
pub struct SendScheduler {
    state: SchedulerState,
    congestion: CongestionController,
    next_seq: PacketId,
    dest_socket_id: u32,
    max_flow_window: u32,
    in_flight: BTreeMap<u32, InFlight>,
    loss_list: BTreeMap<u32, LossEntry>,
}

impl SendScheduler {
    pub fn new(initial_seq: PacketId, dest_socket_id: u32, max_flow_window: u32) -> Self {
        Self {
            state: SchedulerState::Idle,
            congestion: CongestionController::new(max_flow_window as f64),
            next_seq: initial_seq,
            dest_socket_id,
            max_flow_window,
            in_flight: BTreeMap::new(),
            loss_list: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn congestion(&self) -> &CongestionController {
        &self.congestion
    }

    fn window_full(&self) -> bool {
        self.in_flight.len() as f64 >= self.congestion.effective_window(self.max_flow_window as f64)
    }

    /// Queue one packet-worth of payload. Returns the packet to send, or
    /// `None` if the flow window is currently full (the caller should hold
    /// the data and retry once ACKs free up room).
    pub fn queue(
        &mut self,
        payload: Vec<u8>,
        boundary: Boundary,
        in_order: bool,
        msg_number: u32,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Option<DataPacket> {
        if self.window_full() {
            self.state = SchedulerState::Waiting;
            return None;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.next();
        let packet = DataPacket {
            seq,
            boundary,
            in_order,
            msg_number,
            timestamp: 0,
            dest_socket_id: self.dest_socket_id,
            payload,
        };
        self.in_flight.insert(
            seq.value(),
            InFlight {
                packet: packet.clone(),
                sent_at: now,
                expires_at: ttl.map(|t| now + t),
            },
        );
        self.state = SchedulerState::Sending;
        Some(packet)
    }

    /// Apply a cumulative ACK: every in-flight packet with sequence before
    /// `ack_seq` is considered delivered.
    pub fn on_ack(&mut self, ack_seq: PacketId, receive_rate_pps: f64, rtt: Duration) {
        let acked: Vec<u32> = self
            .in_flight
            .keys()
            .copied()
            .take_while(|&seq| PacketId::new(seq).blind_diff(ack_seq) < 0)
            .collect();
        let count = acked.len() as u32;
        for seq in &acked {
            self.in_flight.remove(seq);
            self.loss_list.remove(seq);
        }
        if count > 0 {
            self.congestion.on_ack(count, receive_rate_pps, rtt);
        }
        if self.in_flight.is_empty() {
            self.state = SchedulerState::Idle;
        } else if self.loss_list.is_empty() && self.state == SchedulerState::ProcessDrop {
            self.state = if self.window_full() {
                SchedulerState::Waiting
            } else {
                SchedulerState::Sending
            };
        } else if !self.window_full() && self.state == SchedulerState::Waiting {
            self.state = SchedulerState::Sending;
        }
    }

    /// Apply a NAK naming the lost sequence numbers.
    pub fn on_nak(&mut self, lost: &[PacketId], rng: &mut impl Rng) {
        if lost.is_empty() {
            return;
        }
        let min = lost.iter().copied().min_by_key(|id| id.value()).expect("non-empty");
        self.congestion.on_nak(min, rng);
        for &id in lost {
            if self.in_flight.contains_key(&id.value()) {
                self.loss_list.entry(id.value()).or_insert_with(LossEntry::new);
            }
        }
        if !self.loss_list.is_empty() {
            self.state = SchedulerState::ProcessDrop;
        }
    }

    /// Pull the next packet due for retransmission from the loss list. A
    /// loss entry is only eligible once its resend throttle has elapsed;
    /// entries remain in the loss list (eligible for a further
    /// retransmission) until an ACK clears them.
    pub fn next_retransmission(&mut self, now: Instant) -> Option<DataPacket> {
        let seq = *self
            .loss_list
            .iter()
            .find(|(_, entry)| entry.eligible(now))
            .map(|(seq, _)| seq)?;
        let entry = self.loss_list.get_mut(&seq).expect("just found");
        entry.attempts += 1;
        entry.last_resend = Some(now);
        self.in_flight.get(&seq).map(|f| f.packet.clone())
    }

    /// A retransmission timeout fired with no ACK activity: fall back to
    /// the receive-rate-derived send period and resend everything pending.
    pub fn on_timeout(&mut self, receive_rate_pps: f64) {
        self.congestion.on_timeout(receive_rate_pps);
        for &seq in self.in_flight.keys() {
            self.loss_list.entry(seq).or_insert_with(LossEntry::new);
        }
        if !self.loss_list.is_empty() {
            self.state = SchedulerState::ProcessDrop;
        }
    }

    /// Drop any in-flight packets whose message TTL has expired, returning
    /// the distinct `msg_number`s dropped (the caller turns these into
    /// `MsgDropRequest` control packets).
    pub fn expire_ttls(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.expires_at.is_some_and(|deadline| now >= deadline))
            .map(|(seq, _)| *seq)
            .collect();
        let mut dropped_messages = BTreeSet::new();
        for seq in expired {
            if let Some(f) = self.in_flight.remove(&seq) {
                dropped_messages.insert(f.packet.msg_number);
            }
            self.loss_list.remove(&seq);
        }
        dropped_messages.into_iter().collect()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn queue_blocks_once_flow_window_is_full() {
        let mut s = SendScheduler::new(PacketId::ZERO, 1, 2);
        let now = Instant::now();
        assert!(s.queue(vec![1], Boundary::Only, false, 0, None, now).is_some());
        assert!(s.queue(vec![2], Boundary::Only, false, 1, None, now).is_some());
        for i in 2..20 {
            if s.queue(vec![i as u8], Boundary::Only, false, i, None, now).is_none() {
                assert_eq!(s.state(), SchedulerState::Waiting);
                return;
            }
        }
        panic!("expected the flow window to fill");
    }

    #[test]
    fn ack_releases_in_flight_packets_up_to_ack_seq() {
        let mut s = SendScheduler::new(PacketId::ZERO, 1, 64);
        let now = Instant::now();
        s.queue(vec![1], Boundary::Only, false, 0, None, now);
        s.queue(vec![2], Boundary::Only, false, 1, None, now);
        s.queue(vec![3], Boundary::Only, false, 2, None, now);
        assert_eq!(s.in_flight_count(), 3);
        s.on_ack(PacketId::new(2), 10.0, Duration::from_millis(10));
        assert_eq!(s.in_flight_count(), 1);
    }

    #[test]
    fn nak_enqueues_loss_list_and_retransmits() {
        let mut s = SendScheduler::new(PacketId::ZERO, 1, 64);
        let now = Instant::now();
        s.queue(vec![1], Boundary::Only, false, 0, None, now);
        s.queue(vec![2], Boundary::Only, false, 1, None, now);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        s.on_nak(&[PacketId::new(0)], &mut rng);
        assert_eq!(s.state(), SchedulerState::ProcessDrop);
        let retransmit = s.next_retransmission(now).expect("one loss");
        assert_eq!(retransmit.seq, PacketId::new(0));
    }

    #[test]
    fn retransmission_is_throttled_until_the_resend_interval_elapses() {
        let mut s = SendScheduler::new(PacketId::ZERO, 1, 64);
        let now = Instant::now();
        s.queue(vec![1], Boundary::Only, false, 0, None, now);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        s.on_nak(&[PacketId::new(0)], &mut rng);

        // First attempt is eligible immediately.
        let first = s.next_retransmission(now).expect("first attempt");
        assert_eq!(first.seq, PacketId::new(0));

        // A second poll right away must not re-send before SYN*attempts
        // has elapsed.
        assert!(s.next_retransmission(now).is_none());
        assert!(s.next_retransmission(now + Duration::from_millis(5)).is_none());

        // Once the throttle interval has elapsed, it becomes eligible again.
        let second = s
            .next_retransmission(now + SYN)
            .expect("throttle interval elapsed");
        assert_eq!(second.seq, PacketId::new(0));
    }

    #[test]
    fn expired_ttl_packets_are_dropped_and_reported() {
        let mut s = SendScheduler::new(PacketId::ZERO, 1, 64);
        let now = Instant::now();
        s.queue(
            vec![1],
            Boundary::Only,
            false,
            7,
            Some(Duration::from_millis(10)),
            now,
        );
        let dropped = s.expire_ttls(now + Duration::from_millis(20));
        assert_eq!(dropped, vec![7]);
        assert_eq!(s.in_flight_count(), 0);
    }
}
