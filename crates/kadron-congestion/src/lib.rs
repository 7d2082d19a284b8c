//! Native AIMD-style congestion controller (section 4.5), exposed behind a
//! narrow interface: the reliable transport only ever asks it for the
//! current congestion window and inter-packet send period, and feeds it
//! ACK/NAK/timeout events.

use std::time::Duration;

use kadron_types::PacketId;
use rand::Rng;

/// UDT's synchronization interval, used as the pacing unit in the send-period
/// formula.
pub const SYN: Duration = Duration::from_millis(10);

/// Congestion-control state for one reliable-transport connection.
#[derive(Debug)]
pub struct CongestionController {
    slow_start: bool,
    congestion_window: f64,
    max_flow_window: f64,
    send_period_us: f64,
    last_dec_seq: Option<PacketId>,
    nak_count: u32,
    dec_count: u32,
    avg_nak_per_epoch: f64,
    rand_threshold: u32,
}

impl CongestionController {
    pub fn new(max_flow_window: f64) -> Self {
        Self {
            slow_start: true,
            congestion_window: 2.0,
            max_flow_window,
            // Effectively unlimited until slow start yields a real estimate.
            send_period_us: 1.0,
            last_dec_seq: None,
            nak_count: 0,
            dec_count: 0,
            avg_nak_per_epoch: 0.0,
            rand_threshold: 1,
        }
    }

    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    pub fn send_period(&self) -> Duration {
        Duration::from_micros(self.send_period_us.max(0.0).round() as u64)
    }

    pub fn is_slow_start(&self) -> bool {
        self.slow_start
    }

    /// Effective window: `min(congestionWindow, negotiated flow window)`.
    pub fn effective_window(&self, flow_window: f64) -> f64 {
        self.congestion_window.min(flow_window)
    }

    /// Apply an ACK covering `acked_count` packets. During slow start the
    /// window grows by the number of newly-acked packets until it exceeds
    /// the max flow window; thereafter the window tracks the receiver's
    /// reported receive rate.
    pub fn on_ack(&mut self, acked_count: u32, receive_rate_pps: f64, rtt: Duration) {
        if self.slow_start {
            self.congestion_window += acked_count as f64;
            if self.congestion_window > self.max_flow_window {
                self.slow_start = false;
                self.congestion_window = self.max_flow_window;
            }
            return;
        }
        let secs = rtt.as_secs_f64() + SYN.as_secs_f64();
        self.congestion_window = receive_rate_pps * secs + 16.0;
    }

    /// Tighten the send period toward `capacity_pps` given the current
    /// measured rate `current_rate_pps`, per section 4.5's inc formula.
    pub fn increase_send_rate(&mut self, capacity_pps: f64, current_rate_pps: f64, mss: usize) {
        if self.slow_start {
            return;
        }
        let mss = mss.max(1) as f64;
        let delta = (capacity_pps - current_rate_pps).max(0.0);
        let bits_per_sec = delta * mss * 8.0;
        let inc = if bits_per_sec <= 0.0 {
            0.01 / mss
        } else {
            let exponent = bits_per_sec.log10().ceil();
            (10f64.powf(exponent) * 0.0000015 / mss).max(0.01 / mss)
        };

        let period = self.send_period_us;
        let syn_us = SYN.as_micros() as f64;
        if period * inc + syn_us > 0.0 {
            self.send_period_us = period * syn_us / (period * inc + syn_us);
        }
    }

    /// Apply a NAK whose smallest named loss ID is `loss_min`. A NAK whose
    /// loss ID is past the last decrease opens a new congestion epoch
    /// (1.125x deceleration, EWMA update, fresh random threshold); later
    /// NAKs within the same epoch decelerate again only at multiples of
    /// that threshold, capped at 5 total decreases per epoch.
    pub fn on_nak(&mut self, loss_min: PacketId, rng: &mut impl Rng) {
        let new_epoch = match self.last_dec_seq {
            None => true,
            Some(last) => loss_min.is_ahead_of(last),
        };

        if new_epoch {
            self.send_period_us *= 1.125;
            self.avg_nak_per_epoch = 0.875 * self.avg_nak_per_epoch + 0.125 * self.nak_count as f64;
            self.nak_count = 0;
            self.dec_count = 1;
            self.last_dec_seq = Some(loss_min);
            let ceiling = self.avg_nak_per_epoch.round().max(1.0) as u32;
            self.rand_threshold = rng.gen_range(1..=ceiling);
            tracing::debug!(
                loss_min = loss_min.value(),
                send_period_us = self.send_period_us,
                rand_threshold = self.rand_threshold,
                "congestion: new NAK epoch, decelerating"
            );
        } else {
            self.nak_count += 1;
            if self.dec_count < 5 && self.nak_count % self.rand_threshold == 0 {
                self.send_period_us *= 1.125;
                self.dec_count += 1;
                tracing::debug!(
                    dec_count = self.dec_count,
                    send_period_us = self.send_period_us,
                    "congestion: decelerating again within epoch"
                );
            }
        }
    }

    /// Apply a retransmission timeout: abandon slow start and derive the
    /// send period purely from the receiver's reported receive rate.
    pub fn on_timeout(&mut self, receive_rate_pps: f64) {
        self.slow_start = false;
        if receive_rate_pps > 0.0 {
            self.send_period_us = 1_000_000.0 / receive_rate_pps;
        }
        tracing::debug!(
            receive_rate_pps,
            send_period_us = self.send_period_us,
            "congestion: timeout, exiting slow start"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn slow_start_grows_window_until_max_flow_window_then_exits() {
        let mut controller = CongestionController::new(10.0);
        assert!(controller.is_slow_start());
        for _ in 0..10 {
            controller.on_ack(2, 100.0, Duration::from_millis(50));
        }
        assert!(!controller.is_slow_start());
        assert_eq!(controller.congestion_window(), 10.0);
    }

    #[test]
    fn post_slow_start_window_tracks_receive_rate() {
        let mut controller = CongestionController::new(4.0);
        controller.on_ack(10, 1.0, Duration::from_millis(0)); // exits slow start
        assert!(!controller.is_slow_start());
        controller.on_ack(1, 100.0, Duration::from_millis(40));
        let expected = 100.0 * (0.04 + SYN.as_secs_f64()) + 16.0;
        assert!((controller.congestion_window() - expected).abs() < 1e-6);
    }

    #[test]
    fn nak_opens_new_epoch_and_decelerates() {
        let mut controller = CongestionController::new(16.0);
        controller.send_period_us = 100.0;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        controller.on_nak(PacketId::new(50), &mut rng);
        assert!((controller.send_period_us - 112.5).abs() < 1e-6);
    }

    #[test]
    fn nak_within_same_epoch_does_not_immediately_redecelerate() {
        let mut controller = CongestionController::new(16.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        controller.on_nak(PacketId::new(50), &mut rng);
        let after_first = controller.send_period_us;
        // Same or lower sequence: not a new epoch.
        controller.on_nak(PacketId::new(50), &mut rng);
        // Either unchanged, or decelerated again only if the threshold was hit.
        assert!(controller.send_period_us >= after_first);
    }

    #[test]
    fn timeout_exits_slow_start_and_sets_rate_derived_period() {
        let mut controller = CongestionController::new(16.0);
        controller.on_timeout(500.0);
        assert!(!controller.is_slow_start());
        assert!((controller.send_period_us - 2000.0).abs() < 1e-6);
    }
}
