//! End-to-end bidirectional-sequence timeout: a registered sequence that
//! gets no reply within its 2-second window has its invalidate callback
//! fire exactly once, and a later reply against the same number is no
//! longer accepted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kadron_sequence::{Namespace, SequenceManager};
use kadron_types::clock::ManualClock;

const PEER: [u8; 33] = [0x7a; 33];

#[test]
fn unacked_bidirectional_sequence_times_out_after_two_seconds_and_fires_once() {
    let manager: SequenceManager<()> = SequenceManager::new();
    let clock = ManualClock::new();
    let counter = AtomicU64::new(0);

    let fired = Arc::new(AtomicBool::new(false));
    let fired_in_callback = fired.clone();

    let number = manager.new_sequence_bi(
        PEER,
        &counter,
        Duration::from_secs(2),
        None,
        Some(Box::new(move || {
            fired_in_callback.store(true, Ordering::SeqCst);
        })),
        &clock,
    );

    // Well before the timeout, the sequence is still valid and no sweep
    // fires anything.
    clock.advance(Duration::from_millis(500));
    assert!(manager.sweep_expired(clock.now()).is_empty());
    assert!(!fired.load(Ordering::SeqCst));

    // Cross the 2-second mark with still no reply.
    clock.advance(Duration::from_millis(1600));
    let callbacks = manager.sweep_expired(clock.now());
    assert_eq!(callbacks.len(), 1, "exactly one entry should have expired");
    for cb in callbacks {
        cb();
    }
    assert!(fired.load(Ordering::SeqCst));

    // A second sweep must not re-fire the same callback.
    clock.advance(Duration::from_secs(5));
    assert!(manager.sweep_expired(clock.now()).is_empty());

    // The sequence is gone: a late "reply" against the same number no
    // longer validates.
    assert!(manager
        .validate(Namespace::Bi, PEER, number, false, None, &clock)
        .is_err());
}

#[test]
fn a_reply_before_timeout_keeps_the_sequence_alive_and_suppresses_the_callback() {
    let manager: SequenceManager<&'static str> = SequenceManager::new();
    let clock = ManualClock::new();
    let counter = AtomicU64::new(0);

    let fired = Arc::new(AtomicBool::new(false));
    let fired_in_callback = fired.clone();

    let number = manager.new_sequence_bi(
        PEER,
        &counter,
        Duration::from_secs(2),
        Some("pending"),
        Some(Box::new(move || {
            fired_in_callback.store(true, Ordering::SeqCst);
        })),
        &clock,
    );

    clock.advance(Duration::from_secs(1));
    let outcome = manager
        .validate(Namespace::Bi, PEER, number, true, None, &clock)
        .expect("reply arrives before the timeout");
    assert_eq!(outcome.data, Some("pending"));

    // invalidate_on_hit removed the entry directly; the sweeper has
    // nothing left to expire and the timeout callback never runs.
    clock.advance(Duration::from_secs(5));
    assert!(manager.sweep_expired(clock.now()).is_empty());
    assert!(!fired.load(Ordering::SeqCst));
}
