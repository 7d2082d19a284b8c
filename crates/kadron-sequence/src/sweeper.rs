//! Background expiry sweepers (section 4.4 and section 5): one loop per
//! registry, woken on a fixed interval and on termination, never blocking
//! on anything but its own timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kadron_types::Clock;
use tracing::trace;

use crate::lite_id::LiteIdManager;
use crate::manager::SequenceManager;

async fn wait_cancelled(flag: &AtomicBool) {
    loop {
        if flag.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Run until `terminate` is set, scanning `manager` every `interval` (the
/// reply timeout, per the Design Notes) and firing the invalidate callback
/// of every expired bidirectional entry exactly once, outside the lock.
pub async fn run_sweeper<T>(
    manager: &SequenceManager<T>,
    clock: &impl Clock,
    interval: Duration,
    terminate: &AtomicBool,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wait_cancelled(terminate) => return,
        }
        if terminate.load(Ordering::Relaxed) {
            return;
        }
        let callbacks = manager.sweep_expired(clock.now());
        trace!(count = callbacks.len(), "sequence sweep fired callbacks");
        for callback in callbacks {
            callback();
        }
    }
}

/// Companion sweeper for [`LiteIdManager`], which carries no callbacks —
/// expired sessions are simply dropped.
pub async fn run_lite_sweeper<T>(
    manager: &LiteIdManager<T>,
    clock: &impl Clock,
    interval: Duration,
    terminate: &AtomicBool,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wait_cancelled(terminate) => return,
        }
        if terminate.load(Ordering::Relaxed) {
            return;
        }
        manager.sweep_expired(clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadron_types::clock::ManualClock;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    #[tokio::test]
    async fn sweeper_fires_expired_bi_callback_once() {
        let manager: Arc<SequenceManager<()>> = Arc::new(SequenceManager::new());
        let clock = ManualClock::new();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        let counter = AtomicU64::new(0);

        manager.new_sequence_bi(
            [0x01; 33],
            &counter,
            Duration::from_millis(10),
            None,
            Some(Box::new(move || {
                fired_clone.store(true, Ordering::SeqCst);
            })),
            &clock,
        );

        clock.advance(Duration::from_secs(1));
        let callbacks = manager.sweep_expired(clock.now());
        assert_eq!(callbacks.len(), 1);
        for cb in callbacks {
            cb();
        }
        assert!(fired.load(Ordering::SeqCst));
    }
}
