//! Injectable time source.
//!
//! Every timeout, expiry and deadline in the substrate goes through a
//! `Clock` rather than calling `Instant::now()` directly, so unit tests can
//! construct fresh instances with deterministic time (see Design Notes:
//! tests construct fresh instances rather than relying on global state).

use std::time::{Duration, Instant};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The real wall clock, backed by `Instant::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually advanced clock for deterministic tests.
#[cfg(any(test, feature = "test-util"))]
pub struct ManualClock {
    inner: std::sync::Mutex<Instant>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock().expect("clock lock poisoned");
        *guard += by;
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.inner.lock().expect("clock lock poisoned")
    }
}
