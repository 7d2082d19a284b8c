//! The core expiry-tracked registry keyed by (namespace, peer, number).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use kadron_types::Clock;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::SequenceError;

/// Compressed public key byte length; the sequence manager only ever
/// treats peer identity as an opaque byte string of this length.
pub const COMPRESSED_KEY_SIZE: usize = 33;
pub type PeerKey = [u8; COMPRESSED_KEY_SIZE];

/// Unidirectional ("u") request/reply pairs vs. bidirectional ("b") flows
/// where both peers keep writing on the same sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Uni,
    Bi,
}

impl Namespace {
    fn prefix(self) -> &'static str {
        match self {
            Namespace::Uni => "u",
            Namespace::Bi => "b",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

type Key = (Namespace, PeerKey, u64);
pub type InvalidateCallback = Box<dyn FnOnce() + Send>;

struct Entry<T> {
    created: std::time::Instant,
    expires: std::time::Instant,
    reply_counter: u32,
    data: Option<T>,
    invalidate: Option<InvalidateCallback>,
}

/// Result of a successful [`SequenceManager::validate`] call.
pub struct ValidateOutcome<T> {
    pub data: Option<T>,
    /// Round-trip time, measured from registration to the *first* reply.
    pub rtt: Duration,
}

/// Registry of outstanding sequence numbers for one logical peer set, with
/// expiry and one-shot invalidation callbacks. Safe for concurrent
/// registration and validation (section 5: no lock held across a callback).
pub struct SequenceManager<T> {
    entries: Mutex<HashMap<Key, Entry<T>>>,
}

impl<T> Default for SequenceManager<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SequenceManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically bump `counter` and register a new unidirectional or
    /// bidirectional sequence for `peer`, expiring after `reply_timeout`
    /// unless extended. Returns the assigned sequence number.
    pub fn new_sequence(
        &self,
        namespace: Namespace,
        peer: PeerKey,
        counter: &AtomicU64,
        reply_timeout: Duration,
        data: Option<T>,
        clock: &impl Clock,
    ) -> u64 {
        let number = counter.fetch_add(1, Ordering::SeqCst);
        self.register(namespace, peer, number, reply_timeout, data, None, clock);
        number
    }

    /// Like [`Self::new_sequence`] but with a random starting number, for
    /// addressing a peer we have not contacted before.
    pub fn arbitrary_sequence(
        &self,
        namespace: Namespace,
        peer: PeerKey,
        reply_timeout: Duration,
        data: Option<T>,
        clock: &impl Clock,
    ) -> u64 {
        let number = rand::thread_rng().next_u64();
        self.register(namespace, peer, number, reply_timeout, data, None, clock);
        number
    }

    /// Register a bidirectional sequence with an explicit number (accepting
    /// an inbound peer-initiated flow) and an invalidate callback fired
    /// exactly once on expiry.
    pub fn register_bi(
        &self,
        peer: PeerKey,
        number: u64,
        per_session_timeout: Duration,
        data: Option<T>,
        invalidate: Option<InvalidateCallback>,
        clock: &impl Clock,
    ) {
        self.register(
            Namespace::Bi,
            peer,
            number,
            per_session_timeout,
            data,
            invalidate,
            clock,
        );
    }

    /// Bump `counter` and register a new bidirectional sequence.
    pub fn new_sequence_bi(
        &self,
        peer: PeerKey,
        counter: &AtomicU64,
        per_session_timeout: Duration,
        data: Option<T>,
        invalidate: Option<InvalidateCallback>,
        clock: &impl Clock,
    ) -> u64 {
        let number = counter.fetch_add(1, Ordering::SeqCst);
        self.register(
            Namespace::Bi,
            peer,
            number,
            per_session_timeout,
            data,
            invalidate,
            clock,
        );
        number
    }

    fn register(
        &self,
        namespace: Namespace,
        peer: PeerKey,
        number: u64,
        timeout: Duration,
        data: Option<T>,
        invalidate: Option<InvalidateCallback>,
        clock: &impl Clock,
    ) {
        let now = clock.now();
        let entry = Entry {
            created: now,
            expires: now + timeout,
            reply_counter: 0,
            data,
            invalidate,
        };
        // A fresh registration onto an already-occupied key is a sequence
        // collision (design note (c)): fire the prior invalidate callback,
        // then replace.
        let prior = self
            .entries
            .lock()
            .expect("sequence map lock poisoned")
            .insert((namespace, peer, number), entry);
        if let Some(mut prior) = prior {
            if let Some(cb) = prior.invalidate.take() {
                cb();
            }
        }
    }

    /// Validate an incoming reply against a registered sequence. Returns
    /// [`SequenceError::NotFound`] if the (peer, number) pair is unknown or
    /// already expired. Every call increments the reply counter;
    /// `invalidate_on_hit` removes the entry immediately on a valid hit,
    /// while `extend_on_response` pushes the expiry out by `half_timeout`
    /// (for multi-packet replies).
    pub fn validate(
        &self,
        namespace: Namespace,
        peer: PeerKey,
        number: u64,
        invalidate_on_hit: bool,
        extend_on_response: Option<Duration>,
        clock: &impl Clock,
    ) -> Result<ValidateOutcome<T>, SequenceError>
    where
        T: Clone,
    {
        let now = clock.now();
        let mut guard = self.entries.lock().expect("sequence map lock poisoned");
        let key = (namespace, peer, number);
        let entry = guard.get_mut(&key).ok_or(SequenceError::NotFound)?;
        if now >= entry.expires {
            guard.remove(&key);
            return Err(SequenceError::NotFound);
        }

        entry.reply_counter += 1;
        // RTT is meaningful only relative to the first reply; `created`
        // never moves, so later replies report the same baseline.
        let rtt = now.saturating_duration_since(entry.created);
        let data = entry.data.clone();

        if invalidate_on_hit {
            guard.remove(&key);
        } else if let Some(half) = extend_on_response {
            entry.expires = now + half;
        }

        Ok(ValidateOutcome { data, rtt })
    }

    /// Extend a bidirectional sequence's expiry, e.g. on every subsequent
    /// message within a live session. No-op if the sequence is unknown.
    pub fn extend(
        &self,
        namespace: Namespace,
        peer: PeerKey,
        number: u64,
        by: Duration,
        clock: &impl Clock,
    ) {
        let mut guard = self.entries.lock().expect("sequence map lock poisoned");
        if let Some(entry) = guard.get_mut(&(namespace, peer, number)) {
            entry.expires = clock.now() + by;
        }
    }

    /// Remove a sequence without firing its invalidate callback.
    pub fn invalidate(&self, namespace: Namespace, peer: PeerKey, number: u64) {
        self.entries
            .lock()
            .expect("sequence map lock poisoned")
            .remove(&(namespace, peer, number));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("sequence map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry whose expiry has passed as of `now`, returning
    /// the invalidate callbacks of the bidirectional ones so the caller can
    /// run them outside the lock.
    pub(crate) fn sweep_expired(&self, now: std::time::Instant) -> Vec<InvalidateCallback> {
        let mut guard = self.entries.lock().expect("sequence map lock poisoned");
        let expired_keys: Vec<Key> = guard
            .iter()
            .filter(|(_, entry)| now >= entry.expires)
            .map(|(key, _)| *key)
            .collect();

        let mut callbacks = Vec::new();
        for key in expired_keys {
            if let Some(mut entry) = guard.remove(&key) {
                if key.0 == Namespace::Bi {
                    if let Some(cb) = entry.invalidate.take() {
                        callbacks.push(cb);
                    }
                }
            }
        }
        callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadron_types::clock::ManualClock;

    fn peer(byte: u8) -> PeerKey {
        [byte; COMPRESSED_KEY_SIZE]
    }

    #[test]
    fn new_sequence_numbers_strictly_increase() {
        let manager: SequenceManager<()> = SequenceManager::new();
        let counter = AtomicU64::new(0);
        let clock = ManualClock::new();
        let a = manager.new_sequence(
            Namespace::Uni,
            peer(1),
            &counter,
            Duration::from_secs(5),
            None,
            &clock,
        );
        let b = manager.new_sequence(
            Namespace::Uni,
            peer(1),
            &counter,
            Duration::from_secs(5),
            None,
            &clock,
        );
        assert!(b > a);
    }

    #[test]
    fn validate_unknown_is_invalid() {
        let manager: SequenceManager<()> = SequenceManager::new();
        let clock = ManualClock::new();
        assert!(manager
            .validate(Namespace::Uni, peer(1), 99, false, None, &clock)
            .is_err());
    }

    #[test]
    fn validate_after_expiry_is_invalid() {
        let manager: SequenceManager<u32> = SequenceManager::new();
        let counter = AtomicU64::new(0);
        let clock = ManualClock::new();
        let number = manager.new_sequence(
            Namespace::Uni,
            peer(1),
            &counter,
            Duration::from_secs(1),
            Some(7),
            &clock,
        );
        clock.advance(Duration::from_secs(2));
        assert!(manager
            .validate(Namespace::Uni, peer(1), number, false, None, &clock)
            .is_err());
    }

    #[test]
    fn extend_on_response_keeps_sequence_valid_past_original_expiry() {
        let manager: SequenceManager<()> = SequenceManager::new();
        let counter = AtomicU64::new(0);
        let clock = ManualClock::new();
        let number = manager.new_sequence(
            Namespace::Uni,
            peer(1),
            &counter,
            Duration::from_secs(2),
            None,
            &clock,
        );
        clock.advance(Duration::from_secs(1));
        let outcome = manager.validate(
            Namespace::Uni,
            peer(1),
            number,
            false,
            Some(Duration::from_secs(2)),
            &clock,
        );
        assert!(outcome.is_ok());
        clock.advance(Duration::from_millis(1500));
        assert!(manager
            .validate(Namespace::Uni, peer(1), number, false, None, &clock)
            .is_ok());
    }

    #[test]
    fn invalidate_on_hit_removes_entry_immediately() {
        let manager: SequenceManager<()> = SequenceManager::new();
        let counter = AtomicU64::new(0);
        let clock = ManualClock::new();
        let number = manager.new_sequence(
            Namespace::Uni,
            peer(1),
            &counter,
            Duration::from_secs(5),
            None,
            &clock,
        );
        assert!(manager
            .validate(Namespace::Uni, peer(1), number, true, None, &clock)
            .is_ok());
        assert!(manager
            .validate(Namespace::Uni, peer(1), number, false, None, &clock)
            .is_err());
    }

    #[test]
    fn collision_fires_prior_invalidate_callback_and_replaces() {
        let manager: SequenceManager<()> = SequenceManager::new();
        let clock = ManualClock::new();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        manager.register_bi(
            peer(1),
            5,
            Duration::from_secs(5),
            None,
            Some(Box::new(move || {
                fired_clone.store(true, Ordering::SeqCst);
            })),
            &clock,
        );
        manager.register_bi(peer(1), 5, Duration::from_secs(5), None, None, &clock);
        assert!(fired.load(Ordering::SeqCst));
    }
}
