//! Negotiated low-overhead session identifiers (section 4.3's lite packet),
//! sharing the sequence manager's expiry discipline but keyed by a random
//! 128-bit ID rather than (namespace, peer, number).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use kadron_types::Clock;
use rand::RngCore;

struct Entry<T> {
    expires: Instant,
    data: T,
}

/// Registry of negotiated lite-session IDs. An unsolicited session ID (one
/// never returned by [`Self::negotiate`]) always fails [`Self::touch`].
pub struct LiteIdManager<T> {
    sessions: Mutex<HashMap<[u8; 16], Entry<T>>>,
}

impl<T> Default for LiteIdManager<T> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> LiteIdManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh random session ID bound to `data`, expiring after
    /// `timeout` unless touched again.
    pub fn negotiate(&self, data: T, timeout: Duration, clock: &impl Clock) -> [u8; 16] {
        let mut id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);
        let expires = clock.now() + timeout;
        self.sessions
            .lock()
            .expect("lite-id map lock poisoned")
            .insert(id, Entry { expires, data });
        id
    }

    /// Validate an inbound lite packet's session ID, extending its expiry
    /// by `timeout` on every valid receipt. Returns `None` for an unknown
    /// or expired session.
    pub fn touch(&self, id: [u8; 16], timeout: Duration, clock: &impl Clock) -> Option<()>
    where
        T: Clone,
    {
        let now = clock.now();
        let mut guard = self.sessions.lock().expect("lite-id map lock poisoned");
        let entry = guard.get_mut(&id)?;
        if now >= entry.expires {
            guard.remove(&id);
            return None;
        }
        entry.expires = now + timeout;
        Some(())
    }

    pub fn data(&self, id: [u8; 16]) -> Option<T>
    where
        T: Clone,
    {
        self.sessions
            .lock()
            .expect("lite-id map lock poisoned")
            .get(&id)
            .map(|entry| entry.data.clone())
    }

    pub fn invalidate(&self, id: [u8; 16]) {
        self.sessions
            .lock()
            .expect("lite-id map lock poisoned")
            .remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("lite-id map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn sweep_expired(&self, now: Instant) {
        self.sessions
            .lock()
            .expect("lite-id map lock poisoned")
            .retain(|_, entry| now < entry.expires);
    }
}
