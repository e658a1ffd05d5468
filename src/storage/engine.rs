//! Thread-Safe Key-Value Store with Lazy Expiry
//!
//! ## Design Decisions
//!
//! 1. **One lock**: A single `Mutex` guards the whole map. Every operation holds it
//!    only for its own duration and never across I/O.
//! 2. **Lazy expiry**: An entry past its deadline is removed only when a `get`
//!    touches it. Nothing sweeps in the background, so expired keys that are never
//!    read again keep their memory until overwritten. `len` counts them.
//! 3. **Explicit instance**: There is no global store; each server (or test) owns
//!    its own `Store` and shares it by reference.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// A stored value with an optional expiry deadline.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    data: Bytes,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(data: Bytes) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }

    fn with_ttl(data: Bytes, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Counters describing store activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Entries resident in the map, expired or not
    pub keys: u64,
    pub gets: u64,
    pub sets: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed by lazy expiry
    pub expired: u64,
}

/// The shared key-value store.
///
/// Wrap it in an `Arc` and hand a clone to every connection task. All methods
/// take `&self`.
///
/// # Example
///
/// ```
/// use lazykv::storage::Store;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let store = Store::new();
///
/// store.set(Bytes::from("foo"), Bytes::from("bar"));
/// assert_eq!(store.get(b"foo"), Some(Bytes::from("bar")));
///
/// store.set_with_expiry(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert_eq!(store.len(), 2);
/// ```
#[derive(Default)]
pub struct Store {
    entries: Mutex<HashMap<Bytes, Entry>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the map.
    ///
    /// A writer that panicked cannot leave an entry half-written, so a
    /// poisoned lock is still safe to use.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value stored under `key`.
    ///
    /// An entry whose deadline has passed is removed from the map and reported
    /// as missing.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut entries = self.lock();
        let (value, evicted) = match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => (Some(entry.data.clone()), false),
            Some(_) => {
                entries.remove(key);
                (None, true)
            }
            None => (None, false),
        };
        drop(entries);

        if evicted {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            debug!(key = %String::from_utf8_lossy(key), "Evicted expired key");
        }

        let counter = if value.is_some() {
            &self.hit_count
        } else {
            &self.miss_count
        };
        counter.fetch_add(1, Ordering::Relaxed);

        value
    }

    /// Stores `value` under `key` with no expiry, replacing any previous entry.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(key, Entry::new(value));
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// A zero `ttl` stores an entry that is already expired on the next read.
    pub fn set_with_expiry(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(key, Entry::with_ttl(value, ttl));
    }

    /// Number of entries resident in the map.
    ///
    /// Expired entries that no `get` has touched yet are included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len() as u64,
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
