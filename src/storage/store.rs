//! Single-Writer Key-Value Store with Expiry Support
//!
//! The store is a plain `HashMap` mutated through `&mut self` only. It is
//! owned by the reactor and never shared, so it carries no locks: every
//! mutation happens on the reactor's thread, one after another.
//!
//! ## Expiry
//!
//! Keys with a TTL are removed in two ways:
//! 1. **Lazy**: reading an expired key removes it and reports it missing
//! 2. **Active**: the reactor's cron tick calls [`Store::delete_expired`]
//!
//! Until one of those happens an expired key still occupies a slot, which
//! is why [`Store::len`] counts physical entries.

use crate::storage::aof::{self, AofError};
use crate::storage::eviction::Evictor;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry with TTL.
    ///
    /// A TTL past the range of `Instant` is stored as no expiry.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Returns the remaining TTL, or None if no expiry.
    pub fn remaining_ttl(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(now))
    }
}

/// Errors from value-typed store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("increment or decrement would overflow")]
    Overflow,
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total GET-style reads
    pub get_ops: u64,
    /// Total writes
    pub set_ops: u64,
    /// Total explicit deletes that removed a key
    pub del_ops: u64,
    /// Keys removed because their TTL elapsed
    pub expired: u64,
    /// Keys removed by the eviction policy
    pub evicted: u64,
}

/// The key-value store.
///
/// # Example
///
/// ```
/// use quickkv::storage::Store;
/// use bytes::Bytes;
///
/// let mut store = Store::new();
/// store.insert(Bytes::from("name"), Bytes::from("quick").into());
/// assert_eq!(store.get(b"name"), Some(Bytes::from("quick")));
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<Bytes, Entry>,
    stats: StoreStats,
}

impl From<Bytes> for Entry {
    fn from(value: Bytes) -> Self {
        Entry::new(value)
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: HashMap::with_capacity(capacity),
            stats: StoreStats::default(),
        }
    }

    /// Gets the value for a key, removing it first if it has expired.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.stats.get_ops += 1;
        self.get_entry(key).map(|entry| entry.value.clone())
    }

    /// Gets the full entry for a key (including expiry).
    pub fn get_entry(&mut self, key: &[u8]) -> Option<&Entry> {
        if self.data.get(key)?.is_expired() {
            self.data.remove(key);
            self.stats.expired += 1;
            return None;
        }
        self.data.get(key)
    }

    /// Inserts an entry without consulting the eviction policy.
    ///
    /// Returns `true` if a new key was created.
    pub fn insert(&mut self, key: Bytes, entry: Entry) -> bool {
        self.stats.set_ops += 1;
        self.data.insert(key, entry).is_none()
    }

    /// The write path: inserts an entry, evicting first if a new key would
    /// take the store to `keys_limit`.
    ///
    /// Returns `true` if a new key was created.
    pub fn put(&mut self, key: Bytes, entry: Entry, evictor: &Evictor) -> bool {
        if !self.data.contains_key(&key) && self.data.len() >= evictor.keys_limit() {
            let evicted = evictor.evict(self);
            debug!(evicted, keys = self.data.len(), "Store at capacity, evicted keys");
        }
        self.insert(key, entry)
    }

    /// Deletes a key.
    ///
    /// Returns `true` if the key existed. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let existed = self.remove_live(key);
        if existed {
            self.stats.del_ops += 1;
        }
        existed
    }

    /// Removes a key on behalf of the eviction policy.
    pub(crate) fn evict_key(&mut self, key: &[u8]) -> bool {
        let removed = self.data.remove(key).is_some();
        if removed {
            self.stats.evicted += 1;
        }
        removed
    }

    fn remove_live(&mut self, key: &[u8]) -> bool {
        match self.data.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.stats.expired += 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.get_entry(key).is_some()
    }

    /// Sets an expiry on an existing key. A TTL past the range of `Instant`
    /// leaves the key without expiry.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> bool {
        if self.get_entry(key).is_none() {
            return false;
        }
        match self.data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Instant::now().checked_add(ttl);
                true
            }
            None => false,
        }
    }

    /// Removes the expiry from a key.
    ///
    /// Returns `false` if the key doesn't exist or had no expiry.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.get_entry(key).is_none() {
            return false;
        }
        match self.data.get_mut(key) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        }
    }

    /// Remaining TTL in milliseconds.
    ///
    /// - `Some(ms)` if the key exists and has an expiry
    /// - `Some(-1)` if the key exists but has no expiry
    /// - `None` if the key doesn't exist
    pub fn pttl(&mut self, key: &[u8]) -> Option<i64> {
        let now = Instant::now();
        self.get_entry(key).map(|entry| {
            entry
                .remaining_ttl(now)
                .map(|ttl| ttl.as_millis() as i64)
                .unwrap_or(-1)
        })
    }

    /// Remaining TTL in whole seconds, with the same conventions as [`Store::pttl`].
    pub fn ttl(&mut self, key: &[u8]) -> Option<i64> {
        self.pttl(key)
            .map(|ms| if ms < 0 { ms } else { ms / 1000 })
    }

    /// Adds `delta` to an integer value, creating it at 0 if absent.
    ///
    /// A missing key goes through the eviction hook like any other new key.
    /// An existing key keeps its TTL.
    pub fn incr_by(&mut self, key: &Bytes, delta: i64, evictor: &Evictor) -> Result<i64, StoreError> {
        let (current, expires_at) = match self.get_entry(key) {
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(StoreError::NotAnInteger)?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        let entry = Entry {
            value: Bytes::from(next.to_string()),
            expires_at,
        };
        self.put(key.clone(), entry, evictor);
        Ok(next)
    }

    /// Iterates over every stored key in the map's natural, unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.data.keys()
    }

    /// Iterates over entries that have not expired as of `now`.
    pub fn live_entries(&self, now: Instant) -> impl Iterator<Item = (&Bytes, &Entry)> {
        self.data
            .iter()
            .filter(move |(_, entry)| !entry.is_expired_at(now))
    }

    /// Number of physically stored keys, including expired keys that have
    /// not been swept yet.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clears all data from the store.
    pub fn flush(&mut self) {
        self.data.clear();
    }

    /// Removes every key whose TTL has elapsed as of `now`.
    ///
    /// Returns the number of keys removed. Safe to call with nothing expired.
    pub fn delete_expired(&mut self, now: Instant) -> u64 {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired_at(now));
        let removed = (before - self.data.len()) as u64;
        self.stats.expired += removed;
        removed
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Shutdown hook: rewrites the append-only file from the live keys.
    ///
    /// Returns the number of keys written.
    pub fn shutdown(&mut self, aof_path: &Path) -> Result<usize, AofError> {
        let written = aof::rewrite(self, aof_path)?;
        info!(path = %aof_path.display(), keys = written, "Store flushed to AOF");
        Ok(written)
    }
}
