//! Active Expiry
//!
//! Lazy expiry (checking on access) leaves keys that are never read again
//! sitting in memory. The sweeper removes them.
//!
//! ## Design
//!
//! There is no background task: the reactor calls [`ExpirySweeper::tick`]
//! at the top of every loop iteration, and the sweep only runs once the
//! [`CronTimer`] interval has elapsed. Because the reactor blocks in its
//! poll call without a timeout, a tick only happens after *some* descriptor
//! becomes ready. The interval is therefore a lower bound between sweeps,
//! not a deadline: with no traffic, expired keys stay until the next event.

use crate::storage::Store;
use std::time::{Duration, Instant};
use tracing::debug;

/// Last-execution timestamp plus a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct CronTimer {
    last_run: Instant,
    interval: Duration,
}

impl CronTimer {
    /// Creates a timer whose first run is due one `interval` after `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            last_run: now,
            interval,
        }
    }

    /// True once `now` is past `last_run + interval`.
    pub fn is_due(&self, now: Instant) -> bool {
        now > self.last_run + self.interval
    }

    pub fn mark_run(&mut self, now: Instant) {
        self.last_run = now;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_run(&self) -> Instant {
        self.last_run
    }
}

/// Removes every key whose TTL has elapsed.
///
/// Returns the number of keys removed; zero expired keys is a no-op.
pub fn sweep(store: &mut Store) -> u64 {
    let expired = store.delete_expired(Instant::now());
    if expired > 0 {
        debug!(
            expired = expired,
            keys_remaining = store.len(),
            "Expired keys cleaned up"
        );
    }
    expired
}

/// Runs [`sweep`] at most once per cron interval.
#[derive(Debug)]
pub struct ExpirySweeper {
    timer: CronTimer,
}

impl ExpirySweeper {
    pub fn new(interval: Duration) -> Self {
        Self {
            timer: CronTimer::new(interval, Instant::now()),
        }
    }

    /// Sweeps `store` if the interval has elapsed as of `now`.
    ///
    /// Returns `Some(removed)` when a sweep ran, `None` otherwise.
    pub fn tick(&mut self, store: &mut Store, now: Instant) -> Option<u64> {
        if !self.timer.is_due(now) {
            return None;
        }
        let expired = sweep(store);
        self.timer.mark_run(now);
        Some(expired)
    }

    pub fn timer(&self) -> &CronTimer {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Entry;
    use bytes::Bytes;

    #[test]
    fn test_cron_timer_due_only_after_interval() {
        let start = Instant::now();
        let mut timer = CronTimer::new(Duration::from_secs(1), start);

        assert!(!timer.is_due(start));
        assert!(!timer.is_due(start + Duration::from_millis(999)));
        assert!(!timer.is_due(start + Duration::from_secs(1)));
        assert!(timer.is_due(start + Duration::from_millis(1001)));

        timer.mark_run(start + Duration::from_secs(2));
        assert!(!timer.is_due(start + Duration::from_millis(2500)));
        assert!(timer.is_due(start + Duration::from_millis(3001)));
    }

    #[test]
    fn test_sweep_with_nothing_expired() {
        let mut store = Store::new();
        assert_eq!(sweep(&mut store), 0);

        store.insert(Bytes::from("persistent"), Entry::new(Bytes::from("v")));
        assert_eq!(sweep(&mut store), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_cleans_expired_keys() {
        let mut store = Store::new();

        for i in 0..10 {
            store.insert(
                Bytes::from(format!("key{}", i)),
                Entry::with_ttl(Bytes::from("value"), Duration::from_millis(10)),
            );
        }
        store.insert(Bytes::from("persistent"), Entry::new(Bytes::from("value")));
        assert_eq!(store.len(), 11);

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(sweep(&mut store), 10);
        assert_eq!(store.len(), 1);
        assert!(store.exists(b"persistent"));
    }

    #[test]
    fn test_tick_waits_for_interval() {
        let mut store = Store::new();
        store.insert(
            Bytes::from("short"),
            Entry::with_ttl(Bytes::from("v"), Duration::from_millis(1)),
        );
        std::thread::sleep(Duration::from_millis(5));

        let mut sweeper = ExpirySweeper::new(Duration::from_secs(60));
        let now = Instant::now();

        // Not due: the expired key physically stays
        assert_eq!(sweeper.tick(&mut store, now), None);
        assert_eq!(store.len(), 1);

        // Due: swept, and the timer is reset
        let later = now + Duration::from_secs(61);
        assert_eq!(sweeper.tick(&mut store, later), Some(1));
        assert!(store.is_empty());
        assert!(!sweeper.timer().is_due(later));
    }
}
