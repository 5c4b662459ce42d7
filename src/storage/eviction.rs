//! Key Eviction
//!
//! When a write would push the store past `keys_limit`, the write path asks
//! the [`Evictor`] to free space. The evictor delegates the choice of victims
//! to a pluggable [`EvictionPolicy`].
//!
//! Eviction never checks capacity itself: the caller decides *when* to evict,
//! the policy only decides *what*. Each call removes a fixed number of keys.
//!
//! | Strategy         | Keys removed per call                         |
//! |------------------|-----------------------------------------------|
//! | `simple-first`   | 1 (the first key in iteration order)          |
//! | `allkeys-random` | `max(1, floor(eviction_ratio * keys_limit))`  |
//!
//! Both stop early when the store runs out of keys.

use crate::config::{Config, EvictionStrategy};
use crate::storage::Store;
use bytes::Bytes;
use tracing::trace;

/// Chooses and removes keys from a store.
pub trait EvictionPolicy: Send + std::fmt::Debug {
    /// Removes zero or more keys, returning how many were removed.
    fn evict(&self, store: &mut Store) -> usize;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Deletes the first key the store yields, then stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleFirst;

impl EvictionPolicy for SimpleFirst {
    fn evict(&self, store: &mut Store) -> usize {
        let victim = store.keys().next().cloned();
        match victim {
            Some(key) => usize::from(store.evict_key(&key)),
            None => 0,
        }
    }

    fn name(&self) -> &'static str {
        "simple-first"
    }
}

/// Deletes up to `count` keys in the store's unspecified iteration order.
///
/// `HashMap` iteration order depends on a per-map random hash seed, which is
/// enough of a random sample for approximate eviction.
#[derive(Debug, Clone, Copy)]
pub struct AllKeysRandom {
    count: usize,
}

impl AllKeysRandom {
    /// Builds the policy for a given ceiling and ratio.
    ///
    /// The count is clamped to at least one so that an eviction call always
    /// makes progress on a non-empty store.
    pub fn new(keys_limit: usize, eviction_ratio: f64) -> Self {
        let count = (eviction_ratio * keys_limit as f64).floor();
        let count = if count.is_finite() && count >= 1.0 {
            count as usize
        } else {
            1
        };
        Self { count }
    }

    /// Number of keys removed per call.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl EvictionPolicy for AllKeysRandom {
    fn evict(&self, store: &mut Store) -> usize {
        let victims: Vec<Bytes> = store.keys().take(self.count).cloned().collect();
        let mut evicted = 0;
        for key in &victims {
            if store.evict_key(key) {
                evicted += 1;
            }
        }
        evicted
    }

    fn name(&self) -> &'static str {
        "allkeys-random"
    }
}

/// The store's eviction hook: a policy plus the ceiling it protects.
#[derive(Debug)]
pub struct Evictor {
    policy: Box<dyn EvictionPolicy>,
    keys_limit: usize,
}

impl Evictor {
    pub fn new(policy: Box<dyn EvictionPolicy>, keys_limit: usize) -> Self {
        Self { policy, keys_limit }
    }

    /// Selects the policy named by `config.eviction_strategy`.
    pub fn from_config(config: &Config) -> Self {
        let policy: Box<dyn EvictionPolicy> = match config.eviction_strategy {
            EvictionStrategy::SimpleFirst => Box::new(SimpleFirst),
            EvictionStrategy::AllKeysRandom => {
                Box::new(AllKeysRandom::new(config.keys_limit, config.eviction_ratio))
            }
        };
        Self::new(policy, config.keys_limit)
    }

    pub fn keys_limit(&self) -> usize {
        self.keys_limit
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Runs one eviction pass. Performs no capacity check.
    pub fn evict(&self, store: &mut Store) -> usize {
        let evicted = self.policy.evict(store);
        trace!(policy = self.policy.name(), evicted, "Eviction pass");
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Entry;

    fn store_with(n: usize) -> Store {
        let mut store = Store::new();
        for i in 0..n {
            store.insert(Bytes::from(format!("key{}", i)), Entry::new(Bytes::from("v")));
        }
        store
    }

    fn evictor(strategy: EvictionStrategy, keys_limit: usize, eviction_ratio: f64) -> Evictor {
        Evictor::from_config(&Config {
            keys_limit,
            eviction_strategy: strategy,
            eviction_ratio,
            ..Default::default()
        })
    }

    #[test]
    fn test_allkeys_random_removes_ratio_of_limit() {
        let mut store = store_with(10);
        let evictor = evictor(EvictionStrategy::AllKeysRandom, 10, 0.40);

        assert_eq!(evictor.evict(&mut store), 4);
        assert_eq!(store.len(), 6);
        assert_eq!(store.stats().evicted, 4);
    }

    #[test]
    fn test_simple_first_removes_one_then_noop() {
        let mut store = store_with(1);
        let evictor = evictor(EvictionStrategy::SimpleFirst, 100, 0.40);

        assert_eq!(evictor.evict(&mut store), 1);
        assert!(store.is_empty());

        assert_eq!(evictor.evict(&mut store), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_simple_first_removes_exactly_one() {
        let mut store = store_with(50);
        assert_eq!(SimpleFirst.evict(&mut store), 1);
        assert_eq!(store.len(), 49);
    }

    #[test]
    fn test_allkeys_random_stops_when_store_exhausted() {
        let mut store = store_with(3);
        let policy = AllKeysRandom::new(100, 0.5);

        assert_eq!(policy.count(), 50);
        assert_eq!(policy.evict(&mut store), 3);
        assert!(store.is_empty());
        assert_eq!(policy.evict(&mut store), 0);
    }

    #[test]
    fn test_allkeys_random_count_is_clamped() {
        assert_eq!(AllKeysRandom::new(0, 0.4).count(), 1);
        assert_eq!(AllKeysRandom::new(10, 0.0).count(), 1);
        assert_eq!(AllKeysRandom::new(2, 0.4).count(), 1);
        assert_eq!(AllKeysRandom::new(10, 1.0).count(), 10);
        assert_eq!(AllKeysRandom::new(7, 0.5).count(), 3);
    }

    #[test]
    fn test_eviction_bound_holds_across_limits_and_ratios() {
        for keys_limit in [1usize, 2, 5, 10, 37, 100] {
            for ratio in [0.01, 0.1, 0.25, 0.4, 0.75, 1.0] {
                for stored in [0usize, 1, keys_limit / 2, keys_limit, keys_limit * 2] {
                    let mut store = store_with(stored);
                    let expected = ((ratio * keys_limit as f64).floor() as usize).max(1);
                    let removed = AllKeysRandom::new(keys_limit, ratio).evict(&mut store);
                    assert_eq!(removed, expected.min(stored));
                    assert_eq!(store.len(), stored - removed);
                }
            }
        }
    }

    #[test]
    fn test_from_config_selects_policy() {
        let evictor = evictor(EvictionStrategy::AllKeysRandom, 10, 0.4);
        assert_eq!(evictor.policy_name(), "allkeys-random");
        assert_eq!(evictor.keys_limit(), 10);

        let evictor = Evictor::from_config(&Config::default());
        assert_eq!(evictor.policy_name(), "simple-first");
        assert_eq!(evictor.keys_limit(), 100);
    }
}
