//! Storage Module
//!
//! The key-value store and the maintenance jobs that act on it.
//!
//! ```text
//!        write path                         reactor cron tick
//!            │                                     │
//!            ▼                                     ▼
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │ Store::put           │              │ ExpirySweeper::tick  │
//! │  at keys_limit? ─────┼──> Evictor   │  interval elapsed? ──┼──> sweep
//! └──────────┬───────────┘              └──────────────────────┘
//!            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Store (HashMap, single writer)              │
//! └─────────────────────────────────────────────────────────────┘
//!            │
//!            ▼ shutdown / BGREWRITEAOF
//!        aof::rewrite
//! ```
//!
//! ## Example
//!
//! ```
//! use quickkv::config::Config;
//! use quickkv::storage::{Entry, Evictor, Store};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let evictor = Evictor::from_config(&Config::default());
//! let mut store = Store::new();
//!
//! store.put(Bytes::from("name"), Entry::new(Bytes::from("quick")), &evictor);
//! assert_eq!(store.get(b"name"), Some(Bytes::from("quick")));
//!
//! store.put(
//!     Bytes::from("session"),
//!     Entry::with_ttl(Bytes::from("token123"), Duration::from_secs(3600)),
//!     &evictor,
//! );
//! assert!(store.ttl(b"session").unwrap() > 0);
//! ```

pub mod aof;
pub mod eviction;
pub mod expiry;
pub mod store;

// Re-export commonly used types
pub use aof::AofError;
pub use eviction::{AllKeysRandom, EvictionPolicy, Evictor, SimpleFirst};
pub use expiry::{sweep, CronTimer, ExpirySweeper};
pub use store::{Entry, Store, StoreError, StoreStats};
