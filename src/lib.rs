//! # QuickKV - A Single-Threaded In-Memory Key-Value Server
//!
//! QuickKV speaks the Redis wire protocol (RESP) and serves every client
//! from one event-loop thread. The store is never shared, so it needs no
//! locks; a second thread exists only to wait for a termination signal and
//! shut the loop down cleanly.
//!
//! ## Features
//!
//! - **Redis-Compatible**: RESP arrays and inline commands, pipelining
//! - **Reactor**: one `mio` poller drives the listener and every client
//! - **Bounded Keyspace**: eviction once `keys_limit` keys are stored
//! - **TTL Support**: lazy expiry on read plus a periodic sweep
//! - **AOF Snapshot**: live keys rewritten as `SET` commands on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              QuickKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Listener   │───>│ Connection  │───>│  Command    │                  │
//! │  │ (mio token) │    │   Table     │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │         ▲                                     │                         │
//! │         │ Reactor (one thread)                ▼                         │
//! │  ┌──────┴──────┐    ┌─────────────┐    ┌──────────────────────────────┐ │
//! │  │ EngineStatus│    │    RESP     │    │ Store ── Evictor             │ │
//! │  │  (atomic)   │    │   Parser    │    │   └──── ExpirySweeper (cron) │ │
//! │  └──────┬──────┘    └─────────────┘    └──────────────────────────────┘ │
//! │         │                                                               │
//! │  ┌──────┴──────────────────────────────────────────────────────────────┐│
//! │  │ ShutdownCoordinator (signal thread): claim, wake, join, AOF         ││
//! │  └─────────────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use quickkv::config::Config;
//! use quickkv::server::{termination_signal, EngineContext, Reactor, ShutdownCoordinator};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let reactor = Reactor::bind(&config, Arc::new(EngineContext::new()))?;
//!
//!     let coordinator = ShutdownCoordinator::new(reactor.shutdown_handle(), &config.aof_file);
//!     let reactor = std::thread::spawn(move || reactor.run());
//!
//!     coordinator.run(termination_signal(), reactor)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds] [NX | XX]`, `GET key`
//! - `DEL key [key ...]`, `EXISTS key [key ...]`
//! - `INCR` / `DECR` / `INCRBY` / `DECRBY`
//! - `EXPIRE` / `PEXPIRE`, `TTL` / `PTTL`, `PERSIST`
//! - `DBSIZE`, `FLUSHDB` / `FLUSHALL`, `BGREWRITEAOF`
//!
//! ## Module Overview
//!
//! - [`config`]: command-line configuration and defaults
//! - [`protocol`]: RESP parser and reply encoding
//! - [`storage`]: store, eviction, expiry and AOF rewrite
//! - [`commands`]: command execution against the store
//! - [`connection`]: per-client buffers and the connection table
//! - [`server`]: reactor loop, engine status and shutdown coordination

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, EvictionStrategy};
pub use connection::{Connection, ConnectionStats, ConnectionTable};
pub use protocol::{Command, ParseError, Reply, RespParser};
pub use server::{EngineContext, EngineStatus, Reactor, ShutdownCoordinator};
pub use storage::{Entry, Evictor, ExpirySweeper, Store};

/// Version of QuickKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
