//! Command Handler Module
//!
//! Receives decoded commands from the reactor, executes them against the
//! store, and returns the reply to write back.
//!
//! ```text
//! Connection::read_commands()
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │  - Validate     │
//! │  - Execute      │──── Evictor (on key-creating writes)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (owned by the reactor, lent per call)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::CommandHandler;
