//! Connection Module
//!
//! Client connections as seen by the reactor. There is no task or thread
//! per client: every connection is a registered socket in one poller, and
//! the reactor drives all of them from a single thread.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Reactor                               │
//! │                                                             │
//! │   readiness event (token) ──> ConnectionTable[token]        │
//! │                                      │                      │
//! │            ┌─────────────────────────┼──────────────┐       │
//! │            ▼                         ▼              ▼       │
//! │   ┌───────────────┐       ┌──────────────┐  ┌────────────┐  │
//! │   │ read_commands │──────>│ execute      │─>│ queue/flush│  │
//! │   └───────────────┘       └──────────────┘  └────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read errors close the connection and decrement the live connection
//! counter. On EOF or malformed input, the commands that arrived complete
//! before it are executed and answered first; nothing is sent back for the
//! malformed part.

pub mod handler;
pub mod table;

// Re-export commonly used types
pub use handler::{Connection, ConnectionError, ConnectionStats, ReadBatch};
pub use table::ConnectionTable;
