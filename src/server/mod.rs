//! Server Module
//!
//! Two threads and one shared status word:
//!
//! ```text
//! ┌──────────────────────────────┐         ┌──────────────────────────────┐
//! │ reactor thread               │         │ main thread                  │
//! │                              │         │                              │
//! │ Reactor::run()               │         │ ShutdownCoordinator::run()   │
//! │   owns listener, clients,    │         │   waits for SIGINT/SIGTERM   │
//! │   Store                      │         │   claims ShuttingDown        │
//! │                              │<─ wake ─│   wakes the reactor          │
//! │ returns Store on exit ───────┼── join ─>│   Store::shutdown(aof)       │
//! └──────────────┬───────────────┘         └───────────────┬──────────────┘
//!                │                                         │
//!                └──────────> EngineContext <──────────────┘
//!                      (status, connection counters)
//! ```

pub mod error;
pub mod reactor;
pub mod shutdown;
pub mod status;

pub use error::{ServerError, ShutdownError};
pub use reactor::{Reactor, LISTENER_TOKEN, LISTEN_BACKLOG, WAKER_TOKEN};
pub use shutdown::{termination_signal, ShutdownCoordinator, ShutdownHandle, ShutdownReport};
pub use status::{EngineContext, EngineStatus, StatusCell};
