//! Engine Status
//!
//! The reactor and the shutdown coordinator share exactly one piece of
//! mutable state: a status word. Every transition is a single atomic
//! operation.
//!
//! ```text
//!             try_begin_iteration (CAS)
//!   ┌─────────┐ ─────────────────────> ┌──────┐
//!   │ Waiting │                        │ Busy │
//!   └─────────┘ <───────────────────── └──────┘
//!        │        finish_iteration
//!        │
//!        │ claim_shutdown (CAS, retried while Busy)
//!        ▼
//!   ┌──────────────┐
//!   │ ShuttingDown │   terminal
//!   └──────────────┘
//! ```
//!
//! Shutdown only ever moves `Waiting -> ShuttingDown`, so it can never
//! land in the middle of an event batch, and the reactor's
//! `finish_iteration` can never overwrite it.

use crate::connection::ConnectionStats;
use crossbeam_utils::Backoff;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Reactor state as seen by the shutdown coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineStatus {
    /// Blocked in poll, or between iterations
    Waiting = 1 << 1,
    /// Processing a batch of readiness events
    Busy = 1 << 2,
    /// Terminal: the reactor must stop
    ShuttingDown = 1 << 3,
}

impl EngineStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            r if r == EngineStatus::Busy as u8 => EngineStatus::Busy,
            r if r == EngineStatus::ShuttingDown as u8 => EngineStatus::ShuttingDown,
            _ => EngineStatus::Waiting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Waiting => "waiting",
            EngineStatus::Busy => "busy",
            EngineStatus::ShuttingDown => "shutting-down",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for [`EngineStatus`]. Starts in `Waiting`.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(EngineStatus::Waiting as u8))
    }

    pub fn load(&self) -> EngineStatus {
        EngineStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn is_shutting_down(&self) -> bool {
        self.load() == EngineStatus::ShuttingDown
    }

    /// `Waiting -> Busy`. On failure returns the status that was observed.
    pub fn try_begin_iteration(&self) -> Result<(), EngineStatus> {
        self.0
            .compare_exchange(
                EngineStatus::Waiting as u8,
                EngineStatus::Busy as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(EngineStatus::from_u8)
    }

    /// `Busy -> Waiting`. A no-op once shutdown has been claimed.
    pub fn finish_iteration(&self) {
        let _ = self.0.compare_exchange(
            EngineStatus::Busy as u8,
            EngineStatus::Waiting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Spins until the reactor is not `Busy`, then moves to `ShuttingDown`.
    ///
    /// Returns the status that was replaced. Calling it again after success
    /// returns `ShuttingDown` immediately.
    pub fn claim_shutdown(&self) -> EngineStatus {
        let backoff = Backoff::new();
        loop {
            match self.0.compare_exchange_weak(
                EngineStatus::Waiting as u8,
                EngineStatus::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(previous) => return EngineStatus::from_u8(previous),
                Err(raw) => match EngineStatus::from_u8(raw) {
                    EngineStatus::ShuttingDown => return EngineStatus::ShuttingDown,
                    // Busy, or a spurious failure of the weak exchange
                    _ => backoff.snooze(),
                },
            }
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the reactor thread and the shutdown coordinator.
#[derive(Debug, Default)]
pub struct EngineContext {
    status: StatusCell,
    connections: Arc<ConnectionStats>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    /// Connection counters, including the number of live clients.
    pub fn connections(&self) -> &Arc<ConnectionStats> {
        &self.connections
    }
}
