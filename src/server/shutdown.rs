//! Graceful Shutdown
//!
//! The coordinator runs beside the reactor thread and does nothing until a
//! termination signal arrives. Then:
//!
//! ```text
//!   signal ──> claim ShuttingDown ──> wake reactor ──> join reactor
//!                (waits out Busy)                         │
//!                                                         ▼
//!                                           Store::shutdown(aof) once
//! ```
//!
//! The reactor hands the store back when it exits, so the shutdown hook
//! runs after the last command has been executed and never concurrently
//! with one.

use crate::server::error::ShutdownError;
use crate::server::status::{EngineContext, EngineStatus};
use crate::storage::Store;
use mio::Waker;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

/// Stops a running reactor from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    ctx: Arc<EngineContext>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn new(ctx: Arc<EngineContext>, waker: Arc<Waker>) -> Self {
        Self { ctx, waker }
    }

    /// Claims `ShuttingDown` once the reactor is not mid-batch, then wakes it
    /// out of `poll`. Returns the status that was replaced.
    pub fn shutdown(&self) -> Result<EngineStatus, ShutdownError> {
        let previous = self.ctx.status().claim_shutdown();
        self.waker.wake().map_err(ShutdownError::Wake)?;
        Ok(previous)
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }
}

/// What the shutdown sequence did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Status the coordinator replaced with `ShuttingDown`
    pub previous_status: EngineStatus,
    /// Clients still connected when the reactor stopped
    pub clients_dropped: u64,
    /// Keys written to the AOF, `None` if the rewrite failed
    pub keys_persisted: Option<usize>,
}

/// Waits for a termination signal and tears the server down.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    handle: ShutdownHandle,
    aof_path: PathBuf,
}

impl ShutdownCoordinator {
    pub fn new(handle: ShutdownHandle, aof_path: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            aof_path: aof_path.into(),
        }
    }

    /// Blocks the calling thread on `signal`, then runs [`Self::finish`].
    pub fn run<F>(self, signal: F, reactor: JoinHandle<Store>) -> Result<ShutdownReport, ShutdownError>
    where
        F: Future<Output = io::Result<()>>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ShutdownError::Runtime)?;

        runtime.block_on(signal).map_err(ShutdownError::Signal)?;
        info!("Shutdown signal received");

        self.finish(reactor)
    }

    /// Stops the reactor, takes its store and runs the store shutdown hook.
    pub fn finish(self, reactor: JoinHandle<Store>) -> Result<ShutdownReport, ShutdownError> {
        let previous_status = self.handle.shutdown()?;
        info!(previous = %previous_status, "Engine shutting down");

        let clients_before = self.handle.context().connections().active();
        let mut store = reactor
            .join()
            .map_err(|_| ShutdownError::ReactorPanicked)?;

        let keys_persisted = match store.shutdown(&self.aof_path) {
            Ok(keys) => Some(keys),
            Err(e) => {
                error!(error = %e, "Failed to persist store");
                None
            }
        };

        info!(clients = clients_before, "Shutdown complete");
        Ok(ShutdownReport {
            previous_status,
            clients_dropped: clients_before,
            keys_persisted,
        })
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
pub async fn termination_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
