//! Startup and shutdown errors.

use std::io;
use thiserror::Error;

/// A failed startup step. Every variant is fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to resolve bind address {addr}: {source}")]
    ResolveAddress { addr: String, source: io::Error },

    #[error("bind address {0} did not resolve to any socket address")]
    NoAddress(String),

    #[error("failed to create poll instance: {0}")]
    CreatePoll(#[source] io::Error),

    #[error("failed to create listening socket: {0}")]
    CreateSocket(#[source] io::Error),

    #[error("failed to set listening socket non-blocking: {0}")]
    SetNonBlocking(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: std::net::SocketAddr,
        source: io::Error,
    },

    #[error("failed to register listener with poll: {0}")]
    RegisterListener(#[source] io::Error),

    #[error("failed to create reactor waker: {0}")]
    CreateWaker(#[source] io::Error),
}

/// Failures of the shutdown sequence after a signal was awaited.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("failed to build signal runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to listen for termination signals: {0}")]
    Signal(#[source] io::Error),

    #[error("failed to wake reactor: {0}")]
    Wake(#[source] io::Error),

    #[error("reactor thread panicked")]
    ReactorPanicked,
}
