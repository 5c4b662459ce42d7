//! Client Connection
//!
//! One [`Connection`] per accepted client. It owns the non-blocking socket
//! and two buffers:
//!
//! ```text
//!   socket ──read──> inbound ──RespParser──> Vec<Command> ──> reactor
//!   socket <─write── outbound <──encode──── Reply       <──── reactor
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: one readiness event may carry half a command or
//! several pipelined ones. The socket is drained until it would block, every
//! complete command is decoded, and any trailing partial command stays in
//! `inbound` for the next event.
//!
//! Replies are queued in `outbound` and written immediately. If the socket
//! cannot take all of it, the remainder waits for a writable event.

use crate::protocol::{Command, ParseError, Reply, RespParser};
use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Largest inbound backlog tolerated without a complete command (64 MB)
const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Size of a single read from the socket
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Connection counters, shared with other threads through `EngineContext`.
///
/// Only the reactor thread writes them.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently connected clients
    pub active_connections: AtomicU64,
    /// Total commands executed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn record_commands(&self, count: usize) {
        self.commands_processed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection. None of them affect other clients.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// RESP parse error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed its side of the connection
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Commands decoded from one readiness event.
///
/// `close` is set when the connection must be closed once `commands` have
/// been executed and answered: the peer sent EOF, or the input turned
/// malformed after some complete commands.
#[derive(Debug, Default)]
pub struct ReadBatch {
    pub commands: Vec<Command>,
    pub close: Option<ConnectionError>,
}

/// A registered client socket and its buffers.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    inbound: BytesMut,
    outbound: BytesMut,
    parser: RespParser,
    /// Interest currently registered with the poller
    interest: Interest,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            inbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            outbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            interest: Interest::READABLE,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Registers the socket for read readiness.
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        self.interest = Interest::READABLE;
        registry.register(&mut self.stream, token, self.interest)
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }

    /// Re-registers with writable interest while replies are pending, and
    /// drops it again once they are flushed.
    pub fn update_interest(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        let wanted = if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if wanted != self.interest {
            trace!(client = %self.addr, writable = !self.outbound.is_empty(), "Reregistering");
            registry.reregister(&mut self.stream, token, wanted)?;
            self.interest = wanted;
        }
        Ok(())
    }

    /// Reads everything the socket has and decodes every complete command.
    ///
    /// EOF and malformed input still hand back the commands decoded before
    /// them, with [`ReadBatch::close`] set. I/O errors and an oversized
    /// backlog fail the read outright.
    pub fn read_commands(&mut self, stats: &ConnectionStats) -> Result<ReadBatch, ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut batch = ReadBatch::default();

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    trace!(client = %self.addr, "Peer closed its write side");
                    batch.close = Some(ConnectionError::ClientDisconnected);
                    break;
                }
                Ok(n) => {
                    stats.record_read(n);
                    self.inbound.extend_from_slice(&chunk[..n]);
                    trace!(client = %self.addr, bytes = n, "Read data");
                    if self.inbound.len() > MAX_BUFFER_SIZE {
                        return Err(ConnectionError::BufferFull);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        loop {
            match self.parser.parse_command(&mut self.inbound) {
                Ok(Some(command)) => batch.commands.push(command),
                Ok(None) => break,
                Err(e) => {
                    batch.close = Some(e.into());
                    break;
                }
            }
        }
        trace!(
            client = %self.addr,
            commands = batch.commands.len(),
            remaining = self.inbound.len(),
            "Parsed commands"
        );
        Ok(batch)
    }

    /// Queues replies in order and writes what the socket accepts.
    ///
    /// Returns `true` once nothing is left to write.
    pub fn respond(&mut self, replies: &[Reply], stats: &ConnectionStats) -> Result<bool, ConnectionError> {
        for reply in replies {
            reply.encode(&mut self.outbound);
        }
        self.flush(stats)
    }

    /// Writes as much pending output as the socket accepts.
    ///
    /// Returns `true` once nothing is left to write.
    pub fn flush(&mut self, stats: &ConnectionStats) -> Result<bool, ConnectionError> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outbound.advance(n);
                    stats.record_written(n);
                    trace!(client = %self.addr, bytes = n, "Sent response");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.outbound.is_empty()
    }
}
