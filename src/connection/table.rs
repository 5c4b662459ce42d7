//! Connection Table
//!
//! Live client connections indexed by their poll token. A connection's slab
//! key *is* its token, so a readiness event maps straight back to its
//! connection without a lookup table.

use crate::connection::handler::{Connection, ConnectionStats};
use mio::{Registry, Token};
use slab::Slab;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

/// Open client connections plus the live-connection counter.
#[derive(Debug)]
pub struct ConnectionTable {
    connections: Slab<Connection>,
    stats: Arc<ConnectionStats>,
}

impl ConnectionTable {
    pub fn new(stats: Arc<ConnectionStats>) -> Self {
        Self {
            connections: Slab::new(),
            stats,
        }
    }

    /// Registers a freshly accepted connection for read readiness and stores
    /// it. On failure nothing is stored and the socket is dropped.
    pub fn insert(&mut self, registry: &Registry, mut connection: Connection) -> io::Result<Token> {
        let entry = self.connections.vacant_entry();
        let token = Token(entry.key());
        connection.register(registry, token)?;
        entry.insert(connection);
        self.stats.connection_opened();
        Ok(token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(token.0)
    }

    /// Deregisters and closes a connection.
    ///
    /// Returns the peer address, or `None` if the token was not live.
    pub fn close(&mut self, registry: &Registry, token: Token) -> Option<SocketAddr> {
        let mut connection = self.connections.try_remove(token.0)?;
        if let Err(e) = connection.deregister(registry) {
            error!(client = %connection.addr(), error = %e, "Error deregistering");
        }
        self.stats.connection_closed();
        Some(connection.addr())
    }

    /// Closes every connection.
    pub fn close_all(&mut self, registry: &Registry) {
        let tokens: Vec<Token> = self.connections.iter().map(|(key, _)| Token(key)).collect();
        for token in tokens {
            self.close(registry, token);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }
}
