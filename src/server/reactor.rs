//! Reactor
//!
//! One thread, one poller, every socket. The reactor owns the listener,
//! the connection table and the [`Store`], so the store is only ever
//! touched from this thread and needs no locking.
//!
//! ```text
//!   loop while status != ShuttingDown
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ 1. sweeper.tick()            expire keys if the cron is due  │
//!   │ 2. poll(None)                block until readiness / wake    │
//!   │ 3. CAS Waiting -> Busy       fails on ShuttingDown: exit     │
//!   │ 4. for each event                                            │
//!   │       LISTENER_TOKEN  accept + register every pending client │
//!   │       WAKER_TOKEN     nothing, status is checked next        │
//!   │       client token    read -> execute -> respond             │
//!   │ 5. Busy -> Waiting                                           │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expiry only runs at the top of an iteration. With no socket activity
//! the reactor stays blocked in `poll`, so expired keys may linger
//! physically until the next event; reads still never return them.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{Connection, ConnectionError, ConnectionTable};
use crate::protocol::Reply;
use crate::server::error::ServerError;
use crate::server::shutdown::ShutdownHandle;
use crate::server::status::{EngineContext, EngineStatus};
use crate::storage::{Evictor, ExpirySweeper, Store};
use mio::event::Event;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Token of the listening socket
pub const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Token of the shutdown waker
pub const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// Pending-connection backlog passed to `listen(2)`
pub const LISTEN_BACKLOG: i32 = 20000;

const EVENTS_CAPACITY: usize = 1024;

/// The event loop and everything it owns.
pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    waker: Arc<Waker>,
    connections: ConnectionTable,
    store: Store,
    handler: CommandHandler,
    sweeper: ExpirySweeper,
    ctx: Arc<EngineContext>,
}

impl Reactor {
    /// Runs the startup sequence: poll, socket, non-blocking, bind, listen,
    /// register. The first failing step is returned.
    pub fn bind(config: &Config, ctx: Arc<EngineContext>) -> Result<Self, ServerError> {
        let addr = resolve(&config.bind_address())?;

        let poll = Poll::new().map_err(ServerError::CreatePoll)?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(ServerError::CreateSocket)?;
        if let Err(e) = socket.set_reuse_address(true) {
            warn!(error = %e, "Failed to set SO_REUSEADDR");
        }
        socket
            .set_nonblocking(true)
            .map_err(ServerError::SetNonBlocking)?;
        socket
            .bind(&addr.into())
            .map_err(|source| ServerError::Bind { addr, source })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| ServerError::Listen { addr, source })?;

        let mut listener = TcpListener::from_std(socket.into());
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::RegisterListener)?;

        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::CreateWaker)?;
        let local_addr = listener.local_addr().unwrap_or(addr);

        let evictor = Evictor::from_config(config);
        info!(
            addr = %local_addr,
            keys_limit = evictor.keys_limit(),
            eviction = evictor.policy_name(),
            "Listening"
        );

        Ok(Self {
            poll,
            listener,
            local_addr,
            waker: Arc::new(waker),
            connections: ConnectionTable::new(Arc::clone(ctx.connections())),
            store: Store::new(),
            handler: CommandHandler::new(evictor, config.aof_file.clone()),
            sweeper: ExpirySweeper::new(config.cron_interval()),
            ctx,
        })
    }

    /// Replaces the empty store created by [`Reactor::bind`].
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = store;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle the shutdown coordinator uses to stop this reactor.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.ctx), Arc::clone(&self.waker))
    }

    /// Runs the event loop until shutdown is claimed, then closes every
    /// socket and hands the store back to the caller.
    pub fn run(mut self) -> Store {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while !self.ctx.status().is_shutting_down() {
            self.sweeper.tick(&mut self.store, Instant::now());

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() != io::ErrorKind::Interrupted {
                    error!(error = %e, "Error polling");
                }
                continue;
            }

            match self.ctx.status().try_begin_iteration() {
                Ok(()) => {}
                Err(EngineStatus::ShuttingDown) => {
                    debug!(pending = events.iter().count(), "Discarding events, shutting down");
                    break;
                }
                Err(status) => warn!(%status, "Unexpected engine status"),
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    WAKER_TOKEN => trace!("Reactor woken"),
                    _ => self.handle_client(event),
                }
            }

            self.ctx.status().finish_iteration();
        }

        self.close()
    }

    fn close(self) -> Store {
        let Reactor {
            poll,
            listener,
            local_addr,
            mut connections,
            store,
            ..
        } = self;

        let clients = connections.len();
        connections.close_all(poll.registry());
        drop(listener);
        info!(addr = %local_addr, clients, "Listener closed");
        store
    }

    /// Accepts until the listener would block. Failures only affect the
    /// connection being accepted.
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let connection = Connection::new(stream, addr);
                    match self.connections.insert(self.poll.registry(), connection) {
                        Ok(token) => {
                            debug!(client = %addr, token = token.0, "Client connected");
                        }
                        Err(e) => {
                            warn!(client = %addr, error = %e, "Failed to register client, dropping");
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_per_connection_accept_error(&e) => {
                    debug!(error = %e, "Pending connection failed before accept");
                }
                Err(e) => {
                    // Out of descriptors or similar: retry on the next readiness event
                    warn!(error = %e, "Failed to accept connection");
                    return;
                }
            }
        }
    }

    fn handle_client(&mut self, event: &Event) {
        let token = event.token();
        if let Err(e) = self.serve_client(token, event) {
            match e {
                ConnectionError::ClientDisconnected => {}
                ConnectionError::IoError(ref io_err)
                    if io_err.kind() == io::ErrorKind::ConnectionReset =>
                {
                    debug!(token = token.0, "Connection reset by peer");
                }
                ref e => warn!(token = token.0, error = %e, "Connection error"),
            }
            if let Some(addr) = self.connections.close(self.poll.registry(), token) {
                debug!(client = %addr, "Client disconnected");
            }
        }
    }

    fn serve_client(&mut self, token: Token, event: &Event) -> Result<(), ConnectionError> {
        let registry = self.poll.registry();
        let stats = Arc::clone(self.connections.stats());
        let connection = match self.connections.get_mut(token) {
            Some(connection) => connection,
            // Closed earlier in this batch
            None => return Ok(()),
        };

        if event.is_writable() && connection.has_pending_writes() {
            connection.flush(&stats)?;
        }

        if event.is_readable() || event.is_read_closed() || event.is_error() {
            let batch = connection.read_commands(&stats)?;
            if !batch.commands.is_empty() {
                let replies: Vec<Reply> = batch
                    .commands
                    .iter()
                    .map(|command| {
                        trace!(client = %connection.addr(), %command, "Executing");
                        self.handler.execute(&mut self.store, command)
                    })
                    .collect();
                stats.record_commands(replies.len());
                let drained = connection.respond(&replies, &stats)?;
                if !drained && batch.close.is_some() {
                    debug!(client = %connection.addr(), "Closing with replies unsent");
                }
            }
            if let Some(reason) = batch.close {
                return Err(reason);
            }
        }

        connection.update_interest(registry, token)?;
        Ok(())
    }
}

/// Accept failures that concern only the connection being accepted. The
/// listener still has other clients queued behind it.
fn is_per_connection_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::PermissionDenied
    )
}

fn resolve(bind_address: &str) -> Result<SocketAddr, ServerError> {
    bind_address
        .to_socket_addrs()
        .map_err(|source| ServerError::ResolveAddress {
            addr: bind_address.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ServerError::NoAddress(bind_address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            keys_limit: 10,
            ..Default::default()
        }
    }

    fn start(config: &Config) -> (SocketAddr, ShutdownHandle, thread::JoinHandle<Store>) {
        let ctx = Arc::new(EngineContext::new());
        let reactor = Reactor::bind(config, ctx).unwrap();
        let addr = reactor.local_addr();
        let handle = reactor.shutdown_handle();
        let join = thread::spawn(move || reactor.run());
        (addr, handle, join)
    }

    fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        BufReader::new(stream)
    }

    fn send(client: &mut BufReader<TcpStream>, payload: &[u8]) {
        client.get_mut().write_all(payload).unwrap();
    }

    fn read_line(client: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        client.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_resolve() {
        let addr = resolve("127.0.0.1:7379").unwrap();
        assert_eq!(addr.port(), 7379);

        assert!(matches!(
            resolve("127.0.0.1"),
            Err(ServerError::ResolveAddress { .. })
        ));
    }

    #[test]
    fn test_accept_error_classification() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_per_connection_accept_error(&io::Error::from(kind)));
        }

        // EMFILE / ENFILE stop the accept loop until the next event
        assert!(!is_per_connection_accept_error(&io::Error::from_raw_os_error(24)));
        assert!(!is_per_connection_accept_error(&io::Error::from_raw_os_error(23)));
        assert!(!is_per_connection_accept_error(&io::Error::from(io::ErrorKind::OutOfMemory)));
    }

    #[test]
    fn test_bind_reports_address_in_use() {
        let first = Reactor::bind(&test_config(), Arc::new(EngineContext::new())).unwrap();

        let taken = Config {
            port: first.local_addr().port(),
            ..test_config()
        };
        let result = Reactor::bind(&taken, Arc::new(EngineContext::new()));
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[test]
    fn test_ping_and_set_get() {
        let (addr, handle, join) = start(&test_config());
        let mut client = connect(addr);

        send(&mut client, b"*1\r\n$4\r\nPING\r\n");
        assert_eq!(read_line(&mut client), "+PONG\r\n");

        send(&mut client, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(read_line(&mut client), "+OK\r\n");

        send(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        assert_eq!(read_line(&mut client), "$3\r\n");
        assert_eq!(read_line(&mut client), "bar\r\n");

        handle.shutdown().unwrap();
        let mut store = join.join().unwrap();
        assert_eq!(store.get(b"foo"), Some(bytes::Bytes::from("bar")));
    }

    #[test]
    fn test_pipelined_commands() {
        let (addr, handle, join) = start(&test_config());
        let mut client = connect(addr);

        send(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nn\r\n$1\r\n1\r\n*2\r\n$4\r\nINCR\r\n$1\r\nn\r\n*2\r\n$4\r\nINCR\r\n$1\r\nn\r\n",
        );
        assert_eq!(read_line(&mut client), "+OK\r\n");
        assert_eq!(read_line(&mut client), ":2\r\n");
        assert_eq!(read_line(&mut client), ":3\r\n");

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_partial_command_across_writes() {
        let (addr, handle, join) = start(&test_config());
        let mut client = connect(addr);

        send(&mut client, b"*2\r\n$4\r\nEC");
        thread::sleep(Duration::from_millis(50));
        send(&mut client, b"HO\r\n$5\r\nhello\r\n");
        assert_eq!(read_line(&mut client), "$5\r\n");
        assert_eq!(read_line(&mut client), "hello\r\n");

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_commands_before_half_close_are_applied() {
        let (addr, handle, join) = start(&test_config());
        let mut client = connect(addr);

        send(&mut client, b"SET a 1\r\nINCR a\r\n");
        client.get_mut().shutdown(std::net::Shutdown::Write).unwrap();

        assert_eq!(read_line(&mut client), "+OK\r\n");
        assert_eq!(read_line(&mut client), ":2\r\n");
        // Then the server closes its side
        assert_eq!(read_line(&mut client), "");

        handle.shutdown().unwrap();
        let mut store = join.join().unwrap();
        assert_eq!(store.get(b"a"), Some(bytes::Bytes::from("2")));
    }

    #[test]
    fn test_blank_line_keeps_connection_open() {
        let (addr, handle, join) = start(&test_config());
        let mut client = connect(addr);

        send(&mut client, b"\r\n");
        send(&mut client, b"PING\r\n");
        assert_eq!(read_line(&mut client), "+PONG\r\n");

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_commands_before_malformed_input_are_applied() {
        let (addr, handle, join) = start(&test_config());
        let mut client = connect(addr);

        send(&mut client, b"SET b 2\r\n*1\r\n$-5\r\n");
        assert_eq!(read_line(&mut client), "+OK\r\n");
        assert_eq!(read_line(&mut client), "");

        handle.shutdown().unwrap();
        let mut store = join.join().unwrap();
        assert_eq!(store.get(b"b"), Some(bytes::Bytes::from("2")));
    }

    #[test]
    fn test_clients_share_one_store() {
        let (addr, handle, join) = start(&test_config());
        let mut writer = connect(addr);
        let mut reader = connect(addr);

        send(&mut writer, b"SET shared value\r\n");
        assert_eq!(read_line(&mut writer), "+OK\r\n");

        send(&mut reader, b"GET shared\r\n");
        assert_eq!(read_line(&mut reader), "$5\r\n");
        assert_eq!(read_line(&mut reader), "value\r\n");

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_protocol_error_closes_only_that_client() {
        let ctx = Arc::new(EngineContext::new());
        let reactor = Reactor::bind(&test_config(), Arc::clone(&ctx)).unwrap();
        let addr = reactor.local_addr();
        let handle = reactor.shutdown_handle();
        let join = thread::spawn(move || reactor.run());

        let mut good = connect(addr);
        let mut bad = connect(addr);

        send(&mut bad, b"*1\r\n$-5\r\n");
        let mut buf = [0u8; 16];
        // The server closes without replying
        assert_eq!(bad.get_mut().read(&mut buf).unwrap(), 0);

        send(&mut good, b"PING\r\n");
        assert_eq!(read_line(&mut good), "+PONG\r\n");
        assert_eq!(ctx.connections().active(), 1);

        handle.shutdown().unwrap();
        join.join().unwrap();
        assert_eq!(ctx.connections().active(), 0);
    }

    #[test]
    fn test_disconnect_decrements_live_clients() {
        let ctx = Arc::new(EngineContext::new());
        let reactor = Reactor::bind(&test_config(), Arc::clone(&ctx)).unwrap();
        let addr = reactor.local_addr();
        let handle = reactor.shutdown_handle();
        let join = thread::spawn(move || reactor.run());

        let mut client = connect(addr);
        send(&mut client, b"PING\r\n");
        assert_eq!(read_line(&mut client), "+PONG\r\n");
        assert_eq!(ctx.connections().active(), 1);

        drop(client);
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctx.connections().active() != 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(ctx.connections().active(), 0);

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_eviction_under_keys_limit() {
        let config = Config {
            keys_limit: 3,
            ..test_config()
        };
        let (addr, handle, join) = start(&config);
        let mut client = connect(addr);

        for key in ["a", "b", "c", "d", "e"] {
            send(&mut client, format!("SET {} 1\r\n", key).as_bytes());
            assert_eq!(read_line(&mut client), "+OK\r\n");
        }
        send(&mut client, b"DBSIZE\r\n");
        assert_eq!(read_line(&mut client), ":3\r\n");

        handle.shutdown().unwrap();
        let store = join.join().unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_cron_sweeps_on_activity() {
        let config = Config {
            cron_interval_ms: 10,
            ..test_config()
        };
        let mut store = Store::new();
        store.insert(
            bytes::Bytes::from("short"),
            crate::storage::Entry::with_ttl(bytes::Bytes::from("v"), Duration::from_millis(1)),
        );
        store.insert(
            bytes::Bytes::from("long"),
            crate::storage::Entry::new(bytes::Bytes::from("v")),
        );

        let reactor = Reactor::bind(&config, Arc::new(EngineContext::new()))
            .unwrap()
            .with_store(store);
        let addr = reactor.local_addr();
        let handle = reactor.shutdown_handle();
        let join = thread::spawn(move || reactor.run());

        // The sweep runs at the top of the iteration after the connect event
        thread::sleep(Duration::from_millis(50));
        let mut client = connect(addr);
        send(&mut client, b"DBSIZE\r\n");
        assert_eq!(read_line(&mut client), ":1\r\n");

        handle.shutdown().unwrap();
        let store = join.join().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expired, 1);
    }

    #[test]
    fn test_shutdown_while_idle_closes_listener() {
        let (addr, handle, join) = start(&test_config());

        // Blocked in poll with no clients; the waker must get it out
        thread::sleep(Duration::from_millis(50));
        handle.shutdown().unwrap();
        let store = join.join().unwrap();
        assert!(store.is_empty());

        assert!(TcpStream::connect(addr).is_err());
    }
}
