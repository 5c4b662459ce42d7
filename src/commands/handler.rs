//! Command Dispatch
//!
//! Executes decoded commands against the store. The handler itself holds no
//! data; the reactor lends it the store for the duration of each call, so
//! every mutation stays on the reactor's thread.
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds] [NX | XX]`
//! - `GET key`, `DEL key [key ...]`, `EXISTS key [key ...]`
//! - `INCR key`, `INCRBY key n`, `DECR key`, `DECRBY key n`
//! - `EXPIRE key seconds`, `PEXPIRE key milliseconds`
//! - `TTL key`, `PTTL key`, `PERSIST key`
//! - `DBSIZE`, `FLUSHDB`
//! - `BGREWRITEAOF`
//!
//! Writes that create a key go through [`Store::put`], which runs the
//! eviction policy when the store is at its key limit.

use crate::protocol::{Command, Reply};
use crate::storage::{aof, Entry, Evictor, Store};
use bytes::Bytes;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Dispatches commands to their implementations.
#[derive(Debug)]
pub struct CommandHandler {
    evictor: Evictor,
    aof_path: PathBuf,
}

impl CommandHandler {
    pub fn new(evictor: Evictor, aof_path: impl Into<PathBuf>) -> Self {
        Self {
            evictor,
            aof_path: aof_path.into(),
        }
    }

    pub fn evictor(&self) -> &Evictor {
        &self.evictor
    }

    /// Executes a command and returns the response.
    pub fn execute(&self, store: &mut Store, command: &Command) -> Reply {
        let args = command.args.as_slice();

        match command.name.as_str() {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(store, args),
            "GET" => self.cmd_get(store, args),
            "DEL" => self.cmd_del(store, args),
            "EXISTS" => self.cmd_exists(store, args),
            "INCR" => self.cmd_incr_by(store, "INCR", args, Some(1)),
            "DECR" => self.cmd_incr_by(store, "DECR", args, Some(-1)),
            "INCRBY" => self.cmd_incr_by(store, "INCRBY", args, None),
            "DECRBY" => self.cmd_decrby(store, args),
            "EXPIRE" => self.cmd_expire(store, "EXPIRE", args, Duration::from_secs),
            "PEXPIRE" => self.cmd_expire(store, "PEXPIRE", args, Duration::from_millis),
            "TTL" => self.cmd_ttl(store, "TTL", args, Store::ttl),
            "PTTL" => self.cmd_ttl(store, "PTTL", args, Store::pttl),
            "PERSIST" => self.cmd_persist(store, args),
            "DBSIZE" => self.cmd_dbsize(store, args),
            "FLUSHDB" | "FLUSHALL" => self.cmd_flushdb(store),
            "BGREWRITEAOF" => self.cmd_bgrewriteaof(store),
            other => Reply::error(format!("ERR unknown command '{}'", other)),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args {
            [] => Reply::pong(),
            [message] => Reply::bulk(message.clone()),
            _ => Reply::wrong_arity("PING"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> Reply {
        match args {
            [message] => Reply::bulk(message.clone()),
            _ => Reply::wrong_arity("ECHO"),
        }
    }

    /// SET key value [EX seconds | PX milliseconds] [NX | XX]
    fn cmd_set(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        let (key, value) = match args {
            [key, value, ..] => (key.clone(), value.clone()),
            _ => return Reply::wrong_arity("SET"),
        };

        let mut ttl: Option<Duration> = None;
        let mut nx = false;
        let mut xx = false;

        let mut options = args[2..].iter();
        while let Some(option) = options.next() {
            match option.to_ascii_uppercase().as_slice() {
                b"EX" | b"PX" => {
                    let amount = match options.next().and_then(parse_i64) {
                        Some(n) if n > 0 => n as u64,
                        Some(_) => return Reply::error("ERR invalid expire time in 'set' command"),
                        None => return Reply::error("ERR syntax error"),
                    };
                    ttl = Some(if option.eq_ignore_ascii_case(b"EX") {
                        Duration::from_secs(amount)
                    } else {
                        Duration::from_millis(amount)
                    });
                }
                b"NX" => nx = true,
                b"XX" => xx = true,
                _ => return Reply::error("ERR syntax error"),
            }
        }

        if nx && xx {
            return Reply::error("ERR syntax error");
        }

        if let Some(duration) = ttl {
            if !is_representable(duration) {
                return Reply::error("ERR invalid expire time in 'set' command");
            }
        }

        let exists = store.exists(&key);
        if (nx && exists) || (xx && !exists) {
            return Reply::Null;
        }

        let entry = match ttl {
            Some(duration) => Entry::with_ttl(value, duration),
            None => Entry::new(value),
        };
        store.put(key, entry, &self.evictor);
        Reply::ok()
    }

    /// GET key
    fn cmd_get(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        match args {
            [key] => Reply::bulk_or_null(store.get(key)),
            _ => Reply::wrong_arity("GET"),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Reply::wrong_arity("DEL");
        }
        let deleted = args.iter().filter(|key| store.delete(key)).count();
        Reply::integer(deleted as i64)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Reply::wrong_arity("EXISTS");
        }
        let count = args.iter().filter(|key| store.exists(key)).count();
        Reply::integer(count as i64)
    }

    /// INCR / DECR (fixed delta) and INCRBY (delta argument)
    fn cmd_incr_by(
        &self,
        store: &mut Store,
        name: &str,
        args: &[Bytes],
        fixed: Option<i64>,
    ) -> Reply {
        let (key, delta) = match (args, fixed) {
            ([key], Some(delta)) => (key, delta),
            ([key, delta], None) => match parse_i64(delta) {
                Some(delta) => (key, delta),
                None => return Reply::error("ERR value is not an integer or out of range"),
            },
            _ => return Reply::wrong_arity(name),
        };

        match store.incr_by(key, delta, &self.evictor) {
            Ok(n) => Reply::integer(n),
            Err(e) => Reply::error(format!("ERR {}", e)),
        }
    }

    /// DECRBY key decrement
    fn cmd_decrby(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        let (key, delta) = match args {
            [key, delta] => (key, delta),
            _ => return Reply::wrong_arity("DECRBY"),
        };
        match parse_i64(delta).and_then(i64::checked_neg) {
            Some(delta) => match store.incr_by(key, delta, &self.evictor) {
                Ok(n) => Reply::integer(n),
                Err(e) => Reply::error(format!("ERR {}", e)),
            },
            None => Reply::error("ERR value is not an integer or out of range"),
        }
    }

    /// EXPIRE key seconds / PEXPIRE key milliseconds
    ///
    /// A non-positive timeout deletes the key, as Redis does.
    fn cmd_expire(
        &self,
        store: &mut Store,
        name: &str,
        args: &[Bytes],
        unit: fn(u64) -> Duration,
    ) -> Reply {
        let (key, amount) = match args {
            [key, amount] => (key, amount),
            _ => return Reply::wrong_arity(name),
        };
        let amount = match parse_i64(amount) {
            Some(n) => n,
            None => return Reply::error("ERR value is not an integer or out of range"),
        };

        let applied = if amount <= 0 {
            store.delete(key)
        } else {
            let ttl = unit(amount as u64);
            if !is_representable(ttl) {
                return Reply::error(format!(
                    "ERR invalid expire time in '{}' command",
                    name.to_ascii_lowercase()
                ));
            }
            store.expire(key, ttl)
        };
        Reply::integer(applied as i64)
    }

    /// TTL key / PTTL key
    fn cmd_ttl(
        &self,
        store: &mut Store,
        name: &str,
        args: &[Bytes],
        read: fn(&mut Store, &[u8]) -> Option<i64>,
    ) -> Reply {
        match args {
            [key] => Reply::integer(read(store, key).unwrap_or(-2)),
            _ => Reply::wrong_arity(name),
        }
    }

    /// PERSIST key
    fn cmd_persist(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        match args {
            [key] => Reply::integer(store.persist(key) as i64),
            _ => Reply::wrong_arity("PERSIST"),
        }
    }

    /// DBSIZE
    fn cmd_dbsize(&self, store: &mut Store, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return Reply::wrong_arity("DBSIZE");
        }
        Reply::integer(store.len() as i64)
    }

    /// FLUSHDB
    fn cmd_flushdb(&self, store: &mut Store) -> Reply {
        store.flush();
        Reply::ok()
    }

    /// BGREWRITEAOF
    ///
    /// Runs inline on the reactor thread: the store has a single writer, so
    /// there is no background process to fork.
    fn cmd_bgrewriteaof(&self, store: &mut Store) -> Reply {
        match aof::rewrite(store, &self.aof_path) {
            Ok(written) => {
                debug!(keys = written, path = %self.aof_path.display(), "AOF rewritten");
                Reply::ok()
            }
            Err(e) => {
                error!(error = %e, "AOF rewrite failed");
                Reply::error(format!("ERR {}", e))
            }
        }
    }
}

/// Whether a deadline `ttl` from now can be represented.
fn is_representable(ttl: Duration) -> bool {
    Instant::now().checked_add(ttl).is_some()
}

/// Parses a decimal integer argument.
fn parse_i64(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}
