//! RESP (Redis Serialization Protocol) Data Types
//!
//! Requests arrive as arrays of bulk strings (or inline text lines) and are
//! decoded into a [`Command`]. Responses are built as a [`Reply`] and encoded
//! straight into a connection's outgoing buffer.
//!
//! ## Reply Format
//!
//! Each RESP type starts with a type prefix byte and ends with CRLF:
//! - Simple String: `+OK\r\n`
//! - Error: `-ERR unknown command\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk String: `$5\r\nhello\r\n`
//! - Null Bulk String: `$-1\r\n`
//! - Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Upper-cased command name
    pub name: String,
    /// Arguments after the name, binary safe
    pub args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from its name and arguments.
    pub fn new(name: impl AsRef<str>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.as_ref().to_ascii_uppercase(),
            args,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Format: `-<error message>\r\n`
    Error(String),

    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string: `$-1\r\n`
    Null,

    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<Reply>),
}

impl Reply {
    pub fn simple(s: impl Into<String>) -> Self {
        Reply::SimpleString(s.into())
    }

    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use quickkv::protocol::Reply;
    /// let err = Reply::error("ERR unknown command");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::BulkString(data.into())
    }

    /// `Some(bytes)` becomes a bulk string, `None` becomes null.
    pub fn bulk_or_null(data: Option<Bytes>) -> Self {
        data.map(Reply::BulkString).unwrap_or(Reply::Null)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::SimpleString("PONG".to_string())
    }

    /// Standard arity error for a command.
    pub fn wrong_arity(command: &str) -> Self {
        Reply::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            command.to_ascii_lowercase()
        ))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Appends the wire form of this reply to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::SimpleString(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::BulkString(data) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Reply::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            Reply::Array(values) => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(values.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for value in values {
                    value.encode(buf);
                }
            }
        }
    }

    /// Encodes into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_and_error_encode() {
        assert_eq!(&Reply::ok().to_bytes()[..], b"+OK\r\n");
        assert_eq!(&Reply::pong().to_bytes()[..], b"+PONG\r\n");
        assert_eq!(
            &Reply::error("ERR unknown command").to_bytes()[..],
            b"-ERR unknown command\r\n"
        );
    }

    #[test]
    fn test_integer_encode() {
        assert_eq!(&Reply::integer(1000).to_bytes()[..], b":1000\r\n");
        assert_eq!(&Reply::integer(-42).to_bytes()[..], b":-42\r\n");
    }

    #[test]
    fn test_bulk_and_null_encode() {
        assert_eq!(&Reply::bulk("hello").to_bytes()[..], b"$5\r\nhello\r\n");
        assert_eq!(&Reply::bulk("").to_bytes()[..], b"$0\r\n\r\n");
        assert_eq!(&Reply::Null.to_bytes()[..], b"$-1\r\n");
        assert_eq!(Reply::bulk_or_null(None), Reply::Null);
    }

    #[test]
    fn test_array_encode() {
        let value = Reply::Array(vec![
            Reply::integer(1),
            Reply::Array(vec![Reply::bulk("a"), Reply::Null]),
        ]);
        assert_eq!(&value.to_bytes()[..], b"*2\r\n:1\r\n*2\r\n$1\r\na\r\n$-1\r\n");
    }

    #[test]
    fn test_encode_appends() {
        let mut buf = BytesMut::new();
        Reply::ok().encode(&mut buf);
        Reply::integer(3).encode(&mut buf);
        assert_eq!(&buf[..], b"+OK\r\n:3\r\n");
    }

    #[test]
    fn test_command_name_is_uppercased() {
        let command = Command::new("set", vec![Bytes::from("k"), Bytes::from("v")]);
        assert_eq!(command.name, "SET");
        assert_eq!(command.to_string(), "SET k v");
        assert_eq!(
            Reply::wrong_arity("GET"),
            Reply::error("ERR wrong number of arguments for 'get' command")
        );
    }
}
