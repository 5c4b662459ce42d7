//! Incremental RESP Request Parser
//!
//! The parser works directly on a connection's inbound `BytesMut`:
//!
//! - `Ok(Some(command))` - a complete command was decoded and its bytes consumed
//! - `Ok(None)` - the buffer holds a partial command; nothing was consumed
//! - `Err(ParseError)` - the bytes are not valid RESP; the connection is dropped
//!
//! Calling [`RespParser::parse_command`] in a loop drains every pipelined
//! command that has fully arrived.
//!
//! Two request forms are accepted:
//! 1. Arrays of bulk strings: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! 2. Inline commands: `GET name\r\n`

use crate::protocol::types::{prefix, Command, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid integer in a length header
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a command name or inline command
    #[error("invalid UTF-8 in command")]
    InvalidUtf8,

    /// Bulk string length is negative
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative or zero
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, unexpected type, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one command
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// A RESP request parser.
///
/// # Example
///
/// ```
/// use quickkv::protocol::RespParser;
/// use bytes::BytesMut;
///
/// let mut parser = RespParser::new();
/// let mut buffer = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
///
/// let command = parser.parse_command(&mut buffer).unwrap().unwrap();
/// assert_eq!(command.name, "GET");
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    commands_parsed: u64,
}

impl RespParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands decoded so far.
    pub fn commands_parsed(&self) -> u64 {
        self.commands_parsed
    }

    /// Decodes one command from the front of `buf`, consuming its bytes.
    ///
    /// Blank inline lines are consumed and skipped.
    pub fn parse_command(&mut self, buf: &mut BytesMut) -> ParseResult<Option<Command>> {
        loop {
            let parsed = match buf.first() {
                None => return Ok(None),
                Some(&prefix::ARRAY) => parse_array(buf)?,
                Some(_) => parse_inline(buf)?,
            };

            match parsed {
                Some((parts, consumed)) if parts.is_empty() => buf.advance(consumed),
                Some((parts, consumed)) => {
                    buf.advance(consumed);
                    let command = into_command(parts)?;
                    self.commands_parsed += 1;
                    return Ok(Some(command));
                }
                None => return Ok(None),
            }
        }
    }
}

/// Splits the name off the decoded parts.
fn into_command(mut parts: Vec<Bytes>) -> ParseResult<Command> {
    if parts.is_empty() {
        return Err(ParseError::ProtocolError("empty command".to_string()));
    }
    let args = parts.split_off(1);
    let name = std::str::from_utf8(&parts[0]).map_err(|_| ParseError::InvalidUtf8)?;
    Ok(Command::new(name, args))
}

/// Parses `*<count>\r\n` followed by `count` bulk strings.
fn parse_array(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    let (count, mut consumed) = match parse_header(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if count <= 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }
    let count = count as usize;
    if count > MAX_ARRAY_LEN {
        return Err(ParseError::MessageTooLarge {
            size: count,
            max: MAX_ARRAY_LEN,
        });
    }

    let mut parts = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        match parse_bulk_string(&buf[consumed..])? {
            Some((data, used)) => {
                parts.push(data);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((parts, consumed)))
}

/// Parses `$<length>\r\n<data>\r\n`.
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
    match buf.first() {
        None => return Ok(None),
        Some(&prefix::BULK_STRING) => {}
        Some(&other) => {
            return Err(ParseError::ProtocolError(format!(
                "expected bulk string, got type byte {:#04x}",
                other
            )))
        }
    }

    let (length, data_start) = match parse_header(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }
    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total = data_start + length + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[data_start + length..total] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((data, total)))
}

/// Parses a `<prefix><integer>\r\n` header, returning the integer and the
/// number of bytes it occupied.
fn parse_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let digits = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| ParseError::InvalidUtf8)?;
    let n = digits
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger(digits.to_string()))?;
    Ok(Some((n, 1 + end + CRLF.len())))
}

/// Parses a whitespace-separated inline command line. A blank line yields
/// no parts.
fn parse_inline(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    let end = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let line = std::str::from_utf8(&buf[..end]).map_err(|_| ParseError::InvalidUtf8)?;
    let parts: Vec<Bytes> = line
        .split_whitespace()
        .map(|s| Bytes::copy_from_slice(s.as_bytes()))
        .collect();

    Ok(Some((parts, end + CRLF.len())))
}

/// Finds the position of CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
