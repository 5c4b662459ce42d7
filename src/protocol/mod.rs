//! RESP Protocol Implementation
//!
//! This module is the wire format collaborator of the reactor: it turns
//! inbound bytes into [`Command`]s and [`Reply`] values into outbound bytes.
//! It never touches sockets itself.
//!
//! ## Modules
//!
//! - `types`: `Command`, `Reply` and reply encoding
//! - `parser`: incremental request parser over a `BytesMut`
//!
//! ## Example
//!
//! ```
//! use quickkv::protocol::{Reply, RespParser};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut inbound = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let command = RespParser::new().parse_command(&mut inbound).unwrap().unwrap();
//! assert_eq!(command.args, vec![Bytes::from("name")]);
//!
//! let mut outbound = BytesMut::new();
//! Reply::bulk(Bytes::from("quick")).encode(&mut outbound);
//! assert_eq!(&outbound[..], b"$5\r\nquick\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{ParseError, ParseResult, RespParser};
pub use types::{Command, Reply};
