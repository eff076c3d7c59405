//! RESP Reply Types
//!
//! This module defines the in-memory form of a parsed server reply.
//! A reply is created once by the connection's parse step, handed to the
//! pipeline worker and then to the completion waiting for it. It is never
//! mutated after that.
//!
//! ## Protocol Format
//!
//! Each RESP reply starts with a type prefix byte:
//! - `+` Status (simple string)
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All types are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nfoo\r\n:7\r\n`
//! Nil: `$-1\r\n` or `*-1\r\n`

use bytes::Bytes;
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

/// The kind of a [`ReplyValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Invalid,
    String,
    Status,
    Error,
    Integer,
    Nil,
    Array,
}

/// A parsed protocol reply.
///
/// The default value is [`ReplyValue::Invalid`], which is the only kind that
/// is not "valid" (see [`ReplyValue::is_valid`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReplyValue {
    /// No reply. Never produced by the parser.
    #[default]
    Invalid,

    /// Binary-safe bulk string.
    /// Format: `$<length>\r\n<data>\r\n`
    String(Bytes),

    /// Status reply, e.g. `OK` or `PONG`.
    /// Format: `+<status>\r\n`
    Status(Bytes),

    /// Error reply sent by the server.
    /// Format: `-<error message>\r\n`
    Error(Bytes),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Null bulk string or null array.
    Nil,

    /// Arrays can contain any reply, including nested arrays.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<ReplyValue>),
}

impl ReplyValue {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use flashpipe::protocol::types::ReplyValue;
    /// let ok = ReplyValue::status("OK");
    /// assert!(ok.is_ok());
    /// ```
    pub fn status(s: impl Into<Bytes>) -> Self {
        ReplyValue::Status(s.into())
    }

    /// Creates an error reply.
    pub fn error(s: impl Into<Bytes>) -> Self {
        ReplyValue::Error(s.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        ReplyValue::Integer(n)
    }

    /// Creates a bulk string reply.
    ///
    /// # Example
    /// ```
    /// use flashpipe::protocol::types::ReplyValue;
    /// let bulk = ReplyValue::string("hello");
    /// assert_eq!(bulk.as_str(), Some("hello"));
    /// ```
    pub fn string(data: impl Into<Bytes>) -> Self {
        ReplyValue::String(data.into())
    }

    /// Creates a nil reply.
    pub fn nil() -> Self {
        ReplyValue::Nil
    }

    /// Creates an array reply.
    pub fn array(values: Vec<ReplyValue>) -> Self {
        ReplyValue::Array(values)
    }

    /// Returns the kind of this reply.
    pub fn kind(&self) -> ReplyKind {
        match self {
            ReplyValue::Invalid => ReplyKind::Invalid,
            ReplyValue::String(_) => ReplyKind::String,
            ReplyValue::Status(_) => ReplyKind::Status,
            ReplyValue::Error(_) => ReplyKind::Error,
            ReplyValue::Integer(_) => ReplyKind::Integer,
            ReplyValue::Nil => ReplyKind::Nil,
            ReplyValue::Array(_) => ReplyKind::Array,
        }
    }

    /// Returns false only for [`ReplyValue::Invalid`].
    pub fn is_valid(&self) -> bool {
        !matches!(self, ReplyValue::Invalid)
    }

    /// Returns true for the `+OK` status reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, ReplyValue::Status(s) if s.as_ref() == b"OK")
    }

    /// Returns true if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, ReplyValue::Nil)
    }

    /// Returns true if this value is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, ReplyValue::Error(_))
    }

    /// Returns the status text of a status reply.
    pub fn as_status(&self) -> Option<&str> {
        match self {
            ReplyValue::Status(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner string from a bulk string, status or error.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Attempts to extract the raw bytes of a bulk string, status or error.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ReplyValue::String(b) | ReplyValue::Status(b) | ReplyValue::Error(b) => Some(b),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ReplyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[ReplyValue]> {
        match self {
            ReplyValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<ReplyValue>> {
        match self {
            ReplyValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Serializes the reply to its wire format.
    ///
    /// The client never sends replies; this is what a server writes and is
    /// used by in-process test servers.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// [`ReplyValue::Invalid`] has no wire form and writes nothing.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            ReplyValue::Invalid => {}
            ReplyValue::Status(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s);
                buf.extend_from_slice(CRLF);
            }
            ReplyValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s);
                buf.extend_from_slice(CRLF);
            }
            ReplyValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            ReplyValue::String(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            ReplyValue::Nil => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            ReplyValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }
}

impl fmt::Display for ReplyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyValue::Invalid => write!(f, "(invalid)"),
            ReplyValue::Status(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            ReplyValue::Error(s) => write!(f, "(error) {}", String::from_utf8_lossy(s)),
            ReplyValue::Integer(n) => write!(f, "(integer) {}", n),
            ReplyValue::String(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            ReplyValue::Nil => write!(f, "(nil)"),
            ReplyValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
