//! Incremental RESP Reply Parser
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Parsed one complete top-level reply
//! - `Ok(None)` - Need more data, the reply is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! Partial replies are never exposed: an array is only returned once every
//! nested element has arrived. The caller keeps appending network data to its
//! buffer, retries the parse, and advances the buffer by `consumed` bytes on
//! success.

use crate::protocol::types::{prefix, ReplyValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Bulk string length is negative (but not -1 for nil)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for nil)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The reply exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP reply parser.
///
/// # Example
///
/// ```
/// use flashpipe::protocol::parser::RespParser;
/// use flashpipe::protocol::types::ReplyValue;
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"+PONG\r\n").unwrap().unwrap();
/// assert_eq!(value, ReplyValue::status("PONG"));
/// assert_eq!(consumed, 7);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse exactly one top-level reply from the buffer.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(ReplyValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(ReplyValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(parse_line(buf).map(|(line, consumed)| {
                (ReplyValue::Status(Bytes::copy_from_slice(line)), consumed)
            })),
            prefix::ERROR => Ok(parse_line(buf).map(|(line, consumed)| {
                (ReplyValue::Error(Bytes::copy_from_slice(line)), consumed)
            })),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(ReplyValue, usize)>> {
        match parse_line(buf) {
            Some((line, consumed)) => Ok(Some((ReplyValue::Integer(parse_i64(line)?), consumed))),
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(ReplyValue, usize)>> {
        let (length_line, data_start) = match parse_line(buf) {
            Some(found) => found,
            None => return Ok(None),
        };

        let length = parse_i64(length_line)?;

        if length == -1 {
            return Ok(Some((ReplyValue::Nil, data_start)));
        }

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

        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);

        Ok(Some((ReplyValue::String(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(ReplyValue, usize)>> {
        let (count_line, mut consumed) = match parse_line(buf) {
            Some(found) => found,
            None => return Ok(None),
        };

        let count = parse_i64(count_line)?;

        if count == -1 {
            return Ok(Some((ReplyValue::Nil, consumed)));
        }

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;

        // Don't trust the announced count for the allocation.
        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }

        self.depth -= 1;

        Ok(Some((ReplyValue::Array(elements), consumed)))
    }
}

/// Splits off the line following the prefix byte.
///
/// Returns the line content and the number of bytes consumed including the
/// prefix and the CRLF.
fn parse_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    find_crlf(&buf[1..]).map(|pos| (&buf[1..1 + pos], 1 + pos + 2))
}

fn parse_i64(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidInteger(e.to_string()))?;
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single reply from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(ReplyValue, usize)>> {
    RespParser::new().parse(buf)
}
