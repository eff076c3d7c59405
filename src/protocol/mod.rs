//! RESP Protocol Implementation
//!
//! This module covers the client's side of the Redis Serialization Protocol
//! (RESP): encoding outgoing commands and parsing incoming replies.
//!
//! ## Modules
//!
//! - `types`: Defines the `ReplyValue` enum
//! - `parser`: Incremental parser for incoming replies
//! - `command`: Multi-bulk encoding of outgoing commands
//!
//! ## Example
//!
//! ```
//! use flashpipe::protocol::{format_command, parse_message, ReplyValue};
//!
//! let request = format_command(["PING"]);
//! assert_eq!(&request[..], b"*1\r\n$4\r\nPING\r\n");
//!
//! let (reply, _) = parse_message(b"+PONG\r\n").unwrap().unwrap();
//! assert_eq!(reply, ReplyValue::status("PONG"));
//! ```

pub mod command;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use command::format_command;
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::{ReplyKind, ReplyValue};
