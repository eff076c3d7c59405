//! The Connection Boundary
//!
//! The pipeline worker talks to the server through the [`Connection`] trait
//! and nothing else. An implementation transmits already-pipelined batches
//! and hands back replies one at a time, in the order they arrive.
//!
//! The worker is the only owner of its connection, so implementations need
//! `Send` but never `Sync`.

use crate::protocol::{ParseError, ReplyValue};
use std::time::Duration;

/// A transport that can carry pipelined RESP traffic.
pub trait Connection: Send {
    /// Establishes the connection.
    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), ConnectionError>;

    /// Returns true while the connection can carry traffic.
    fn is_connected(&self) -> bool;

    /// Transmits one batch of encoded commands as a single write.
    fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError>;

    /// Blocks until exactly one complete top-level reply has been parsed.
    fn receive_reply(&mut self) -> Result<ReplyValue, ConnectionError>;

    /// Closes the connection. Closing twice is a no-op.
    fn close(&mut self);
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), ConnectionError> {
        (**self).connect(host, port, timeout)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        (**self).send(bytes)
    }

    fn receive_reply(&mut self) -> Result<ReplyValue, ConnectionError> {
        (**self).receive_reply()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Errors raised by a [`Connection`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The server sent bytes that are not valid RESP
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// No connection has been established, or it was closed
    #[error("Not connected")]
    NotConnected,

    /// The server closed the connection
    #[error("Connection closed by server")]
    Closed,

    /// The configured read timeout elapsed before a reply arrived
    #[error("Timed out waiting for a reply")]
    Timeout,

    /// The host name did not resolve to any address
    #[error("Could not resolve {0}")]
    Unresolved(String),
}
