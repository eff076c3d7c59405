//! Blocking TCP Connection
//!
//! The default [`Connection`]: a `std::net::TcpStream` plus a read buffer.
//! TCP is a stream protocol, so one read may carry half a reply or several
//! replies at once. Incoming bytes accumulate in a `BytesMut` buffer and
//! the parser is retried until a complete reply is available.
//!
//! ```text
//!  receive_reply()
//!        │
//!        ▼
//!  ┌─────────────────┐  complete  ┌──────────────────────┐
//!  │ Parse buffer    │──────────▶ │ Consume, return reply│
//!  └────────┬────────┘            └──────────────────────┘
//!           │ incomplete
//!           ▼
//!  ┌─────────────────┐
//!  │ Read from socket│──▶ (loop back)
//!  └─────────────────┘
//! ```
//!
//! Any I/O or protocol failure closes the stream: once a reply was lost or
//! garbled, later replies can no longer be matched to their commands.

use crate::connection::adapter::{Connection, ConnectionError};
use crate::protocol::{ReplyValue, RespParser};
use bytes::BytesMut;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// A blocking TCP connection to a RESP server.
#[derive(Debug)]
pub struct TcpConnection {
    /// The socket, present while connected
    stream: Option<TcpStream>,

    /// Server address (for logging)
    addr: Option<SocketAddr>,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// RESP parser
    parser: RespParser,

    /// Read timeout applied to the socket (None blocks forever)
    read_timeout: Option<Duration>,
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnection {
    /// Creates an unconnected adapter without a read timeout.
    pub fn new() -> Self {
        Self {
            stream: None,
            addr: None,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            read_timeout: None,
        }
    }

    /// Sets the read timeout applied once connected.
    ///
    /// Without one, a server that never answers stalls the pipeline worker.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Returns the address of the connected server.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Drops the socket after a failure, keeping the error for the caller.
    fn fail(&mut self, error: ConnectionError) -> ConnectionError {
        warn!(server = ?self.addr, error = %error, "Connection failed, closing");
        self.close();
        error
    }

    /// Attempts to parse a reply from the buffer.
    fn try_parse_reply(&mut self) -> Result<Option<ReplyValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed reply"
                );
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(buffered = self.buffer.len(), "Incomplete reply, need more data");
                Ok(None)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Reads more data from the socket into the buffer.
    fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(self.fail(ConnectionError::Timeout));
            }
            Err(e) => return Err(self.fail(e.into())),
        };

        if n == 0 {
            return Err(self.fail(ConnectionError::Closed));
        }

        self.buffer.extend_from_slice(&chunk[..n]);
        trace!(bytes = n, "Read data");
        Ok(())
    }
}

impl Connection for TcpConnection {
    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), ConnectionError> {
        self.close();

        let mut last_error = None;
        for addr in (host, port).to_socket_addrs()? {
            let attempt = if timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, timeout)
            };

            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(self.read_timeout)?;
                    info!(server = %addr, "Connected");
                    self.stream = Some(stream);
                    self.addr = Some(addr);
                    return Ok(());
                }
                Err(e) => {
                    debug!(server = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => ConnectionError::IoError(e),
            None => ConnectionError::Unresolved(format!("{}:{}", host, port)),
        })
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;

        let written = stream.write_all(bytes).and_then(|_| stream.flush());
        if let Err(e) = written {
            return Err(self.fail(e.into()));
        }

        trace!(bytes = bytes.len(), "Sent batch");
        Ok(())
    }

    fn receive_reply(&mut self) -> Result<ReplyValue, ConnectionError> {
        loop {
            if let Some(reply) = self.try_parse_reply()? {
                return Ok(reply);
            }
            self.read_more_data()?;
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!(server = ?self.addr, "Connection closed");
        }
        self.buffer.clear();
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Accepts one client, waits for `expect` request bytes, then writes
    /// `response` in two halves to exercise partial reads.
    fn one_shot_server(expect: usize, response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = vec![0u8; expect];
            stream.read_exact(&mut request).unwrap();

            let (head, tail) = response.split_at(response.len() / 2);
            stream.write_all(head).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(tail).unwrap();
        });

        addr
    }

    #[test]
    fn test_send_and_receive_pipelined_replies() {
        let request = b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nINCR\r\n$1\r\nc\r\n";
        let addr = one_shot_server(request.len(), b"+PONG\r\n:1\r\n*2\r\n$1\r\na\r\n$-1\r\n");

        let mut conn = TcpConnection::new();
        conn.connect("127.0.0.1", addr.port(), CONNECT_TIMEOUT).unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.peer_addr(), Some(addr));

        conn.send(request).unwrap();
        assert_eq!(conn.receive_reply().unwrap(), ReplyValue::status("PONG"));
        assert_eq!(conn.receive_reply().unwrap(), ReplyValue::Integer(1));
        assert_eq!(
            conn.receive_reply().unwrap(),
            ReplyValue::array(vec![ReplyValue::string("a"), ReplyValue::Nil])
        );
    }

    #[test]
    fn test_server_close_marks_disconnected() {
        let addr = one_shot_server(0, b"");

        let mut conn = TcpConnection::new();
        conn.connect("127.0.0.1", addr.port(), CONNECT_TIMEOUT).unwrap();

        let result = conn.receive_reply();
        assert!(matches!(result, Err(ConnectionError::Closed)));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(300));
            drop(stream);
        });

        let mut conn = TcpConnection::new().with_read_timeout(Duration::from_millis(50));
        conn.connect("127.0.0.1", addr.port(), CONNECT_TIMEOUT).unwrap();

        assert!(matches!(conn.receive_reply(), Err(ConnectionError::Timeout)));
        assert!(!conn.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_operations_before_connect() {
        let mut conn = TcpConnection::new();
        assert!(!conn.is_connected());
        assert!(matches!(conn.send(b"x"), Err(ConnectionError::NotConnected)));
        assert!(matches!(
            conn.receive_reply(),
            Err(ConnectionError::NotConnected)
        ));
        conn.close();
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut conn = TcpConnection::new();
        assert!(conn.connect("127.0.0.1", port, CONNECT_TIMEOUT).is_err());
        assert!(!conn.is_connected());
    }
}
