//! Command Encoding
//!
//! Commands travel as RESP multi-bulk arrays: an argument count, then every
//! argument as a length-prefixed, binary-safe bulk string.
//!
//! ```text
//! SET foo bar  =>  *3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
//! ```
//!
//! A pipelined batch is the plain concatenation of encoded commands.

use crate::protocol::types::{prefix, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

/// Encodes a command into its multi-bulk wire form.
///
/// # Example
///
/// ```
/// use flashpipe::protocol::format_command;
///
/// let bytes = format_command(["GET", "name"]);
/// assert_eq!(&bytes[..], b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
/// ```
pub fn format_command<I, A>(args: I) -> Bytes
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let args: Vec<A> = args.into_iter().collect();
    let payload: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();

    let mut buf = BytesMut::with_capacity(16 + payload);
    put_header(&mut buf, prefix::ARRAY, args.len());
    for arg in &args {
        let arg = arg.as_ref();
        put_header(&mut buf, prefix::BULK_STRING, arg.len());
        buf.put_slice(arg);
        buf.put_slice(CRLF);
    }
    buf.freeze()
}

fn put_header(buf: &mut BytesMut, kind: u8, len: usize) {
    buf.put_u8(kind);
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(CRLF);
}
