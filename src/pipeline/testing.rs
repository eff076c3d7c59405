//! A scripted in-memory connection for pipeline tests.
//!
//! Every transmitted batch is decoded and recorded, and each command in it
//! queues one canned reply:
//!
//! - `PING [msg]` → `+PONG` (or the bulk `msg`)
//! - `ECHO msg` → bulk `msg`
//! - `INCR key` → per-key counter
//! - `NESTED` → `[+OK, :7, nil]`
//! - `FAIL` → `-ERR injected`
//! - anything else → `+OK`

use crate::connection::{Connection, ConnectionError};
use crate::protocol::{ParseError, ReplyValue, RespParser};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct MockState {
    connected: bool,
    batches: Vec<Vec<Vec<String>>>,
    fail_next_send: bool,
    fail_receive_after: Option<usize>,
    garbage_next_receive: bool,
    reply_delay: Option<Duration>,
    counters: HashMap<String, i64>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MockState>,
    sent: Condvar,
}

/// The connection handed to the worker.
pub(crate) struct MockConnection {
    shared: Arc<Shared>,
    pending: VecDeque<ReplyValue>,
}

/// The test's view into a [`MockConnection`].
#[derive(Clone)]
pub(crate) struct MockHandle {
    shared: Arc<Shared>,
}

impl MockConnection {
    /// Creates a connected mock and its handle.
    pub(crate) fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Shared::default());
        shared.state.lock().unwrap().connected = true;
        let handle = MockHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                shared,
                pending: VecDeque::new(),
            },
            handle,
        )
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.state.lock().unwrap()
    }
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.state.lock().unwrap()
    }

    /// Every batch sent so far, as commands of arguments.
    pub(crate) fn batches(&self) -> Vec<Vec<Vec<String>>> {
        self.state().batches.clone()
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.state().batches.iter().map(Vec::len).collect()
    }

    /// Every command sent so far, in transmission order.
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.state().batches.iter().flatten().cloned().collect()
    }

    pub(crate) fn fail_next_send(&self) {
        self.state().fail_next_send = true;
    }

    /// Delivers `replies` replies, then fails the next read.
    pub(crate) fn fail_receive_after(&self, replies: usize) {
        self.state().fail_receive_after = Some(replies);
    }

    pub(crate) fn fail_receive_with_garbage(&self) {
        self.state().garbage_next_receive = true;
    }

    pub(crate) fn delay_replies(&self, delay: Duration) {
        self.state().reply_delay = Some(delay);
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Waits until at least `count` batches were sent.
    pub(crate) fn wait_for_batches(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.batches.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self.shared.sent.wait_timeout(state, deadline - now).unwrap().0;
        }
        true
    }
}

fn decode_batch(bytes: &[u8]) -> Vec<Vec<String>> {
    let mut parser = RespParser::new();
    let mut commands = Vec::new();
    let mut offset = 0;
    while let Some((value, consumed)) = parser.parse(&bytes[offset..]).unwrap() {
        offset += consumed;
        let args = value
            .into_array()
            .unwrap()
            .iter()
            .map(|arg| String::from_utf8_lossy(arg.as_bytes().unwrap()).into_owned())
            .collect();
        commands.push(args);
    }
    assert_eq!(offset, bytes.len(), "trailing bytes in batch");
    commands
}

fn reply_for(args: &[String], counters: &mut HashMap<String, i64>) -> ReplyValue {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    match args[0].to_ascii_uppercase().as_str() {
        "PING" if args.len() > 1 => ReplyValue::string(arg(1)),
        "PING" => ReplyValue::status("PONG"),
        "ECHO" => ReplyValue::string(arg(1)),
        "INCR" => {
            let counter = counters.entry(arg(1)).or_insert(0);
            *counter += 1;
            ReplyValue::Integer(*counter)
        }
        "NESTED" => ReplyValue::array(vec![
            ReplyValue::status("OK"),
            ReplyValue::integer(7),
            ReplyValue::nil(),
        ]),
        "FAIL" => ReplyValue::error("ERR injected"),
        _ => ReplyValue::status("OK"),
    }
}

impl Connection for MockConnection {
    fn connect(&mut self, _host: &str, _port: u16, _timeout: Duration) -> Result<(), ConnectionError> {
        self.state().connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let mut state = self.state();
        if !state.connected {
            return Err(ConnectionError::NotConnected);
        }
        if std::mem::take(&mut state.fail_next_send) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected send failure").into());
        }

        let batch = decode_batch(bytes);
        let replies: Vec<_> = batch
            .iter()
            .map(|args| reply_for(args, &mut state.counters))
            .collect();
        state.batches.push(batch);
        drop(state);

        self.pending.extend(replies);
        self.shared.sent.notify_all();
        Ok(())
    }

    fn receive_reply(&mut self) -> Result<ReplyValue, ConnectionError> {
        let delay = self.state().reply_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut state = self.state();
        if std::mem::take(&mut state.garbage_next_receive) {
            return Err(ParseError::UnknownPrefix(b'@').into());
        }
        match state.fail_receive_after {
            Some(0) => {
                state.fail_receive_after = None;
                return Err(ConnectionError::Closed);
            }
            Some(n) => state.fail_receive_after = Some(n - 1),
            None => {}
        }
        drop(state);

        self.pending.pop_front().ok_or(ConnectionError::Timeout)
    }

    fn close(&mut self) {
        self.state().connected = false;
        self.pending.clear();
    }
}
