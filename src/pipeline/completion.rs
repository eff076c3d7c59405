//! Completions
//!
//! Every queued command carries exactly one [`Completion`]. It is consumed
//! when fired, so it runs at most once, and the worker fires it exactly once
//! with either the reply or a [`CommandError`].
//!
//! Two flavours share that mechanism:
//! - a callback, run on the worker thread;
//! - a single-shot slot backing a [`ReplyFuture`].

use crate::connection::ConnectionError;
use crate::protocol::ReplyValue;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::error;

/// Why a command did not get a reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Sending the batch or reading its replies failed
    #[error("connection error: {0}")]
    Connection(String),

    /// The client was not connected when the command was submitted or flushed
    #[error("not connected")]
    Disconnected,

    /// The server's reply could not be parsed
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The command was still queued when the client shut down
    #[error("command discarded at shutdown")]
    ShutdownDiscarded,

    /// The command had no arguments
    #[error("invalid command: {0}")]
    InvalidCommand(&'static str),
}

impl From<&ConnectionError> for CommandError {
    fn from(error: &ConnectionError) -> Self {
        match error {
            ConnectionError::ParseError(e) => CommandError::Protocol(e.to_string()),
            ConnectionError::NotConnected => CommandError::Disconnected,
            other => CommandError::Connection(other.to_string()),
        }
    }
}

/// The outcome delivered to a completion.
pub type ReplyResult = Result<ReplyValue, CommandError>;

type Callback = Box<dyn FnOnce(ReplyResult) + Send + 'static>;

/// Something that is told, exactly once, how a command ended.
pub enum Completion {
    /// Runs arbitrary user code on the worker thread.
    Callback(Callback),
    /// Fulfils the slot read by a [`ReplyFuture`].
    Slot(oneshot::Sender<ReplyResult>),
}

impl Completion {
    /// Wraps a callback.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(ReplyResult) + Send + 'static,
    {
        Completion::Callback(Box::new(f))
    }

    /// Creates a slot completion together with the future that observes it.
    pub fn slot() -> (Self, ReplyFuture) {
        let (tx, rx) = oneshot::channel();
        (Completion::Slot(tx), ReplyFuture { rx })
    }

    /// Fires the completion.
    ///
    /// A panicking callback is contained here so it cannot take the worker
    /// thread down with it.
    pub fn complete(self, result: ReplyResult) {
        match self {
            Completion::Callback(f) => {
                if panic::catch_unwind(AssertUnwindSafe(|| f(result))).is_err() {
                    error!("Reply callback panicked");
                }
            }
            Completion::Slot(tx) => {
                // The caller may have dropped the future; nobody is waiting then.
                let _ = tx.send(result);
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Callback(_) => f.write_str("Completion::Callback"),
            Completion::Slot(_) => f.write_str("Completion::Slot"),
        }
    }
}

/// The pending reply of a command submitted with
/// [`Client::request`](crate::Client::request).
///
/// Await it from async code, or call [`ReplyFuture::wait`] from a plain
/// thread. If the completion is dropped without firing, the future resolves
/// to [`CommandError::ShutdownDiscarded`].
///
/// In manual-commit mode nothing is sent before a commit, so waiting on the
/// future before calling `commit` blocks forever.
#[derive(Debug)]
pub struct ReplyFuture {
    rx: oneshot::Receiver<ReplyResult>,
}

impl ReplyFuture {
    /// Blocks the current thread until the reply is known.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// use `.await` there instead.
    pub fn wait(self) -> ReplyResult {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(CommandError::ShutdownDiscarded))
    }

    /// Returns the result if it is already known, without blocking.
    pub fn try_take(&mut self) -> Option<ReplyResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(CommandError::ShutdownDiscarded)),
        }
    }
}

impl Future for ReplyFuture {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CommandError::ShutdownDiscarded)))
    }
}
