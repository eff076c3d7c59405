//! Command Queue
//!
//! A multi-producer, single-consumer FIFO of commands waiting to be flushed.
//!
//! Producers call [`CommandQueue::push`] from any thread and never block
//! beyond a short critical section. The pipeline worker is the only consumer.
//! The queue length doubles as the counting signal for batch filling: it goes
//! up on every push and down by the batch size whenever the worker takes a
//! batch, and [`CommandQueue::wait_for_batch`] sleeps on a condition variable
//! until it reaches the threshold, the batch times out, a flush is requested
//! or the queue closes.
//!
//! The order in which pushes acquire the lock is the order the worker sees,
//! so the dequeue order is always a valid linearization of concurrent pushes.

use crate::pipeline::completion::{Completion, ReplyResult};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One command waiting for transmission.
#[derive(Debug)]
pub struct PendingCommand {
    /// The encoded command, ready for the wire
    payload: Bytes,
    /// Fired exactly once with the reply or failure
    completion: Completion,
    /// When the command entered the queue
    enqueued_at: Instant,
}

impl PendingCommand {
    pub fn new(payload: Bytes, completion: Completion) -> Self {
        Self {
            payload,
            completion,
            enqueued_at: Instant::now(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the command and fires its completion.
    pub fn complete(self, result: ReplyResult) {
        self.completion.complete(result);
    }
}

/// Why [`CommandQueue::wait_for_batch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// At least the requested number of commands is queued
    Filled,
    /// The oldest queued command has waited for the full batch timeout
    TimedOut,
    /// A flush was requested
    Flush,
    /// The queue was closed
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    commands: VecDeque<PendingCommand>,
    flush_requested: bool,
    closed: bool,
}

/// A blocking MPSC queue of [`PendingCommand`]s.
#[derive(Debug, Default)]
pub struct CommandQueue {
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    ///
    /// Hands the command back if the queue is closed.
    pub fn push(&self, command: PendingCommand) -> Result<(), PendingCommand> {
        let mut state = self.lock();
        if state.closed {
            return Err(command);
        }
        state.commands.push_back(command);
        drop(state);

        self.signal.notify_one();
        Ok(())
    }

    /// Pops the oldest command, blocking until one is available.
    ///
    /// `max_wait` of `None` waits indefinitely. Returns `None` on timeout or
    /// once the queue is closed.
    pub fn pop_blocking(&self, max_wait: Option<Duration>) -> Option<PendingCommand> {
        let deadline = max_wait.map(|wait| Instant::now() + wait);
        let mut state = self.lock();

        loop {
            if state.closed {
                return None;
            }
            if let Some(command) = Self::pop_locked(&mut state) {
                return Some(command);
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.wait_timeout(state, deadline - now)
                }
                None => self.wait(state),
            };
        }
    }

    /// Pops the oldest command if one is queued, without blocking.
    pub fn pop_available(&self) -> Option<PendingCommand> {
        Self::pop_locked(&mut self.lock())
    }

    /// Takes up to `max` queued commands in FIFO order.
    pub fn take_batch(&self, max: usize) -> Vec<PendingCommand> {
        std::iter::from_fn(|| self.pop_available()).take(max).collect()
    }

    /// Blocks until a batch may be formed.
    ///
    /// With a `threshold`, returns [`Wake::Filled`] once that many commands
    /// are queued and [`Wake::TimedOut`] once the oldest queued command is
    /// `timeout` old. Without a threshold only a flush request or closing the
    /// queue ends the wait. An empty queue never times out.
    pub fn wait_for_batch(&self, threshold: Option<usize>, timeout: Option<Duration>) -> Wake {
        let mut state = self.lock();

        loop {
            if state.closed {
                return Wake::Closed;
            }
            if state.flush_requested {
                return Wake::Flush;
            }
            let threshold = match threshold {
                Some(threshold) => threshold,
                None => {
                    state = self.wait(state);
                    continue;
                }
            };
            if state.commands.len() >= threshold {
                return Wake::Filled;
            }

            let oldest = state.commands.front().map(|c| c.enqueued_at);
            state = match (timeout, oldest) {
                (Some(timeout), Some(oldest)) => {
                    let deadline = oldest + timeout;
                    let now = Instant::now();
                    if now >= deadline {
                        return Wake::TimedOut;
                    }
                    self.wait_timeout(state, deadline - now)
                }
                _ => self.wait(state),
            };
        }
    }

    /// Asks the consumer to flush whatever is queued.
    ///
    /// The request stays pending until the queue has been drained.
    pub fn request_flush(&self) {
        self.lock().flush_requested = true;
        self.signal.notify_all();
    }

    /// Closes the queue and wakes the consumer.
    ///
    /// Further pushes are refused. Queued commands stay until [`drain`](Self::drain).
    pub fn close(&self) {
        self.lock().closed = true;
        self.signal.notify_all();
    }

    /// Accepts pushes again after [`close`](Self::close).
    ///
    /// A flush requested while the queue had no consumer stays pending.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Removes every queued command.
    pub fn drain(&self) -> Vec<PendingCommand> {
        let mut state = self.lock();
        state.flush_requested = false;
        state.commands.drain(..).collect()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn pop_locked(state: &mut QueueState) -> Option<PendingCommand> {
        let command = state.commands.pop_front();
        if state.commands.is_empty() {
            state.flush_requested = false;
        }
        command
    }

    // Completions never run under this lock, so a poisoned guard still
    // holds a consistent queue.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        self.signal
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, QueueState>,
        timeout: Duration,
    ) -> MutexGuard<'a, QueueState> {
        self.signal
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }
}
