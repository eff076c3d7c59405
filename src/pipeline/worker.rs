//! Pipeline Worker
//!
//! The worker is the only thread that touches the connection, which is what
//! makes pipelining safe without a connection-level lock. It loops over three
//! phases until the queue is closed:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ 1. Fill                      │  wait for `capacity` commands, the batch
//! │                              │  timeout, or a commit
//! └──────────────┬───────────────┘
//!                ▼
//! ┌──────────────────────────────┐
//! │ 2. Send                      │  one write with every payload of the batch
//! └──────────────┬───────────────┘
//!                ▼
//! ┌──────────────────────────────┐
//! │ 3. Receive                   │  one reply per command, in order, each
//! │                              │  handed to that command's completion
//! └──────────────┬───────────────┘
//!                ▼
//!           [Loop back]
//! ```
//!
//! A batch is always fully answered (or fully failed) before the next one is
//! formed, so the n-th reply read is the reply to the n-th command sent.

use crate::connection::Connection;
use crate::pipeline::completion::CommandError;
use crate::pipeline::queue::{CommandQueue, PendingCommand, Wake};
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::PipelineConfig;
use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Drains a [`CommandQueue`] into a [`Connection`].
pub struct PipelineWorker<C: Connection> {
    conn: C,
    queue: Arc<CommandQueue>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    /// Mirrors `conn.is_connected()` for other threads
    connected: Arc<AtomicBool>,
}

impl<C: Connection + 'static> PipelineWorker<C> {
    pub fn new(
        conn: C,
        queue: Arc<CommandQueue>,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            conn,
            queue,
            config,
            stats,
            connected,
        }
    }

    /// Runs the worker on its own thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("flashpipe-worker".to_string())
            .spawn(move || self.run())
    }

    /// Runs until the queue is closed, then closes the connection.
    ///
    /// A batch already sent when the queue closes is still read to the end.
    pub fn run(mut self) {
        info!(
            capacity = self.config.capacity,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Pipeline worker started"
        );
        self.publish_link();

        while let Some(batch) = self.fill() {
            self.flush(batch);
        }

        self.conn.close();
        self.publish_link();
        info!("Pipeline worker stopped");
    }

    /// Waits for the next batch. Returns `None` once the queue is closed.
    fn fill(&mut self) -> Option<Vec<PendingCommand>> {
        match self.config.capacity {
            0 => match self.queue.wait_for_batch(None, None) {
                Wake::Closed => None,
                _ => Some(self.queue.take_batch(usize::MAX)),
            },
            1 => self.queue.pop_blocking(None).map(|command| vec![command]),
            capacity => match self
                .queue
                .wait_for_batch(Some(capacity), self.config.batch_timeout())
            {
                Wake::Closed => None,
                wake => {
                    trace!(?wake, queued = self.queue.len(), "Batch ready");
                    Some(self.queue.take_batch(capacity))
                }
            },
        }
    }

    /// Sends one batch and dispatches its replies.
    fn flush(&mut self, batch: Vec<PendingCommand>) {
        if batch.is_empty() {
            return;
        }

        if !self.conn.is_connected() {
            debug!(commands = batch.len(), "Not connected, failing batch");
            self.publish_link();
            self.fail_all(batch, CommandError::Disconnected);
            return;
        }

        let size: usize = batch.iter().map(|command| command.payload().len()).sum();
        let mut payload = BytesMut::with_capacity(size);
        for command in &batch {
            payload.extend_from_slice(command.payload());
        }

        if let Err(e) = self.conn.send(&payload) {
            warn!(error = %e, commands = batch.len(), "Failed to send batch");
            self.publish_link();
            self.fail_all(batch, CommandError::from(&e));
            return;
        }

        self.publish_link();
        self.stats.batch_sent(batch.len(), size);
        debug!(commands = batch.len(), bytes = size, "Flushed batch");

        let mut outstanding = batch.into_iter();
        while let Some(command) = outstanding.next() {
            match self.conn.receive_reply() {
                Ok(reply) => {
                    trace!(kind = ?reply.kind(), "Reply received");
                    self.stats.reply_received();
                    command.complete(Ok(reply));
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        unanswered = outstanding.len() + 1,
                        "Failed to read reply, dropping connection"
                    );
                    // Replies can no longer be matched to commands.
                    self.conn.close();
                    self.publish_link();
                    let error = CommandError::from(&e);
                    self.fail_all(std::iter::once(command).chain(outstanding), error);
                    break;
                }
            }
        }
    }

    fn fail_all(&self, commands: impl IntoIterator<Item = PendingCommand>, error: CommandError) {
        let commands: Vec<_> = commands.into_iter().collect();
        self.stats.commands_failed(commands.len());
        for command in commands {
            command.complete(Err(error.clone()));
        }
    }

    fn publish_link(&self) {
        self.connected
            .store(self.conn.is_connected(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::completion::{Completion, ReplyResult};
    use crate::pipeline::testing::MockConnection;
    use crate::protocol::{format_command, ReplyValue};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        queue: Arc<CommandQueue>,
        stats: Arc<PipelineStats>,
        connected: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    }

    impl Harness {
        fn start(conn: MockConnection, config: PipelineConfig) -> Self {
            let queue = Arc::new(CommandQueue::new());
            let stats = Arc::new(PipelineStats::new());
            let connected = Arc::new(AtomicBool::new(false));
            let thread = PipelineWorker::new(
                conn,
                Arc::clone(&queue),
                config,
                Arc::clone(&stats),
                Arc::clone(&connected),
            )
            .spawn()
            .unwrap();
            Self {
                queue,
                stats,
                connected,
                thread,
            }
        }

        fn push(&self, args: &[&str], tx: &mpsc::Sender<ReplyResult>) {
            let tx = tx.clone();
            let command = PendingCommand::new(
                format_command(args),
                Completion::callback(move |result| {
                    let _ = tx.send(result);
                }),
            );
            assert!(self.queue.push(command).is_ok());
        }

        fn stop(self) {
            self.queue.close();
            self.thread.join().unwrap();
        }
    }

    #[test]
    fn test_replies_follow_send_order() {
        let (conn, mock) = MockConnection::new();
        let harness = Harness::start(conn, PipelineConfig::batched(3, Duration::from_secs(10)));
        let (tx, rx) = mpsc::channel();

        harness.push(&["ECHO", "a"], &tx);
        harness.push(&["ECHO", "b"], &tx);
        harness.push(&["ECHO", "c"], &tx);

        let replies: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(
            replies,
            vec![
                Ok(ReplyValue::string("a")),
                Ok(ReplyValue::string("b")),
                Ok(ReplyValue::string("c")),
            ]
        );
        assert_eq!(mock.batch_sizes(), vec![3]);
        assert_eq!(harness.stats.replies_received.load(Ordering::Relaxed), 3);
        harness.stop();
    }

    #[test]
    fn test_receive_failure_fails_rest_of_batch_and_breaks_link() {
        let (conn, mock) = MockConnection::new();
        mock.fail_receive_after(1);
        let harness = Harness::start(conn, PipelineConfig::batched(3, Duration::from_secs(10)));
        let (tx, rx) = mpsc::channel();

        for _ in 0..3 {
            harness.push(&["PING"], &tx);
        }

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(ReplyValue::status("PONG")));
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            Err(CommandError::Connection(_))
        ));
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            Err(CommandError::Connection(_))
        ));
        let deadline = std::time::Instant::now() + WAIT;
        while harness.connected.load(Ordering::Acquire) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!harness.connected.load(Ordering::Acquire));

        // The broken link is not retried: later commands fail without a send.
        for _ in 0..3 {
            harness.push(&["PING"], &tx);
        }
        for _ in 0..3 {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), Err(CommandError::Disconnected));
        }
        assert_eq!(mock.batch_sizes(), vec![3]);
        assert_eq!(harness.stats.commands_failed.load(Ordering::Relaxed), 5);
        harness.stop();
    }

    #[test]
    fn test_protocol_error_maps_to_protocol_failure() {
        let (conn, mock) = MockConnection::new();
        mock.fail_receive_with_garbage();
        let harness = Harness::start(conn, PipelineConfig::immediate());
        let (tx, rx) = mpsc::channel();

        harness.push(&["PING"], &tx);
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            Err(CommandError::Protocol(_))
        ));
        harness.stop();
    }

    #[test]
    fn test_stop_drains_in_flight_batch() {
        let (conn, mock) = MockConnection::new();
        mock.delay_replies(Duration::from_millis(50));
        let harness = Harness::start(conn, PipelineConfig::immediate());
        let (tx, rx) = mpsc::channel();

        harness.push(&["PING"], &tx);
        assert!(mock.wait_for_batches(1, WAIT));
        harness.stop();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(ReplyValue::status("PONG")));
        assert!(!mock.is_connected());
    }
}
