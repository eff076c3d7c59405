//! The Client
//!
//! [`Client`] is shared freely between threads (`&Client` or `Arc<Client>`).
//! Submitting a command only encodes it and pushes it onto the queue, so
//! producers never wait on the network. Lifecycle calls (`connect`,
//! `disconnect`) start and stop the single worker thread that owns the
//! connection.
//!
//! ## Shutdown
//!
//! `disconnect` (and dropping the client) closes the queue, lets the worker
//! finish reading the batch it already sent, joins it, and then fails every
//! command still queued with [`CommandError::ShutdownDiscarded`]. Call
//! [`Client::commit`] and wait for the outstanding replies first if queued
//! commands must reach the server.

use crate::connection::{Connection, TcpConnection};
use crate::pipeline::{
    CommandError, CommandQueue, Completion, PendingCommand, PipelineConfig, PipelineStats,
    PipelineWorker, ReplyFuture, ReplyResult,
};
use crate::protocol::format_command;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// A running worker and its view of the link.
struct WorkerHandle {
    thread: JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

/// A pipelining RESP client.
///
/// # Example
///
/// ```no_run
/// use flashpipe::{Client, PipelineConfig};
/// use std::time::Duration;
///
/// let client = Client::new(PipelineConfig::batched(16, Duration::from_millis(5)));
/// assert!(client.connect("127.0.0.1", 6379, 1500));
///
/// client
///     .send(["SET", "foo", "bar"], |reply| println!("SET: {:?}", reply))
///     .send(["INCR", "counter"], |reply| println!("INCR: {:?}", reply))
///     .commit();
///
/// let pong = client.request(["PING"]);
/// client.commit();
/// println!("{}", pong.wait().unwrap());
/// ```
pub struct Client {
    config: PipelineConfig,
    read_timeout: Option<Duration>,
    queue: Arc<CommandQueue>,
    stats: Arc<PipelineStats>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Client {
    /// Creates a client that is not connected yet.
    ///
    /// Commands submitted before [`connect`](Self::connect) wait in the queue
    /// and are flushed once a worker is running.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            read_timeout: None,
            queue: Arc::new(CommandQueue::new()),
            stats: Arc::new(PipelineStats::new()),
            worker: Mutex::new(None),
        }
    }

    /// Creates a client running over an already established connection.
    pub fn with_connection<C>(config: PipelineConfig, conn: C) -> io::Result<Self>
    where
        C: Connection + 'static,
    {
        let client = Self::new(config);
        client.attach(conn)?;
        Ok(client)
    }

    /// Sets the read timeout used by [`connect`](Self::connect).
    ///
    /// Without one, a server that stops answering stalls every command behind
    /// the unanswered batch.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Connects over TCP and starts the worker.
    ///
    /// An existing connection is shut down first. Returns false if the
    /// connection could not be established.
    pub fn connect(&self, host: &str, port: u16, timeout_ms: u32) -> bool {
        let mut conn = TcpConnection::new();
        if let Some(timeout) = self.read_timeout {
            conn = conn.with_read_timeout(timeout);
        }

        if let Err(e) = conn.connect(host, port, Duration::from_millis(timeout_ms.into())) {
            warn!(host = host, port = port, error = %e, "Failed to connect");
            return false;
        }

        match self.attach(conn) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to start pipeline worker");
                false
            }
        }
    }

    /// Starts a worker over `conn`, replacing any running one.
    ///
    /// Must not be called from a reply callback.
    pub fn attach<C>(&self, conn: C) -> io::Result<()>
    where
        C: Connection + 'static,
    {
        let mut worker = self.lock_worker();
        if let Some(previous) = worker.take() {
            self.queue.close();
            self.join(previous);
            self.discard_queued();
        }
        self.queue.reopen();

        let connected = Arc::new(AtomicBool::new(conn.is_connected()));
        let thread = PipelineWorker::new(
            conn,
            Arc::clone(&self.queue),
            self.config,
            Arc::clone(&self.stats),
            Arc::clone(&connected),
        )
        .spawn()?;

        *worker = Some(WorkerHandle { thread, connected });
        Ok(())
    }

    /// Returns true while a worker is running over a live connection.
    pub fn is_connected(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .map(|worker| worker.connected.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Stops the worker and closes the connection.
    ///
    /// Queued commands fail with [`CommandError::ShutdownDiscarded`]; commands
    /// submitted afterwards fail with [`CommandError::Disconnected`] until the
    /// next connect. Must not be called from a reply callback.
    ///
    /// Waits for the replies of the batch already sent. Without a read
    /// timeout (see [`with_read_timeout`](Self::with_read_timeout)) a server
    /// that never answers makes this block forever.
    pub fn disconnect(&self) {
        let worker = self.lock_worker().take();
        self.queue.close();
        if let Some(worker) = worker {
            self.join(worker);
            info!("Disconnected");
        }
        self.discard_queued();
    }

    /// Submits a command; `callback` receives its reply.
    ///
    /// The callback normally runs on the worker thread. If the command is
    /// rejected up front (empty, or the client is disconnected) it runs on
    /// the calling thread before `send` returns.
    ///
    /// Returns `self` so calls can be chained. Chained calls reach the queue
    /// in call order; commands from other threads may interleave with them.
    pub fn send<I, A, F>(&self, command: I, callback: F) -> &Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
        F: FnOnce(ReplyResult) + Send + 'static,
    {
        self.submit(command, Completion::callback(callback));
        self
    }

    /// Submits a command and returns a future for its reply.
    pub fn request<I, A>(&self, command: I) -> ReplyFuture
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let (completion, future) = Completion::slot();
        self.submit(command, completion);
        future
    }

    /// Asks the worker to flush everything queued now.
    ///
    /// Does nothing in immediate mode, where nothing is ever held back.
    pub fn commit(&self) -> &Self {
        if !self.config.flushes_immediately() {
            trace!(queued = self.queue.len(), "Commit requested");
            self.queue.request_flush();
        }
        self
    }

    /// Number of commands queued and not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn submit<I, A>(&self, command: I, completion: Completion)
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let args: Vec<A> = command.into_iter().collect();
        if args.is_empty() {
            // An empty multi-bulk draws no reply and would shift every later one.
            completion.complete(Err(CommandError::InvalidCommand("empty command")));
            return;
        }

        let pending = PendingCommand::new(format_command(&args), completion);
        match self.queue.push(pending) {
            Ok(()) => self.stats.command_queued(),
            Err(rejected) => {
                debug!("Command submitted while disconnected");
                self.stats.commands_failed(1);
                rejected.complete(Err(CommandError::Disconnected));
            }
        }
    }

    fn join(&self, worker: WorkerHandle) {
        if worker.thread.join().is_err() {
            error!("Pipeline worker panicked");
        }
        worker.connected.store(false, Ordering::Release);
    }

    fn discard_queued(&self) {
        let discarded = self.queue.drain();
        if discarded.is_empty() {
            return;
        }

        warn!(commands = discarded.len(), "Discarding unsent commands");
        self.stats.commands_failed(discarded.len());
        for command in discarded {
            command.complete(Err(CommandError::ShutdownDiscarded));
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dropping the client disconnects it, with the same blocking caveat as
/// [`Client::disconnect`].
impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
