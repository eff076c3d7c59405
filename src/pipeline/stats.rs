//! Pipeline counters, shared between the client and its worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for one client's pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Commands accepted into the queue
    pub commands_queued: AtomicU64,
    /// Commands transmitted to the server
    pub commands_sent: AtomicU64,
    /// Commands whose completion fired with an error
    pub commands_failed: AtomicU64,
    /// Batches transmitted (one write each)
    pub batches_sent: AtomicU64,
    /// Replies delivered to completions
    pub replies_received: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_queued(&self) {
        self.commands_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_sent(&self, commands: usize, bytes: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.commands_sent
            .fetch_add(commands as u64, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn reply_received(&self) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commands_failed(&self, count: usize) {
        self.commands_failed
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}
