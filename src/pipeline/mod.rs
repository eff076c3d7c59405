//! Pipelining Core
//!
//! Many producer threads push commands into one [`CommandQueue`]; a single
//! [`PipelineWorker`] drains it in batches over one connection and hands each
//! reply to the [`Completion`] of the command it answers.
//!
//! ## Architecture
//!
//! ```text
//!  producer ─┐
//!  producer ─┼─▶ CommandQueue ─▶ PipelineWorker ─▶ Connection
//!  producer ─┘    (Mutex +         (fill/send/        │
//!                  Condvar)         receive)          │
//!                                      ▲              │
//!                                      └── replies ───┘
//!                                      │
//!                                      ▼
//!                               Completion per command
//! ```
//!
//! ## Flush Policy
//!
//! | capacity | behaviour                                                    |
//! |----------|--------------------------------------------------------------|
//! | `0`      | manual: nothing is sent until `commit`, then everything     |
//! | `1`      | immediate: every command is its own transmission            |
//! | `N > 1`  | batched: up to `N` per transmission, flushed when full, when |
//! |          | the oldest command is `timeout` old, or on `commit`          |

pub mod completion;
pub mod queue;
pub mod stats;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use completion::{CommandError, Completion, ReplyFuture, ReplyResult};
pub use queue::{CommandQueue, PendingCommand, Wake};
pub use stats::PipelineStats;
pub use worker::PipelineWorker;

use std::time::Duration;

/// Configuration for the flush policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Commands per batch (0 = manual commit, 1 = no batching)
    pub capacity: usize,

    /// How long the oldest queued command may wait for its batch to fill.
    ///
    /// Zero waits indefinitely. With a batch that never fills and no commit,
    /// that stalls its commands forever, so a zero timeout is discouraged.
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::immediate()
    }
}

impl PipelineConfig {
    /// Nothing is sent until [`Client::commit`](crate::Client::commit).
    pub fn manual() -> Self {
        Self {
            capacity: 0,
            timeout: Duration::ZERO,
        }
    }

    /// Every command is sent as soon as the worker sees it.
    pub fn immediate() -> Self {
        Self {
            capacity: 1,
            timeout: Duration::ZERO,
        }
    }

    /// Batches of up to `capacity` commands.
    pub fn batched(capacity: usize, timeout: Duration) -> Self {
        Self { capacity, timeout }
    }

    pub fn is_manual(&self) -> bool {
        self.capacity == 0
    }

    /// True when commits have nothing to do.
    pub fn flushes_immediately(&self) -> bool {
        self.capacity == 1
    }

    /// The batch timeout, `None` meaning no timeout.
    pub fn batch_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
