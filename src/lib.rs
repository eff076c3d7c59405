//! # FlashPipe - A Pipelining RESP Client
//!
//! FlashPipe is a Redis-compatible client built around one idea: many threads
//! submit commands, one worker batches them into pipelines over a single
//! connection, and every reply finds its way back to the command that asked
//! for it, in submission order.
//!
//! ## Features
//!
//! - **Multi-Producer**: `Client` is `Sync`; any number of threads can submit
//! - **Adaptive Flushing**: batch by size, by timeout, or on explicit commit
//! - **Strict Ordering**: one reply per command, matched in transmission order
//! - **Two Completion Styles**: callbacks, or futures you can await or block on
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashPipe                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐              │
//! │  │   Client    │───>│  Command    │───>│ Pipeline Worker │              │
//! │  │ (any thread)│    │   Queue     │    │ (own thread)    │              │
//! │  └─────────────┘    └─────────────┘    └────────┬────────┘              │
//! │         ▲                                       │                       │
//! │         │ completion(reply)                     ▼                       │
//! │         │                              ┌─────────────────┐              │
//! │         └──────────────────────────────│   Connection    │──── TCP ────>│
//! │                                        │ (RESP parser)   │              │
//! │                                        └─────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashpipe::{Client, PipelineConfig};
//!
//! // Manual commit: nothing is sent until commit() is called.
//! let client = Client::new(PipelineConfig::manual());
//! assert!(client.connect("127.0.0.1", 6379, 1500));
//!
//! let pong = client.request(["PING"]);
//! client
//!     .send(["SET", "foo", "bar"], |reply| println!("SET: {:?}", reply))
//!     .send(["GET", "foo"], |reply| println!("GET: {:?}", reply))
//!     .commit();
//!
//! assert_eq!(pong.wait().unwrap().as_status(), Some("PONG"));
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: reply model, reply parser and command encoding
//! - [`connection`]: the connection boundary and its TCP implementation
//! - [`pipeline`]: command queue, completions and the pipeline worker
//! - [`client`]: the public client
//!
//! ## Failure Handling
//!
//! Transport and protocol failures never escape as panics or errors from
//! `send`; each affected command's completion receives a [`CommandError`]
//! instead. A failed batch does not affect later ones, and nothing is retried
//! automatically.

pub mod client;
pub mod connection;
pub mod pipeline;
pub mod protocol;

// Re-export commonly used types for convenience
pub use client::Client;
pub use connection::{Connection, ConnectionError, TcpConnection};
pub use pipeline::{CommandError, PipelineConfig, PipelineStats, ReplyFuture, ReplyResult};
pub use protocol::{format_command, parse_message, ParseError, ReplyKind, ReplyValue};

/// The default Redis port
pub const DEFAULT_PORT: u16 = 6379;

/// The default host to connect to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashPipe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
