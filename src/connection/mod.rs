//! Connection Module
//!
//! This module is the boundary between the pipeline and the wire.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Pipeline Worker                         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ send(batch) / receive_reply()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 dyn Connection                              │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Write batch │───>│ Read bytes  │───>│ Parse reply │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - `adapter`: the [`Connection`] trait and [`ConnectionError`]
//! - `tcp`: [`TcpConnection`], the blocking TCP implementation

pub mod adapter;
pub mod tcp;

// Re-export commonly used types
pub use adapter::{Connection, ConnectionError};
pub use tcp::TcpConnection;
