//! Client Module
//!
//! The public entry point. A [`Client`] formats commands, queues them for
//! its pipeline worker and offers two ways to learn the outcome:
//!
//! - [`Client::send`] takes a callback and returns the client for chaining;
//! - [`Client::request`] returns a [`ReplyFuture`](crate::ReplyFuture).
//!
//! Both go through the same completion mechanism, so they can be mixed
//! freely on one client.

pub mod facade;

pub use facade::Client;
