#![doc(html_root_url = "https://docs.rs/framestream/latest")]
//! Public API for the `framestream` library.
//!
//! This crate turns a message-oriented, full-duplex connection (for example a
//! WebSocket) into a byte stream. [`StreamAdapter`] concatenates inbound
//! messages for readers and turns every write into one outbound message,
//! while remaining safe to share between concurrent tasks. [`AdapterIo`]
//! exposes the same adapter through tokio's `AsyncRead`/`AsyncWrite`.
//!
//! Establishing the framed connection is left to the caller, who supplies it
//! through the [`FramedConnection`] trait.

pub mod adapter;
pub mod compat;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
mod sync;
pub mod test_helpers;

pub use adapter::StreamAdapter;
pub use compat::AdapterIo;
pub use config::{AdapterConfig, EmptyWritePolicy};
pub use connection::{FramedConnection, MessageKind, MessageReader, MessageWriter};
pub use error::{Result, StreamError};
