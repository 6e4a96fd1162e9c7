//! Framed connection seam consumed by [`StreamAdapter`](crate::StreamAdapter).
//!
//! A framed connection moves whole messages rather than bytes. Each inbound
//! message is exposed as a [`MessageReader`] that is drained until it signals
//! end-of-message, and each outbound message is built through a
//! [`MessageWriter`] that must be explicitly finished to put the message on
//! the wire. Establishing the connection (handshake, TLS, upgrade) is the
//! implementor's concern; the adapter only ever sees an open handle.

use std::io;

use async_trait::async_trait;
use serde::Deserialize;

/// Kind of outbound message requested from a [`FramedConnection`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// UTF-8 text message.
    #[default]
    Text,
    /// Opaque binary message.
    Binary,
}

impl MessageKind {
    /// Stable lowercase name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Binary => "binary",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Sequential source of the bytes of one inbound message.
#[async_trait]
pub trait MessageReader: Send {
    /// Read up to `buf.len()` bytes of the current message.
    ///
    /// Returning `Ok(0)` for a non-empty `buf` signals that the message is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns any transport failure raised while receiving the message.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Sequential sink for the bytes of one outbound message.
#[async_trait]
pub trait MessageWriter: Send {
    /// Append bytes to the message, returning how many were accepted.
    ///
    /// # Errors
    ///
    /// Returns any transport failure raised while buffering or sending.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Finalize the message, emitting it as one unit on the transport.
    ///
    /// Writes after a successful `finish` are expected to fail.
    ///
    /// # Errors
    ///
    /// Returns any transport failure raised while flushing the message.
    async fn finish(&mut self) -> io::Result<()>;
}

/// An established, full-duplex, message-oriented connection.
///
/// Implementations must tolerate one `next_reader` call running concurrently
/// with one `next_writer` call, and `close` running concurrently with either.
#[async_trait]
pub trait FramedConnection: Send + Sync {
    /// Cursor over one inbound message.
    type Reader: MessageReader;
    /// Builder for one outbound message.
    type Writer: MessageWriter;

    /// Wait for the next inbound message.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection is closed or the transport fails.
    async fn next_reader(&self) -> io::Result<Self::Reader>;

    /// Open a new outbound message of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection is closed or the transport fails.
    async fn next_writer(&self, kind: MessageKind) -> io::Result<Self::Writer>;

    /// Release the underlying transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to shut down cleanly.
    async fn close(&self) -> io::Result<()>;
}
