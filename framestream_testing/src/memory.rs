//! In-memory framed connection pair.
//!
//! [`memory_pair`] returns two connected [`MemoryConnection`]s. Every message
//! finalized on one end is delivered whole to the other, which makes the pair
//! a stand-in for a WebSocket without sockets or handshakes.

use std::{
    io,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use framestream::{FramedConnection, MessageKind, MessageReader, MessageWriter};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

/// A complete message travelling between the two ends of a pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Kind requested by the sender.
    pub kind: MessageKind,
    /// Complete payload.
    pub payload: Bytes,
}

impl Message {
    /// Build a text message.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: payload.into(),
        }
    }

    /// Build a binary message.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
        }
    }
}

/// One end of an in-memory framed connection.
pub struct MemoryConnection {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    closed: CancellationToken,
}

/// Create two connected ends.
///
/// Messages finalized on either end arrive, in order, on the other. Closing an
/// end fails its own pending and future calls; the peer sees
/// [`io::ErrorKind::UnexpectedEof`] once every message already sent has been
/// consumed.
#[must_use]
pub fn memory_pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (MemoryConnection::new(a_tx, a_rx), MemoryConnection::new(b_tx, b_rx))
}

fn not_connected() -> io::Error { io::Error::new(io::ErrorKind::NotConnected, "connection closed") }

impl MemoryConnection {
    fn new(tx: mpsc::UnboundedSender<Message>, rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
            closed: CancellationToken::new(),
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send a complete message to the peer without going through a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if either end has been closed.
    pub fn send(&self, message: Message) -> io::Result<()> {
        let tx = self.sender().ok_or_else(not_connected)?;
        tx.send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed connection"))
    }

    /// Wait for the next complete message from the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if this end was closed or the peer has gone away.
    pub async fn recv(&self) -> io::Result<Message> {
        if self.closed.is_cancelled() {
            return Err(not_connected());
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            message = rx.recv() => message.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed connection")
            }),
            () = self.closed.cancelled() => Err(not_connected()),
        }
    }

    /// Returns `true` once [`FramedConnection::close`] has run on this end.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.is_cancelled() }
}

/// Reader over one received [`Message`].
pub struct MemoryReader {
    payload: Bytes,
}

#[async_trait]
impl MessageReader for MemoryReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.payload.remaining());
        self.payload.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

/// Writer buffering one outbound [`Message`] until finished.
pub struct MemoryWriter {
    kind: MessageKind,
    payload: BytesMut,
    tx: Option<mpsc::UnboundedSender<Message>>,
}

#[async_trait]
impl MessageWriter for MemoryWriter {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.tx.is_none() {
            return Err(io::Error::other("message already finalized"));
        }
        self.payload.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn finish(&mut self) -> io::Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| io::Error::other("message already finalized"))?;
        let message = Message {
            kind: self.kind,
            payload: self.payload.split().freeze(),
        };
        tx.send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed connection"))
    }
}

#[async_trait]
impl FramedConnection for MemoryConnection {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    async fn next_reader(&self) -> io::Result<Self::Reader> {
        let message = self.recv().await?;
        Ok(MemoryReader {
            payload: message.payload,
        })
    }

    async fn next_writer(&self, kind: MessageKind) -> io::Result<Self::Writer> {
        let tx = self.sender().ok_or_else(not_connected)?;
        Ok(MemoryWriter {
            kind,
            payload: BytesMut::new(),
            tx: Some(tx),
        })
    }

    async fn close(&self) -> io::Result<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if tx.is_none() {
            return Err(not_connected());
        }
        self.closed.cancel();
        Ok(())
    }
}
