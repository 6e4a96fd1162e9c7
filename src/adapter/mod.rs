//! Byte-stream view over a framed connection.
//!
//! [`StreamAdapter`] wraps one [`FramedConnection`] and exposes `read`,
//! `write` and `close` with ordinary byte-stream semantics. Inbound messages
//! are concatenated transparently; every `write` call becomes exactly one
//! outbound message.
//!
//! The adapter keeps at most one open inbound cursor and one open outbound
//! cursor. A synchronous lock guards the slots holding the connection and
//! both cursors, and is only ever held to copy or swap those slots. All
//! awaiting happens after the lock is released; when a call comes back to
//! store or clear a cursor it re-checks the slot first, so a concurrent
//! `close` always wins and a stale cursor is never written back.

use std::{io, sync::Arc};

use tokio::sync::Mutex as CursorLock;
use tracing::{debug, trace};

use crate::{
    compat::AdapterIo,
    config::{AdapterConfig, EmptyWritePolicy},
    connection::{FramedConnection, MessageReader, MessageWriter},
    error::{Result, StreamError},
    metrics::{self, Direction},
    sync::{Mutex, lock},
};

/// A message cursor shared between the state slot and the call using it.
type Cursor<T> = Arc<CursorLock<T>>;

struct State<C: FramedConnection> {
    connection: Option<Arc<C>>,
    reader: Option<Cursor<C::Reader>>,
    writer: Option<Cursor<Outbound<C::Writer>>>,
}

/// Outbound message writer that is finalized at most once.
///
/// Both a `write` call and a racing `close` may try to finalize the same
/// message; only the first attempt reaches the connection.
struct Outbound<W> {
    writer: W,
    finished: bool,
}

impl<W: MessageWriter> Outbound<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            finished: false,
        }
    }

    async fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.finish().await
    }
}

/// Clear `slot` only if it still holds `cursor`.
fn clear_if_current<T>(slot: &mut Option<Cursor<T>>, cursor: &Cursor<T>) -> Option<Cursor<T>> {
    if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, cursor)) {
        slot.take()
    } else {
        None
    }
}

/// Concurrency-safe byte stream backed by a message-oriented connection.
///
/// All operations take `&self`; share the adapter between tasks with an
/// [`Arc`]. Once [`close`](Self::close) has taken ownership of the
/// connection every later call fails with [`StreamError::Closed`] without
/// touching the transport.
///
/// # Examples
///
/// ```no_run
/// use framestream::{FramedConnection, StreamAdapter};
///
/// async fn echo_once<C: FramedConnection>(conn: C) -> framestream::Result<()> {
///     let adapter = StreamAdapter::new(conn);
///     let mut buf = [0_u8; 64];
///     let n = adapter.read(&mut buf).await?;
///     adapter.write(&buf[..n]).await?;
///     adapter.close().await
/// }
/// ```
pub struct StreamAdapter<C: FramedConnection> {
    state: Mutex<State<C>>,
    config: AdapterConfig,
}

impl<C: FramedConnection> StreamAdapter<C> {
    /// Wrap an open connection using [`AdapterConfig::default`].
    #[must_use]
    pub fn new(connection: C) -> Self { Self::with_config(connection, AdapterConfig::default()) }

    /// Wrap an open connection with explicit options.
    #[must_use]
    pub fn with_config(connection: C, config: AdapterConfig) -> Self {
        Self {
            state: Mutex::new(State {
                connection: Some(Arc::new(connection)),
                reader: None,
                writer: None,
            }),
            config,
        }
    }

    /// Options this adapter was built with.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig { &self.config }

    /// Returns `true` once [`close`](Self::close) has taken the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool { lock(&self.state).connection.is_none() }

    /// Read bytes from the current inbound message into `buf`.
    ///
    /// Fills `buf` from the open message, waiting for a new message only when
    /// none is open. Returns early, with fewer bytes than requested, when the
    /// current message is exhausted; the next call continues with the next
    /// message. A message boundary reached before any byte was copied is
    /// skipped, so `Ok(0)` is only returned for an empty `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the adapter is closed, or
    /// [`StreamError::Transport`] carrying the bytes already copied if the
    /// connection fails.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let (connection, reader) = {
                let state = lock(&self.state);
                (state.connection.clone(), state.reader.clone())
            };
            let Some(connection) = connection else {
                return Err(StreamError::Closed);
            };
            if buf.is_empty() {
                return Ok(0);
            }

            let reader = match reader {
                Some(reader) => reader,
                None => self.open_reader(&connection).await?,
            };
            drop(connection);

            if let Some(filled) = self.drain(&reader, buf).await? {
                return Ok(filled);
            }
        }
    }

    /// Copy from `reader` into `buf` until it is full or the message ends.
    ///
    /// Returns `None` when the message ended before any byte was copied.
    async fn drain(&self, reader: &Cursor<C::Reader>, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut cursor = reader.lock().await;
        let mut filled = 0;
        let mut exhausted = false;
        while filled < buf.len() {
            match cursor.read(&mut buf[filled..]).await {
                Ok(0) => {
                    exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(source) => {
                    metrics::add_bytes(Direction::Inbound, filled);
                    return Err(StreamError::transport(filled, source));
                }
            }
        }
        drop(cursor);
        metrics::add_bytes(Direction::Inbound, filled);

        if exhausted {
            let released = clear_if_current(&mut lock(&self.state).reader, reader);
            if released.is_some() {
                metrics::inc_messages(Direction::Inbound);
                trace!(filled, "inbound message exhausted");
            }
            if filled == 0 {
                return Ok(None);
            }
        }
        Ok(Some(filled))
    }

    async fn open_reader(&self, connection: &C) -> Result<Cursor<C::Reader>> {
        let reader = connection
            .next_reader()
            .await
            .map_err(|source| StreamError::transport(0, source))?;
        let reader = Arc::new(CursorLock::new(reader));

        let mut state = lock(&self.state);
        if state.connection.is_none() {
            drop(state);
            debug!("discarding inbound message opened after close");
            return Err(StreamError::Closed);
        }
        let replaced = state.reader.replace(Arc::clone(&reader));
        drop(state);
        drop(replaced);
        trace!("inbound message opened");
        Ok(reader)
    }

    /// Write all of `buf` as one outbound message.
    ///
    /// Opens a message if none is open, writes the whole buffer and then
    /// finalizes the message before returning, so each call that completes
    /// emits exactly one message. A failed call still finalizes whatever was
    /// written. Zero-length writes follow [`AdapterConfig::empty_write`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the adapter is closed, or
    /// [`StreamError::Transport`] carrying the bytes already accepted if
    /// writing or finalizing fails. A write failure takes precedence over a
    /// finalize failure.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        loop {
            let (connection, writer) = {
                let state = lock(&self.state);
                (state.connection.clone(), state.writer.clone())
            };
            let Some(connection) = connection else {
                return Err(StreamError::Closed);
            };
            if buf.is_empty() && self.config.empty_write() == EmptyWritePolicy::Skip {
                return Ok(0);
            }

            let writer = match writer {
                Some(writer) => writer,
                None => self.open_writer(&connection).await?,
            };
            drop(connection);

            let mut message = writer.lock().await;
            if message.finished {
                drop(message);
                let released = clear_if_current(&mut lock(&self.state).writer, &writer);
                drop(released);
                continue;
            }
            let mut written = 0;
            let mut failure = None;
            while written < buf.len() {
                match message.writer.write(&buf[written..]).await {
                    Ok(0) => {
                        failure = Some(io::Error::from(io::ErrorKind::WriteZero));
                        break;
                    }
                    Ok(n) => written += n,
                    Err(source) => {
                        failure = Some(source);
                        break;
                    }
                }
            }
            let finished = message.finish().await;
            drop(message);

            let released = clear_if_current(&mut lock(&self.state).writer, &writer);
            drop(released);
            metrics::add_bytes(Direction::Outbound, written);

            return match (failure, finished) {
                (Some(source), _) | (None, Err(source)) => {
                    Err(StreamError::transport(written, source))
                }
                (None, Ok(())) => {
                    metrics::inc_messages(Direction::Outbound);
                    trace!(written, "outbound message finalized");
                    Ok(written)
                }
            };
        }
    }

    async fn open_writer(&self, connection: &C) -> Result<Cursor<Outbound<C::Writer>>> {
        let kind = self.config.message_kind();
        let writer = connection
            .next_writer(kind)
            .await
            .map_err(|source| StreamError::transport(0, source))?;
        let message = Outbound::new(writer);

        let stored = {
            let mut state = lock(&self.state);
            if state.connection.is_some() {
                let writer = Arc::new(CursorLock::new(message));
                let replaced = state.writer.replace(Arc::clone(&writer));
                Ok((writer, replaced))
            } else {
                Err(message)
            }
        };
        match stored {
            Ok((writer, replaced)) => {
                drop(replaced);
                trace!(%kind, "outbound message opened");
                Ok(writer)
            }
            Err(mut message) => {
                debug!(%kind, "discarding outbound message opened after close");
                let _ = message.finish().await;
                Err(StreamError::Closed)
            }
        }
    }

    /// Close the adapter and the underlying connection.
    ///
    /// Takes the connection and both cursors in one step, so every call
    /// racing with or following this one observes the adapter as closed. An
    /// open outbound message is finalized first, after any `write` still
    /// filling it; if finalizing fails its error is returned and the
    /// connection is released without an explicit close.
    /// Calling `close` again returns `Ok(())` without any I/O.
    ///
    /// Waiting for an in-flight `write` means `close` does not complete while
    /// the connection keeps that write stalled; the connection's own write
    /// deadline is what bounds it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if finalizing the open message or
    /// closing the connection fails.
    pub async fn close(&self) -> Result<()> {
        let (reader, writer, connection) = {
            let mut state = lock(&self.state);
            (
                state.reader.take(),
                state.writer.take(),
                state.connection.take(),
            )
        };
        drop(reader);

        if let Some(writer) = writer {
            writer
                .lock()
                .await
                .finish()
                .await
                .map_err(|source| StreamError::transport(0, source))?;
        }
        let Some(connection) = connection else {
            return Ok(());
        };
        connection
            .close()
            .await
            .map_err(|source| StreamError::transport(0, source))?;
        debug!("stream adapter closed");
        Ok(())
    }
}

impl<C: FramedConnection + 'static> StreamAdapter<C> {
    /// Convert into a tokio [`AsyncRead`](tokio::io::AsyncRead) +
    /// [`AsyncWrite`](tokio::io::AsyncWrite) stream.
    #[must_use]
    pub fn into_io(self) -> AdapterIo<C> { AdapterIo::new(Arc::new(self)) }
}

impl<C: FramedConnection> std::fmt::Debug for StreamAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("StreamAdapter")
            .field("closed", &state.connection.is_none())
            .field("reading", &state.reader.is_some())
            .field("writing", &state.writer.is_some())
            .field("config", &self.config)
            .finish()
    }
}
