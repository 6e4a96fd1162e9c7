//! Tokio I/O bridge for [`StreamAdapter`].
//!
//! `AdapterIo` drives the adapter's `async fn` operations from the poll-based
//! [`AsyncRead`] and [`AsyncWrite`] traits, so codecs and protocol stacks
//! written against tokio streams can run on top of a framed connection.
//! Each `poll_write` that completes maps to one adapter `write` and therefore
//! one outbound message; wrap the bridge in a `BufWriter` to coalesce small
//! writes.

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{adapter::StreamAdapter, connection::FramedConnection, error::StreamError};

/// Bytes produced by one adapter read, paired with its outcome.
type ReadOutcome = (Vec<u8>, Result<usize, StreamError>);

/// [`AsyncRead`] + [`AsyncWrite`] view of a shared [`StreamAdapter`].
///
/// A `poll_write` that returned `Pending` keeps its message in flight. Polling
/// again with the same bytes resumes it; polling with different bytes, or
/// flushing, lets it finish on its own and only its error is reported.
pub struct AdapterIo<C: FramedConnection + 'static> {
    adapter: Arc<StreamAdapter<C>>,
    read_future: Option<BoxFuture<'static, ReadOutcome>>,
    leftover: Vec<u8>,
    pos: usize,
    read_error: Option<io::Error>,
    write_future: Option<BoxFuture<'static, Result<usize, StreamError>>>,
    in_flight: Option<Arc<[u8]>>,
    write_error: Option<io::Error>,
    shutdown_future: Option<BoxFuture<'static, Result<(), StreamError>>>,
}

impl<C: FramedConnection + 'static> AdapterIo<C> {
    /// Bridge a shared adapter.
    #[must_use]
    pub fn new(adapter: Arc<StreamAdapter<C>>) -> Self {
        Self {
            adapter,
            read_future: None,
            leftover: Vec::new(),
            pos: 0,
            read_error: None,
            write_future: None,
            in_flight: None,
            write_error: None,
            shutdown_future: None,
        }
    }

    /// Shared handle to the wrapped adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<StreamAdapter<C>> { &self.adapter }

    fn drain_leftover(&mut self, buf: &mut ReadBuf<'_>) -> bool {
        if self.pos >= self.leftover.len() {
            return false;
        }
        let to_copy = (self.leftover.len() - self.pos).min(buf.remaining());
        buf.put_slice(&self.leftover[self.pos..self.pos + to_copy]);
        self.pos += to_copy;
        if self.pos == self.leftover.len() {
            self.leftover.clear();
            self.pos = 0;
        }
        true
    }

    /// Deliver `chunk[..filled]` to `buf`, keeping any overflow for later.
    fn deliver(&mut self, chunk: Vec<u8>, filled: usize, buf: &mut ReadBuf<'_>) {
        let to_copy = filled.min(buf.remaining());
        buf.put_slice(&chunk[..to_copy]);
        if to_copy < filled {
            self.leftover = chunk;
            self.leftover.truncate(filled);
            self.pos = to_copy;
        }
    }

    /// Drive the in-flight write to completion.
    ///
    /// A partial write reports its progress and keeps the error for the next
    /// call. Returns `None` when no write is in flight.
    fn poll_pending_write(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<usize>>> {
        let Some(future) = self.write_future.as_mut() else {
            return Poll::Ready(None);
        };
        let result = ready!(future.as_mut().poll(cx));
        self.write_future = None;
        self.in_flight = None;
        Poll::Ready(Some(match result {
            Ok(n) => Ok(n),
            Err(err) if err.transferred() > 0 => {
                let n = err.transferred();
                self.write_error = Some(err.into());
                Ok(n)
            }
            Err(err) => Err(err.into()),
        }))
    }

    /// Settle a write whose `poll_write` caller went away.
    ///
    /// Its byte count belongs to nobody and is dropped; a failure is kept
    /// for the next write or flush.
    fn poll_abandoned_write(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if let Some(Err(err)) = ready!(self.poll_pending_write(cx)) {
            self.write_error.get_or_insert(err);
        }
        Poll::Ready(())
    }
}

impl<C: FramedConnection + 'static> AsyncRead for AdapterIo<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.drain_leftover(buf) {
            return Poll::Ready(Ok(()));
        }
        if let Some(err) = this.read_error.take() {
            return Poll::Ready(Err(err));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let future = this.read_future.get_or_insert_with(|| {
            let adapter = Arc::clone(&this.adapter);
            let len = buf.remaining();
            Box::pin(async move {
                let mut chunk = vec![0_u8; len];
                let result = adapter.read(&mut chunk).await;
                (chunk, result)
            })
        });
        let (chunk, result) = match future.as_mut().poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };
        this.read_future = None;

        match result {
            Ok(filled) => {
                this.deliver(chunk, filled, buf);
                Poll::Ready(Ok(()))
            }
            Err(err) if err.transferred() > 0 => {
                let filled = err.transferred();
                this.read_error = Some(err.into());
                this.deliver(chunk, filled, buf);
                Poll::Ready(Ok(()))
            }
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }
}

impl<C: FramedConnection + 'static> AsyncWrite for AdapterIo<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        // A different buffer means the caller of the in-flight write is gone.
        if this.in_flight.as_deref().is_some_and(|data| data != buf) {
            ready!(this.poll_abandoned_write(cx));
        }
        if this.write_future.is_none() {
            if let Some(err) = this.write_error.take() {
                return Poll::Ready(Err(err));
            }
            let adapter = Arc::clone(&this.adapter);
            let data: Arc<[u8]> = Arc::from(buf);
            this.in_flight = Some(Arc::clone(&data));
            this.write_future = Some(Box::pin(async move { adapter.write(&data).await }));
        }
        match ready!(this.poll_pending_write(cx)) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Ready(Ok(0)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_abandoned_write(cx));
        match this.write_error.take() {
            Some(err) => Poll::Ready(Err(err)),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_abandoned_write(cx));

        let future = this.shutdown_future.get_or_insert_with(|| {
            let adapter = Arc::clone(&this.adapter);
            Box::pin(async move { adapter.close().await })
        });
        let result = match future.as_mut().poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };
        this.shutdown_future = None;
        Poll::Ready(result.map_err(io::Error::from))
    }
}
