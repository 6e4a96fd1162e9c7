#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers for shared test utilities.
//!
//! [`ScriptedConnection`] is a deterministic [`FramedConnection`] that replays
//! a fixed list of inbound messages and records every outbound message and
//! teardown call in a shared [`ScriptLog`].

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio::sync::Notify;

use crate::connection::{FramedConnection, MessageKind, MessageReader, MessageWriter};

/// Outbound message captured by a [`ScriptedConnection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    /// Kind requested by the adapter.
    pub kind: MessageKind,
    /// Payload at the time the message was finalized.
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LogInner {
    sent: Vec<SentMessage>,
    writers_opened: usize,
    readers_opened: usize,
    finishes: usize,
    connection_closes: usize,
}

/// Shared record of what a [`ScriptedConnection`] observed.
#[derive(Clone, Debug, Default)]
pub struct ScriptLog(Arc<Mutex<LogInner>>);

impl ScriptLog {
    fn with<T>(&self, f: impl FnOnce(&mut LogInner) -> T) -> T {
        let mut inner = self.0.lock().expect("script log poisoned");
        f(&mut inner)
    }

    /// Payloads of all finalized outbound messages, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.with(|log| log.sent.iter().map(|m| m.payload.clone()).collect())
    }

    /// All finalized outbound messages with their kinds.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<SentMessage> { self.with(|log| log.sent.clone()) }

    /// Number of outbound messages opened.
    #[must_use]
    pub fn writers_opened(&self) -> usize { self.with(|log| log.writers_opened) }

    /// Number of inbound messages handed out.
    #[must_use]
    pub fn readers_opened(&self) -> usize { self.with(|log| log.readers_opened) }

    /// Number of `finish` calls across all writers, successful or not.
    #[must_use]
    pub fn finishes(&self) -> usize { self.with(|log| log.finishes) }

    /// Number of times the connection's `close` was invoked.
    #[must_use]
    pub fn connection_closes(&self) -> usize { self.with(|log| log.connection_closes) }
}

type Inbound = Result<Bytes, io::ErrorKind>;

#[derive(Default)]
struct Script {
    inbound: Mutex<VecDeque<Inbound>>,
    read_chunk: Option<usize>,
    write_chunk: Option<usize>,
    write_limit: Option<usize>,
    fail_next_writer: bool,
    fail_finish: bool,
    fail_close: bool,
    reader_gate: Option<Arc<Notify>>,
    writer_gate: Option<Arc<Notify>>,
    write_gate: Option<Arc<Notify>>,
    closed: Mutex<bool>,
}

/// Deterministic framed connection for unit and integration tests.
///
/// Inbound messages are replayed in the order they were added; once the
/// script is exhausted `next_reader` fails with
/// [`io::ErrorKind::ConnectionAborted`].
#[derive(Default)]
pub struct ScriptedConnection {
    script: Script,
    log: ScriptLog,
}

impl ScriptedConnection {
    /// Create a connection with no scripted traffic.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Queue inbound messages.
    #[must_use]
    pub fn with_inbound<I, M>(self, messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        {
            let mut inbound = self.script.inbound.lock().expect("script poisoned");
            inbound.extend(
                messages
                    .into_iter()
                    .map(|m| Ok(Bytes::copy_from_slice(m.as_ref()))),
            );
        }
        self
    }

    /// Queue a failure returned by `next_reader`.
    #[must_use]
    pub fn with_inbound_error(self, kind: io::ErrorKind) -> Self {
        self.script
            .inbound
            .lock()
            .expect("script poisoned")
            .push_back(Err(kind));
        self
    }

    /// Limit each message read to at most `chunk` bytes.
    #[must_use]
    pub fn with_read_chunk(mut self, chunk: usize) -> Self {
        self.script.read_chunk = Some(chunk);
        self
    }

    /// Limit each message write to at most `chunk` bytes.
    #[must_use]
    pub fn with_write_chunk(mut self, chunk: usize) -> Self {
        self.script.write_chunk = Some(chunk);
        self
    }

    /// Accept at most `limit` bytes per outbound message, then report `Ok(0)`.
    #[must_use]
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.script.write_limit = Some(limit);
        self
    }

    /// Make every `next_writer` call fail.
    #[must_use]
    pub fn failing_next_writer(mut self) -> Self {
        self.script.fail_next_writer = true;
        self
    }

    /// Make every `finish` call fail after recording the attempt.
    #[must_use]
    pub fn failing_finish(mut self) -> Self {
        self.script.fail_finish = true;
        self
    }

    /// Make the connection's `close` fail after recording the attempt.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.script.fail_close = true;
        self
    }

    /// Hold each inbound message, once dequeued, until `gate` is notified.
    #[must_use]
    pub fn with_reader_gate(mut self, gate: Arc<Notify>) -> Self {
        self.script.reader_gate = Some(gate);
        self
    }

    /// Hold each outbound message, once opened, until `gate` is notified.
    #[must_use]
    pub fn with_writer_gate(mut self, gate: Arc<Notify>) -> Self {
        self.script.writer_gate = Some(gate);
        self
    }

    /// Hold each message write call until `gate` is notified.
    #[must_use]
    pub fn with_write_gate(mut self, gate: Arc<Notify>) -> Self {
        self.script.write_gate = Some(gate);
        self
    }

    /// Shared log of observed traffic.
    #[must_use]
    pub fn log(&self) -> ScriptLog { self.log.clone() }

    fn is_closed(&self) -> bool { *self.script.closed.lock().expect("script poisoned") }
}

fn not_connected() -> io::Error { io::Error::new(io::ErrorKind::NotConnected, "connection closed") }

/// Inbound message replayed by [`ScriptedConnection`].
pub struct ScriptedReader {
    payload: Bytes,
    chunk: Option<usize>,
}

#[async_trait]
impl MessageReader for ScriptedReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = self.chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(self.payload.remaining()).min(limit);
        self.payload.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

/// Outbound message recorded by [`ScriptedConnection`].
pub struct ScriptedWriter {
    kind: MessageKind,
    payload: Vec<u8>,
    chunk: Option<usize>,
    limit: Option<usize>,
    fail_finish: bool,
    write_gate: Option<Arc<Notify>>,
    finished: bool,
    log: ScriptLog,
}

#[async_trait]
impl MessageWriter for ScriptedWriter {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(gate) = &self.write_gate {
            gate.notified().await;
        }
        if self.finished {
            return Err(io::Error::other("message already finalized"));
        }
        let room = self
            .limit
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.payload.len()));
        let n = buf.len().min(room).min(self.chunk.unwrap_or(usize::MAX));
        self.payload.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.log.with(|log| log.finishes += 1);
        if self.finished {
            return Err(io::Error::other("message already finalized"));
        }
        self.finished = true;
        if self.fail_finish {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "finish failed"));
        }
        let message = SentMessage {
            kind: self.kind,
            payload: std::mem::take(&mut self.payload),
        };
        self.log.with(|log| log.sent.push(message));
        Ok(())
    }
}

#[async_trait]
impl FramedConnection for ScriptedConnection {
    type Reader = ScriptedReader;
    type Writer = ScriptedWriter;

    async fn next_reader(&self) -> io::Result<Self::Reader> {
        if self.is_closed() {
            return Err(not_connected());
        }
        let next = self
            .script
            .inbound
            .lock()
            .expect("script poisoned")
            .pop_front();
        if let Some(gate) = &self.script.reader_gate {
            gate.notified().await;
        }
        match next {
            Some(Ok(payload)) => {
                self.log.with(|log| log.readers_opened += 1);
                Ok(ScriptedReader {
                    payload,
                    chunk: self.script.read_chunk,
                })
            }
            Some(Err(kind)) => Err(io::Error::new(kind, "scripted inbound failure")),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "inbound script exhausted",
            )),
        }
    }

    async fn next_writer(&self, kind: MessageKind) -> io::Result<Self::Writer> {
        if self.is_closed() {
            return Err(not_connected());
        }
        if self.script.fail_next_writer {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "scripted writer failure",
            ));
        }
        self.log.with(|log| log.writers_opened += 1);
        if let Some(gate) = &self.script.writer_gate {
            gate.notified().await;
        }
        Ok(ScriptedWriter {
            kind,
            payload: Vec::new(),
            chunk: self.script.write_chunk,
            limit: self.script.write_limit,
            fail_finish: self.script.fail_finish,
            write_gate: self.script.write_gate.clone(),
            finished: false,
            log: self.log.clone(),
        })
    }

    async fn close(&self) -> io::Result<()> {
        self.log.with(|log| log.connection_closes += 1);
        *self.script.closed.lock().expect("script poisoned") = true;
        if self.script.fail_close {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "close failed"));
        }
        Ok(())
    }
}
