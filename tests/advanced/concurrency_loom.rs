#![cfg(all(feature = "advanced-tests", loom))]
//! Concurrency tests for adapter shutdown using loom.
//!
//! A `close` racing with `read`, `write` or another `close` must leave the
//! connection closed exactly once and never finalize a message twice. `loom`
//! explores the interleavings of the adapter's state lock.

use std::io;

use async_trait::async_trait;
use framestream::{
    FramedConnection, MessageKind, MessageReader, MessageWriter, StreamAdapter, StreamError,
};
use loom::{
    future::block_on,
    model,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

#[derive(Clone, Default)]
struct Counters {
    closes: Arc<AtomicUsize>,
    finishes: Arc<AtomicUsize>,
}

struct CountingConnection {
    counters: Counters,
}

struct ByteReader;

#[async_trait]
impl MessageReader for ByteReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buf[0] = b'x';
        Ok(1)
    }
}

struct CountingWriter {
    finishes: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageWriter for CountingWriter {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> { Ok(buf.len()) }

    async fn finish(&mut self) -> io::Result<()> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FramedConnection for CountingConnection {
    type Reader = ByteReader;
    type Writer = CountingWriter;

    async fn next_reader(&self) -> io::Result<Self::Reader> { Ok(ByteReader) }

    async fn next_writer(&self, _kind: MessageKind) -> io::Result<Self::Writer> {
        Ok(CountingWriter {
            finishes: Arc::clone(&self.counters.finishes),
        })
    }

    async fn close(&self) -> io::Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn adapter() -> (Arc<StreamAdapter<CountingConnection>>, Counters) {
    let counters = Counters::default();
    let conn = CountingConnection {
        counters: counters.clone(),
    };
    (Arc::new(StreamAdapter::new(conn)), counters)
}

#[test]
fn concurrent_closes_close_connection_once() {
    model(|| {
        let (adapter, counters) = adapter();
        let other = Arc::clone(&adapter);

        let t = thread::spawn(move || block_on(other.close()));
        block_on(adapter.close()).expect("close should succeed");
        t.join()
            .expect("close thread panicked")
            .expect("concurrent close should succeed");

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert!(adapter.is_closed());
    });
}

#[test]
fn write_racing_close_finalizes_at_most_once() {
    model(|| {
        let (adapter, counters) = adapter();
        let writer = Arc::clone(&adapter);

        let t = thread::spawn(move || block_on(writer.write(b"x")));
        block_on(adapter.close()).expect("close should succeed");
        let result = t.join().expect("write thread panicked");

        let finishes = counters.finishes.load(Ordering::SeqCst);
        match result {
            Ok(n) => {
                assert_eq!(n, 1);
                assert_eq!(finishes, 1);
            }
            Err(StreamError::Closed) => assert!(finishes <= 1),
            Err(err) => panic!("unexpected write error: {err}"),
        }
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn read_racing_close_either_completes_or_sees_closed() {
    model(|| {
        let (adapter, counters) = adapter();
        let reader = Arc::clone(&adapter);

        let t = thread::spawn(move || {
            let mut buf = [0_u8; 1];
            block_on(reader.read(&mut buf)).map(|n| (n, buf[0]))
        });
        block_on(adapter.close()).expect("close should succeed");

        match t.join().expect("read thread panicked") {
            Ok((n, byte)) => assert_eq!((n, byte), (1, b'x')),
            Err(err) => assert!(err.is_closed(), "unexpected read error: {err}"),
        }
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

        let mut buf = [0_u8; 1];
        assert!(matches!(
            block_on(adapter.read(&mut buf)),
            Err(StreamError::Closed)
        ));
    });
}
