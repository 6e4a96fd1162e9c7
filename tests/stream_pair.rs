#![cfg(not(loom))]
//! End-to-end behaviour of two adapters joined by an in-memory framed
//! connection.
//!
//! The properties checked here are the two halves of the bridge: reads
//! de-frame transparently whatever the caller's buffer size, and every
//! completed write produces exactly one message on the wire.

use std::sync::Arc;

use framestream::{AdapterConfig, FramedConnection, MessageKind, StreamAdapter, StreamError};
use framestream_testing::{MemoryConnection, Message, memory_pair};
use proptest::{
    collection::vec,
    prelude::{Strategy, any},
    prop_assert_eq,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner},
};
use rstest::rstest;

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}

fn messages_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    vec(vec(any::<u8>(), 0..48), 0..12)
}

/// Read until the peer goes away, collecting every byte.
async fn drain(adapter: &StreamAdapter<MemoryConnection>, buf_len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0_u8; buf_len];
    loop {
        match adapter.read(&mut buf).await {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(err) => {
                assert!(!err.is_closed(), "reader closed unexpectedly");
                out.extend_from_slice(&buf[..err.transferred()]);
                return out;
            }
        }
    }
}

#[rstest]
#[case(1, 96)]
#[case(3, 96)]
#[case(16, 64)]
#[case(256, 32)]
fn reads_concatenate_any_message_sequence(#[case] buf_len: usize, #[case] cases: u32) {
    let mut runner = deterministic_runner(cases);
    let rt = runtime();

    runner
        .run(&messages_strategy(), |messages| {
            let received = rt.block_on(async {
                let (peer, local) = memory_pair();
                for message in &messages {
                    peer.send(Message::binary(message.clone()))
                        .expect("peer send");
                }
                peer.close().await.expect("peer close");

                let adapter = StreamAdapter::new(local);
                drain(&adapter, buf_len).await
            });
            prop_assert_eq!(received, messages.concat());
            Ok(())
        })
        .expect("reads should de-frame transparently");
}

#[test]
fn each_write_becomes_exactly_one_message() {
    let mut runner = deterministic_runner(128);
    let rt = runtime();
    let strategy = vec(vec(any::<u8>(), 1..64), 0..10);

    runner
        .run(&strategy, |writes| {
            let sent = rt.block_on(async {
                let (local, peer) = memory_pair();
                let adapter = StreamAdapter::new(local);
                for payload in &writes {
                    let n = adapter.write(payload).await.expect("write");
                    assert_eq!(n, payload.len());
                }
                adapter.close().await.expect("close");

                let mut sent = Vec::new();
                while let Ok(message) = peer.recv().await {
                    assert_eq!(message.kind, MessageKind::Text);
                    sent.push(message.payload.to_vec());
                }
                sent
            });
            prop_assert_eq!(sent, writes);
            Ok(())
        })
        .expect("writes should map one-to-one onto messages");
}

#[tokio::test]
async fn adapters_exchange_bytes_in_both_directions() {
    let (a, b) = memory_pair();
    let config = AdapterConfig::default().with_message_kind(MessageKind::Binary);
    let client = StreamAdapter::with_config(a, config);
    let server = StreamAdapter::new(b);

    client.write(b"ping").await.expect("client write");
    let mut buf = [0_u8; 16];
    let n = server.read(&mut buf).await.expect("server read");
    assert_eq!(&buf[..n], b"ping");

    server.write(b"pong").await.expect("server write");
    let n = client.read(&mut buf).await.expect("client read");
    assert_eq!(&buf[..n], b"pong");
}

#[tokio::test]
async fn close_unblocks_pending_read() {
    let (local, _peer) = memory_pair();
    let adapter = Arc::new(StreamAdapter::new(local));

    let reader = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move {
            let mut buf = [0_u8; 8];
            adapter.read(&mut buf).await
        }
    });
    tokio::task::yield_now().await;
    adapter.close().await.expect("close");

    // The blocked call fails through the connection; later calls fail fast.
    let result = reader.await.expect("reader task");
    assert!(result.is_err());
    let mut buf = [0_u8; 8];
    assert!(matches!(
        adapter.read(&mut buf).await,
        Err(StreamError::Closed)
    ));
}

#[tokio::test]
async fn concurrent_writers_each_emit_whole_messages() {
    let (local, peer) = memory_pair();
    let adapter = Arc::new(StreamAdapter::new(local));

    let tasks: Vec<_> = (0_u8..8)
        .map(|id| {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move {
                let payload = vec![id; 32];
                adapter.write(&payload).await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.expect("writer task").expect("write"), 32);
    }
    adapter.close().await.expect("close");

    let mut seen = Vec::new();
    while let Ok(message) = peer.recv().await {
        let first = message.payload[0];
        assert!(message.payload.iter().all(|&b| b == first), "message mixed writers");
        assert_eq!(message.payload.len(), 32);
        seen.push(first);
    }
    seen.sort_unstable();
    assert_eq!(seen, (0_u8..8).collect::<Vec<_>>());
}
