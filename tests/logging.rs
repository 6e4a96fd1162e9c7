#![cfg(not(loom))]
//! Log output emitted by the adapter lifecycle.
//!
//! `tracing` events are forwarded to the `log` facade, where the shared
//! [`LoggerHandle`] captures them.

use framestream::StreamAdapter;
use framestream_testing::{LoggerHandle, Message, logger, memory_pair};
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn close_logs_at_debug(mut logger: LoggerHandle) {
    let (local, _peer) = memory_pair();
    let adapter = StreamAdapter::new(local);
    adapter.close().await.expect("close");

    assert!(logger.contains("stream adapter closed"), "close was not logged");
}

#[rstest]
#[tokio::test]
async fn repeated_close_logs_once(mut logger: LoggerHandle) {
    let (local, _peer) = memory_pair();
    let adapter = StreamAdapter::new(local);
    adapter.close().await.expect("first close");
    assert!(logger.contains("stream adapter closed"));

    adapter.close().await.expect("second close");
    assert!(!logger.contains("stream adapter closed"), "second close touched the connection");
}

#[rstest]
#[tokio::test]
async fn transport_failures_are_returned_not_logged(mut logger: LoggerHandle) {
    let (local, peer) = memory_pair();
    peer.send(Message::text("tail")).expect("send");
    drop(peer);
    let adapter = StreamAdapter::new(local);

    let mut buf = [0_u8; 8];
    assert_eq!(adapter.read(&mut buf).await.expect("read"), 4);
    let err = adapter.read(&mut buf).await.expect_err("peer gone");
    assert_eq!(err.transferred(), 0);

    while let Some(record) = logger.pop() {
        assert!(
            record.level() > log::Level::Warn,
            "unexpected {} record: {}",
            record.level(),
            record.args()
        );
    }
}
