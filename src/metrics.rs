//! Metric helpers for `framestream`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking complete messages per direction.
pub const MESSAGES_TOTAL: &str = "framestream_messages_total";
/// Name of the counter tracking payload bytes per direction.
pub const BYTES_TOTAL: &str = "framestream_bytes_total";

/// Direction of message flow relative to the adapter.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Messages drained from the connection.
    Inbound,
    /// Messages finalized onto the connection.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record one complete message for the given direction.
pub fn inc_messages(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record `count` payload bytes for the given direction.
pub fn add_bytes(direction: Direction, count: usize) {
    #[cfg(feature = "metrics")]
    counter!(BYTES_TOTAL, "direction" => direction.as_str()).increment(count as u64);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, count);
}
