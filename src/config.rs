//! Adapter configuration.
//!
//! [`AdapterConfig`] selects the kind of outbound message the adapter opens
//! and how a zero-length write is treated. It can be built in code through
//! the `with_*` methods or deserialized with `serde` from an embedding
//! application's own configuration file.

use serde::Deserialize;

use crate::connection::MessageKind;

/// Behaviour of [`StreamAdapter::write`](crate::StreamAdapter::write) when
/// called with an empty buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyWritePolicy {
    /// Return `Ok(0)` without touching the connection.
    #[default]
    Skip,
    /// Open and finalize a zero-length message.
    EmitMessage,
}

/// Options controlling a [`StreamAdapter`](crate::StreamAdapter).
///
/// # Examples
///
/// ```
/// use framestream::{AdapterConfig, EmptyWritePolicy, MessageKind};
///
/// let config = AdapterConfig::default()
///     .with_message_kind(MessageKind::Binary)
///     .with_empty_write(EmptyWritePolicy::EmitMessage);
/// assert_eq!(config.message_kind(), MessageKind::Binary);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    message_kind: MessageKind,
    empty_write: EmptyWritePolicy,
}

impl AdapterConfig {
    /// Set the kind of every outbound message.
    #[must_use]
    pub fn with_message_kind(mut self, kind: MessageKind) -> Self {
        self.message_kind = kind;
        self
    }

    /// Set the policy for zero-length writes.
    #[must_use]
    pub fn with_empty_write(mut self, policy: EmptyWritePolicy) -> Self {
        self.empty_write = policy;
        self
    }

    /// Kind of outbound message the adapter opens.
    #[must_use]
    pub fn message_kind(&self) -> MessageKind { self.message_kind }

    /// Policy applied to zero-length writes.
    #[must_use]
    pub fn empty_write(&self) -> EmptyWritePolicy { self.empty_write }
}
