use thiserror::Error;

use crate::hub::ConnId;

/// A query or mutation against the relational or room store failed.
#[derive(Debug, Error)]
#[error("store operation `{op}` failed: {source}")]
pub struct StoreError {
    pub op: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl StoreError {
    pub fn new(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self {
            op,
            source: source.into(),
        }
    }
}

/// A malformed `sendMessage`. Logged, never answered.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing room id")]
    MissingRoom,
    #[error("missing sender id")]
    MissingSender,
    #[error("missing message type")]
    MissingType,
    #[error("message has neither content nor images")]
    EmptyBody,
}

/// A push to a connection that is gone.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnId),
    #[error("connection {0} is closed")]
    Closed(ConnId),
}

/// Why `sendMessage` produced no message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
