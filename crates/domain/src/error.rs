//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A command was rejected by the order aggregate.
    #[error("{0}")]
    Order(#[from] OrderError),

    #[error("{aggregate_type} {aggregate_id} not found")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// True when an append lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }
}
