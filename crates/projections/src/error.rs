use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("journal error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A journal entry did not decode as an order event.
    #[error("undecodable order event: {0}")]
    Deserialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
