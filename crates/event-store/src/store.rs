use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Concurrency expectation attached to an append.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Version the stream must currently be at. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Append without a version check.
    pub fn any() -> Self {
        Self::default()
    }

    /// Append only if the stream is currently at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Append only if the stream does not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }

    /// Picks `expect_new` or `expect_version` from the version a writer loaded.
    pub fn after(loaded: Version) -> Self {
        if loaded == Version::initial() {
            Self::expect_new()
        } else {
            Self::expect_version(loaded)
        }
    }
}

/// A stream of journal entries.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Persistent, append-only storage for aggregate events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for a single aggregate.
    ///
    /// The batch is atomic. When `options.expected_version` is set and the
    /// stream has moved on, nothing is written and `ConcurrencyConflict` is
    /// returned. Returns the stream version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Returns every event of an aggregate in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams the whole journal in append order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Returns the current version of an aggregate, or `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Convenience methods available on every [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch is non-empty, targets one aggregate, and has
/// consecutive versions. Returns the aggregate id and the first version.
pub(crate) fn validate_batch(events: &[EventEnvelope]) -> Result<(AggregateId, Version)> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "a batch must target a single aggregate".to_string(),
            ));
        }
        expected = expected.next();
        if event.version != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {expected}, got {}",
                event.version
            )));
        }
    }

    Ok((first.aggregate_id, first.version))
}
