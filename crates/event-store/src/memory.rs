use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{AppendOptions, EventStore, EventStream, validate_batch};
use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

#[derive(Default)]
struct Journal {
    /// Every event in append order.
    log: Vec<EventEnvelope>,
    /// Current version of each stream.
    heads: HashMap<AggregateId, Version>,
}

/// In-memory journal used by tests and the default server configuration.
///
/// The version check and the write happen under one write lock, which gives
/// the same conditional-append semantics as the unique constraint in the
/// PostgreSQL schema.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    journal: Arc<RwLock<Journal>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams.
    pub async fn event_count(&self) -> usize {
        self.journal.read().await.log.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let (aggregate_id, first_version) = validate_batch(&events)?;

        let mut journal = self.journal.write().await;
        let current = journal
            .heads
            .get(&aggregate_id)
            .copied()
            .unwrap_or_else(Version::initial);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        // Even unchecked appends may not rewrite history.
        if first_version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        let last = events.last().map_or(current, |e| e.version);
        journal.heads.insert(aggregate_id, last);
        journal.log.extend(events);

        Ok(last)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let journal = self.journal.read().await;
        // Appends are ordered per stream, so the log order is version order.
        Ok(journal
            .log
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        let events = self.journal.read().await.log.clone();
        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.journal.read().await.heads.get(&aggregate_id).copied())
    }
}
