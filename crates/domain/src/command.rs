//! Load → decide → conditional append.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use serde::Serialize;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Attempts made by [`CommandHandler::execute_with_retry`] before a
/// concurrency conflict is surfaced.
const MAX_ATTEMPTS: usize = 5;

#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// Events produced and persisted by this command. Empty when the command
    /// was a no-op.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

/// An intention to change one aggregate.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Executes commands against event-sourced aggregates.
///
/// Every append names the version the decision was made against, so two
/// writers deciding from the same state cannot both succeed.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays an aggregate. Unknown ids yield a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Loads the aggregate, runs `command_fn` against it and appends the
    /// resulting events conditioned on the loaded version.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = self.build_envelopes(aggregate_id, current_version, &events)?;
        let new_version = self
            .store
            .append(envelopes, AppendOptions::after(current_version))
            .await?;

        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Like [`execute`](Self::execute), but re-loads and re-decides when the
    /// append loses a concurrency race. The command is evaluated against the
    /// winner's state, so idempotent commands converge to a no-op.
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempt = 1;
        loop {
            match self.execute(aggregate_id, &command_fn).await {
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(%aggregate_id, attempt, "append conflict, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn build_envelopes(
        &self,
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError>
    where
        A::Event: Serialize,
    {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?
                .build()?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use event_store::{EventStoreExt, InMemoryEventStore};
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { id: AggregateId },
        Set { value: i32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Set { .. } => "TallySet",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Tally {
        id: Option<AggregateId>,
        value: i32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("rejected")]
    struct Rejected;

    impl From<Rejected> for DomainError {
        fn from(_: Rejected) -> Self {
            DomainError::AggregateNotFound {
                aggregate_type: "Tally",
                aggregate_id: "rejected".to_string(),
            }
        }
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = Rejected;

        fn aggregate_type() -> &'static str {
            "Tally"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TallyEvent::Opened { id } => self.id = Some(id),
                TallyEvent::Set { value } => self.value = value,
            }
        }
    }

    async fn opened(handler: &CommandHandler<InMemoryEventStore, Tally>) -> AggregateId {
        let id = AggregateId::new();
        handler
            .execute(id, |_| Ok(vec![TallyEvent::Opened { id }]))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn execute_persists_and_applies() {
        let handler = CommandHandler::<_, Tally>::new(InMemoryEventStore::new());
        let id = opened(&handler).await;

        let result = handler
            .execute(id, |_| Ok(vec![TallyEvent::Set { value: 42 }]))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.value, 42);
        assert_eq!(handler.load(id).await.unwrap().value, 42);
    }

    #[tokio::test]
    async fn rejected_command_writes_nothing() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Tally>::new(store.clone());
        let id = opened(&handler).await;

        assert!(handler.execute(id, |_| Err(Rejected)).await.is_err());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn empty_decision_is_not_persisted() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Tally>::new(store.clone());

        let result = handler.execute(AggregateId::new(), |_| Ok(vec![])).await.unwrap();
        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn load_existing_distinguishes_unknown_ids() {
        let handler = CommandHandler::<_, Tally>::new(InMemoryEventStore::new());
        assert!(handler.load_existing(AggregateId::new()).await.unwrap().is_none());

        let id = opened(&handler).await;
        assert!(handler.load_existing(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_write_conflicts_without_retry() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Tally>::new(store.clone());
        let id = opened(&handler).await;

        let result = handler
            .execute(id, |_| {
                // Another writer extends the stream between load and append.
                let envelope = EventEnvelope::builder()
                    .aggregate_id(id)
                    .aggregate_type("Tally")
                    .event_type("TallySet")
                    .version(Version::new(2))
                    .payload(&TallyEvent::Set { value: 1 })
                    .unwrap()
                    .build()
                    .unwrap();
                let store = store.clone();
                std::thread::spawn(move || {
                    tokio::runtime::Runtime::new()
                        .unwrap()
                        .block_on(store.append_event(envelope, AppendOptions::any()))
                })
                .join()
                .unwrap()
                .unwrap();
                Ok(vec![TallyEvent::Set { value: 2 }])
            })
            .await;

        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn retry_re_decides_against_the_winning_state() {
        let store = InMemoryEventStore::new();
        let handler = CommandHandler::<_, Tally>::new(store.clone());
        let id = opened(&handler).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let result = handler
            .execute_with_retry(id, |tally| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let envelope = EventEnvelope::builder()
                        .aggregate_id(id)
                        .aggregate_type("Tally")
                        .event_type("TallySet")
                        .version(Version::new(2))
                        .payload(&TallyEvent::Set { value: 7 })
                        .unwrap()
                        .build()
                        .unwrap();
                    let store = store.clone();
                    std::thread::spawn(move || {
                        tokio::runtime::Runtime::new()
                            .unwrap()
                            .block_on(store.append_event(envelope, AppendOptions::any()))
                    })
                    .join()
                    .unwrap()
                    .unwrap();
                }
                // Only bump values that have not been set yet.
                if tally.value == 0 {
                    Ok(vec![TallyEvent::Set { value: 1 }])
                } else {
                    Ok(vec![])
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(result.events.is_empty());
        assert_eq!(result.aggregate.value, 7);
    }
}
