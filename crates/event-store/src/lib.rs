//! Append-only journal for event-sourced aggregates.
//!
//! Every order mutation is recorded as an event appended at an expected
//! version, so concurrent writers to the same order are serialized by
//! optimistic concurrency instead of blind overwrites.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
