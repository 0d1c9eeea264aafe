//! Feeds journal entries to projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Delivers journal entries to registered projections.
///
/// Views are brought up to date by [`run_catch_up`](Self::run_catch_up),
/// which replays the journal and hands each projection only the entries
/// past its position. Catch-ups are serialized so concurrent readers never
/// deliver the same entry twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let _guard = self.catch_up.lock().await;
        let mut stream = self.store.stream_all_events().await?;
        let mut index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(entry) = stream.next().await {
            let event = entry?;
            index += 1;

            for projection in &self.projections {
                if projection.position().await.events_processed < index {
                    projection.handle(&event).await?;
                    delivered += 1;
                    metrics::counter!(
                        "projection_events_processed_total",
                        "projection" => projection.name()
                    )
                    .increment(1);
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(journal_len = index, delivered, "projections caught up");
        }
        Ok(())
    }

    /// Hands one entry to every projection without consulting positions.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Clears every projection and replays the journal from the start.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            tracing::info!(projection = projection.name(), "rebuilding");
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}
