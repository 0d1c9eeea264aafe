//! A customer's own orders, newest first.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, UserId};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use super::summary::{OrderSummary, SummaryTable};
use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

#[derive(Default)]
struct CustomerOrdersState {
    summaries: SummaryTable,
    by_user: HashMap<UserId, Vec<AggregateId>>,
    position: ProjectionPosition,
}

/// Serves "my orders" listings.
#[derive(Clone, Default)]
pub struct CustomerOrdersView {
    state: Arc<RwLock<CustomerOrdersState>>,
}

impl CustomerOrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders placed by `user_id`, newest first.
    pub async fn orders_for(&self, user_id: UserId) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<OrderSummary> = state
            .by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.summaries.get(id).cloned())
            .collect();
        orders.sort_by(OrderSummary::newest_first);
        orders
    }

    pub async fn order_count(&self, user_id: UserId) -> usize {
        self.state
            .read()
            .await
            .by_user
            .get(&user_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl Projection for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        let state = &mut *state;
        state.position = state.position.advance();

        let placed = event.event_type == "OrderPlaced";
        if let Some(summary) = state.summaries.apply(event)?
            && placed
        {
            state
                .by_user
                .entry(summary.user_id)
                .or_default()
                .push(summary.order_id);
        }
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.summaries.clear();
        state.by_user.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}
