//! Administrative order listing with pagination and status counts.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, OrderStatus, PaymentStatus};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::summary::{OrderSummary, SummaryTable};
use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page request. Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrderQuery {
    pub page: u32,
    pub limit: u32,
    pub status: Option<OrderStatus>,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: usize,
}

#[derive(Default)]
struct OrderListState {
    summaries: SummaryTable,
    position: ProjectionPosition,
}

/// Every order in the system, for administrators.
#[derive(Clone, Default)]
pub struct OrderListView {
    state: Arc<RwLock<OrderListState>>,
}

impl OrderListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest-first page of orders, optionally filtered by status.
    pub async fn page(&self, query: OrderQuery) -> OrderPage {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        let state = self.state.read().await;
        let mut matching: Vec<&OrderSummary> = state
            .summaries
            .values()
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .collect();
        matching.sort_by(|a, b| OrderSummary::newest_first(a, b));

        let total = matching.len();
        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let orders = matching
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect();

        OrderPage {
            orders,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit as usize) as u32,
        }
    }

    /// Number of orders in each status, in lifecycle order.
    pub async fn status_counts(&self) -> Vec<StatusCount> {
        let state = self.state.read().await;
        OrderStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: state.summaries.values().filter(|o| o.status == status).count(),
            })
            .collect()
    }

    /// Sum of order totals whose payment has completed.
    pub async fn captured_revenue(&self) -> Money {
        self.state
            .read()
            .await
            .summaries
            .values()
            .filter(|o| o.payment_status == PaymentStatus::Completed)
            .map(|o| o.total_amount)
            .sum()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.summaries.len()
    }
}

#[async_trait]
impl Projection for OrderListView {
    fn name(&self) -> &'static str {
        "OrderListView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        state.position = state.position.advance();
        state.summaries.apply(event)?;
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.summaries.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}
