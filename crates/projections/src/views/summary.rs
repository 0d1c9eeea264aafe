//! Order summaries shared by the list views.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use domain::{Money, OrderEvent, OrderStatus, PaymentMethod, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;

use crate::Result;

/// One order as it appears in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub total_items: u32,
    pub total_amount: Money,
    pub tracking_number: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSummary {
    fn apply(&mut self, event: OrderEvent, at: DateTime<Utc>) {
        match event {
            OrderEvent::OrderPlaced(_) => return,
            OrderEvent::StatusChanged(data) => {
                self.status = data.status;
                if data.tracking_number.is_some() {
                    self.tracking_number = data.tracking_number;
                }
            }
            OrderEvent::OrderCancelled(_) => self.status = OrderStatus::Cancelled,
            OrderEvent::PaymentInitiated(_) => {}
            OrderEvent::PaymentCaptured(_) => self.payment_status = PaymentStatus::Completed,
            OrderEvent::PaymentFailed(_) => self.payment_status = PaymentStatus::Failed,
        }
        self.updated_at = at;
    }

    /// Newest first; order numbers break ties between orders placed in the
    /// same instant.
    pub(crate) fn newest_first(a: &OrderSummary, b: &OrderSummary) -> std::cmp::Ordering {
        b.placed_at
            .cmp(&a.placed_at)
            .then_with(|| b.order_number.cmp(&a.order_number))
    }
}

/// Summaries keyed by order id, folded from the journal.
#[derive(Debug, Default)]
pub(crate) struct SummaryTable {
    orders: HashMap<AggregateId, OrderSummary>,
}

impl SummaryTable {
    /// Folds one journal entry and returns the summary it touched, if any.
    pub(crate) fn apply(&mut self, envelope: &EventEnvelope) -> Result<Option<&OrderSummary>> {
        if envelope.aggregate_type != "Order" {
            return Ok(None);
        }
        let event: OrderEvent = serde_json::from_value(envelope.payload.clone())?;
        let order_id = envelope.aggregate_id;

        if let OrderEvent::OrderPlaced(data) = event {
            let summary = OrderSummary {
                order_id,
                order_number: data.order_number,
                user_id: data.user_id,
                status: OrderStatus::Pending,
                payment_method: data.payment_method,
                payment_status: PaymentStatus::Pending,
                total_items: data.items.iter().map(|line| line.quantity).sum(),
                total_amount: data.pricing.total_amount,
                tracking_number: None,
                placed_at: data.placed_at,
                updated_at: envelope.timestamp,
            };
            self.orders.insert(order_id, summary);
            return Ok(self.orders.get(&order_id));
        }

        match self.orders.get_mut(&order_id) {
            Some(summary) => {
                summary.apply(event, envelope.timestamp);
                Ok(Some(summary))
            }
            None => {
                tracing::warn!(%order_id, "event for order with no placement, skipped");
                Ok(None)
            }
        }
    }

    pub(crate) fn get(&self, order_id: &AggregateId) -> Option<&OrderSummary> {
        self.orders.get(order_id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &OrderSummary> {
        self.orders.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.orders.len()
    }

    pub(crate) fn clear(&mut self) {
        self.orders.clear();
    }
}
