//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::cart::Coupon;
use crate::pricing::{PricingSnapshot, ShippingOption};

use super::{Address, OrderLine, OrderStatus, PaymentMethod, PaymentSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderPlaced(OrderPlacedData),

    /// Fulfillment moved forward (anything except cancellation).
    StatusChanged(StatusChangedData),

    OrderCancelled(OrderCancelledData),

    /// An order was opened at the payment gateway for this order.
    PaymentInitiated(PaymentInitiatedData),

    PaymentCaptured(PaymentCapturedData),

    PaymentFailed(PaymentFailedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::PaymentInitiated(_) => "PaymentInitiated",
            OrderEvent::PaymentCaptured(_) => "PaymentCaptured",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub pricing: PricingSnapshot,
    pub coupon: Option<Coupon>,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingOption,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub actor_id: Option<UserId>,
    pub tracking_number: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub external_order_id: String,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCapturedData {
    pub transaction_id: String,
    pub external_order_id: Option<String>,
    pub source: PaymentSource,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub transaction_id: Option<String>,
    pub source: PaymentSource,
    pub failed_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn status_changed(
        status: OrderStatus,
        note: Option<String>,
        actor_id: Option<UserId>,
        tracking_number: Option<String>,
    ) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            status,
            note,
            actor_id,
            tracking_number,
            changed_at: Utc::now(),
        })
    }

    pub fn order_cancelled(reason: impl Into<String>, cancelled_by: UserId) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }

    pub fn payment_initiated(external_order_id: impl Into<String>) -> Self {
        OrderEvent::PaymentInitiated(PaymentInitiatedData {
            external_order_id: external_order_id.into(),
            initiated_at: Utc::now(),
        })
    }

    pub fn payment_captured(
        transaction_id: impl Into<String>,
        external_order_id: Option<String>,
        source: PaymentSource,
    ) -> Self {
        OrderEvent::PaymentCaptured(PaymentCapturedData {
            transaction_id: transaction_id.into(),
            external_order_id,
            source,
            paid_at: Utc::now(),
        })
    }

    pub fn payment_failed(transaction_id: Option<String>, source: PaymentSource) -> Self {
        OrderEvent::PaymentFailed(PaymentFailedData {
            transaction_id,
            source,
            failed_at: Utc::now(),
        })
    }

    /// Status the order ends up in after this event, if it changes it.
    pub fn resulting_status(&self) -> Option<OrderStatus> {
        match self {
            OrderEvent::OrderPlaced(_) => Some(OrderStatus::Pending),
            OrderEvent::StatusChanged(data) => Some(data.status),
            OrderEvent::OrderCancelled(_) => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}
