//! Order commands.

use common::{AggregateId, UserId};

use crate::cart::Coupon;
use crate::command::Command;
use crate::pricing::{PricingSnapshot, ShippingOption};

use super::{Address, Order, OrderLine, OrderStatus, PaymentMethod};

/// Records a priced order. Built by checkout once stock is reserved.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingOption,
    pub pricing: PricingSnapshot,
    pub coupon: Option<Coupon>,
}

impl Command for PlaceOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Administrative status change.
#[derive(Debug, Clone)]
pub struct UpdateStatus {
    pub order_id: AggregateId,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub tracking_number: Option<String>,
    pub actor_id: UserId,
}

impl UpdateStatus {
    pub fn new(order_id: AggregateId, status: OrderStatus, actor_id: UserId) -> Self {
        Self {
            order_id,
            status,
            note: None,
            tracking_number: None,
            actor_id,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }
}

impl Command for UpdateStatus {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Customer cancellation.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub requester: UserId,
    pub reason: String,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, requester: UserId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            requester,
            reason: reason.into(),
        }
    }
}

impl Command for CancelOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}
