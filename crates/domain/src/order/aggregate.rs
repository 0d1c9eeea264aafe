//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;

use crate::Money;
use crate::aggregate::Aggregate;
use crate::cart::Coupon;
use crate::pricing::{PricingSnapshot, ShippingOption};

use super::events::{OrderCancelledData, OrderPlacedData, StatusChangedData};
use super::{
    Address, OrderError, OrderEvent, OrderLine, OrderStatus, PaymentEvent, PaymentInfo,
    PaymentSource, PaymentStatus, PlaceOrder, ShippingInfo, StatusEntry,
};

/// A placed order.
///
/// Items, addresses and pricing are frozen by `OrderPlaced`. Afterwards only
/// the status, its history, shipping tracking, payment info and the
/// cancellation reason change.
#[derive(Debug, Clone, Default)]
pub struct Order {
    id: Option<AggregateId>,
    version: Version,
    order_number: String,
    user_id: Option<UserId>,
    items: Vec<OrderLine>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    pricing: PricingSnapshot,
    coupon: Option<Coupon>,
    payment: Option<PaymentInfo>,
    status: OrderStatus,
    status_history: Vec<StatusEntry>,
    shipping: Option<ShippingInfo>,
    cancel_reason: Option<String>,
    placed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            OrderEvent::OrderCancelled(data) => self.apply_cancelled(data),
            OrderEvent::PaymentInitiated(data) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.external_order_id = Some(data.external_order_id);
                }
            }
            OrderEvent::PaymentCaptured(data) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.status = PaymentStatus::Completed;
                    payment.transaction_id = Some(data.transaction_id);
                    if data.external_order_id.is_some() {
                        payment.external_order_id = data.external_order_id;
                    }
                    payment.paid_at = Some(data.paid_at);
                }
            }
            OrderEvent::PaymentFailed(data) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.status = PaymentStatus::Failed;
                    if data.transaction_id.is_some() {
                        payment.transaction_id = data.transaction_id;
                    }
                }
            }
        }
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn items(&self) -> &[OrderLine] {
        &self.items
    }

    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn pricing(&self) -> PricingSnapshot {
        self.pricing
    }

    pub fn total_amount(&self) -> Money {
        self.pricing.total_amount
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    pub fn payment(&self) -> Option<&PaymentInfo> {
        self.payment.as_ref()
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.payment.as_ref().map(|p| p.status)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusEntry] {
        &self.status_history
    }

    pub fn shipping(&self) -> Option<&ShippingInfo> {
        self.shipping.as_ref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }
}

// Command methods (return events)
impl Order {
    pub fn place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let billing_address = cmd
            .billing_address
            .clone()
            .unwrap_or_else(|| cmd.shipping_address.clone());

        let mut field_errors = Vec::new();
        if let Err(errors) = cmd.shipping_address.validate("shippingAddress") {
            field_errors.extend(errors);
        }
        if let Some(billing) = &cmd.billing_address
            && let Err(errors) = billing.validate("billingAddress")
        {
            field_errors.extend(errors);
        }
        if !field_errors.is_empty() {
            return Err(OrderError::InvalidAddress(field_errors));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            user_id: cmd.user_id,
            items: cmd.items.clone(),
            shipping_address: cmd.shipping_address.clone(),
            billing_address,
            pricing: cmd.pricing,
            coupon: cmd.coupon.clone(),
            payment_method: cmd.payment_method,
            shipping_method: cmd.shipping_method,
            placed_at: Utc::now(),
        })])
    }

    /// Moves the order along the fulfillment state machine on behalf of an
    /// administrator. Moving to `cancelled` records a cancellation.
    pub fn change_status(
        &self,
        to: OrderStatus,
        note: Option<String>,
        tracking_number: Option<String>,
        actor_id: UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        self.ensure_transition(to)?;

        if to == OrderStatus::Cancelled {
            let reason = note.unwrap_or_else(|| "Cancelled by administrator".to_string());
            return Ok(vec![OrderEvent::order_cancelled(reason, actor_id)]);
        }

        Ok(vec![OrderEvent::status_changed(
            to,
            note,
            Some(actor_id),
            tracking_number,
        )])
    }

    /// Customer cancellation. Only the owner may cancel, and only while the
    /// order is pending or confirmed.
    pub fn cancel(&self, requester: UserId, reason: String) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if !self.is_owned_by(requester) {
            return Err(OrderError::NotOwner);
        }
        self.ensure_transition(OrderStatus::Cancelled)?;

        Ok(vec![OrderEvent::order_cancelled(reason, requester)])
    }

    /// Folds a verified payment outcome into the order.
    ///
    /// A capture on an already-completed payment produces no events, so
    /// replays from either entry point are no-ops. A failure only lands on a
    /// payment that is still pending.
    pub fn apply_payment_event(&self, event: &PaymentEvent) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        let payment_status = self.payment_status().unwrap_or_default();

        match event {
            PaymentEvent::Captured {
                transaction_id,
                external_order_id,
                source,
            } => {
                if payment_status == PaymentStatus::Completed {
                    return Ok(vec![]);
                }

                let mut events = vec![OrderEvent::payment_captured(
                    transaction_id.clone(),
                    external_order_id.clone(),
                    *source,
                )];
                if self.status == OrderStatus::Pending {
                    let note = match source {
                        PaymentSource::SyncConfirmation => "Payment confirmed",
                        PaymentSource::Webhook => "Payment captured via webhook",
                    };
                    events.push(OrderEvent::status_changed(
                        OrderStatus::Confirmed,
                        Some(note.to_string()),
                        None,
                        None,
                    ));
                }
                Ok(events)
            }
            PaymentEvent::Failed {
                transaction_id,
                source,
            } => {
                if payment_status != PaymentStatus::Pending {
                    return Ok(vec![]);
                }
                Ok(vec![OrderEvent::payment_failed(
                    transaction_id.clone(),
                    *source,
                )])
            }
        }
    }

    /// Remembers the gateway order opened for this order. Ignored once the
    /// payment has completed or when the reference is already recorded.
    pub fn record_gateway_order(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        let Some(payment) = &self.payment else {
            return Ok(vec![]);
        };
        if payment.status == PaymentStatus::Completed
            || payment.external_order_id.as_deref() == Some(external_order_id)
        {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::payment_initiated(external_order_id)])
    }

    fn ensure_placed(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        Ok(())
    }

    fn ensure_transition(&self, to: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

// Event application
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = data.order_number;
        self.user_id = Some(data.user_id);
        self.items = data.items;
        self.shipping_address = Some(data.shipping_address);
        self.billing_address = Some(data.billing_address);
        self.pricing = data.pricing;
        self.coupon = data.coupon;
        self.payment = Some(PaymentInfo::pending(data.payment_method));
        self.shipping = Some(ShippingInfo {
            method: data.shipping_method,
            tracking_number: None,
            actual_delivery: None,
        });
        self.status = OrderStatus::Pending;
        self.status_history = vec![StatusEntry {
            status: OrderStatus::Pending,
            timestamp: data.placed_at,
            note: Some("Order placed".to_string()),
            actor_id: Some(data.user_id),
        }];
        self.placed_at = Some(data.placed_at);
    }

    fn apply_status_changed(&mut self, data: StatusChangedData) {
        self.status = data.status;
        let shipping = self.shipping.get_or_insert_with(|| ShippingInfo {
            method: ShippingOption::default(),
            tracking_number: None,
            actual_delivery: None,
        });
        if data.tracking_number.is_some() {
            shipping.tracking_number = data.tracking_number;
        }
        if data.status == OrderStatus::Delivered {
            shipping.actual_delivery = Some(data.changed_at);
        }
        self.status_history.push(StatusEntry {
            status: data.status,
            timestamp: data.changed_at,
            note: data.note,
            actor_id: data.actor_id,
        });
    }

    fn apply_cancelled(&mut self, data: OrderCancelledData) {
        self.status = OrderStatus::Cancelled;
        self.status_history.push(StatusEntry {
            status: OrderStatus::Cancelled,
            timestamp: data.cancelled_at,
            note: Some(data.reason.clone()),
            actor_id: Some(data.cancelled_by),
        });
        self.cancel_reason = Some(data.reason);
    }
}
