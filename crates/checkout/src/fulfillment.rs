//! Post-checkout order handling: reads, status changes, cancellations.

use std::sync::Arc;

use common::{Actor, AggregateId};
use domain::{CancelOrder, CommandResult, Order, OrderEvent, OrderService, OrderStatus, UpdateStatus};
use event_store::EventStore;

use crate::error::{CheckoutError, Result};
use crate::inventory::{InventoryLedger, StockLine};

const DEFAULT_CANCEL_REASON: &str = "Cancelled by customer";

/// Drives orders after placement and returns stock for cancelled ones.
///
/// Restocking is keyed off the `OrderCancelled` event each writer actually
/// persisted. Only one writer can append that event for a given order, so
/// stock comes back exactly once no matter how many cancellations race.
pub struct FulfillmentService<S: EventStore> {
    orders: Arc<OrderService<S>>,
    ledger: Arc<dyn InventoryLedger>,
}

impl<S: EventStore> Clone for FulfillmentService<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: EventStore> FulfillmentService<S> {
    pub fn new(orders: Arc<OrderService<S>>, ledger: Arc<dyn InventoryLedger>) -> Self {
        Self { orders, ledger }
    }

    /// Loads an order visible to `actor`: its owner or an administrator.
    pub async fn get_order(&self, actor: &Actor, order_id: AggregateId) -> Result<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::NotFound { what: "order" })?;
        match order.user_id() {
            Some(owner) if actor.can_view(owner) => Ok(order),
            _ => Err(CheckoutError::Forbidden("not your order")),
        }
    }

    /// Customer cancellation of their own pending or confirmed order.
    #[tracing::instrument(skip(self, actor, reason), fields(user_id = %actor.user_id))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        reason: Option<String>,
    ) -> Result<Order> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

        let result = self
            .orders
            .cancel_order(CancelOrder::new(order_id, actor.user_id, reason))
            .await?;
        self.restock_if_cancelled(&result).await;
        Ok(result.aggregate)
    }

    /// Administrative status change. Unknown ids surface as `NotFound`.
    #[tracing::instrument(skip(self, actor, note, tracking_number), fields(actor_id = %actor.user_id))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: AggregateId,
        status: OrderStatus,
        note: Option<String>,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        if !actor.is_admin() {
            return Err(CheckoutError::Forbidden("administrator role required"));
        }
        let mut cmd = UpdateStatus::new(order_id, status, actor.user_id);
        if let Some(note) = note {
            cmd = cmd.with_note(note);
        }
        if let Some(tracking) = tracking_number {
            cmd = cmd.with_tracking_number(tracking);
        }

        let result = self.orders.update_status(cmd).await?;
        self.restock_if_cancelled(&result).await;
        Ok(result.aggregate)
    }

    async fn restock_if_cancelled(&self, result: &CommandResult<Order>) {
        let cancelled = result
            .events
            .iter()
            .any(|e| matches!(e, OrderEvent::OrderCancelled(_)));
        if !cancelled {
            return;
        }

        let lines: Vec<StockLine> = result.aggregate.items().iter().map(StockLine::from).collect();
        match self.ledger.release(&lines).await {
            Ok(()) => {
                metrics::counter!("inventory_restocks_total").increment(1);
                tracing::info!(
                    order_number = result.aggregate.order_number(),
                    lines = lines.len(),
                    "stock returned for cancelled order"
                );
            }
            Err(e) => {
                // The cancellation is already persisted; surface the lost
                // restock loudly rather than failing the request.
                metrics::counter!("inventory_restock_failures_total").increment(1);
                tracing::error!(
                    order_number = result.aggregate.order_number(),
                    error = %e,
                    "restock after cancellation failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::UserId;
    use domain::{Address, Money, OrderLine, PaymentMethod, PlaceOrder, PricingSnapshot, ProductId, ShippingOption};
    use event_store::InMemoryEventStore;

    use super::*;
    use crate::error::ErrorKind;
    use crate::inventory::{InMemoryInventoryLedger, InventoryRecord};

    struct Fixture {
        service: FulfillmentService<InMemoryEventStore>,
        orders: Arc<OrderService<InMemoryEventStore>>,
        ledger: InMemoryInventoryLedger,
    }

    async fn fixture() -> Fixture {
        let ledger = InMemoryInventoryLedger::new();
        ledger.set_record(InventoryRecord::tracked("lamp", 10)).await.unwrap();
        let orders = Arc::new(OrderService::new(InMemoryEventStore::new()));
        let service = FulfillmentService::new(orders.clone(), Arc::new(ledger.clone()));
        Fixture {
            service,
            orders,
            ledger,
        }
    }

    fn address() -> Address {
        Address {
            first_name: "Ada".into(),
            last_name: "Byron".into(),
            street: "1 Loop".into(),
            city: "London".into(),
            state: "LDN".into(),
            zip_code: "N1".into(),
            country: "UK".into(),
            phone: None,
        }
    }

    /// Places an order for three lamps after taking them from stock, the
    /// way checkout would.
    async fn place(f: &Fixture, owner: UserId) -> AggregateId {
        let line = OrderLine {
            product_id: ProductId::new("lamp"),
            name: "Desk Lamp".into(),
            sku: "LMP-1".into(),
            quantity: 3,
            unit_price: Money::from_major(40),
            variant: None,
        };
        f.ledger.reserve(&[StockLine::from(&line)]).await.unwrap();

        let order_id = AggregateId::new();
        f.orders
            .place_order(PlaceOrder {
                order_id,
                order_number: "ORD-20260101-000001".into(),
                user_id: owner,
                items: vec![line],
                shipping_address: address(),
                billing_address: None,
                payment_method: PaymentMethod::Card,
                shipping_method: ShippingOption::Standard,
                pricing: PricingSnapshot::default(),
                coupon: None,
            })
            .await
            .unwrap();
        order_id
    }

    async fn lamps(f: &Fixture) -> u32 {
        f.ledger
            .record(&ProductId::new("lamp"))
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn customer_cancel_returns_stock() {
        let f = fixture().await;
        let owner = Actor::customer(UserId::new());
        let order_id = place(&f, owner.user_id).await;
        assert_eq!(lamps(&f).await, 7);

        let order = f
            .service
            .cancel_order(&owner, order_id, Some("changed my mind".into()))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason(), Some("changed my mind"));
        assert_eq!(lamps(&f).await, 10);
    }

    #[tokio::test]
    async fn blank_reason_falls_back_to_default() {
        let f = fixture().await;
        let owner = Actor::customer(UserId::new());
        let order_id = place(&f, owner.user_id).await;

        let order = f
            .service
            .cancel_order(&owner, order_id, Some("   ".into()))
            .await
            .unwrap();
        assert_eq!(order.cancel_reason(), Some(DEFAULT_CANCEL_REASON));
    }

    #[tokio::test]
    async fn racing_cancellations_restock_once() {
        let f = fixture().await;
        let owner = Actor::customer(UserId::new());
        let order_id = place(&f, owner.user_id).await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = f.service.clone();
            handles.push(tokio::spawn(async move {
                service.cancel_order(&owner, order_id, None).await
            }));
        }
        let mut cancelled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => cancelled += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidTransition),
            }
        }

        assert_eq!(cancelled, 1);
        assert_eq!(lamps(&f).await, 10);
    }

    #[tokio::test]
    async fn admin_cancel_via_status_update_restocks() {
        let f = fixture().await;
        let order_id = place(&f, UserId::new()).await;
        let admin = Actor::admin(UserId::new());

        let order = f
            .service
            .update_status(&admin, order_id, OrderStatus::Cancelled, None, None)
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(lamps(&f).await, 10);
    }

    #[tokio::test]
    async fn rejected_transition_appends_no_history() {
        let f = fixture().await;
        let owner = Actor::customer(UserId::new());
        let order_id = place(&f, owner.user_id).await;
        let admin = Actor::admin(UserId::new());
        f.service.cancel_order(&owner, order_id, None).await.unwrap();
        let before = f.service.get_order(&admin, order_id).await.unwrap();

        let err = f
            .service
            .update_status(&admin, order_id, OrderStatus::Shipped, None, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        let after = f.service.get_order(&admin, order_id).await.unwrap();
        assert_eq!(after.status_history().len(), before.status_history().len());
        assert_eq!(lamps(&f).await, 10);
    }

    #[tokio::test]
    async fn status_updates_require_admin() {
        let f = fixture().await;
        let owner = Actor::customer(UserId::new());
        let order_id = place(&f, owner.user_id).await;

        let err = f
            .service
            .update_status(&owner, order_id, OrderStatus::Confirmed, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = f
            .service
            .update_status(
                &Actor::admin(UserId::new()),
                AggregateId::new(),
                OrderStatus::Confirmed,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn shipping_records_tracking_number() {
        let f = fixture().await;
        let order_id = place(&f, UserId::new()).await;
        let admin = Actor::admin(UserId::new());
        for status in [OrderStatus::Confirmed, OrderStatus::Processing] {
            f.service
                .update_status(&admin, order_id, status, None, None)
                .await
                .unwrap();
        }

        let order = f
            .service
            .update_status(
                &admin,
                order_id,
                OrderStatus::Shipped,
                Some("handed to courier".into()),
                Some("TRK-42".into()),
            )
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(
            order.shipping().and_then(|s| s.tracking_number.as_deref()),
            Some("TRK-42")
        );
        assert_eq!(lamps(&f).await, 7);
    }

    #[tokio::test]
    async fn orders_are_visible_to_owner_and_admin_only() {
        let f = fixture().await;
        let owner = Actor::customer(UserId::new());
        let order_id = place(&f, owner.user_id).await;

        assert!(f.service.get_order(&owner, order_id).await.is_ok());
        assert!(
            f.service
                .get_order(&Actor::admin(UserId::new()), order_id)
                .await
                .is_ok()
        );
        let err = f
            .service
            .get_order(&Actor::customer(UserId::new()), order_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = f
            .service
            .get_order(&owner, AggregateId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
