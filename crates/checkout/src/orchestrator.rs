//! Checkout orchestration: cart → priced order with stock reserved.

use std::sync::Arc;
use std::time::Instant;

use common::{AggregateId, UserId};
use domain::{
    Address, Cart, Order, OrderLine, OrderService, PaymentMethod, PlaceOrder, PricingPolicy,
    ShippingOption, price_order,
};
use event_store::EventStore;
use serde::Deserialize;
use tokio::sync::OwnedMutexGuard;

use crate::cart_service::CartService;
use crate::error::{CheckoutError, Result};
use crate::inventory::{InventoryLedger, StockLine};
use crate::order_number::OrderNumberGenerator;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping_option: ShippingOption,
}

/// Converts carts into orders.
///
/// Once stock has been taken the remaining steps run on a spawned task, so
/// a caller that goes away mid-checkout cannot leave stock decremented
/// without either a persisted order or a compensating release.
pub struct CheckoutService<S: EventStore> {
    carts: CartService,
    ledger: Arc<dyn InventoryLedger>,
    numbers: Arc<dyn OrderNumberGenerator>,
    orders: Arc<OrderService<S>>,
    policy: PricingPolicy,
}

impl<S: EventStore> Clone for CheckoutService<S> {
    fn clone(&self) -> Self {
        Self {
            carts: self.carts.clone(),
            ledger: self.ledger.clone(),
            numbers: self.numbers.clone(),
            orders: self.orders.clone(),
            policy: self.policy,
        }
    }
}

impl<S: EventStore + 'static> CheckoutService<S> {
    pub fn new(
        carts: CartService,
        ledger: Arc<dyn InventoryLedger>,
        numbers: Arc<dyn OrderNumberGenerator>,
        orders: Arc<OrderService<S>>,
        policy: PricingPolicy,
    ) -> Self {
        Self {
            carts,
            ledger,
            numbers,
            orders,
            policy,
        }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Places an order from the user's cart.
    ///
    /// Either the order is persisted, stock is decremented for every line and
    /// the cart is cleared, or none of these happen.
    #[tracing::instrument(skip(self, request), fields(payment_method = ?request.payment_method))]
    pub async fn place_order(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let started = Instant::now();
        let result = self.run(user_id, request).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_orders_placed_total").increment(1);
                tracing::info!(
                    order_number = order.order_number(),
                    total = %order.total_amount(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(kind = e.kind().as_str(), error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn run(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let cart = self.carts.lock(user_id).await;
        if cart.is_empty() {
            return Err(CheckoutError::CartEmpty);
        }
        validate_addresses(&request)?;

        let this = self.clone();
        tokio::spawn(async move { this.commit(user_id, cart, request).await })
            .await
            .map_err(|e| CheckoutError::Internal(format!("checkout task failed: {e}")))?
    }

    async fn commit(
        &self,
        user_id: UserId,
        mut cart: OwnedMutexGuard<Cart>,
        request: CheckoutRequest,
    ) -> Result<Order> {
        let pricing = price_order(&cart, request.shipping_option, &self.policy);
        let items: Vec<OrderLine> = cart.items().iter().map(OrderLine::from).collect();
        let stock: Vec<StockLine> = items.iter().map(StockLine::from).collect();

        let order_number = self.numbers.next_number().await?;
        self.ledger.reserve(&stock).await?;

        let cmd = PlaceOrder {
            order_id: AggregateId::new(),
            order_number,
            user_id,
            items,
            shipping_address: request.shipping_address,
            billing_address: request.billing_address,
            payment_method: request.payment_method,
            shipping_method: request.shipping_option,
            pricing,
            coupon: cart.coupon().cloned(),
        };

        match self.orders.place_order(cmd).await {
            Ok(result) => {
                cart.clear();
                Ok(result.aggregate)
            }
            Err(e) => {
                tracing::error!(error = %e, "persisting order failed, releasing stock");
                if let Err(release_error) = self.ledger.release(&stock).await {
                    tracing::error!(error = %release_error, "compensating stock release failed");
                }
                Err(e.into())
            }
        }
    }
}

fn validate_addresses(request: &CheckoutRequest) -> Result<()> {
    let mut fields = Vec::new();
    if let Err(errors) = request.shipping_address.validate("shippingAddress") {
        fields.extend(errors);
    }
    if let Some(billing) = &request.billing_address
        && let Err(errors) = billing.validate("billingAddress")
    {
        fields.extend(errors);
    }
    if fields.is_empty() {
        return Ok(());
    }
    Err(CheckoutError::Validation {
        message: "invalid address".to_string(),
        fields,
    })
}
