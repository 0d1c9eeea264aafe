//! Payment gateway port.
//!
//! The gateway owns payment capture; this service only creates gateway-side
//! orders, looks up payments and verifies what the gateway reports back.
//! [`HttpGateway`] talks to the real gateway; [`InMemoryGateway`] stands in
//! for it in tests and local runs.

mod http;

pub use http::HttpGateway;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};

/// Request for a gateway-side order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGatewayOrder {
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: NewGatewayOrder) -> Result<GatewayOrder>;

    /// Returns `None` when the gateway has no such payment.
    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>>;
}

#[derive(Default)]
struct GatewayState {
    orders: HashMap<String, GatewayOrder>,
    payments: HashMap<String, GatewayPayment>,
}

/// In-process gateway.
///
/// `with_latency` delays every call, which is how callers' timeouts are
/// exercised.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<GatewayState>>,
    sequence: Arc<AtomicU64>,
    latency: Option<Duration>,
    unavailable: bool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every call fail as if the gateway were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Records a payment as the gateway would after a customer pays.
    pub async fn insert_payment(&self, payment: GatewayPayment) {
        self.state
            .write()
            .await
            .payments
            .insert(payment.id.clone(), payment);
    }

    pub async fn order(&self, id: &str) -> Option<GatewayOrder> {
        self.state.read().await.orders.get(id).cloned()
    }

    async fn simulate_network(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable {
            return Err(CheckoutError::TransientDependency {
                dependency: "payment gateway",
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_order(&self, request: NewGatewayOrder) -> Result<GatewayOrder> {
        self.simulate_network().await?;
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let order = GatewayOrder {
            id: format!("order_{n:010}"),
            amount: request.amount,
            currency: request.currency,
            receipt: request.receipt,
            notes: request.notes,
        };
        self.state
            .write()
            .await
            .orders
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>> {
        self.simulate_network().await?;
        Ok(self.state.read().await.payments.get(payment_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewGatewayOrder {
        NewGatewayOrder {
            amount: Money::from_cents(49_900),
            currency: "INR".into(),
            receipt: "rcpt_1".into(),
            notes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn orders_get_distinct_ids() {
        let gateway = InMemoryGateway::new();
        let a = gateway.create_order(request()).await.unwrap();
        let b = gateway.create_order(request()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(gateway.order(&a.id).await.unwrap().amount, Money::from_cents(49_900));
    }

    #[tokio::test]
    async fn unknown_payment_is_none() {
        let gateway = InMemoryGateway::new();
        assert!(gateway.fetch_payment("pay_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_gateway_is_transient() {
        let gateway = InMemoryGateway::new().unavailable();
        let err = gateway.create_order(request()).await.unwrap_err();
        assert!(err.kind().is_retryable());
    }
}
