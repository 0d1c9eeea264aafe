//! Payment reconciliation.
//!
//! Two uncoordinated entry points report payment outcomes: the client's
//! synchronous confirmation and the gateway's webhook. Both are verified
//! here and then funnelled into [`OrderService::apply_payment`], which owns
//! idempotency.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Actor, AggregateId};
use domain::{Money, OrderService, PaymentEvent, PaymentSource};
use event_store::EventStore;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CheckoutError, Result};
use crate::gateway::{GatewayPayment, NewGatewayOrder, PaymentGateway};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
pub struct PaymentSecrets {
    /// Public key id handed to clients alongside a gateway order.
    pub key_id: String,
    /// Signs synchronous confirmations.
    pub key_secret: String,
    /// Signs webhook bodies. When unset, webhook signatures are not checked.
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for PaymentSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSecrets")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Hex-encoded HMAC-SHA256 of `message`.
pub fn sign_hex(secret: &str, message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::Internal(format!("HMAC error: {e}")))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature. Malformed hex never matches.
fn signature_matches(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// Gateway order handed back to the client to start payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOrder {
    pub id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub key: String,
}

/// Client-reported outcome of a gateway checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfirmation {
    pub gateway_order_ref: String,
    pub gateway_payment_ref: String,
    pub signature: String,
    #[serde(default)]
    pub order_id: Option<AggregateId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event was folded into the order; `changed` is false for replays.
    Applied { order_id: AggregateId, changed: bool },
    /// Well-formed, but nothing to do.
    Ignored { reason: &'static str },
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<EntityWrapper>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    /// The gateway sends an empty array when a payment has no notes.
    #[serde(default)]
    notes: serde_json::Value,
}

impl PaymentEntity {
    fn order_reference(&self) -> Option<AggregateId> {
        self.notes
            .get("orderId")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| AggregateId::parse(s).ok())
    }
}

pub struct PaymentReconciler<S: EventStore> {
    orders: Arc<OrderService<S>>,
    gateway: Arc<dyn PaymentGateway>,
    secrets: PaymentSecrets,
    timeout: Duration,
}

impl<S: EventStore> Clone for PaymentReconciler<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            gateway: self.gateway.clone(),
            secrets: self.secrets.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: EventStore> PaymentReconciler<S> {
    pub fn new(
        orders: Arc<OrderService<S>>,
        gateway: Arc<dyn PaymentGateway>,
        secrets: PaymentSecrets,
    ) -> Self {
        Self {
            orders,
            gateway,
            secrets,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call_gateway<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "payment gateway timed out");
                Err(CheckoutError::TransientDependency {
                    dependency: "payment gateway",
                })
            }
        }
    }

    /// Creates a gateway order for `amount`. When `order_id` names one of the
    /// caller's orders, the gateway reference is recorded on it.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id, amount = %amount))]
    pub async fn create_payment_order(
        &self,
        actor: &Actor,
        amount: Money,
        currency: Option<String>,
        order_id: Option<AggregateId>,
    ) -> Result<PaymentOrder> {
        if !amount.is_positive() {
            return Err(CheckoutError::field("amount", "must be greater than zero"));
        }
        let currency = currency
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let mut notes = HashMap::from([("userId".to_string(), actor.user_id.to_string())]);
        if let Some(id) = order_id {
            notes.insert("orderId".to_string(), id.to_string());
        }
        let request = NewGatewayOrder {
            amount,
            currency,
            receipt: format!("receipt_{}", Utc::now().timestamp_millis()),
            notes,
        };
        let gateway_order = self.call_gateway(self.gateway.create_order(request)).await?;

        if let Some(id) = order_id {
            match self.orders.get_order(id).await? {
                Some(order) if order.is_owned_by(actor.user_id) => {
                    self.orders
                        .record_gateway_order(id, gateway_order.id.clone())
                        .await?;
                }
                _ => tracing::warn!(order_id = %id, "gateway order not linked: order unknown or not owned"),
            }
        }

        tracing::info!(gateway_order = %gateway_order.id, "payment order created");
        Ok(PaymentOrder {
            id: gateway_order.id,
            amount: gateway_order.amount.cents(),
            currency: gateway_order.currency,
            key: self.secrets.key_id.clone(),
        })
    }

    /// Verifies a client's confirmation and marks the order paid.
    #[tracing::instrument(
        skip(self, actor, confirmation),
        fields(user_id = %actor.user_id, gateway_order = %confirmation.gateway_order_ref)
    )]
    pub async fn verify_sync_confirmation(
        &self,
        actor: &Actor,
        confirmation: SyncConfirmation,
    ) -> Result<SyncConfirmation> {
        let message = format!(
            "{}|{}",
            confirmation.gateway_order_ref, confirmation.gateway_payment_ref
        );
        if !signature_matches(
            &self.secrets.key_secret,
            message.as_bytes(),
            &confirmation.signature,
        ) {
            reject_signature(PaymentSource::SyncConfirmation);
            return Err(CheckoutError::SignatureInvalid);
        }

        if let Some(order_id) = confirmation.order_id {
            match self.orders.get_order(order_id).await? {
                Some(order) if order.is_owned_by(actor.user_id) => {
                    let linked = order.payment().and_then(|p| p.external_order_id.as_deref());
                    if let Some(linked) = linked
                        && linked != confirmation.gateway_order_ref
                    {
                        tracing::warn!(
                            %order_id,
                            linked_gateway_order = linked,
                            "confirmation for a different gateway order rejected"
                        );
                        return Err(CheckoutError::field(
                            "gatewayOrderRef",
                            "does not match the payment order of this order",
                        ));
                    }
                    let result = self
                        .orders
                        .apply_payment(
                            order_id,
                            PaymentEvent::Captured {
                                transaction_id: confirmation.gateway_payment_ref.clone(),
                                external_order_id: Some(confirmation.gateway_order_ref.clone()),
                                source: PaymentSource::SyncConfirmation,
                            },
                        )
                        .await?;
                    tracing::info!(
                        order_number = result.aggregate.order_number(),
                        changed = !result.events.is_empty(),
                        "payment confirmation applied"
                    );
                }
                _ => {
                    tracing::warn!(%order_id, "verified confirmation for unknown or foreign order ignored")
                }
            }
        }

        Ok(confirmation)
    }

    /// Verifies and applies a gateway webhook delivery. `raw_body` must be the
    /// bytes exactly as received.
    #[tracing::instrument(skip_all, fields(bytes = raw_body.len()))]
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        if let Some(secret) = &self.secrets.webhook_secret {
            let valid = signature.is_some_and(|sig| signature_matches(secret, raw_body, sig));
            if !valid {
                reject_signature(PaymentSource::Webhook);
                return Err(CheckoutError::SignatureInvalid);
            }
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| CheckoutError::validation(format!("malformed webhook payload: {e}")))?;

        let entity = envelope
            .payload
            .and_then(|p| p.payment)
            .map(|w| w.entity);

        let (entity, event) = match (envelope.event.as_str(), entity) {
            ("payment.captured", Some(entity)) => {
                let event = PaymentEvent::Captured {
                    transaction_id: entity.id.clone(),
                    external_order_id: entity.order_id.clone(),
                    source: PaymentSource::Webhook,
                };
                (entity, event)
            }
            ("payment.failed", Some(entity)) => {
                let event = PaymentEvent::Failed {
                    transaction_id: Some(entity.id.clone()),
                    source: PaymentSource::Webhook,
                };
                (entity, event)
            }
            ("payment.captured" | "payment.failed", None) => {
                return Ok(WebhookOutcome::Ignored {
                    reason: "missing payment entity",
                });
            }
            (other, _) => {
                tracing::debug!(event = other, "unhandled webhook event");
                return Ok(WebhookOutcome::Ignored {
                    reason: "unhandled event",
                });
            }
        };

        let Some(order_id) = entity.order_reference() else {
            tracing::warn!(payment = %entity.id, "webhook payment carries no order reference");
            return Ok(WebhookOutcome::Ignored {
                reason: "no order reference",
            });
        };

        match self.orders.apply_payment(order_id, event).await {
            Ok(result) => {
                let changed = !result.events.is_empty();
                tracing::info!(%order_id, event = %envelope.event, changed, "webhook applied");
                Ok(WebhookOutcome::Applied { order_id, changed })
            }
            Err(e) => match CheckoutError::from(e) {
                CheckoutError::NotFound { .. } => {
                    tracing::warn!(%order_id, "webhook for unknown order");
                    Ok(WebhookOutcome::Ignored {
                        reason: "unknown order",
                    })
                }
                other => Err(other),
            },
        }
    }

    pub async fn get_payment_details(&self, payment_id: &str) -> Result<GatewayPayment> {
        self.call_gateway(self.gateway.fetch_payment(payment_id))
            .await?
            .ok_or(CheckoutError::NotFound { what: "payment" })
    }
}

fn reject_signature(source: PaymentSource) {
    metrics::counter!("payment_signature_failures_total", "source" => source.as_str())
        .increment(1);
    tracing::warn!(source = source.as_str(), "payment signature rejected");
}
