//! Payment endpoints: gateway order creation, client confirmations and
//! gateway webhooks.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use checkout::{CheckoutError, GatewayPayment, PaymentOrder, SyncConfirmation, WebhookOutcome};
use common::AggregateId;
use domain::Money;
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, Identity};

/// Header carrying the hex HMAC of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Major units, e.g. `499.99`.
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<AggregateId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedResponse {
    pub verified: bool,
    pub gateway_order_ref: String,
    pub gateway_payment_ref: String,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

fn to_minor_units(amount: f64) -> Result<Money, ApiError> {
    if !amount.is_finite() {
        return Err(CheckoutError::field("amount", "must be a number").into());
    }
    Ok(Money::from_cents((amount * 100.0).round() as i64))
}

/// POST /payments/orders
pub async fn create_order<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> Result<Json<PaymentOrder>, ApiError> {
    let amount = to_minor_units(req.amount)?;
    let order = state
        .payments
        .create_payment_order(&actor, amount, req.currency, req.order_id)
        .await?;
    Ok(Json(order))
}

/// POST /payments/verify
pub async fn verify<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    ApiJson(confirmation): ApiJson<SyncConfirmation>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let confirmed = state
        .payments
        .verify_sync_confirmation(&actor, confirmation)
        .await?;
    Ok(Json(VerifiedResponse {
        verified: true,
        gateway_order_ref: confirmed.gateway_order_ref,
        gateway_payment_ref: confirmed.gateway_payment_ref,
    }))
}

/// POST /payments/webhook. Unauthenticated; trust comes from the body
/// signature. Well-formed events the API has no use for are still
/// acknowledged so the gateway stops redelivering them.
pub async fn webhook<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let WebhookOutcome::Ignored { reason } =
        state.payments.handle_webhook(&body, signature).await?
    {
        tracing::debug!(reason, "webhook acknowledged without changes");
    }
    Ok(Json(WebhookAck { status: "ok" }))
}

/// GET /payments/{payment_id}
pub async fn get_payment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(_): Identity,
    ApiPath(payment_id): ApiPath<String>,
) -> Result<Json<GatewayPayment>, ApiError> {
    Ok(Json(state.payments.get_payment_details(&payment_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_units_round_to_cents() {
        assert_eq!(to_minor_units(499.99).unwrap(), Money::from_cents(49_999));
        assert_eq!(to_minor_units(0.1 + 0.2).unwrap(), Money::from_cents(30));
        assert!(to_minor_units(f64::NAN).is_err());
    }
}
