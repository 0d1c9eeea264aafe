//! REST client for the payment gateway.
//!
//! Requests authenticate with HTTP basic auth (`key_id:key_secret`) and carry
//! amounts in minor units. `base_url` includes the API version prefix, e.g.
//! `https://api.razorpay.com/v1`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{GatewayOrder, GatewayPayment, NewGatewayOrder, PaymentGateway};
use crate::error::{CheckoutError, Result};

const DEPENDENCY: &str = "payment gateway";

#[derive(Debug, Deserialize)]
struct WireOrder {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    /// An empty array when the order has no notes.
    #[serde(default)]
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WirePayment {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    error: WireError,
}

#[derive(Debug, Default, Deserialize)]
struct WireError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

fn notes_map(notes: serde_json::Value) -> HashMap<String, String> {
    match notes {
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect(),
        _ => HashMap::new(),
    }
}

/// Payment ids are opaque tokens; anything else cannot name a payment.
fn is_payment_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn transport_error(e: reqwest::Error) -> CheckoutError {
    tracing::warn!(error = %e, timeout = e.is_timeout(), "payment gateway unreachable");
    CheckoutError::TransientDependency {
        dependency: DEPENDENCY,
    }
}

pub struct HttpGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Internal(format!("payment gateway client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| CheckoutError::Internal(format!("unreadable gateway response: {e}")))
    }

    /// Maps a non-success response to an error. 5xx and 429 are retryable.
    async fn failure(response: Response) -> CheckoutError {
        let status = response.status();
        let body: WireErrorBody = response.json().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(%status, code = %body.error.code, "payment gateway unavailable");
            return CheckoutError::TransientDependency {
                dependency: DEPENDENCY,
            };
        }
        tracing::error!(
            %status,
            code = %body.error.code,
            description = %body.error.description,
            "payment gateway rejected request"
        );
        CheckoutError::Internal(format!(
            "payment gateway rejected request: {status} {}",
            body.error.description
        ))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[tracing::instrument(skip_all, fields(amount = %request.amount, currency = %request.currency))]
    async fn create_order(&self, request: NewGatewayOrder) -> Result<GatewayOrder> {
        let body = serde_json::json!({
            "amount": request.amount.cents(),
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": request.notes,
        });
        let response = self
            .client
            .post(self.url("orders"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let order: WireOrder = Self::decode(response).await?;
        Ok(GatewayOrder {
            id: order.id,
            amount: Money::from_cents(order.amount),
            currency: order.currency,
            receipt: order.receipt.unwrap_or(request.receipt),
            notes: notes_map(order.notes),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>> {
        if !is_payment_id(payment_id) {
            return Ok(None);
        }
        let response = self
            .client
            .get(self.url(&format!("payments/{payment_id}")))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            // The gateway reports unknown ids as a bad request.
            StatusCode::BAD_REQUEST => {
                let body: WireErrorBody = response.json().await.unwrap_or_default();
                if body.error.description.contains("does not exist") {
                    return Ok(None);
                }
                return Err(CheckoutError::Internal(format!(
                    "payment gateway rejected request: {}",
                    body.error.description
                )));
            }
            status if !status.is_success() => return Err(Self::failure(response).await),
            _ => {}
        }

        let payment: WirePayment = Self::decode(response).await?;
        Ok(Some(GatewayPayment {
            id: payment.id,
            order_id: payment.order_id,
            amount: Money::from_cents(payment.amount),
            currency: payment.currency,
            status: payment.status,
            method: payment.method,
        }))
    }
}
