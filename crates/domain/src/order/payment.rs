//! Payment outcomes reported by the gateway.

use serde::{Deserialize, Serialize};

/// Entry point a payment outcome arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Client-side confirmation relayed after checkout.
    SyncConfirmation,
    /// Asynchronous notification from the gateway.
    Webhook,
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentSource::SyncConfirmation => "sync_confirmation",
            PaymentSource::Webhook => "webhook",
        }
    }
}

/// A verified payment outcome to fold into an order.
///
/// Both entry points hand these to [`Order::apply_payment_event`], which is
/// the only place that decides whether an outcome changes anything.
///
/// [`Order::apply_payment_event`]: crate::Order::apply_payment_event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Captured {
        transaction_id: String,
        external_order_id: Option<String>,
        source: PaymentSource,
    },
    Failed {
        transaction_id: Option<String>,
        source: PaymentSource,
    },
}

impl PaymentEvent {
    pub fn source(&self) -> PaymentSource {
        match self {
            PaymentEvent::Captured { source, .. } | PaymentEvent::Failed { source, .. } => *source,
        }
    }
}
