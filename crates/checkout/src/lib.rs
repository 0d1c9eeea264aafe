//! Checkout pipeline: turns a user's cart into a placed order while
//! reserving stock, then tracks that order through fulfillment and payment.
//!
//! - [`CartService`] holds one cart per user
//! - [`CheckoutService`] prices the cart, reserves stock in the
//!   [`InventoryLedger`] and persists the order, all or nothing
//! - [`FulfillmentService`] applies status changes and cancellations,
//!   restocking exactly once per cancelled order
//! - [`PaymentReconciler`] verifies gateway signatures and folds payment
//!   outcomes into orders through the shared idempotent transition

pub mod cart_service;
pub mod catalog;
pub mod error;
pub mod fulfillment;
pub mod gateway;
pub mod inventory;
pub mod orchestrator;
pub mod order_number;
pub mod payments;

pub use cart_service::CartService;
pub use catalog::{InMemoryCatalog, ProductCatalog, ProductSnapshot};
pub use error::{CheckoutError, ErrorKind, Result};
pub use fulfillment::FulfillmentService;
pub use gateway::{
    GatewayOrder, GatewayPayment, HttpGateway, InMemoryGateway, NewGatewayOrder, PaymentGateway,
};
pub use inventory::{
    InMemoryInventoryLedger, InventoryLedger, InventoryRecord, PostgresInventoryLedger,
    StockLine, StockStatus,
};
pub use orchestrator::{CheckoutRequest, CheckoutService};
pub use order_number::{
    OrderNumberGenerator, PostgresOrderNumbers, SequenceOrderNumbers, format_order_number,
};
pub use payments::{
    DEFAULT_CURRENCY, DEFAULT_GATEWAY_TIMEOUT, PaymentOrder, PaymentReconciler, PaymentSecrets,
    SyncConfirmation, WebhookOutcome, sign_hex,
};
