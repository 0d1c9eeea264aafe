//! The order aggregate and its state machine.

mod aggregate;
mod commands;
mod events;
mod payment;
mod service;
mod status;
mod value_objects;

pub use aggregate::Order;
pub use commands::{CancelOrder, PlaceOrder, UpdateStatus};
pub use events::{
    OrderCancelledData, OrderEvent, OrderPlacedData, PaymentCapturedData, PaymentFailedData,
    PaymentInitiatedData, StatusChangedData,
};
pub use payment::{PaymentEvent, PaymentSource};
pub use service::OrderService;
pub use status::OrderStatus;
pub use value_objects::{
    Address, FieldError, OrderLine, PaymentInfo, PaymentMethod, PaymentStatus, ProductId,
    ShippingInfo, StatusEntry,
};

use thiserror::Error;

/// Reasons an order command is rejected. A rejected command records nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order already placed")]
    AlreadyPlaced,

    #[error("order has no items")]
    NoItems,

    #[error("order does not exist")]
    NotPlaced,

    #[error("only the customer who placed the order may do this")]
    NotOwner,

    #[error("invalid address: {}", FieldError::summarize(.0))]
    InvalidAddress(Vec<FieldError>),
}
