//! Checkout error taxonomy.

use domain::{CartError, DomainError, FieldError, MAX_LINE_QUANTITY, OrderError, OrderStatus};
use thiserror::Error;

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientStock,
    InvalidCoupon,
    CartEmpty,
    InvalidTransition,
    Unauthorized,
    Forbidden,
    SignatureInvalid,
    TransientDependency,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::InvalidCoupon => "invalid_coupon",
            ErrorKind::CartEmpty => "cart_empty",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::SignatureInvalid => "signature_invalid",
            ErrorKind::TransientDependency => "transient_dependency",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientDependency)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    /// `what` names the kind of resource, never its identifier.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    #[error("insufficient stock for {product}")]
    InsufficientStock { product: String },

    #[error("invalid coupon code")]
    InvalidCoupon,

    #[error("cart is empty")]
    CartEmpty,

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("invalid signature")]
    SignatureInvalid,

    #[error("{dependency} unavailable, retry later")]
    TransientDependency { dependency: &'static str },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("order journal error: {0}")]
    Journal(#[source] DomainError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    pub fn validation(message: impl Into<String>) -> Self {
        CheckoutError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let error = FieldError::new(field, message);
        CheckoutError::Validation {
            message: format!("{} {}", error.field, error.message),
            fields: vec![error],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::Validation { .. } => ErrorKind::Validation,
            CheckoutError::NotFound { .. } => ErrorKind::NotFound,
            CheckoutError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CheckoutError::InvalidCoupon => ErrorKind::InvalidCoupon,
            CheckoutError::CartEmpty => ErrorKind::CartEmpty,
            CheckoutError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CheckoutError::Unauthorized => ErrorKind::Unauthorized,
            CheckoutError::Forbidden(_) => ErrorKind::Forbidden,
            CheckoutError::SignatureInvalid => ErrorKind::SignatureInvalid,
            CheckoutError::TransientDependency { .. } => ErrorKind::TransientDependency,
            CheckoutError::Database(_) | CheckoutError::Journal(_) | CheckoutError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Field-level details for validation failures.
    pub fn fields(&self) -> &[FieldError] {
        match self {
            CheckoutError::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::CartEmpty => CheckoutError::CartEmpty,
            CartError::InvalidCoupon(_) => CheckoutError::InvalidCoupon,
            CartError::ItemNotFound(_) => CheckoutError::NotFound { what: "cart item" },
            CartError::InvalidQuantity => CheckoutError::field(
                "quantity",
                format!("must be between 1 and {MAX_LINE_QUANTITY}"),
            ),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { from, to } => {
                CheckoutError::InvalidTransition { from, to }
            }
            OrderError::NotPlaced => CheckoutError::NotFound { what: "order" },
            OrderError::NotOwner => CheckoutError::Forbidden("not your order"),
            OrderError::NoItems => CheckoutError::CartEmpty,
            OrderError::InvalidAddress(fields) => CheckoutError::Validation {
                message: format!("invalid address: {}", FieldError::summarize(&fields)),
                fields,
            },
            OrderError::AlreadyPlaced => CheckoutError::Internal("order already placed".to_string()),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Order(order) => order.into(),
            other => CheckoutError::Journal(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
