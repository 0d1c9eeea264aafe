//! Domain layer for the order-fulfillment pipeline.
//!
//! - [`Cart`] with coupon evaluation and derived totals
//! - [`pricing`] turning a cart into a frozen [`PricingSnapshot`]
//! - the event-sourced [`Order`] aggregate, its status state machine and
//!   the idempotent payment transition shared by every payment entry point
//! - [`CommandHandler`] for load → decide → conditional append

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{
    Cart, CartError, CartItem, CartItemId, CartTotals, Coupon, CouponBook, CouponKind,
    MAX_LINE_QUANTITY, Variant,
};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
pub use money::Money;
pub use order::{
    Address, CancelOrder, FieldError, Order, OrderError, OrderEvent, OrderLine, OrderService,
    OrderStatus, PaymentEvent, PaymentInfo, PaymentMethod, PaymentSource, PaymentStatus,
    PlaceOrder, ProductId, ShippingInfo, StatusEntry, UpdateStatus,
};
pub use pricing::{PricingPolicy, PricingSnapshot, ShippingOption, ShippingRates, price_order};
