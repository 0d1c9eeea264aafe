//! Read side of the order journal.
//!
//! - [`CustomerOrdersView`] answers "my orders", newest first
//! - [`OrderListView`] answers the administrative order list with paging,
//!   status filtering and per-status counts
//! - [`ProjectionProcessor`] keeps both up to date from the journal

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use views::{
    CustomerOrdersView, OrderListView, OrderPage, OrderQuery, OrderSummary, StatusCount,
};
