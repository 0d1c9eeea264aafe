//! Order list views.

pub mod customer_orders;
pub mod order_list;
mod summary;

pub use customer_orders::CustomerOrdersView;
pub use order_list::{OrderListView, OrderPage, OrderQuery, StatusCount};
pub use summary::OrderSummary;
