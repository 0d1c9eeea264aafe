//! Identifiers and caller identity shared by every crate in the workspace.

mod actor;
mod ids;

pub use actor::{Actor, Role};
pub use ids::{AggregateId, UserId};
