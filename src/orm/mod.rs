//! Typed layer over the graph compiler.
//!
//! Implement [`Entity`] for a row type and query it with
//! [`Graph::query`](crate::Graph::query). Edges are eager-loaded with
//! [`EdgeLoader`]s after the parent rows are read, and handed to a closure
//! that attaches them to their parents.

mod entity;
mod loader;
mod query;

pub use entity::{Entity, FromValue, Record};
pub use loader::EdgeLoader;
pub use query::EntityQuery;
