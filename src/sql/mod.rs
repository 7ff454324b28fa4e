//! Dialect statement builder.
//!
//! Pure builders that render SELECT, INSERT (with RETURNING and upserts),
//! UPDATE and DELETE statements for MySQL, Postgres and SQLite. Identifiers
//! are always quoted for the target dialect and values are always bound as
//! parameters.

mod builder;
mod delete;
mod dialect;
mod insert;
mod predicate;
mod select;
mod update;

pub use builder::Statement;
pub use delete::DeleteBuilder;
pub use dialect::Dialect;
pub use insert::{ConflictAction, InsertBuilder, OnConflict};
pub use predicate::{CmpOp, OrderDirection, OrderTerm, Predicate};
pub use select::{Join, MAX_LIMIT, Selector, TableRef};
pub use update::UpdateBuilder;
