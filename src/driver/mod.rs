//! Driver seam between the compiler and a database connection.
//!
//! The compiler only ever talks to a [`Driver`]: it executes compiled
//! [`Statement`]s and opens transactions. Values cross the seam as
//! [`Value`]s in both directions, so adapters only need to know how to bind
//! and decode their own wire types.

use async_trait::async_trait;

use crate::spec::Value;
use crate::sql::{Dialect, Statement};

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::MySqlDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Last generated ID, on drivers that report one.
    pub last_insert_id: Option<i64>,
}

/// A buffered result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `column` in each row.
    pub fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Something statements can run against: a pool or an open transaction.
#[async_trait]
pub trait ExecQuerier: Send {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, sqlx::Error>;

    async fn query(&mut self, stmt: &Statement) -> Result<Rows, sqlx::Error>;
}

/// An open transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait Tx: ExecQuerier {
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error>;
}

/// A shared, pooled connection to one database.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, sqlx::Error>;

    async fn query(&self, stmt: &Statement) -> Result<Rows, sqlx::Error>;

    async fn begin(&self) -> Result<Box<dyn Tx>, sqlx::Error>;
}
