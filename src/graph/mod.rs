//! The graph compiler.
//!
//! [`Graph`] is constructed once per database and passed around explicitly.
//! Each method compiles one operation spec into statements for the driver's
//! dialect, runs them (inside a transaction when more than one table is
//! touched) and reports results back through the spec's callbacks.

mod batch;
mod conn;
mod create;
mod delete;
mod edges;
mod query;
mod update;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::context::Ctx;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::spec::{FieldType, ScanValues, Value};
use crate::sql::{Dialect, Selector};

use conn::Conn;

/// Compiles and runs graph operations against one driver.
#[derive(Clone)]
pub struct Graph {
    driver: Arc<dyn Driver>,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("dialect", &self.driver.dialect())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Graph {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    pub fn from_arc(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            default_timeout: None,
        }
    }

    /// Apply the configured statement timeout to [`Graph::context`].
    pub fn with_config(driver: impl Driver + 'static, config: &Config) -> Self {
        Self {
            default_timeout: config.statement_timeout,
            ..Self::new(driver)
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// A fresh context carrying the default deadline, if one is configured.
    pub fn context(&self) -> Ctx {
        match self.default_timeout {
            Some(timeout) => Ctx::with_timeout(timeout),
            None => Ctx::background(),
        }
    }

    async fn conn(&self, ctx: &Ctx, transactional: bool) -> Result<Conn<'_>> {
        Conn::open(self.driver.as_ref(), ctx, transactional).await
    }
}

/// Run `selector` as `SELECT EXISTS (...)`.
async fn probe(conn: &mut Conn<'_>, table: &str, selector: Selector) -> Result<bool> {
    let stmt = selector.exists_query(conn.dialect());
    let rows = conn.query(table, &stmt).await?;
    Ok(rows
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Column types for a result set: the caller's, or raw driver values.
fn scan_types(scan: Option<&mut ScanValues<'_>>, columns: &[String]) -> Result<Vec<FieldType>> {
    match scan {
        Some(scan) => scan(columns),
        None => Ok(vec![FieldType::Other; columns.len()]),
    }
}

/// Restore the logical types of one row.
fn coerce_row(columns: &[String], types: &[FieldType], row: Vec<Value>) -> Result<Vec<Value>> {
    if types.len() != row.len() {
        return Err(Error::validation(
            columns.join(", "),
            format!("scan expects {} values, row has {}", types.len(), row.len()),
        ));
    }
    row.into_iter()
        .zip(types)
        .zip(columns)
        .map(|((value, ty), column)| value.coerce(*ty).map_err(|reason| Error::validation(column, reason)))
        .collect()
}

/// Read back a generated or stored ID as the node's ID type.
fn coerce_id(column: &str, field_type: FieldType, value: Value) -> Result<Value> {
    value
        .coerce(field_type)
        .map_err(|reason| Error::validation(column, reason))
}
