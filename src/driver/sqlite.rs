//! SQLite adapter over a sqlx pool.
//!
//! SQLite has no UUID, JSON or timestamp storage classes, so those values
//! are bound as text and read back as text; the compiler restores the
//! logical type from the caller's scan types.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Executor, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use tracing::info;

use super::{Driver, ExecQuerier, ExecResult, Rows, Tx};
use crate::config::Config;
use crate::spec::Value;
use crate::sql::{Dialect, Statement};

#[derive(Debug, Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config.database_url`, creating the database file if
    /// needed. `sqlite::memory:` databases are private to one connection, so
    /// use `max_connections = 1` with them.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("Invalid SQLite URL: {}", config.database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!(max_connections = config.max_connections, "SQLite pool ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
        Value::Uuid(u) => query.bind(u.to_string()),
        Value::Json(j) => query.bind(j.to_string()),
        Value::Time(t) => query.bind(t.to_rfc3339()),
    }
}

fn prepare(stmt: &Statement) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    stmt.args.iter().fold(sqlx::query(&stmt.sql), bind)
}

/// Decode by the value's runtime storage class.
fn decode(row: &SqliteRow, i: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match raw.type_info().name() {
        "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
        "REAL" | "NUMERIC" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

fn decode_rows(rows: Vec<SqliteRow>) -> Result<Rows, sqlx::Error> {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode(row, i)).collect())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Rows { columns, rows })
}

async fn execute<'c, E>(executor: E, stmt: &Statement) -> Result<ExecResult, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = prepare(stmt).execute(executor).await?;
    Ok(ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: Some(result.last_insert_rowid()),
    })
}

async fn fetch<'c, E>(executor: E, stmt: &Statement) -> Result<Rows, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    decode_rows(prepare(stmt).fetch_all(executor).await?)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        execute(&self.pool, stmt).await
    }

    async fn query(&self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        fetch(&self.pool, stmt).await
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl ExecQuerier for SqliteTx {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        execute(&mut *self.tx, stmt).await
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        fetch(&mut *self.tx, stmt).await
    }
}

#[async_trait]
impl Tx for SqliteTx {
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
