//! MySQL adapter over a sqlx pool.
//!
//! UUIDs are bound as text, matching `CHAR(36)` ID columns. Generated IDs
//! come back through `LAST_INSERT_ID()` on the query result.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, MySql, Row, Transaction, TypeInfo, ValueRef};
use tracing::info;

use super::{Driver, ExecQuerier, ExecResult, Rows, Tx};
use crate::config::Config;
use crate::spec::Value;
use crate::sql::{Dialect, Statement};

#[derive(Debug, Clone)]
pub struct MySqlDriver {
    pool: MySqlPool,
}

impl MySqlDriver {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .context("Failed to connect to MySQL database")?;

        info!(max_connections = config.max_connections, "MySQL pool ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn bind<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
        Value::Uuid(u) => query.bind(u.to_string()),
        Value::Json(j) => query.bind(j),
        Value::Time(t) => query.bind(*t),
    }
}

fn prepare(stmt: &Statement) -> Query<'_, MySql, MySqlArguments> {
    stmt.args.iter().fold(sqlx::query(&stmt.sql), bind)
}

fn decode(row: &MySqlRow, i: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match raw.type_info().name() {
        "BOOLEAN" => Value::Bool(row.try_get(i)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::Int(row.try_get_unchecked::<i64, _>(i)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let n = row.try_get_unchecked::<u64, _>(i)?;
            Value::Int(i64::try_from(n).map_err(|e| sqlx::Error::Decode(Box::new(e)))?)
        }
        "FLOAT" | "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            Value::Bytes(row.try_get(i)?)
        }
        "JSON" => Value::Json(row.try_get(i)?),
        "TIMESTAMP" => Value::Time(row.try_get::<DateTime<Utc>, _>(i)?),
        "DATETIME" => Value::Time(row.try_get::<NaiveDateTime, _>(i)?.and_utc()),
        _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

fn decode_rows(rows: Vec<MySqlRow>) -> Result<Rows, sqlx::Error> {
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
    E: Executor<'c, Database = MySql>,
{
    let result = prepare(stmt).execute(executor).await?;
    Ok(ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: i64::try_from(result.last_insert_id()).ok(),
    })
}

async fn fetch<'c, E>(executor: E, stmt: &Statement) -> Result<Rows, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    decode_rows(prepare(stmt).fetch_all(executor).await?)
}

#[async_trait]
impl Driver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        execute(&self.pool, stmt).await
    }

    async fn query(&self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        fetch(&self.pool, stmt).await
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx { tx }))
    }
}

struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl ExecQuerier for MySqlTx {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        execute(&mut *self.tx, stmt).await
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        fetch(&mut *self.tx, stmt).await
    }
}

#[async_trait]
impl Tx for MySqlTx {
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
