use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row, Transaction, TypeInfo, ValueRef};
use tracing::info;
use uuid::Uuid;

use super::{Driver, ExecQuerier, ExecResult, Rows, Tx};
use crate::config::Config;
use crate::spec::Value;
use crate::sql::{Dialect, Statement};

/// Postgres adapter over a sqlx pool.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .context("Failed to connect to Postgres database")?;

        info!(max_connections = config.max_connections, "Postgres pool ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
        Value::Uuid(u) => query.bind(*u),
        Value::Json(j) => query.bind(j),
        Value::Time(t) => query.bind(*t),
    }
}

fn prepare(stmt: &Statement) -> Query<'_, Postgres, PgArguments> {
    stmt.args.iter().fold(sqlx::query(&stmt.sql), bind)
}

fn decode(row: &PgRow, i: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match raw.type_info().name() {
        "BOOL" => Value::Bool(row.try_get(i)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(i)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(i)?.into()),
        "INT8" => Value::Int(row.try_get(i)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(i)?.into()),
        "FLOAT8" => Value::Float(row.try_get(i)?),
        "BYTEA" => Value::Bytes(row.try_get(i)?),
        "UUID" => Value::Uuid(row.try_get::<Uuid, _>(i)?),
        "JSON" | "JSONB" => Value::Json(row.try_get(i)?),
        "TIMESTAMPTZ" => Value::Time(row.try_get::<DateTime<Utc>, _>(i)?),
        "TIMESTAMP" => Value::Time(row.try_get::<NaiveDateTime, _>(i)?.and_utc()),
        _ => Value::String(row.try_get(i)?),
    };
    Ok(value)
}

fn decode_rows(rows: Vec<PgRow>) -> Result<Rows, sqlx::Error> {
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
    E: Executor<'c, Database = Postgres>,
{
    let result = prepare(stmt).execute(executor).await?;
    Ok(ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: None,
    })
}

async fn fetch<'c, E>(executor: E, stmt: &Statement) -> Result<Rows, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    decode_rows(prepare(stmt).fetch_all(executor).await?)
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn exec(&self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        execute(&self.pool, stmt).await
    }

    async fn query(&self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        fetch(&self.pool, stmt).await
    }

    async fn begin(&self) -> Result<Box<dyn Tx>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ExecQuerier for PostgresTx {
    async fn exec(&mut self, stmt: &Statement) -> Result<ExecResult, sqlx::Error> {
        execute(&mut *self.tx, stmt).await
    }

    async fn query(&mut self, stmt: &Statement) -> Result<Rows, sqlx::Error> {
        fetch(&mut *self.tx, stmt).await
    }
}

#[async_trait]
impl Tx for PostgresTx {
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
