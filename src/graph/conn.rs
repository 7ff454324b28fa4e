//! Transaction coordinator.
//!
//! A [`Conn`] is opened per operation, either directly on the pool or inside
//! a transaction. Every statement runs under the operation's [`Ctx`] and its
//! driver errors are classified on the way out. [`Conn::finish`] commits or
//! rolls back depending on the operation's outcome.

use tracing::{debug, warn};

use crate::classify::classify;
use crate::context::Ctx;
use crate::driver::{Driver, ExecResult, Rows, Tx};
use crate::error::{Error, Result};
use crate::sql::{Dialect, Statement};

enum Inner<'d> {
    Direct(&'d dyn Driver),
    Tx(Box<dyn Tx>),
}

pub(crate) struct Conn<'d> {
    dialect: Dialect,
    ctx: Ctx,
    inner: Inner<'d>,
}

impl<'d> Conn<'d> {
    pub(crate) async fn open(driver: &'d dyn Driver, ctx: &Ctx, transactional: bool) -> Result<Self> {
        let dialect = driver.dialect();
        let inner = if transactional {
            let tx = ctx
                .run(driver.begin())
                .await?
                .map_err(|e| classify(dialect, e))?;
            debug!(%dialect, "transaction started");
            Inner::Tx(tx)
        } else {
            Inner::Direct(driver)
        };
        Ok(Self {
            dialect,
            ctx: ctx.clone(),
            inner,
        })
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) async fn exec(&mut self, table: &str, stmt: &Statement) -> Result<ExecResult> {
        debug!(kind = stmt.kind(), table, sql = %stmt.sql, args = stmt.args.len(), "exec");
        let result = match &mut self.inner {
            Inner::Direct(driver) => self.ctx.run(driver.exec(stmt)).await?,
            Inner::Tx(tx) => self.ctx.run(tx.exec(stmt)).await?,
        };
        result.map_err(|e| classify(self.dialect, e))
    }

    pub(crate) async fn query(&mut self, table: &str, stmt: &Statement) -> Result<Rows> {
        debug!(kind = stmt.kind(), table, sql = %stmt.sql, args = stmt.args.len(), "query");
        let result = match &mut self.inner {
            Inner::Direct(driver) => self.ctx.run(driver.query(stmt)).await?,
            Inner::Tx(tx) => self.ctx.run(tx.query(stmt)).await?,
        };
        result.map_err(|e| classify(self.dialect, e))
    }

    /// Commit on success, roll back on failure. A context cancelled after
    /// the last statement still rolls back.
    pub(crate) async fn finish<T>(self, result: Result<T>) -> Result<T> {
        let Inner::Tx(tx) = self.inner else {
            return result;
        };
        let result = result.and_then(|v| self.ctx.check().map(|()| v));
        match result {
            Ok(v) => {
                tx.commit().await.map_err(|e| classify(self.dialect, e))?;
                debug!("transaction committed");
                Ok(v)
            }
            Err(err) => Err(rollback(tx, err).await),
        }
    }
}

/// Roll back `tx` after `err`, keeping `err` as the cause.
async fn rollback(tx: Box<dyn Tx>, err: Error) -> Error {
    match tx.rollback().await {
        Ok(()) => {
            debug!(error = %err, "transaction rolled back");
            err
        }
        Err(rollback) => {
            warn!(error = %err, %rollback, "transaction rollback failed");
            Error::Rollback {
                source: Box::new(err),
                rollback,
            }
        }
    }
}
