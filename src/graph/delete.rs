use tracing::debug;

use super::Graph;
use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::spec::DeleteSpec;
use crate::sql::{DeleteBuilder, Predicate};

impl Graph {
    /// Delete every node matching `spec.predicate` and return the number of
    /// deleted rows.
    pub async fn delete_nodes(&self, ctx: &Ctx, spec: &DeleteSpec) -> Result<u64> {
        let mut conn = self.conn(ctx, false).await?;
        let mut delete = DeleteBuilder::new(conn.dialect(), &spec.node.table);
        if let Some(predicate) = &spec.predicate {
            delete.filter(predicate.clone());
        }
        let res = conn.exec(&spec.node.table, &delete.query()).await?;
        debug!(table = %spec.node.table, deleted = res.rows_affected, "nodes deleted");
        Ok(res.rows_affected)
    }

    /// Delete the node whose ID is set on `spec.node`.
    pub async fn delete_node(&self, ctx: &Ctx, spec: &DeleteSpec) -> Result<()> {
        let node = &spec.node;
        let id = node.id.bind_value()?;
        if id.is_null() {
            return Err(Error::validation(
                &node.id.column,
                "deleting a single node requires its ID",
            ));
        }
        let mut conn = self.conn(ctx, false).await?;
        let mut delete = DeleteBuilder::new(conn.dialect(), &node.table);
        delete.filter(Predicate::eq(node.id.column.clone(), id));
        if let Some(predicate) = &spec.predicate {
            delete.filter(predicate.clone());
        }
        match conn.exec(&node.table, &delete.query()).await?.rows_affected {
            0 => Err(Error::not_found(node.label())),
            _ => Ok(()),
        }
    }
}
