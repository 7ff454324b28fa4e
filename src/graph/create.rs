use tracing::debug;

use super::conn::Conn;
use super::edges::{add_fk_edges, add_m2m_edges, check_add, check_o2o, needs_tx, own_columns};
use super::{Graph, coerce_id};
use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::spec::{CreateSpec, NodeSpec, Value};
use crate::sql::{Dialect, InsertBuilder};

impl Graph {
    /// Insert one node with its edges and return its ID. The ID is also
    /// written back to `spec.node.id.value`.
    pub async fn create_node(&self, ctx: &Ctx, spec: &mut CreateSpec) -> Result<Value> {
        for edge in &spec.edges {
            if !edge.target.pending.is_empty() {
                return Err(Error::validation(
                    &edge.table,
                    "pending references are only valid inside a batch create",
                ));
            }
            check_add(edge)?;
        }
        let mut conn = self.conn(ctx, needs_tx(&spec.edges)).await?;
        let result = create(&mut conn, spec).await;
        let id = conn.finish(result).await?;
        debug!(table = %spec.node.table, %id, "node created");
        Ok(id)
    }
}

/// Insert `spec` on an open connection. Edges must already be validated
/// and their pending references resolved.
pub(super) async fn create(conn: &mut Conn<'_>, spec: &mut CreateSpec) -> Result<Value> {
    check_o2o(conn, &spec.node, None, &spec.edges, &[]).await?;
    let supplied = spec.node.insert_id()?;
    let node = &spec.node;
    let dialect = conn.dialect();

    let mut insert = InsertBuilder::new(dialect, &node.table);
    if let Some(id) = &supplied {
        insert.set(node.id.column.clone(), id.clone());
    }
    for (column, value) in own_columns(node, &spec.fields, &spec.edges)? {
        insert.set(column, value);
    }
    if let Some(on_conflict) = &spec.on_conflict {
        insert.on_conflict(on_conflict.clone());
        if dialect == Dialect::MySql && node.id.field_type.is_numeric() && supplied.is_none() {
            insert.report_conflict_id(node.id.column.clone());
        }
    }

    let id = match supplied {
        Some(id) if spec.on_conflict.is_none() => {
            conn.exec(&node.table, &insert.query()?).await?;
            id
        }
        supplied => inserted_id(conn, node, &mut insert, supplied).await?,
    };
    spec.node.id.value = id.clone();

    let ids = [id.clone()];
    add_m2m_edges(conn, &ids, &spec.edges).await?;
    add_fk_edges(conn, &ids, &spec.edges).await?;
    Ok(id)
}

/// Run `insert` and read back the ID of the inserted (or, on conflict,
/// existing) row.
async fn inserted_id(
    conn: &mut Conn<'_>,
    node: &NodeSpec,
    insert: &mut InsertBuilder,
    supplied: Option<Value>,
) -> Result<Value> {
    let column = &node.id.column;
    if conn.dialect().supports_returning() {
        insert.returning(column.clone());
        let rows = conn.query(&node.table, &insert.query()?).await?;
        return match rows.rows.into_iter().next().and_then(|row| row.into_iter().next()) {
            Some(id) => coerce_id(column, node.id.field_type, id),
            None => supplied.ok_or_else(|| Error::not_found(node.label())),
        };
    }

    let res = conn.exec(&node.table, &insert.query()?).await?;
    if let Some(id) = supplied {
        return Ok(id);
    }
    if !node.id.field_type.is_numeric() {
        return Err(Error::validation(
            column,
            format!("{} does not report generated IDs of type {}", conn.dialect(), node.id.field_type),
        ));
    }
    match res.last_insert_id {
        Some(id) if id != 0 => coerce_id(column, node.id.field_type, Value::Int(id)),
        _ => Err(Error::not_found(node.label())),
    }
}
