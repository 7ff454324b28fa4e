use std::collections::BTreeSet;

use tracing::debug;

use super::conn::Conn;
use super::edges::{check_add, check_o2o, match_ids, own_columns, set_external_edges};
use super::{Graph, coerce_id, coerce_row, probe, scan_types};
use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::spec::{RelationKind, UpdateSpec, Value};
use crate::sql::{Dialect, Predicate, Selector, UpdateBuilder};

impl Graph {
    /// Update the node whose ID is set on `spec.node`. Fails with
    /// [`Error::NotFound`] when no such row matches `spec.predicate`.
    pub async fn update_node(&self, ctx: &Ctx, spec: &mut UpdateSpec<'_>) -> Result<()> {
        let id = spec.node.id.bind_value()?;
        if id.is_null() {
            return Err(Error::validation(
                &spec.node.id.column,
                "updating a single node requires its ID",
            ));
        }
        check_update(spec)?;
        let mut conn = self.conn(ctx, true).await?;
        let result = update_one(&mut conn, spec, &id).await;
        conn.finish(result).await?;
        debug!(table = %spec.node.table, %id, "node updated");
        Ok(())
    }

    /// Update every node matching `spec.predicate` and return how many
    /// matched.
    pub async fn update_nodes(&self, ctx: &Ctx, spec: &mut UpdateSpec<'_>) -> Result<u64> {
        check_update(spec)?;
        let multiple = spec
            .edges
            .add
            .iter()
            .chain(&spec.edges.clear)
            .any(|e| e.writes_external())
            || spec.edges.add.iter().any(|e| e.rel == RelationKind::O2O);

        let affected = if multiple {
            let mut conn = self.conn(ctx, true).await?;
            let result = update_many(&mut conn, spec).await;
            conn.finish(result).await?
        } else {
            let mut conn = self.conn(ctx, false).await?;
            let mut update = build_update(conn.dialect(), spec)?;
            if update.is_empty() {
                return Ok(0);
            }
            if let Some(predicate) = &spec.predicate {
                update.filter(predicate.clone());
            }
            conn.exec(&spec.node.table, &update.query()).await?.rows_affected
        };
        debug!(table = %spec.node.table, affected, "nodes updated");
        Ok(affected)
    }
}

fn check_update(spec: &UpdateSpec<'_>) -> Result<()> {
    for edge in &spec.edges.add {
        if !edge.target.pending.is_empty() {
            return Err(Error::validation(
                &edge.table,
                "pending references are only valid inside a batch create",
            ));
        }
        check_add(edge)?;
    }
    for edge in &spec.edges.clear {
        edge.validate()?;
    }
    let cleared: BTreeSet<&str> = spec.fields.clear.iter().map(String::as_str).collect();
    for field in spec.fields.set.iter().chain(&spec.fields.add) {
        if cleared.contains(field.column.as_str()) {
            return Err(Error::validation(
                &field.column,
                "column cannot be set and cleared in the same update",
            ));
        }
    }
    for field in &spec.fields.add {
        if !field.field_type.is_numeric() {
            return Err(Error::validation(
                &field.column,
                format!("cannot add to a column of type {}", field.field_type),
            ));
        }
    }
    Ok(())
}

/// The UPDATE of the node rows themselves, without a WHERE clause. Own FK
/// columns of cleared edges are NULLed unless the same update sets them.
fn build_update(dialect: Dialect, spec: &UpdateSpec<'_>) -> Result<UpdateBuilder> {
    let node = &spec.node;
    let sets = own_columns(node, &spec.fields.set, &spec.edges.add)?;
    let mut update = UpdateBuilder::new(dialect, &node.table);
    for column in &spec.fields.clear {
        node.check_column(column)?;
        update.set_null(column.clone());
    }
    for edge in spec.edges.clear.iter().filter(|e| e.writes_own_column()) {
        let fk = edge.fk_column()?;
        if !sets.iter().any(|(column, _)| column == fk) {
            update.set_null(fk);
        }
    }
    for (column, value) in sets {
        update.set(column, value);
    }
    for field in &spec.fields.add {
        node.check_column(&field.column)?;
        update.add(field.column.clone(), field.bind_value()?);
    }
    Ok(update)
}

async fn update_one(conn: &mut Conn<'_>, spec: &mut UpdateSpec<'_>, id: &Value) -> Result<()> {
    let node = &spec.node;
    check_o2o(conn, node, Some(id), &spec.edges.add, &spec.edges.clear).await?;

    let by_id = Predicate::eq(node.id.column.clone(), id.clone());
    let mut update = build_update(conn.dialect(), spec)?;
    let mut affected = 0;
    if !update.is_empty() {
        update.filter(by_id.clone());
        if let Some(predicate) = &spec.predicate {
            update.filter(predicate.clone());
        }
        affected = conn.exec(&node.table, &update.query()).await?.rows_affected;
    }
    // MySQL reports unchanged rows as unaffected, so zero is not conclusive.
    if affected == 0 {
        let exists = Selector::table(&node.table)
            .filter(by_id.clone())
            .filter_opt(spec.predicate.clone());
        if !probe(conn, &node.table, exists).await? {
            return Err(Error::not_found(node.label()));
        }
    }

    set_external_edges(conn, std::slice::from_ref(id), &spec.edges).await?;

    let Some(assign) = spec.assign.as_mut() else {
        return Ok(());
    };
    let columns = node.select_columns();
    let select = Selector::table(&node.table)
        .columns(columns.iter().cloned())
        .filter(by_id);
    let rows = conn.query(&node.table, &select.query(conn.dialect())).await?;
    let Some(row) = rows.rows.into_iter().next() else {
        return Err(Error::not_found(node.label()));
    };
    let types = scan_types(spec.scan_values.as_mut(), &columns)?;
    assign(&columns, coerce_row(&columns, &types, row)?)
}

async fn update_many(conn: &mut Conn<'_>, spec: &mut UpdateSpec<'_>) -> Result<u64> {
    let node = &spec.node;
    let select = Selector::table(&node.table)
        .columns([node.id.column.clone()])
        .filter_opt(spec.predicate.clone());
    let rows = conn.query(&node.table, &select.query(conn.dialect())).await?;
    let ids = rows
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .map(|id| coerce_id(&node.id.column, node.id.field_type, id))
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Ok(0);
    }

    if spec.edges.add.iter().any(|e| e.rel == RelationKind::O2O) {
        if ids.len() > 1 {
            let message = format!("unable to link O2O edge to {} {} nodes", ids.len(), node.label());
            return Err(Error::constraint(message.clone(), message));
        }
        check_o2o(conn, node, ids.first(), &spec.edges.add, &spec.edges.clear).await?;
    }

    let mut update = build_update(conn.dialect(), spec)?;
    if !update.is_empty() {
        update.filter(match_ids(&node.id.column, &ids));
        conn.exec(&node.table, &update.query()).await?;
    }
    set_external_edges(conn, &ids, &spec.edges).await?;
    Ok(ids.len() as u64)
}
