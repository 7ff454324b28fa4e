//! Query compiler and eager loading.
//!
//! The base selection runs first. Each [`EdgeLoad`] then issues one query
//! against the neighbor table (two for M2M, the first against the join
//! table), keyed by the parent values collected from the base rows. Neighbor
//! rows are stitched to parents by key, never by row order.

use std::collections::HashMap;

use tracing::debug;

use super::conn::Conn;
use super::edges::match_ids;
use super::{Graph, coerce_id, coerce_row, scan_types};
use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::spec::{EdgeLoad, EdgeQuerySpec, FieldType, Key, QuerySpec, RelationKind, Value};
use crate::sql::{Selector, TableRef};

type Fetched = (Vec<String>, Vec<Vec<Value>>);

fn qualify(selector: &Selector, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        selector.c(column)
    }
}

/// The FROM table (or neighbor subselect) with the spec's predicate.
fn base_selector(spec: &QuerySpec<'_>) -> Selector {
    spec.from
        .clone()
        .unwrap_or_else(|| Selector::table(&spec.node.table))
        .filter_opt(spec.predicate.clone())
}

/// Selected columns: the requested ones (all node columns by default) plus
/// the key column of every eager-loaded edge.
fn projection(spec: &QuerySpec<'_>) -> Vec<String> {
    let mut columns = if spec.columns.is_empty() {
        spec.node.select_columns()
    } else {
        spec.columns.clone()
    };
    for load in &spec.edges {
        let key = load.key_column(&spec.node);
        if !columns.iter().any(|c| c == key) {
            columns.push(key.to_string());
        }
    }
    columns
}

fn selector(spec: &QuerySpec<'_>, columns: &[String], limit: Option<u64>) -> Selector {
    let base = base_selector(spec);
    let qualified: Vec<String> = columns.iter().map(|c| qualify(&base, c)).collect();
    let mut selector = base.columns(qualified);
    for term in &spec.order {
        selector = selector.order_by(term.clone());
    }
    if let Some(limit) = limit.or(spec.limit) {
        selector = selector.limit(limit);
    }
    if let Some(offset) = spec.offset {
        selector = selector.offset(offset);
    }
    if spec.unique {
        selector = selector.distinct();
    }
    selector
}

/// The spec's limit, capped at `cap`.
fn capped(spec: &QuerySpec<'_>, cap: u64) -> Option<u64> {
    Some(spec.limit.map_or(cap, |limit| limit.min(cap)))
}

impl Graph {
    /// Run the selection, hand each row to `spec.assign` and load the
    /// requested edges. Returns the number of rows.
    pub async fn query_nodes(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<usize> {
        let (columns, rows) = self.fetch(ctx, spec, None).await?;
        self.deliver(ctx, spec, &columns, rows).await
    }

    /// Like [`Graph::query_nodes`] for the first row only. No rows is
    /// [`Error::NotFound`].
    pub async fn first(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<()> {
        let (columns, rows) = {
            let limit = capped(spec, 1);
            self.fetch(ctx, spec, limit).await?
        };
        if rows.is_empty() {
            return Err(Error::not_found(spec.node.label()));
        }
        self.deliver(ctx, spec, &columns, rows).await?;
        Ok(())
    }

    /// Like [`Graph::query_nodes`] when exactly one row matches. Nothing is
    /// assigned unless the result is singular.
    pub async fn only(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<()> {
        let (columns, rows) = {
            let limit = capped(spec, 2);
            self.fetch(ctx, spec, limit).await?
        };
        match rows.len() {
            0 => Err(Error::not_found(spec.node.label())),
            1 => self.deliver(ctx, spec, &columns, rows).await.map(drop),
            _ => Err(Error::not_singular(spec.node.label())),
        }
    }

    pub async fn ids(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<Vec<Value>> {
        self.fetch_ids(ctx, spec, None).await
    }

    pub async fn first_id(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<Value> {
        let ids = {
            let limit = capped(spec, 1);
            self.fetch_ids(ctx, spec, limit).await?
        };
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::not_found(spec.node.label()))
    }

    pub async fn only_id(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<Value> {
        let mut ids = {
            let limit = capped(spec, 2);
            self.fetch_ids(ctx, spec, limit).await?
        };
        match ids.len() {
            0 => Err(Error::not_found(spec.node.label())),
            1 => Ok(ids.remove(0)),
            _ => Err(Error::not_singular(spec.node.label())),
        }
    }

    /// `SELECT COUNT(...)` of the selection. ORDER BY is dropped; a limit or
    /// offset moves the selection into a subquery.
    pub async fn count_nodes(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<u64> {
        let base = base_selector(spec);
        let id = qualify(&base, &spec.node.id.column);
        let selector = if spec.limit.is_some() || spec.offset.is_some() {
            let inner = selector(spec, &[spec.node.id.column.clone()], None);
            Selector::new(TableRef::subquery(inner, "t")).count()
        } else if spec.unique {
            base.columns([id]).distinct().count()
        } else {
            base.count()
        };
        let mut conn = self.conn(ctx, false).await?;
        let rows = conn
            .query(&spec.node.table, &selector.query(conn.dialect()))
            .await?;
        let count = rows
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::validation(&spec.node.table, "COUNT returned no value"))?;
        Ok(count.max(0) as u64)
    }

    /// Whether the selection has at least one row.
    pub async fn exist(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>) -> Result<bool> {
        let base = base_selector(spec);
        let id = qualify(&base, &spec.node.id.column);
        let selector = base.columns([id]);
        let mut conn = self.conn(ctx, false).await?;
        let rows = conn
            .query(&spec.node.table, &selector.exists_query(conn.dialect()))
            .await?;
        Ok(rows
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Read the (from, to) pairs of an M2M join table, oriented from the
    /// edge's declaring side.
    pub async fn query_edges(&self, ctx: &Ctx, spec: &mut EdgeQuerySpec<'_>) -> Result<usize> {
        let edge = &spec.edge;
        if edge.rel != RelationKind::M2M {
            return Err(Error::validation(
                &edge.table,
                format!("{} edges have no join table to query", edge.rel),
            ));
        }
        let (from, to) = edge.join_columns()?;
        let selector = Selector::table(&edge.table)
            .columns([from, to])
            .filter_opt(spec.predicate.clone());
        let mut conn = self.conn(ctx, false).await?;
        let rows = conn.query(&edge.table, &selector.query(conn.dialect())).await?;
        let n = rows.len();
        for row in rows.rows {
            let mut values = row.into_iter();
            let (Some(from_id), Some(to_id)) = (values.next(), values.next()) else {
                return Err(Error::validation(&edge.table, "edge row has fewer than two columns"));
            };
            let to_id = coerce_id(to, edge.target.id.field_type, to_id)?;
            (spec.assign)(from_id, to_id)?;
        }
        Ok(n)
    }

    /// Load the neighbors of the parent rows whose key values are `keys`
    /// (one per parent row, in row order). Returns the number of neighbor
    /// rows assigned.
    pub async fn load_edge(&self, ctx: &Ctx, load: &mut EdgeLoad<'_>, keys: &[Value]) -> Result<usize> {
        let mut parents: HashMap<Key, Vec<usize>> = HashMap::new();
        let mut unique = Vec::new();
        for (i, value) in keys.iter().enumerate() {
            let Some(key) = value.key() else {
                continue;
            };
            let positions = parents.entry(key).or_default();
            if positions.is_empty() {
                unique.push(value.clone());
            }
            positions.push(i);
        }
        if unique.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn(ctx, false).await?;
        let n = match load.edge.rel {
            RelationKind::M2M => {
                let (own, other) = load.edge.join_columns()?;
                let join = Selector::table(&load.edge.table)
                    .columns([own, other])
                    .filter(match_ids(own, &unique));
                let rows = conn
                    .query(&load.edge.table, &join.query(conn.dialect()))
                    .await?;
                let mut owners: HashMap<Key, Vec<usize>> = HashMap::new();
                let mut targets = Vec::new();
                for row in rows.rows {
                    let mut values = row.into_iter();
                    let (Some(own_id), Some(other_id)) = (values.next(), values.next()) else {
                        continue;
                    };
                    let (Some(own_key), Some(other_key)) = (own_id.key(), other_id.key()) else {
                        continue;
                    };
                    let Some(positions) = parents.get(&own_key) else {
                        continue;
                    };
                    let entry = owners.entry(other_key).or_default();
                    if entry.is_empty() {
                        targets.push(other_id);
                    }
                    entry.extend(positions);
                }
                if targets.is_empty() {
                    return Ok(0);
                }
                let column = load.target.id.column.clone();
                load_targets(&mut conn, load, &column, &targets, &owners).await?
            }
            _ if load.edge.writes_own_column() => {
                let column = load.target.id.column.clone();
                load_targets(&mut conn, load, &column, &unique, &parents).await?
            }
            _ => {
                let column = load.edge.fk_column()?.to_string();
                load_targets(&mut conn, load, &column, &unique, &parents).await?
            }
        };
        debug!(table = %load.target.table, parents = keys.len(), rows = n, "edge loaded");
        Ok(n)
    }

    async fn fetch(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>, limit: Option<u64>) -> Result<Fetched> {
        let columns = projection(spec);
        let selector = selector(spec, &columns, limit);
        let mut conn = self.conn(ctx, false).await?;
        let rows = conn
            .query(&spec.node.table, &selector.query(conn.dialect()))
            .await?;
        if rows.is_empty() {
            return Ok((columns, Vec::new()));
        }
        let types = scan_types(spec.scan_values.as_mut(), &columns)?;
        let rows = rows
            .rows
            .into_iter()
            .map(|row| coerce_row(&columns, &types, row))
            .collect::<Result<Vec<_>>>()?;
        Ok((columns, rows))
    }

    async fn fetch_ids(&self, ctx: &Ctx, spec: &mut QuerySpec<'_>, limit: Option<u64>) -> Result<Vec<Value>> {
        let node = &spec.node;
        let selector = selector(spec, &[node.id.column.clone()], limit);
        let mut conn = self.conn(ctx, false).await?;
        let rows = conn.query(&node.table, &selector.query(conn.dialect())).await?;
        rows.rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|id| coerce_id(&node.id.column, node.id.field_type, id))
            .collect()
    }

    /// Assign fetched rows and eager-load their edges.
    async fn deliver(
        &self,
        ctx: &Ctx,
        spec: &mut QuerySpec<'_>,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> Result<usize> {
        let n = rows.len();
        let positions: Vec<Option<usize>> = spec
            .edges
            .iter()
            .map(|load| {
                let key = load.key_column(&spec.node);
                columns.iter().position(|c| c == key)
            })
            .collect();
        let mut keys: Vec<Vec<Value>> = vec![Vec::with_capacity(n); spec.edges.len()];
        for row in rows {
            for (keys, position) in keys.iter_mut().zip(&positions) {
                keys.push(position.map_or(Value::Null, |p| row[p].clone()));
            }
            if let Some(assign) = spec.assign.as_mut() {
                assign(columns, row)?;
            }
        }
        if n > 0 {
            for (load, keys) in spec.edges.iter_mut().zip(&keys) {
                self.load_edge(ctx, load, keys).await?;
            }
        }
        Ok(n)
    }
}

/// Query the neighbor table for rows whose `column` is one of `values` and
/// assign each to the parents indexed under its `column` value.
async fn load_targets(
    conn: &mut Conn<'_>,
    load: &mut EdgeLoad<'_>,
    column: &str,
    values: &[Value],
    index: &HashMap<Key, Vec<usize>>,
) -> Result<usize> {
    let target = &load.target;
    let mut columns = target.select_columns();
    if !columns.iter().any(|c| c == column) {
        columns.push(column.to_string());
    }
    let Some(position) = columns.iter().position(|c| c == column) else {
        return Ok(0);
    };
    let table = Selector::table(&target.table);
    let qualified: Vec<String> = columns.iter().map(|c| qualify(&table, c)).collect();
    let matched = match_ids(&qualify(&table, column), values);
    let mut selector = table
        .columns(qualified)
        .filter(matched)
        .filter_opt(load.predicate.clone());
    for term in &load.order {
        selector = selector.order_by(term.clone());
    }
    let rows = conn.query(&target.table, &selector.query(conn.dialect())).await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let types = (load.scan_values)(&columns)?;
    let mut n = 0;
    for row in rows.rows {
        let row = coerce_row(&columns, &types, row)?;
        let Some(parents) = row[position].key().and_then(|key| index.get(&key)) else {
            continue;
        };
        let mut parents = parents.clone();
        parents.sort_unstable();
        parents.dedup();
        (load.assign)(&parents, &columns, row)?;
        n += 1;
    }
    Ok(n)
}
