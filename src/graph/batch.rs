//! Batch inserts.
//!
//! Independent nodes are coalesced into one multi-row INSERT. Once any node
//! references another through a pending edge, the batch becomes a chain:
//! nodes are inserted one at a time in dependency order inside a single
//! transaction, each seeing the IDs of the nodes created before it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::conn::Conn;
use super::create::create;
use super::edges::{
    O2oClaims, add_fk_edges, check_add, check_o2o, m2m_insert, m2m_rows, needs_tx, own_columns,
};
use super::{Graph, coerce_id};
use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::spec::{BatchCreateSpec, CreateSpec, FieldType, NodeSpec, RelationKind, Value};
use crate::sql::{ConflictAction, Dialect, InsertBuilder, OnConflict, Predicate, Selector};

impl Graph {
    /// Insert every node of `spec` and return their IDs in input order.
    pub async fn batch_create(&self, ctx: &Ctx, spec: &mut BatchCreateSpec) -> Result<Vec<Value>> {
        let Some(first) = spec.nodes.first() else {
            return Ok(Vec::new());
        };
        let table = first.node.table.clone();
        if let Some(other) = spec.nodes.iter().find(|n| n.node.table != table) {
            return Err(Error::validation(
                &other.node.table,
                format!("batch insert into {table} cannot include rows of another table"),
            ));
        }
        for edge in spec.nodes.iter().flat_map(|n| &n.edges) {
            check_add(edge)?;
        }

        let ids = if spec.nodes.iter().any(|n| n.dependencies().next().is_some()) {
            let order = creation_order(&spec.nodes)?;
            let mut conn = self.conn(ctx, true).await?;
            let result = create_chain(&mut conn, spec, &order).await;
            conn.finish(result).await?
        } else {
            let transactional = spec.nodes.iter().any(|n| needs_tx(&n.edges));
            let mut conn = self.conn(ctx, transactional).await?;
            let result = create_bulk(&mut conn, spec).await;
            conn.finish(result).await?
        };
        debug!(%table, count = ids.len(), "batch created");
        Ok(ids)
    }
}

/// Topological order of the batch. Among the nodes that are ready, the one
/// with the smallest index goes first, so independent nodes keep their
/// input order.
fn creation_order(nodes: &[CreateSpec]) -> Result<Vec<usize>> {
    let n = nodes.len();
    let mut pending = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, node) in nodes.iter().enumerate() {
        for dep in node.dependencies() {
            if dep >= n {
                return Err(Error::validation(
                    &node.node.table,
                    format!("batch node {i} references node {dep}, but the batch has {n} nodes"),
                ));
            }
            pending[i] += 1;
            dependents[dep].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }
    if order.len() != n {
        return Err(Error::validation(
            &nodes[0].node.table,
            "batch references form a cycle",
        ));
    }
    Ok(order)
}

async fn create_chain(
    conn: &mut Conn<'_>,
    spec: &mut BatchCreateSpec,
    order: &[usize],
) -> Result<Vec<Value>> {
    let mut ids = vec![Value::Null; spec.nodes.len()];
    let mut claims = O2oClaims::default();
    for &i in order {
        let node = &mut spec.nodes[i];
        for edge in &mut node.edges {
            for dep in std::mem::take(&mut edge.target.pending) {
                let id = &ids[dep];
                if id.is_null() {
                    return Err(Error::not_found(node.node.label()));
                }
                edge.target.nodes.push(id.clone());
            }
        }
        claims.claim(&node.node, &node.edges)?;
        if let Some(on_conflict) = &spec.on_conflict {
            node.on_conflict = Some(on_conflict.clone());
        }
        ids[i] = create(conn, node).await?;
    }
    Ok(ids)
}

async fn create_bulk(conn: &mut Conn<'_>, spec: &mut BatchCreateSpec) -> Result<Vec<Value>> {
    let dialect = conn.dialect();
    let mut rows = Vec::with_capacity(spec.nodes.len());
    let mut claims = O2oClaims::default();
    for node in &mut spec.nodes {
        claims.claim(&node.node, &node.edges)?;
        check_o2o(conn, &node.node, None, &node.edges, &[]).await?;
        let id = node.node.insert_id()?;
        let values = own_columns(&node.node, &node.fields, &node.edges)?;
        rows.push((id, values));
    }

    let node = &spec.nodes[0].node;
    let supplied: Vec<Value> = rows.iter().filter_map(|(id, _)| id.clone()).collect();
    if !supplied.is_empty() && supplied.len() != rows.len() {
        return Err(Error::validation(
            &node.id.column,
            "batch mixes supplied and generated IDs",
        ));
    }
    let mut columns: Vec<String> = Vec::new();
    if !supplied.is_empty() {
        columns.push(node.id.column.clone());
    }
    let union: BTreeSet<&str> = rows
        .iter()
        .flat_map(|(_, values)| values.iter().map(|(c, _)| c.as_str()))
        .collect();
    columns.extend(union.into_iter().map(str::to_string));

    if columns.is_empty() {
        let mut ids = Vec::with_capacity(spec.nodes.len());
        for node in &mut spec.nodes {
            ids.push(create(conn, node).await?);
        }
        return Ok(ids);
    }

    let mut insert = InsertBuilder::new(dialect, &node.table);
    insert.columns(columns.iter().cloned());
    let mut bound = Vec::with_capacity(rows.len());
    for (id, values) in rows {
        let mut values: BTreeMap<String, Value> = values.into_iter().collect();
        if let Some(id) = id {
            values.insert(node.id.column.clone(), id);
        }
        let row: Vec<Value> = columns
            .iter()
            .map(|c| values.remove(c).unwrap_or(Value::Null))
            .collect();
        insert.values(row.clone());
        bound.push(row);
    }
    let on_conflict = spec
        .on_conflict
        .clone()
        .or_else(|| spec.nodes[0].on_conflict.clone());

    let ids = match on_conflict {
        Some(on_conflict) => {
            insert.on_conflict(on_conflict.clone());
            let rows = BoundRows {
                columns: &columns,
                values: &bound,
                generated: supplied.is_empty(),
            };
            upserted_ids(conn, node, &mut insert, &rows, &on_conflict).await?
        }
        None if !supplied.is_empty() => {
            conn.exec(&node.table, &insert.query()?).await?;
            supplied
        }
        None => inserted_ids(conn, node, bound.len(), &mut insert).await?,
    };
    for (node, id) in spec.nodes.iter_mut().zip(&ids) {
        node.node.id.value = id.clone();
    }

    add_batch_edges(conn, dialect, spec, &ids).await?;
    Ok(ids)
}

/// IDs generated for a plain multi-row insert, by position.
async fn inserted_ids(
    conn: &mut Conn<'_>,
    node: &NodeSpec,
    count: usize,
    insert: &mut InsertBuilder,
) -> Result<Vec<Value>> {
    let column = &node.id.column;
    let mut ids = vec![Value::Null; count];
    if conn.dialect().supports_returning() {
        insert.returning(column.clone());
        let rows = conn.query(&node.table, &insert.query()?).await?;
        for (slot, row) in ids.iter_mut().zip(rows.rows) {
            if let Some(id) = row.into_iter().next() {
                *slot = coerce_id(column, node.id.field_type, id)?;
            }
        }
        return Ok(ids);
    }

    check_generated(conn.dialect(), node)?;
    let res = conn.exec(&node.table, &insert.query()?).await?;
    let first = res.last_insert_id.ok_or_else(|| Error::not_found(node.label()))?;
    for (i, slot) in ids.iter_mut().enumerate().take(res.rows_affected as usize) {
        *slot = coerce_id(column, node.id.field_type, Value::Int(first + i as i64))?;
    }
    Ok(ids)
}

fn check_generated(dialect: Dialect, node: &NodeSpec) -> Result<()> {
    if node.id.field_type.is_numeric() {
        return Ok(());
    }
    Err(Error::validation(
        &node.id.column,
        format!("{dialect} does not report generated IDs of type {}", node.id.field_type),
    ))
}

/// The values written by a multi-row insert, one row per batch node.
struct BoundRows<'a> {
    columns: &'a [String],
    values: &'a [Vec<Value>],
    /// IDs are assigned by the database.
    generated: bool,
}

impl BoundRows<'_> {
    /// Positions of the columns that identify a row after an upsert: the
    /// conflict columns, or every written column when none are named.
    fn keys(&self, on_conflict: &OnConflict) -> Vec<usize> {
        let keys: Vec<usize> = on_conflict
            .columns
            .iter()
            .filter_map(|c| self.columns.iter().position(|column| column == c))
            .collect();
        if keys.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            keys
        }
    }

    /// `(k1 = ? AND k2 = ?) OR ...` over every row.
    fn matching(&self, keys: &[usize]) -> Predicate {
        Predicate::or_any(self.values.iter().map(|row| {
            Predicate::and_all(keys.iter().map(|&k| match &row[k] {
                Value::Null => Predicate::is_null(self.columns[k].clone()),
                value => Predicate::eq(self.columns[k].clone(), value.clone()),
            }))
        }))
    }
}

/// IDs of a multi-row upsert. Stored rows are matched back to the batch
/// nodes by their key columns, so a row the conflict policy skipped leaves
/// its node NULL.
async fn upserted_ids(
    conn: &mut Conn<'_>,
    node: &NodeSpec,
    insert: &mut InsertBuilder,
    rows: &BoundRows<'_>,
    on_conflict: &OnConflict,
) -> Result<Vec<Value>> {
    let keys = rows.keys(on_conflict);
    let returned = std::iter::once(node.id.column.clone())
        .chain(keys.iter().map(|&k| rows.columns[k].clone()));

    let stored = if conn.dialect().supports_returning() {
        for column in returned {
            insert.returning(column);
        }
        conn.query(&node.table, &insert.query()?).await?.rows
    } else {
        if rows.generated {
            check_generated(conn.dialect(), node)?;
        }
        let res = conn.exec(&node.table, &insert.query()?).await?;
        let mut select = Selector::table(&node.table)
            .columns(returned)
            .filter(rows.matching(&keys));
        // Rows inserted by this statement have IDs from LAST_INSERT_ID()
        // upwards; older rows only conflicted.
        if rows.generated && on_conflict.action == ConflictAction::DoNothing {
            match res.last_insert_id {
                Some(first) if first != 0 && res.rows_affected > 0 => {
                    select = select.filter(Predicate::gte(node.id.column.clone(), first));
                }
                _ => return Ok(vec![Value::Null; rows.values.len()]),
            }
        }
        let stmt = select.query(conn.dialect());
        conn.query(&node.table, &stmt).await?.rows
    };

    let mut ids = vec![Value::Null; rows.values.len()];
    for row in stored {
        let mut row = row.into_iter();
        let Some(id) = row.next() else {
            continue;
        };
        let key: Vec<Value> = row.collect();
        let slot = rows.values.iter().zip(&ids).position(|(values, id)| {
            id.is_null()
                && key.len() == keys.len()
                && keys.iter().zip(&key).all(|(&k, stored)| same_value(stored, &values[k]))
        });
        if let Some(slot) = slot {
            ids[slot] = coerce_id(&node.id.column, node.id.field_type, id)?;
        }
    }
    Ok(ids)
}

/// A stored value read back by the driver equals the value that was bound.
fn same_value(stored: &Value, bound: &Value) -> bool {
    let ty = match bound {
        Value::Null => return stored.is_null(),
        Value::Bool(_) => FieldType::Bool,
        Value::Int(_) => FieldType::Int,
        Value::Float(_) => FieldType::Float,
        Value::String(_) => FieldType::String,
        Value::Bytes(_) => FieldType::Bytes,
        Value::Uuid(_) => FieldType::Uuid,
        Value::Json(_) => FieldType::Json,
        Value::Time(_) => FieldType::Time,
    };
    stored.clone().coerce(ty).is_ok_and(|value| &value == bound)
}

/// M2M rows of the whole batch are inserted with one statement per join
/// table. FK edges are linked per node. Nodes without an ID were skipped by
/// the conflict policy and get no edges.
async fn add_batch_edges(
    conn: &mut Conn<'_>,
    dialect: Dialect,
    spec: &BatchCreateSpec,
    ids: &[Value],
) -> Result<()> {
    let mut inserts: BTreeMap<&str, (InsertBuilder, usize)> = BTreeMap::new();
    for (node, id) in spec.nodes.iter().zip(ids) {
        if id.is_null() {
            continue;
        }
        for edge in node.edges.iter().filter(|e| e.rel == RelationKind::M2M) {
            let (insert, rows) = inserts
                .entry(edge.table.as_str())
                .or_insert_with(|| (m2m_insert(dialect, &edge.table, edge), 0));
            *rows += m2m_rows(insert, edge, std::slice::from_ref(id))?;
        }
    }
    for (table, (insert, rows)) in inserts {
        if rows > 0 {
            conn.exec(table, &insert.query()?).await?;
        }
    }
    for (node, id) in spec.nodes.iter().zip(ids) {
        if !id.is_null() {
            add_fk_edges(conn, std::slice::from_ref(id), &node.edges).await?;
        }
    }
    Ok(())
}
