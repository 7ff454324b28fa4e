//! Edge writes shared by create, batch create and update.
//!
//! M2M edges live in join tables and are written with INSERT and DELETE.
//! O2M and non-inverse O2O edges live in an FK column of the other table
//! and are written with UPDATE (`fk = ?`, `fk = NULL`). M2O and
//! inverse/bidi O2O edges are columns of the node's own row.

use std::collections::{BTreeMap, BTreeSet};

use super::conn::Conn;
use super::probe;
use crate::error::{Error, Result};
use crate::spec::{EdgeMut, EdgeSpec, FieldSpec, NodeSpec, RelationKind, Value};
use crate::sql::{DeleteBuilder, Dialect, InsertBuilder, OnConflict, Predicate, Selector, UpdateBuilder};

pub(super) fn match_ids(column: &str, ids: &[Value]) -> Predicate {
    match ids {
        [id] => Predicate::eq(column, id.clone()),
        _ => Predicate::is_in(column, ids.iter().cloned()),
    }
}

fn match_pairs(column1: &str, ids1: &[Value], column2: &str, ids2: &[Value]) -> Predicate {
    match_ids(column1, ids1).and(match_ids(column2, ids2))
}

fn constraint(message: String) -> Error {
    Error::constraint(message.clone(), message)
}

fn list(ids: &[Value]) -> String {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("[{}]", ids.join(", "))
}

/// Validate an edge that is about to be added.
pub(super) fn check_add(edge: &EdgeSpec) -> Result<()> {
    edge.validate()?;
    let targets = edge.target.nodes.len() + edge.target.pending.len();
    let column = edge.columns.first().map_or(edge.table.as_str(), String::as_str);
    match edge.rel {
        RelationKind::O2O if targets > 1 => {
            return Err(Error::validation(
                column,
                format!("O2O edge accepts a single target, got {targets}"),
            ));
        }
        RelationKind::M2O if targets != 1 => {
            return Err(Error::validation(
                column,
                format!("M2O edge expects exactly one target, got {targets}"),
            ));
        }
        _ if targets == 0 => {
            return Err(Error::validation(column, "edge has no target nodes"));
        }
        _ => {}
    }
    for field in &edge.target.fields {
        field.bind_value()?;
    }
    Ok(())
}

/// Values written on the node's own row: its fields, then the FK columns of
/// edges stored on the node's table.
pub(super) fn own_columns(
    node: &NodeSpec,
    fields: &[FieldSpec],
    edges: &[EdgeSpec],
) -> Result<Vec<(String, Value)>> {
    let mut seen = BTreeSet::new();
    let mut columns = Vec::with_capacity(fields.len() + edges.len());
    for field in fields {
        node.check_column(&field.column)?;
        columns.push((field.column.clone(), field.bind_value()?));
    }
    for edge in edges.iter().filter(|e| e.writes_own_column()) {
        let column = edge.fk_column()?;
        let target = edge
            .target
            .nodes
            .first()
            .ok_or_else(|| Error::validation(column, "edge has no target node"))?;
        columns.push((column.to_string(), target.clone()));
    }
    for (column, _) in &columns {
        if !seen.insert(column.as_str()) {
            return Err(Error::validation(column, "column is written more than once"));
        }
    }
    Ok(columns)
}

fn group_by_table<'e>(
    edges: impl IntoIterator<Item = &'e EdgeSpec>,
) -> BTreeMap<&'e str, Vec<&'e EdgeSpec>> {
    let mut tables: BTreeMap<&str, Vec<&EdgeSpec>> = BTreeMap::new();
    for edge in edges {
        tables.entry(edge.table.as_str()).or_default().push(edge);
    }
    tables
}

fn is_fk_edge(edge: &EdgeSpec) -> bool {
    match edge.rel {
        RelationKind::O2M => true,
        RelationKind::O2O => !edge.inverse,
        RelationKind::M2O | RelationKind::M2M => false,
    }
}

/// Delete join-table rows of `ids`, or only those to the listed targets.
pub(super) async fn clear_m2m_edges(conn: &mut Conn<'_>, ids: &[Value], edges: &[EdgeSpec]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let tables = group_by_table(edges.iter().filter(|e| e.rel == RelationKind::M2M));
    for (table, edges) in tables {
        let mut preds = Vec::with_capacity(edges.len());
        for edge in edges {
            let (from, to) = edge.join_columns()?;
            let targets = &edge.target.nodes;
            if targets.is_empty() {
                preds.push(match_ids(from, ids));
                if edge.bidi {
                    preds.push(match_ids(to, ids));
                }
            } else {
                preds.push(match_pairs(from, ids, to, targets));
                if edge.bidi {
                    preds.push(match_pairs(to, ids, from, targets));
                }
            }
        }
        let mut delete = DeleteBuilder::new(conn.dialect(), table);
        delete.filter(Predicate::or_any(preds));
        conn.exec(table, &delete.query()).await?;
    }
    Ok(())
}

/// Insert join-table rows from each of `ids` to the edge targets.
pub(super) async fn add_m2m_edges(conn: &mut Conn<'_>, ids: &[Value], edges: &[EdgeSpec]) -> Result<()> {
    let tables = group_by_table(edges.iter().filter(|e| e.rel == RelationKind::M2M));
    for (table, edges) in tables {
        let mut insert = m2m_insert(conn.dialect(), table, edges[0]);
        let mut rows = 0;
        for edge in edges {
            rows += m2m_rows(&mut insert, edge, ids)?;
        }
        if rows > 0 {
            conn.exec(table, &insert.query()?).await?;
        }
    }
    Ok(())
}

/// Join-table INSERT shaped after `first`. Conflicts are ignored only when
/// the edge has no extra fields, since those may differ between writes.
pub(super) fn m2m_insert(dialect: Dialect, table: &str, first: &EdgeSpec) -> InsertBuilder {
    let mut insert = InsertBuilder::new(dialect, table);
    insert
        .columns(first.columns.iter().cloned())
        .columns(first.target.fields.iter().map(|f| f.column.clone()));
    if first.target.fields.is_empty() {
        insert.on_conflict(OnConflict::do_nothing());
    }
    insert
}

/// Add the rows of one M2M edge to `insert`, returning how many were added.
pub(super) fn m2m_rows(insert: &mut InsertBuilder, edge: &EdgeSpec, ids: &[Value]) -> Result<usize> {
    let extra = edge
        .target
        .fields
        .iter()
        .map(FieldSpec::bind_value)
        .collect::<Result<Vec<_>>>()?;
    let (owners, others) = if edge.inverse {
        (edge.target.nodes.as_slice(), ids)
    } else {
        (ids, edge.target.nodes.as_slice())
    };
    let mut rows = 0;
    for a in owners {
        for b in others {
            let mut row = vec![a.clone(), b.clone()];
            row.extend(extra.iter().cloned());
            insert.values(row);
            rows += 1;
            if edge.bidi {
                let mut row = vec![b.clone(), a.clone()];
                row.extend(extra.iter().cloned());
                insert.values(row);
                rows += 1;
            }
        }
    }
    Ok(rows)
}

/// NULL out FK columns in other tables that point at `ids`.
pub(super) async fn clear_fk_edges(conn: &mut Conn<'_>, ids: &[Value], edges: &[EdgeSpec]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    for edge in edges.iter().filter(|e| is_fk_edge(e)) {
        let fk = edge.fk_column()?;
        let pred = if edge.target.nodes.is_empty() {
            match_ids(fk, ids)
        } else {
            match_pairs(&edge.target.id.column, &edge.target.nodes, fk, ids)
        };
        let mut update = UpdateBuilder::new(conn.dialect(), &edge.table);
        update.set_null(fk).filter(pred);
        conn.exec(&edge.table, &update.query()).await?;
    }
    Ok(())
}

/// Point FK columns of the edge targets at `ids[0]`. Targets already
/// connected elsewhere are a constraint violation.
pub(super) async fn add_fk_edges(conn: &mut Conn<'_>, ids: &[Value], edges: &[EdgeSpec]) -> Result<()> {
    let edges: Vec<&EdgeSpec> = edges
        .iter()
        .filter(|e| is_fk_edge(e) && !e.target.nodes.is_empty())
        .collect();
    let id = match ids {
        _ if edges.is_empty() => return Ok(()),
        [id] => id,
        _ => {
            return Err(constraint(format!(
                "unable to link FK edge to more than one node: {}",
                list(ids)
            )));
        }
    };
    for edge in edges {
        let fk = edge.fk_column()?;
        let targets = &edge.target.nodes;
        let mut update = UpdateBuilder::new(conn.dialect(), &edge.table);
        update
            .set(fk, id.clone())
            .filter(match_ids(&edge.target.id.column, targets))
            .filter(Predicate::is_null(fk));
        let res = conn.exec(&edge.table, &update.query()).await?;
        if (res.rows_affected as usize) < targets.len() {
            return Err(constraint(format!(
                "one of {} is already connected to a different {fk}",
                list(targets)
            )));
        }
    }
    Ok(())
}

/// Write the edges stored outside the node rows of `ids`. Clears run
/// before adds so that an edge can be moved in one update.
pub(super) async fn set_external_edges(conn: &mut Conn<'_>, ids: &[Value], edges: &EdgeMut) -> Result<()> {
    clear_m2m_edges(conn, ids, &edges.clear).await?;
    add_m2m_edges(conn, ids, &edges.add).await?;
    clear_fk_edges(conn, ids, &edges.clear).await?;
    add_fk_edges(conn, ids, &edges.add).await
}

/// An insert carrying these edges touches more than one row.
pub(super) fn needs_tx(edges: &[EdgeSpec]) -> bool {
    edges
        .iter()
        .any(|e| e.writes_external() || (e.rel == RelationKind::O2O && e.writes_own_column()))
}

/// O2O targets claimed so far by the nodes of one batch. The database
/// probes in [`check_o2o`] cannot see rows of the same batch that are not
/// written yet.
#[derive(Debug, Default)]
pub(super) struct O2oClaims {
    claimed: Vec<(String, String, Value)>,
}

impl O2oClaims {
    pub(super) fn claim(&mut self, node: &NodeSpec, edges: &[EdgeSpec]) -> Result<()> {
        for edge in edges.iter().filter(|e| e.rel == RelationKind::O2O) {
            let fk = edge.fk_column()?;
            for target in &edge.target.nodes {
                let claim = (edge.table.clone(), fk.to_string(), target.clone());
                if self.claimed.contains(&claim) {
                    return Err(constraint(format!(
                        "{target} is linked to more than one {} of the batch through {fk}",
                        node.label()
                    )));
                }
                self.claimed.push(claim);
            }
        }
        Ok(())
    }
}

/// Reject O2O adds that would give either endpoint a second partner. An
/// add paired with a clear of the same edge replaces the partner instead.
pub(super) async fn check_o2o(
    conn: &mut Conn<'_>,
    node: &NodeSpec,
    id: Option<&Value>,
    add: &[EdgeSpec],
    clear: &[EdgeSpec],
) -> Result<()> {
    let o2o = add
        .iter()
        .filter(|e| e.rel == RelationKind::O2O)
        .filter(|e| !clear.iter().any(|c| c.same_relation(e)));
    for edge in o2o {
        let Some(target) = edge.target.nodes.first() else {
            continue;
        };
        let fk = edge.fk_column()?;
        if edge.writes_own_column() {
            let mut taken = Selector::table(&edge.table).filter(Predicate::eq(fk, target.clone()));
            if let Some(id) = id {
                taken = taken.filter(Predicate::ne(node.id.column.clone(), id.clone()));
            }
            if probe(conn, &edge.table, taken).await? {
                return Err(constraint(format!(
                    "{target} is already connected to a different {} through {fk}",
                    node.label()
                )));
            }
            if let Some(id) = id {
                let current = Selector::table(&node.table)
                    .filter(Predicate::eq(node.id.column.clone(), id.clone()))
                    .filter(Predicate::not_null(fk))
                    .filter(Predicate::ne(fk, target.clone()));
                if probe(conn, &node.table, current).await? {
                    return Err(constraint(format!(
                        "{} {id} is already connected through {fk}",
                        node.label()
                    )));
                }
            }
        }
        if let Some(id) = id.filter(|_| edge.writes_external()) {
            let current = Selector::table(&edge.table)
                .filter(Predicate::eq(fk, id.clone()))
                .filter(Predicate::ne(edge.target.id.column.clone(), target.clone()));
            if probe(conn, &edge.table, current).await? {
                return Err(constraint(format!(
                    "{} {id} is already connected to a different {} through {fk}",
                    node.label(),
                    edge.table
                )));
            }
        }
    }
    Ok(())
}
