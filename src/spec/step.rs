//! One traversal step across an edge, from a node table to its neighbors.

use serde::{Deserialize, Serialize};

use super::edge::RelationKind;
use super::value::Value;
use crate::sql::{Predicate, Selector, TableRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFrom {
    pub table: String,
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEdge {
    pub rel: RelationKind,
    pub inverse: bool,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTo {
    pub table: String,
    pub column: String,
}

/// Where the relation is stored, relative to the step's direction.
enum Layout {
    /// A join table holds both ends.
    JoinTable,
    /// The FK column sits on the `from` table.
    FromOwner,
    /// The FK column sits on the `to` table.
    ToOwner,
}

/// Describes how to walk from rows of one table to their neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub from: StepFrom,
    pub edge: StepEdge,
    pub to: StepTo,
}

impl Step {
    pub fn new<I, S>(
        from: (&str, &str),
        rel: RelationKind,
        inverse: bool,
        edge_table: &str,
        edge_columns: I,
        to: (&str, &str),
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: StepFrom {
                table: from.0.to_string(),
                column: from.1.to_string(),
                value: Value::Null,
            },
            edge: StepEdge {
                rel,
                inverse,
                table: edge_table.to_string(),
                columns: edge_columns.into_iter().map(Into::into).collect(),
            },
            to: StepTo {
                table: to.0.to_string(),
                column: to.1.to_string(),
            },
        }
    }

    /// Start the walk from the node with this ID.
    pub fn from_value(mut self, value: impl Into<Value>) -> Self {
        self.from.value = value.into();
        self
    }

    fn layout(&self) -> Layout {
        match self.edge.rel {
            RelationKind::M2M => Layout::JoinTable,
            RelationKind::M2O => Layout::FromOwner,
            RelationKind::O2O if self.edge.inverse => Layout::FromOwner,
            RelationKind::O2O | RelationKind::O2M => Layout::ToOwner,
        }
    }

    fn column(&self, i: usize) -> &str {
        self.edge.columns.get(i).map_or("", String::as_str)
    }

    /// Join-table columns as (target side, source side).
    fn join_columns(&self) -> (&str, &str) {
        if self.edge.inverse {
            (self.column(0), self.column(1))
        } else {
            (self.column(1), self.column(0))
        }
    }

    fn qualified(table: &str, column: &str) -> String {
        format!("{table}.{column}")
    }

    /// Rows of the `to` table adjacent to `from.value`.
    pub fn neighbors(&self) -> Selector {
        let to = &self.to.table;
        match self.layout() {
            Layout::JoinTable => {
                let (pk1, pk2) = self.join_columns();
                let edge = &self.edge.table;
                let matches = Selector::table(edge)
                    .columns([Self::qualified(edge, pk1)])
                    .filter(Predicate::eq(
                        Self::qualified(edge, pk2),
                        self.from.value.clone(),
                    ));
                Selector::table(to).join(
                    TableRef::subquery(matches, "t1"),
                    Self::qualified(to, &self.to.column),
                    Self::qualified("t1", pk1),
                )
            }
            Layout::FromOwner => {
                let fk = self.column(0);
                let owner = Selector::table(&self.edge.table)
                    .columns([fk])
                    .filter(Predicate::eq(
                        self.from.column.clone(),
                        self.from.value.clone(),
                    ));
                Selector::table(to).join(
                    TableRef::subquery(owner, "t1"),
                    Self::qualified(to, &self.to.column),
                    Self::qualified("t1", fk),
                )
            }
            Layout::ToOwner => Selector::table(to).filter(Predicate::eq(
                Self::qualified(to, self.column(0)),
                self.from.value.clone(),
            )),
        }
    }

    /// Rows of the `from` table that have at least one neighbor.
    pub fn has_neighbors(&self) -> Predicate {
        let from = Self::qualified(&self.from.table, &self.from.column);
        let edge = &self.edge.table;
        match self.layout() {
            Layout::JoinTable => {
                let (_, source) = self.join_columns();
                Predicate::in_select(
                    from,
                    Selector::table(edge).columns([Self::qualified(edge, source)]),
                )
            }
            Layout::FromOwner => {
                Predicate::not_null(Self::qualified(&self.from.table, self.column(0)))
            }
            Layout::ToOwner => {
                let fk = Self::qualified(edge, self.column(0));
                Predicate::in_select(
                    from,
                    Selector::table(edge)
                        .columns([fk.clone()])
                        .filter(Predicate::not_null(fk)),
                )
            }
        }
    }

    /// Rows of the `from` table with at least one neighbor matching `pred`.
    pub fn has_neighbors_with(&self, pred: Predicate) -> Predicate {
        let from = Self::qualified(&self.from.table, &self.from.column);
        let to = &self.to.table;
        let edge = &self.edge.table;
        match self.layout() {
            Layout::JoinTable => {
                let (target, source) = self.join_columns();
                let matches = Selector::table(to)
                    .columns([Self::qualified(to, &self.to.column)])
                    .filter(pred);
                Predicate::in_select(
                    from,
                    Selector::table(edge)
                        .columns([Self::qualified(edge, source)])
                        .filter(Predicate::in_select(Self::qualified(edge, target), matches)),
                )
            }
            Layout::FromOwner => Predicate::in_select(
                Self::qualified(&self.from.table, self.column(0)),
                Selector::table(to)
                    .columns([Self::qualified(to, &self.to.column)])
                    .filter(pred),
            ),
            Layout::ToOwner => {
                let fk = Self::qualified(edge, self.column(0));
                Predicate::in_select(
                    from,
                    Selector::table(edge)
                        .columns([fk.clone()])
                        .filter(Predicate::not_null(fk))
                        .filter(pred),
                )
            }
        }
    }
}
