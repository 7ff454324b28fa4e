use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::FieldSpec;
use super::value::{FieldType, Value};
use crate::error::{Error, Result};

/// Cardinality of a relation, seen from the node that declares the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    O2O,
    O2M,
    M2O,
    M2M,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::O2O => "O2O",
            RelationKind::O2M => "O2M",
            RelationKind::M2O => "M2O",
            RelationKind::M2M => "M2M",
        };
        f.write_str(name)
    }
}

/// Target side of an edge write.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTarget {
    /// IDs of the target nodes.
    pub nodes: Vec<Value>,
    /// ID column of the target table.
    pub id: FieldSpec,
    /// Extra join-table columns written with each M2M row.
    pub fields: Vec<FieldSpec>,
    /// In-batch references: positions of other specs of the same batch
    /// whose generated IDs become targets once known.
    pub pending: Vec<usize>,
}

/// A relation between two node tables.
///
/// `table` and `columns` locate the relation: for O2O, O2M and M2O the FK
/// column (`columns[0]`) lives in `table`; for M2M `table` is the join table
/// and `columns` holds its two FK columns, owner side first.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub rel: RelationKind,
    /// This side is the referenced side of the relation.
    pub inverse: bool,
    /// The same table and columns serve both traversal directions.
    pub bidi: bool,
    pub table: String,
    pub columns: Vec<String>,
    pub target: EdgeTarget,
}

impl EdgeSpec {
    pub fn new<I, S>(rel: RelationKind, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rel,
            inverse: false,
            bidi: false,
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            target: EdgeTarget {
                nodes: Vec::new(),
                id: FieldSpec::column("id", FieldType::Int),
                fields: Vec::new(),
                pending: Vec::new(),
            },
        }
    }

    pub fn o2o(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(RelationKind::O2O, table, [column.into()])
    }

    pub fn o2m(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(RelationKind::O2M, table, [column.into()])
    }

    /// The FK column lives on this node's own table, so M2O edges are
    /// always inverse.
    pub fn m2o(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(RelationKind::M2O, table, [column.into()]).inverse()
    }

    pub fn m2m(table: impl Into<String>, owner: impl Into<String>, other: impl Into<String>) -> Self {
        Self::new(RelationKind::M2M, table, [owner.into(), other.into()])
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    pub fn bidi(mut self) -> Self {
        self.bidi = true;
        self
    }

    pub fn target_id(mut self, column: impl Into<String>, field_type: FieldType) -> Self {
        self.target.id = FieldSpec::column(column, field_type);
        self
    }

    pub fn nodes<I, V>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.target.nodes.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn node(self, node: impl Into<Value>) -> Self {
        self.nodes([node.into()])
    }

    /// Reference the node created by spec `index` of the same batch.
    pub fn pending(mut self, index: usize) -> Self {
        self.target.pending.push(index);
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.target.fields.push(field);
        self
    }

    /// The FK column is a column of the node's own table.
    pub fn writes_own_column(&self) -> bool {
        match self.rel {
            RelationKind::M2O => true,
            RelationKind::O2O => self.inverse || self.bidi,
            RelationKind::O2M | RelationKind::M2M => false,
        }
    }

    /// The edge is stored outside the node's row: in a join table or in an
    /// FK column of the target table.
    pub fn writes_external(&self) -> bool {
        match self.rel {
            RelationKind::M2M | RelationKind::O2M => true,
            RelationKind::O2O => !self.inverse,
            RelationKind::M2O => false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let expected = match self.rel {
            RelationKind::M2M => 2,
            RelationKind::O2O | RelationKind::O2M | RelationKind::M2O => 1,
        };
        if self.columns.len() != expected {
            return Err(Error::validation(
                &self.table,
                format!(
                    "{} edge expects {expected} column(s), got {}",
                    self.rel,
                    self.columns.len()
                ),
            ));
        }
        if self.rel == RelationKind::M2O && !self.inverse {
            return Err(Error::validation(
                &self.columns[0],
                "M2O edges are owned by the declaring table and must be inverse",
            ));
        }
        Ok(())
    }

    /// FK column of an O2O, O2M or M2O edge.
    pub(crate) fn fk_column(&self) -> Result<&str> {
        match self.columns.as_slice() {
            [column] => Ok(column.as_str()),
            _ => Err(Error::validation(
                &self.table,
                format!("{} edge expects a single FK column", self.rel),
            )),
        }
    }

    /// Join-table columns of an M2M edge as (this node's column, target's
    /// column).
    pub(crate) fn join_columns(&self) -> Result<(&str, &str)> {
        match self.columns.as_slice() {
            [owner, other] if self.inverse => Ok((other.as_str(), owner.as_str())),
            [owner, other] => Ok((owner.as_str(), other.as_str())),
            _ => Err(Error::validation(
                &self.table,
                "M2M edge expects two join-table columns",
            )),
        }
    }

    /// Same relation as `other`, regardless of targets.
    pub(crate) fn same_relation(&self, other: &EdgeSpec) -> bool {
        self.rel == other.rel
            && self.inverse == other.inverse
            && self.table == other.table
            && self.columns == other.columns
    }
}

/// Edge writes of an update.
#[derive(Debug, Clone, Default)]
pub struct EdgeMut {
    pub add: Vec<EdgeSpec>,
    /// Edges to clear. A clear without target nodes removes every edge of
    /// that relation; with target nodes it removes only those.
    pub clear: Vec<EdgeSpec>,
}

impl EdgeMut {
    pub fn add(&mut self, edge: EdgeSpec) -> &mut Self {
        self.add.push(edge);
        self
    }

    pub fn clear(&mut self, edge: EdgeSpec) -> &mut Self {
        self.clear.push(edge);
        self
    }

    /// Remove the edges to the listed target nodes only.
    pub fn remove(&mut self, edge: EdgeSpec) -> Result<&mut Self> {
        if edge.target.nodes.is_empty() {
            return Err(Error::validation(
                &edge.table,
                "removing edges requires target nodes",
            ));
        }
        self.clear.push(edge);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.clear.is_empty()
    }
}
