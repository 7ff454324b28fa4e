//! Operation specs: one value per create, update, delete or query call.
//!
//! Specs are built by the caller, handed to a [`Graph`](crate::Graph)
//! method by mutable reference and dropped afterwards. Query results flow
//! back through the `scan_values` / `assign` callbacks, so the compiler
//! never needs to know the caller's entity types.

use super::edge::{EdgeMut, EdgeSpec};
use super::node::{FieldSpec, NodeSpec};
use super::step::Step;
use super::value::{FieldType, Value};
use crate::error::Result;
use crate::sql::{OnConflict, OrderTerm, Predicate, Selector};

/// Given the selected column names, returns the type each column should be
/// read as.
pub type ScanValues<'a> = Box<dyn FnMut(&[String]) -> Result<Vec<FieldType>> + Send + 'a>;

/// Receives one row: the selected column names and the typed values.
pub type Assign<'a> = Box<dyn FnMut(&[String], Vec<Value>) -> Result<()> + Send + 'a>;

/// Receives one neighbor row together with the positions of every parent
/// row it belongs to.
pub type LoadAssign<'a> = Box<dyn FnMut(&[usize], &[String], Vec<Value>) -> Result<()> + Send + 'a>;

/// Receives one (from, to) pair of a join table.
pub type EdgeAssign<'a> = Box<dyn FnMut(Value, Value) -> Result<()> + Send + 'a>;

/// Insert of a single node with its edges.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub node: NodeSpec,
    pub fields: Vec<FieldSpec>,
    pub edges: Vec<EdgeSpec>,
    pub on_conflict: Option<OnConflict>,
}

impl CreateSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            fields: Vec::new(),
            edges: Vec::new(),
            on_conflict: None,
        }
    }

    pub fn set(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Supply the ID instead of letting the database or generator pick it.
    pub fn id(mut self, value: impl Into<Value>) -> Self {
        self.node.id.value = value.into();
        self
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    /// Positions of other batch specs this spec references.
    pub(crate) fn dependencies(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().flat_map(|e| e.target.pending.iter().copied())
    }
}

/// Ordered inserts into one table, sharing a conflict policy.
#[derive(Debug, Clone, Default)]
pub struct BatchCreateSpec {
    pub nodes: Vec<CreateSpec>,
    pub on_conflict: Option<OnConflict>,
}

impl BatchCreateSpec {
    pub fn new(nodes: Vec<CreateSpec>) -> Self {
        Self {
            nodes,
            on_conflict: None,
        }
    }

    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }
}

/// Column writes of an update.
#[derive(Debug, Clone, Default)]
pub struct FieldMut {
    pub set: Vec<FieldSpec>,
    /// Numeric increments.
    pub add: Vec<FieldSpec>,
    /// Columns set to NULL.
    pub clear: Vec<String>,
}

impl FieldMut {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.is_empty() && self.clear.is_empty()
    }
}

/// Update of one node by ID, or of every node matching a predicate.
pub struct UpdateSpec<'a> {
    pub node: NodeSpec,
    pub fields: FieldMut,
    pub edges: EdgeMut,
    pub predicate: Option<Predicate>,
    pub scan_values: Option<ScanValues<'a>>,
    pub assign: Option<Assign<'a>>,
}

impl<'a> UpdateSpec<'a> {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            fields: FieldMut::default(),
            edges: EdgeMut::default(),
            predicate: None,
            scan_values: None,
            assign: None,
        }
    }

    /// Target a single node.
    pub fn id(mut self, value: impl Into<Value>) -> Self {
        self.node.id.value = value.into();
        self
    }

    pub fn set(mut self, field: FieldSpec) -> Self {
        self.fields.set.push(field);
        self
    }

    pub fn add(mut self, field: FieldSpec) -> Self {
        self.fields.add.push(field);
        self
    }

    pub fn clear(mut self, column: impl Into<String>) -> Self {
        self.fields.clear.push(column.into());
        self
    }

    pub fn add_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.add(edge);
        self
    }

    pub fn clear_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.clear(edge);
        self
    }

    /// Remove the edges to `edge`'s target nodes only.
    pub fn remove_edge(mut self, edge: EdgeSpec) -> Result<Self> {
        self.edges.remove(edge)?;
        Ok(self)
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    /// Read the updated row back through `assign`.
    pub fn scan(mut self, scan_values: ScanValues<'a>, assign: Assign<'a>) -> Self {
        self.scan_values = Some(scan_values);
        self.assign = Some(assign);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DeleteSpec {
    pub node: NodeSpec,
    pub predicate: Option<Predicate>,
}

impl DeleteSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            predicate: None,
        }
    }

    /// Target a single node.
    pub fn id(mut self, value: impl Into<Value>) -> Self {
        self.node.id.value = value.into();
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }
}

/// Eager load of one edge for the rows of a query.
pub struct EdgeLoad<'a> {
    /// The edge, as declared on the parent table.
    pub edge: EdgeSpec,
    /// The neighbor table.
    pub target: NodeSpec,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderTerm>,
    pub scan_values: ScanValues<'a>,
    pub assign: LoadAssign<'a>,
}

impl<'a> EdgeLoad<'a> {
    pub fn new(
        edge: EdgeSpec,
        target: NodeSpec,
        scan_values: ScanValues<'a>,
        assign: LoadAssign<'a>,
    ) -> Self {
        Self {
            edge,
            target,
            predicate: None,
            order: Vec::new(),
            scan_values,
            assign,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn order_by(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }

    /// The parent column whose values key this edge: the FK column when the
    /// parent holds it, the parent's ID otherwise.
    pub fn key_column<'n>(&'n self, parent: &'n NodeSpec) -> &'n str {
        if self.edge.writes_own_column() {
            self.edge.columns.first().map_or("", String::as_str)
        } else {
            &parent.id.column
        }
    }
}

/// Selection of nodes, with optional eager-loaded edges.
pub struct QuerySpec<'a> {
    pub node: NodeSpec,
    /// Projection; all node columns when empty.
    pub columns: Vec<String>,
    /// Select from this selector instead of the node table.
    pub from: Option<Selector>,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unique: bool,
    pub edges: Vec<EdgeLoad<'a>>,
    pub scan_values: Option<ScanValues<'a>>,
    pub assign: Option<Assign<'a>>,
}

impl<'a> QuerySpec<'a> {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            columns: Vec::new(),
            from: None,
            predicate: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: false,
            edges: Vec::new(),
            scan_values: None,
            assign: None,
        }
    }

    /// Query the neighbors reached by `step`. Results are distinct.
    pub fn from_step(node: NodeSpec, step: &Step) -> Self {
        let mut spec = Self::new(node);
        spec.from = Some(step.neighbors());
        spec.unique = true;
        spec
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn order_by(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_edge(mut self, load: EdgeLoad<'a>) -> Self {
        self.edges.push(load);
        self
    }

    pub fn scan(mut self, scan_values: ScanValues<'a>, assign: Assign<'a>) -> Self {
        self.scan_values = Some(scan_values);
        self.assign = Some(assign);
        self
    }
}

/// Reads the raw (from, to) pairs of an M2M join table.
pub struct EdgeQuerySpec<'a> {
    pub edge: EdgeSpec,
    pub predicate: Option<Predicate>,
    pub assign: EdgeAssign<'a>,
}

impl<'a> EdgeQuerySpec<'a> {
    pub fn new(edge: EdgeSpec, assign: EdgeAssign<'a>) -> Self {
        Self {
            edge,
            predicate: None,
            assign,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }
}
