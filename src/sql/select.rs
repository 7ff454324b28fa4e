use serde::{Deserialize, Serialize};

use super::builder::{Builder, Statement};
use super::dialect::Dialect;
use super::predicate::{OrderTerm, Predicate};

/// LIMIT used when only an OFFSET is requested; MySQL and SQLite reject a
/// bare OFFSET.
pub const MAX_LIMIT: u64 = i32::MAX as u64;

/// A table or a derived table in a FROM or JOIN clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableRef {
    Table { name: String, alias: Option<String> },
    Select { select: Box<Selector>, alias: String },
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        TableRef::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn subquery(select: Selector, alias: impl Into<String>) -> Self {
        TableRef::Select {
            select: Box::new(select),
            alias: alias.into(),
        }
    }

    /// Name used to qualify columns of this table.
    pub fn name(&self) -> &str {
        match self {
            TableRef::Table {
                alias: Some(alias), ..
            } => alias.as_str(),
            TableRef::Table { name, .. } => name.as_str(),
            TableRef::Select { alias, .. } => alias.as_str(),
        }
    }

    fn render(&self, b: &mut Builder) {
        match self {
            TableRef::Table { name, alias } => {
                b.ident(name);
                if let Some(alias) = alias {
                    b.push(" AS ").ident(alias);
                }
            }
            TableRef::Select { select, alias } => {
                b.push("(");
                select.render(b);
                b.push(") AS ").ident(alias);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub table: TableRef,
    pub left: String,
    pub right: String,
}

/// SELECT statement builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    columns: Vec<String>,
    from: TableRef,
    joins: Vec<Join>,
    predicate: Option<Predicate>,
    order: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    count: bool,
}

impl Selector {
    pub fn new(table: TableRef) -> Self {
        Self {
            columns: Vec::new(),
            from: table,
            joins: Vec::new(),
            predicate: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            count: false,
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::new(TableRef::table(name))
    }

    /// Qualify `column` with the name of the FROM table.
    pub fn c(&self, column: &str) -> String {
        format!("{}.{}", self.from.name(), column)
    }

    pub fn table_name(&self) -> &str {
        self.from.name()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn selected_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn join(mut self, table: TableRef, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.joins.push(Join {
            table,
            left: left.into(),
            right: right.into(),
        });
        self
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn filter_opt(self, predicate: Option<Predicate>) -> Self {
        match predicate {
            Some(p) => self.filter(p),
            None => self,
        }
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

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Turn the selection into `COUNT(*)`, or `COUNT(DISTINCT cols)` when
    /// distinct columns are selected. ORDER BY is dropped.
    pub fn count(mut self) -> Self {
        self.count = true;
        self.order.clear();
        self
    }

    pub fn has_window(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn query(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        self.render(&mut b);
        b.finish()
    }

    /// `SELECT EXISTS (<self>)`.
    pub fn exists_query(&self, dialect: Dialect) -> Statement {
        let mut b = Builder::new(dialect);
        b.push("SELECT EXISTS (");
        self.render(&mut b);
        b.push(")");
        b.finish()
    }

    pub(crate) fn render(&self, b: &mut Builder) {
        b.push("SELECT ");
        if self.count {
            if self.distinct && !self.columns.is_empty() {
                b.push("COUNT(DISTINCT ").idents(&self.columns).push(")");
            } else {
                b.push("COUNT(*)");
            }
        } else {
            if self.distinct {
                b.push("DISTINCT ");
            }
            if self.columns.is_empty() {
                b.push("*");
            } else {
                b.idents(&self.columns);
            }
        }
        b.push(" FROM ");
        self.from.render(b);
        for join in &self.joins {
            b.push(" JOIN ");
            join.table.render(b);
            b.push(" ON ").ident(&join.left).push(" = ").ident(&join.right);
        }
        if let Some(predicate) = &self.predicate {
            b.push(" WHERE ");
            predicate.render(b);
        }
        if !self.order.is_empty() {
            b.push(" ORDER BY ");
            for (i, term) in self.order.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                term.render(b);
            }
        }
        match (self.limit, self.offset) {
            (Some(limit), _) => {
                b.push(&format!(" LIMIT {limit}"));
            }
            (None, Some(_)) => {
                b.push(&format!(" LIMIT {MAX_LIMIT}"));
            }
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            b.push(&format!(" OFFSET {offset}"));
        }
    }
}
