use super::builder::{Builder, Statement};
use super::dialect::Dialect;
use super::predicate::Predicate;
use crate::spec::Value;

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Value(Value),
    Add(Value),
}

/// UPDATE statement builder.
///
/// Columns set to NULL are rendered first, then absolute values, then
/// increments.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    dialect: Dialect,
    table: String,
    nulls: Vec<String>,
    sets: Vec<(String, Assignment)>,
    predicate: Option<Predicate>,
}

impl UpdateBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            nulls: Vec::new(),
            sets: Vec::new(),
            predicate: None,
        }
    }

    pub fn set_null(&mut self, column: impl Into<String>) -> &mut Self {
        let column = column.into();
        if !self.nulls.contains(&column) {
            self.nulls.push(column);
        }
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        self.sets.push((column.into(), Assignment::Value(value)));
        self
    }

    /// `column = COALESCE(column, 0) + value`.
    pub fn add(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        self.sets.push((column.into(), Assignment::Add(value)));
        self
    }

    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty() && self.sets.is_empty()
    }

    pub fn query(&self) -> Statement {
        let mut b = Builder::new(self.dialect);
        b.push("UPDATE ").ident(&self.table).push(" SET ");
        let mut first = true;
        for column in &self.nulls {
            if !first {
                b.push(", ");
            }
            first = false;
            b.ident(column).push(" = NULL");
        }
        let ordered = self
            .sets
            .iter()
            .filter(|(_, a)| matches!(a, Assignment::Value(_)))
            .chain(self.sets.iter().filter(|(_, a)| matches!(a, Assignment::Add(_))));
        for (column, assignment) in ordered {
            if !first {
                b.push(", ");
            }
            first = false;
            b.ident(column).push(" = ");
            match assignment {
                Assignment::Value(value) => {
                    b.arg(value);
                }
                Assignment::Add(value) => {
                    b.push("COALESCE(")
                        .ident(column)
                        .push(", 0) + ")
                        .arg(value);
                }
            }
        }
        if let Some(predicate) = &self.predicate {
            b.push(" WHERE ");
            predicate.render(&mut b);
        }
        b.finish()
    }
}
