use super::builder::{Builder, Statement};
use super::dialect::Dialect;
use super::predicate::Predicate;

/// DELETE statement builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    dialect: Dialect,
    table: String,
    predicate: Option<Predicate>,
}

impl DeleteBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            predicate: None,
        }
    }

    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn query(&self) -> Statement {
        let mut b = Builder::new(self.dialect);
        b.push("DELETE FROM ").ident(&self.table);
        if let Some(predicate) = &self.predicate {
            b.push(" WHERE ");
            predicate.render(&mut b);
        }
        b.finish()
    }
}
