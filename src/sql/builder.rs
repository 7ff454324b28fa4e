use serde::{Deserialize, Serialize};

use super::dialect::Dialect;
use crate::spec::Value;

/// Parameterized SQL text and its bound arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    /// Leading keyword, used as the statement kind in logs.
    pub fn kind(&self) -> &str {
        self.sql.split_whitespace().next().unwrap_or("")
    }
}

/// Accumulates SQL text and arguments for one statement, numbering
/// placeholders across nested subqueries.
#[derive(Debug)]
pub(crate) struct Builder {
    dialect: Dialect,
    buf: String,
    args: Vec<Value>,
}

impl Builder {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            buf: String::new(),
            args: Vec::new(),
        }
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.buf.push_str(sql);
        self
    }

    /// Write an identifier. Dotted names are quoted per part and `*` is
    /// written as is.
    pub(crate) fn ident(&mut self, name: &str) -> &mut Self {
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                self.buf.push('.');
            }
            if part == "*" {
                self.buf.push('*');
            } else {
                let quoted = self.dialect.quote(part);
                self.buf.push_str(&quoted);
            }
        }
        self
    }

    pub(crate) fn idents<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            self.ident(name.as_ref());
        }
        self
    }

    /// Bind a value. NULL is written as a literal so that it needs no type
    /// on any driver.
    pub(crate) fn arg(&mut self, value: &Value) -> &mut Self {
        if value.is_null() {
            self.buf.push_str("NULL");
        } else {
            self.args.push(value.clone());
            let placeholder = self.dialect.placeholder(self.args.len());
            self.buf.push_str(&placeholder);
        }
        self
    }

    pub(crate) fn args(&mut self, values: &[Value]) -> &mut Self {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            self.arg(value);
        }
        self
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.buf,
            args: self.args,
        }
    }
}
