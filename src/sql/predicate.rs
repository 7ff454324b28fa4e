//! Filter and order expression trees.
//!
//! Predicates are plain data: they can be built, inspected, compared and
//! serialized without a connection, and are rendered for a dialect only
//! when a statement is compiled.

use serde::{Deserialize, Serialize};

use super::builder::Builder;
use super::dialect::Dialect;
use super::select::Selector;
use crate::spec::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => " = ",
            CmpOp::Ne => " <> ",
            CmpOp::Gt => " > ",
            CmpOp::Gte => " >= ",
            CmpOp::Lt => " < ",
            CmpOp::Lte => " <= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        cmp: CmpOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    NotIn {
        column: String,
        values: Vec<Value>,
    },
    IsNull {
        column: String,
    },
    NotNull {
        column: String,
    },
    Like {
        column: String,
        pattern: String,
    },
    InSelect {
        column: String,
        select: Box<Selector>,
    },
    Exists {
        select: Box<Selector>,
    },
    And {
        preds: Vec<Predicate>,
    },
    Or {
        preds: Vec<Predicate>,
    },
    Not {
        pred: Box<Predicate>,
    },
}

fn compare(column: impl Into<String>, cmp: CmpOp, value: impl Into<Value>) -> Predicate {
    Predicate::Compare {
        column: column.into(),
        cmp,
        value: value.into(),
    }
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        compare(column, CmpOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        compare(column, CmpOp::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        compare(column, CmpOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        compare(column, CmpOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        compare(column, CmpOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        compare(column, CmpOp::Lte, value)
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::NotIn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull {
            column: column.into(),
        }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Predicate::NotNull {
            column: column.into(),
        }
    }

    /// Raw LIKE pattern; `%` and `_` keep their wildcard meaning.
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn contains(column: impl Into<String>, needle: &str) -> Self {
        Self::like(column, format!("%{}%", escape_like(needle)))
    }

    pub fn has_prefix(column: impl Into<String>, prefix: &str) -> Self {
        Self::like(column, format!("{}%", escape_like(prefix)))
    }

    pub fn has_suffix(column: impl Into<String>, suffix: &str) -> Self {
        Self::like(column, format!("%{}", escape_like(suffix)))
    }

    pub fn in_select(column: impl Into<String>, select: Selector) -> Self {
        Predicate::InSelect {
            column: column.into(),
            select: Box::new(select),
        }
    }

    pub fn exists(select: Selector) -> Self {
        Predicate::Exists {
            select: Box::new(select),
        }
    }

    pub fn and_all(preds: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And {
            preds: preds.into_iter().collect(),
        }
    }

    pub fn or_any(preds: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or {
            preds: preds.into_iter().collect(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not {
            pred: Box::new(self),
        }
    }

    /// Conjunction, flattening nested ANDs.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And { mut preds } => {
                preds.push(other);
                Predicate::And { preds }
            }
            first => Predicate::And {
                preds: vec![first, other],
            },
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or { mut preds } => {
                preds.push(other);
                Predicate::Or { preds }
            }
            first => Predicate::Or {
                preds: vec![first, other],
            },
        }
    }

    /// Combine an optional predicate with another one.
    pub(crate) fn conjoin(current: Option<Predicate>, other: Predicate) -> Predicate {
        match current {
            Some(p) => p.and(other),
            None => other,
        }
    }

    /// Every column name referenced at this level (subqueries excluded).
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::In { column, .. }
            | Predicate::NotIn { column, .. }
            | Predicate::IsNull { column }
            | Predicate::NotNull { column }
            | Predicate::Like { column, .. }
            | Predicate::InSelect { column, .. } => out.push(column),
            Predicate::Exists { .. } => {}
            Predicate::And { preds } | Predicate::Or { preds } => {
                preds.iter().for_each(|p| p.collect_columns(out))
            }
            Predicate::Not { pred } => pred.collect_columns(out),
        }
    }

    pub(crate) fn render(&self, b: &mut Builder) {
        match self {
            Predicate::Compare { column, cmp, value } => match (cmp, value) {
                (CmpOp::Eq, Value::Null) => {
                    b.ident(column).push(" IS NULL");
                }
                (CmpOp::Ne, Value::Null) => {
                    b.ident(column).push(" IS NOT NULL");
                }
                _ => {
                    b.ident(column).push(cmp.as_sql()).arg(value);
                }
            },
            Predicate::In { values, .. } if values.is_empty() => {
                b.push("1 = 0");
            }
            Predicate::In { column, values } => {
                b.ident(column).push(" IN (").args(values).push(")");
            }
            Predicate::NotIn { values, .. } if values.is_empty() => {
                b.push("1 = 1");
            }
            Predicate::NotIn { column, values } => {
                b.ident(column).push(" NOT IN (").args(values).push(")");
            }
            Predicate::IsNull { column } => {
                b.ident(column).push(" IS NULL");
            }
            Predicate::NotNull { column } => {
                b.ident(column).push(" IS NOT NULL");
            }
            Predicate::Like { column, pattern } => {
                b.ident(column)
                    .push(" LIKE ")
                    .arg(&Value::String(pattern.clone()));
                if b.dialect() == Dialect::Sqlite {
                    b.push(" ESCAPE '\\'");
                }
            }
            Predicate::InSelect { column, select } => {
                b.ident(column).push(" IN (");
                select.render(b);
                b.push(")");
            }
            Predicate::Exists { select } => {
                b.push("EXISTS (");
                select.render(b);
                b.push(")");
            }
            Predicate::And { preds } => render_junction(b, preds, " AND ", "1 = 1"),
            Predicate::Or { preds } => render_junction(b, preds, " OR ", "1 = 0"),
            Predicate::Not { pred } => {
                b.push("NOT (");
                pred.render(b);
                b.push(")");
            }
        }
    }

    fn is_junction(&self) -> bool {
        matches!(self, Predicate::And { .. } | Predicate::Or { .. })
    }
}

fn render_junction(b: &mut Builder, preds: &[Predicate], sep: &str, empty: &str) {
    if preds.is_empty() {
        b.push(empty);
        return;
    }
    for (i, pred) in preds.iter().enumerate() {
        if i > 0 {
            b.push(sep);
        }
        if pred.is_junction() && preds.len() > 1 {
            b.push("(");
            pred.render(b);
            b.push(")");
        } else {
            pred.render(b);
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn to_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderTerm {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    pub(crate) fn render(&self, b: &mut Builder) {
        b.ident(&self.column).push(" ").push(self.direction.to_sql());
    }
}
