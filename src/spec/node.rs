use super::value::{FieldType, Value};
use crate::error::{Error, Result};

/// A single column write or read.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub column: String,
    pub field_type: FieldType,
    pub value: Value,
}

impl FieldSpec {
    pub fn new(column: impl Into<String>, field_type: FieldType, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            field_type,
            value: value.into(),
        }
    }

    /// A field without a value, used to describe ID columns.
    pub fn column(column: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(column, field_type, Value::Null)
    }

    /// The value to bind for this field.
    ///
    /// Fails when the value does not fit the declared type. JSON fields
    /// accept any value and are converted to a JSON document.
    pub fn bind_value(&self) -> Result<Value> {
        if !self.field_type.accepts(&self.value) {
            return Err(Error::validation(
                &self.column,
                format!(
                    "{} value does not match column type {}",
                    self.value.kind(),
                    self.field_type
                ),
            ));
        }
        Ok(match (&self.field_type, &self.value) {
            (FieldType::Json, Value::Null) => Value::Null,
            (FieldType::Json, v) => Value::Json(v.clone().into_json()),
            (_, v) => v.clone(),
        })
    }
}

/// How a table's ID is assigned on insert.
#[derive(Debug, Clone, Copy)]
pub enum IdStrategy {
    /// Generated by the database (auto-increment / serial).
    Sequence,
    /// Always supplied by the caller.
    Client,
    /// Produced by a function before the insert, e.g. a random UUID.
    Generator(fn() -> Value),
}

/// Identifies a table, its columns and its ID column.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub table: String,
    /// Full column list, ID excluded. When empty, column names are not
    /// checked.
    pub columns: Vec<String>,
    pub id: FieldSpec,
    pub id_strategy: IdStrategy,
    label: Option<String>,
}

impl NodeSpec {
    pub fn new(table: impl Into<String>, id: FieldSpec) -> Self {
        let id_strategy = if id.field_type.is_numeric() {
            IdStrategy::Sequence
        } else {
            IdStrategy::Client
        };
        Self {
            table: table.into(),
            columns: Vec::new(),
            id,
            id_strategy,
            label: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Entity name used in not-found errors. Defaults to the table name.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.table)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.is_empty() || column == self.id.column || self.columns.iter().any(|c| c == column)
    }

    pub fn add_column_once(&mut self, column: &str) {
        if column != self.id.column && !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    pub(crate) fn check_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(Error::validation(
                column,
                format!("unknown column for table {}", self.table),
            ))
        }
    }

    /// The ID value to insert with, generating one when the strategy says so.
    pub(crate) fn insert_id(&mut self) -> Result<Option<Value>> {
        if !self.id.value.is_null() {
            return self.id.bind_value().map(Some);
        }
        match self.id_strategy {
            IdStrategy::Sequence => Ok(None),
            IdStrategy::Client => Err(Error::validation(
                &self.id.column,
                format!("missing required ID for table {}", self.table),
            )),
            IdStrategy::Generator(generate) => {
                self.id.value = generate();
                self.id.bind_value().map(Some)
            }
        }
    }

    /// Columns to select when reading rows back: the ID first, then the rest.
    pub(crate) fn select_columns(&self) -> Vec<String> {
        std::iter::once(self.id.column.clone())
            .chain(self.columns.iter().filter(|c| **c != self.id.column).cloned())
            .collect()
    }
}
