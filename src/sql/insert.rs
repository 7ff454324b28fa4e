use serde::{Deserialize, Serialize};

use super::builder::{Builder, Statement};
use super::dialect::Dialect;
use crate::error::{Error, Result};
use crate::spec::Value;

/// How an upsert resolves a conflict on a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    /// Skip the conflicting row.
    DoNothing,
    /// Keep the stored row but touch it, so its ID is reported back.
    Ignore,
    /// Overwrite the stored row with the proposed values.
    UpdateNewValues,
}

/// Conflict-resolution policy of an insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnConflict {
    /// Conflict target. Required by `DO UPDATE` on Postgres and SQLite;
    /// ignored by MySQL which resolves on any unique key.
    pub columns: Vec<String>,
    pub action: ConflictAction,
}

impl OnConflict {
    pub fn do_nothing() -> Self {
        Self {
            columns: Vec::new(),
            action: ConflictAction::DoNothing,
        }
    }

    pub fn ignore() -> Self {
        Self {
            columns: Vec::new(),
            action: ConflictAction::Ignore,
        }
    }

    pub fn update_new_values() -> Self {
        Self {
            columns: Vec::new(),
            action: ConflictAction::UpdateNewValues,
        }
    }

    pub fn on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// INSERT statement builder, for one or many rows.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    dialect: Dialect,
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    returning: Vec<String>,
    on_conflict: Option<OnConflict>,
    last_insert_id: Option<String>,
}

impl InsertBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            returning: Vec::new(),
            on_conflict: None,
            last_insert_id: None,
        }
    }

    /// Set a column of a single-row insert.
    pub fn set(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        self.columns.push(column.into());
        if let Some(row) = self.rows.first_mut() {
            row.push(value);
        }
        self
    }

    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn values(&mut self, row: Vec<Value>) -> &mut Self {
        self.rows.push(row);
        self
    }

    pub fn returning(&mut self, column: impl Into<String>) -> &mut Self {
        self.returning.push(column.into());
        self
    }

    pub fn on_conflict(&mut self, on_conflict: OnConflict) -> &mut Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    /// On MySQL, make a conflicting upsert report the existing row's ID via
    /// `LAST_INSERT_ID(id)`.
    pub fn report_conflict_id(&mut self, id_column: impl Into<String>) -> &mut Self {
        self.last_insert_id = Some(id_column.into());
        self
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn query(&self) -> Result<Statement> {
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(Error::validation(
                    &self.table,
                    format!(
                        "insert row {i} has {} values for {} columns",
                        row.len(),
                        self.columns.len()
                    ),
                ));
            }
        }
        let mut b = Builder::new(self.dialect);
        b.push("INSERT INTO ").ident(&self.table);
        if self.columns.is_empty() {
            match self.dialect {
                Dialect::MySql => {
                    b.push(" VALUES ()");
                }
                Dialect::Postgres | Dialect::Sqlite => {
                    b.push(" DEFAULT VALUES");
                }
            }
        } else {
            b.push(" (").idents(&self.columns).push(") VALUES ");
            for (i, row) in self.rows.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.push("(").args(row).push(")");
            }
        }
        if let Some(on_conflict) = &self.on_conflict {
            self.render_conflict(&mut b, on_conflict)?;
        }
        if !self.returning.is_empty() && self.dialect.supports_returning() {
            b.push(" RETURNING ").idents(&self.returning);
        }
        Ok(b.finish())
    }

    fn render_conflict(&self, b: &mut Builder, on_conflict: &OnConflict) -> Result<()> {
        match self.dialect {
            Dialect::Postgres | Dialect::Sqlite => {
                b.push(" ON CONFLICT");
                if !on_conflict.columns.is_empty() {
                    b.push(" (").idents(&on_conflict.columns).push(")");
                }
                let action = match on_conflict.action {
                    _ if self.columns.is_empty() => ConflictAction::DoNothing,
                    action => action,
                };
                if action != ConflictAction::DoNothing && on_conflict.columns.is_empty() {
                    return Err(Error::validation(
                        &self.table,
                        "DO UPDATE upserts require conflict columns",
                    ));
                }
                match action {
                    ConflictAction::DoNothing => {
                        b.push(" DO NOTHING");
                    }
                    ConflictAction::Ignore => {
                        b.push(" DO UPDATE SET ");
                        self.render_sets(b, |b, column| {
                            b.ident(&format!("{}.{column}", self.table));
                        });
                    }
                    ConflictAction::UpdateNewValues => {
                        b.push(" DO UPDATE SET ");
                        self.render_sets(b, |b, column| {
                            b.push("excluded.").ident(column);
                        });
                    }
                }
            }
            Dialect::MySql => {
                let mut sets = Vec::new();
                match on_conflict.action {
                    ConflictAction::DoNothing => {
                        if let Some(first) = self.columns.first() {
                            let mut s = Builder::new(self.dialect);
                            s.ident(first).push(" = ").ident(first);
                            sets.push(s.finish().sql);
                        }
                    }
                    ConflictAction::Ignore => {
                        for column in &self.columns {
                            let mut s = Builder::new(self.dialect);
                            s.ident(column)
                                .push(" = ")
                                .ident(&format!("{}.{column}", self.table));
                            sets.push(s.finish().sql);
                        }
                    }
                    ConflictAction::UpdateNewValues => {
                        for column in &self.columns {
                            let mut s = Builder::new(self.dialect);
                            s.ident(column).push(" = VALUES(").ident(column).push(")");
                            sets.push(s.finish().sql);
                        }
                    }
                }
                if let Some(id) = &self.last_insert_id {
                    if !self.columns.contains(id) || on_conflict.action == ConflictAction::DoNothing {
                        let mut s = Builder::new(self.dialect);
                        s.ident(id)
                            .push(" = LAST_INSERT_ID(")
                            .ident(&format!("{}.{id}", self.table))
                            .push(")");
                        sets.retain(|set| !set.starts_with(&self.dialect.quote(id)));
                        sets.push(s.finish().sql);
                    }
                }
                if sets.is_empty() {
                    // A row without columns still needs a no-op assignment,
                    // or the duplicate fails the statement.
                    let Some(column) = on_conflict.columns.first() else {
                        return Err(Error::validation(
                            &self.table,
                            "MySQL upsert of an empty row requires conflict columns or an ID column",
                        ));
                    };
                    let mut s = Builder::new(self.dialect);
                    s.ident(column).push(" = ").ident(column);
                    sets.push(s.finish().sql);
                }
                b.push(" ON DUPLICATE KEY UPDATE ").push(&sets.join(", "));
            }
        }
        Ok(())
    }

    fn render_sets(&self, b: &mut Builder, value: impl Fn(&mut Builder, &str)) {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.ident(column).push(" = ");
            value(b, column);
        }
    }
}
