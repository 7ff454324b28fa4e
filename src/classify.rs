//! Maps driver errors onto the crate's error taxonomy.

use sqlx::error::ErrorKind;

use crate::error::Error;
use crate::sql::Dialect;

/// Which rule a constraint violation broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Unique,
    ForeignKey,
    Check,
}

const MYSQL_UNIQUE: &[&str] = &["Error 1062", "1062 (23000)", "Duplicate entry"];
const MYSQL_FOREIGN_KEY: &[&str] = &[
    "Error 1451",
    "Error 1452",
    "1451 (23000)",
    "1452 (23000)",
    "a foreign key constraint fails",
];
const MYSQL_CHECK: &[&str] = &["Error 3819", "3819 (HY000)", "Check constraint"];

const POSTGRES_UNIQUE: &[&str] = &["violates unique constraint"];
const POSTGRES_FOREIGN_KEY: &[&str] = &["violates foreign key constraint"];
const POSTGRES_CHECK: &[&str] = &["violates check constraint"];

const SQLITE_UNIQUE: &[&str] = &["UNIQUE constraint failed"];
const SQLITE_FOREIGN_KEY: &[&str] = &["FOREIGN KEY constraint failed"];
const SQLITE_CHECK: &[&str] = &["CHECK constraint failed"];

/// Detect a constraint violation from an error message, using the wording
/// of `dialect`'s server.
pub fn violation(dialect: Dialect, message: &str) -> Option<Violation> {
    let (unique, fk, check) = match dialect {
        Dialect::MySql => (MYSQL_UNIQUE, MYSQL_FOREIGN_KEY, MYSQL_CHECK),
        Dialect::Postgres => (POSTGRES_UNIQUE, POSTGRES_FOREIGN_KEY, POSTGRES_CHECK),
        Dialect::Sqlite => (SQLITE_UNIQUE, SQLITE_FOREIGN_KEY, SQLITE_CHECK),
    };
    let any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));
    if any(unique) {
        Some(Violation::Unique)
    } else if any(fk) {
        Some(Violation::ForeignKey)
    } else if any(check) {
        Some(Violation::Check)
    } else {
        None
    }
}

/// Classify a driver error. Constraint violations become
/// [`Error::Constraint`] wrapping the original error; everything else passes
/// through as [`Error::Driver`].
pub fn classify(dialect: Dialect, err: sqlx::Error) -> Error {
    let found = match &err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => Some(Violation::Unique),
            ErrorKind::ForeignKeyViolation => Some(Violation::ForeignKey),
            ErrorKind::CheckViolation => Some(Violation::Check),
            _ => violation(dialect, db.message()),
        },
        other => violation(dialect, &other.to_string()),
    };
    match found {
        Some(_) => {
            let message = match &err {
                sqlx::Error::Database(db) => db.message().to_string(),
                other => other.to_string(),
            };
            Error::constraint(message, err)
        }
        None => Error::Driver(err),
    }
}
