//! Error types and SQLSTATE classification.

use codedb_core::error::{DriverError, DriverErrorKind};

/// `duplicate_database`
pub const DUPLICATE_DATABASE: &str = "42P04";
/// `duplicate_object`
pub const DUPLICATE_OBJECT: &str = "42710";
/// `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";

/// Maps a SQLSTATE to the driver error taxonomy.
#[must_use]
pub fn driver_error_kind(sqlstate: &str) -> DriverErrorKind {
    match sqlstate {
        DUPLICATE_DATABASE => DriverErrorKind::DuplicateDatabase,
        DUPLICATE_OBJECT => DriverErrorKind::DuplicateObject,
        UNIQUE_VIOLATION => DriverErrorKind::DuplicateKey,
        _ => DriverErrorKind::Unknown,
    }
}

/// Wraps a native failure, classifying it by its SQLSTATE when present.
#[must_use]
pub fn driver_error(sqlstate: Option<&str>, message: impl Into<String>) -> DriverError {
    let kind = sqlstate.map_or(DriverErrorKind::Unknown, driver_error_kind);
    DriverError::new(kind, sqlstate.map(str::to_string), message)
}

/// Errors raised while reading the PostgreSQL catalog.
#[derive(Debug, thiserror::Error)]
pub enum PgError {
    /// A column uses a type with no logical counterpart.
    #[error("column '{table}.{column}' has unsupported type '{udt_name}'")]
    UnsupportedType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Catalog type name.
        udt_name: String,
    },

    /// A catalog row is missing a value.
    #[error("catalog query '{query}' returned a row without column {index}")]
    MalformedRow {
        /// Which catalog query.
        query: &'static str,
        /// Missing column position.
        index: usize,
    },

    /// A constraint or index names a column its table does not have.
    #[error("{kind} '{name}' on table '{table}' refers to unknown column '{column}'")]
    UnknownColumn {
        /// Constraint kind.
        kind: &'static str,
        /// Constraint or index name.
        name: String,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Core or driver failure.
    #[error(transparent)]
    Core(#[from] codedb_core::Error),
}

/// Result type for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(driver_error_kind("42P04"), DriverErrorKind::DuplicateDatabase);
        assert_eq!(driver_error_kind("42710"), DriverErrorKind::DuplicateObject);
        assert_eq!(driver_error_kind("23505"), DriverErrorKind::DuplicateKey);
    }

    #[test]
    fn unknown_codes() {
        assert_eq!(driver_error_kind("40001"), DriverErrorKind::Unknown);
        let err = driver_error(None, "connection refused");
        assert_eq!(err.kind, DriverErrorKind::Unknown);
        assert!(err.code.is_none());
    }

    #[test]
    fn code_preserved() {
        let err = driver_error(Some("42710"), "role \"app\" already exists");
        assert_eq!(err.kind, DriverErrorKind::DuplicateObject);
        assert_eq!(err.code.as_deref(), Some("42710"));
    }
}
