//! Error types for the migration tool.

use std::path::PathBuf;

/// Errors that can occur while planning or applying a migration.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Database error during catalog reads or DDL execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing schema files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema model, diff or driver failure.
    #[error(transparent)]
    Core(#[from] codedb_core::Error),

    /// The live catalog could not be mapped onto the schema model.
    #[error("Catalog error: {0}")]
    Catalog(#[from] codedb_pg::PgError),

    /// A schema file could not be used.
    #[error("Invalid schema file '{path}': {message}")]
    SchemaFile {
        /// Path to the schema file.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl MigrateError {
    /// Returns the driver error kind behind a core error, if any.
    #[must_use]
    pub const fn driver_kind(&self) -> Option<codedb_core::DriverErrorKind> {
        match self {
            Self::Core(e) => e.driver_kind(),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
