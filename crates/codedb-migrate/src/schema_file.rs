//! Schema files.
//!
//! A declared schema is exported by the application as JSON and read
//! back here as the target of a migration.

use std::fs;
use std::path::Path;

use codedb_core::schema::DatabaseDef;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Reads a schema from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid schema.
pub fn load_schema(path: &Path) -> Result<DatabaseDef> {
    let text = fs::read_to_string(path)?;
    let db: DatabaseDef = serde_json::from_str(&text).map_err(|e| MigrateError::SchemaFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!(path = %path.display(), tables = db.tables().len(), "Schema loaded");
    Ok(db)
}

/// Writes a schema as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_schema(db: &DatabaseDef, path: &Path) -> Result<()> {
    fs::write(path, to_json(db)?)?;
    debug!(path = %path.display(), "Schema saved");
    Ok(())
}

/// Renders a schema as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(db: &DatabaseDef) -> Result<String> {
    Ok(serde_json::to_string_pretty(db)?)
}
