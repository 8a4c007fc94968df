//! Schema migrations for PostgreSQL.
//!
//! `codedb-migrate` compares the live catalog of a database with a
//! declared target schema and applies the difference:
//! - The target is a [`DatabaseDef`](codedb_core::DatabaseDef), usually
//!   exported as JSON by the application that declares it
//! - The current schema is read from the catalog over `sqlx`
//! - The statements come from the core diff engine and are rendered by
//!   [`PgDialect`](codedb_pg::PgDialect)
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the live schema
//! codedb-migrate dump > current.json
//!
//! # Show the DDL that would reach the target
//! codedb-migrate plan --target schema.json
//!
//! # Apply it in one transaction
//! codedb-migrate apply --target schema.json
//!
//! # Prepare the environment
//! codedb-migrate create-role --name app --password secret
//! codedb-migrate create-database --name appdb --owner app
//! ```

pub mod catalog;
pub mod error;
pub mod executor;
pub mod schema_file;

/// Re-exports of commonly used types.
pub mod prelude {
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{plan, EnvironmentOutcome, MigrationExecutor};
    pub use crate::schema_file::{load_schema, save_schema, to_json};
    pub use codedb_core::ddl::{Dialect, Environment, Statement};
    pub use codedb_core::schema::DatabaseDef;
    pub use codedb_pg::PgDialect;
}
