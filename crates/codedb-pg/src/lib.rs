//! # codedb-pg
//!
//! PostgreSQL support for codedb: the SQL dialect, catalog
//! introspection, and SQLSTATE classification.
//!
//! This crate performs no I/O of its own. Catalog queries run through any
//! [`codedb_core::Connection`], which lets the migration tool drive them
//! over its own client.
//!
//! ## Example
//!
//! ```rust
//! use codedb_core::ddl::{Dialect, Statement};
//! use codedb_pg::PgDialect;
//!
//! let sql = PgDialect::new().generate_sql(&Statement::DropTable { table: "tb_tag".into() });
//! assert_eq!(sql, "DROP TABLE IF EXISTS tb_tag;");
//! ```

pub mod catalog;
pub mod dialect;
pub mod error;
pub mod params;

pub use catalog::{assemble, PgIntrospector};
pub use dialect::{parse_type_name, PgDialect};
pub use error::{driver_error, driver_error_kind, PgError, Result};
pub use params::to_positional;
