//! # codedb-core
//!
//! Declarative schemas, schema diffing and parameterized SQL compilation.
//!
//! This crate provides:
//! - A schema model ([`schema`]) built from explicit table declarations,
//!   usually generated by `#[derive(Table)]` from `codedb-derive`
//! - A structural diff engine ([`diff`]) and a DDL emitter ([`ddl`])
//!   turning two schema snapshots into an ordered list of statements
//! - A query tree ([`query`]) and a restricted expression language
//!   ([`expr`]) compiled into [`Commandable`]s whose values are always
//!   passed as parameters
//!
//! ## Migrating
//!
//! ```rust
//! use codedb_core::ddl::{emit_ddl, Statement};
//! use codedb_core::diff::diff;
//! use codedb_core::schema::{ColumnFlags, DatabaseDef, SchemaBuilder};
//!
//! let target = SchemaBuilder::new("app")
//!     .declare("tb_tag", |ctx| {
//!         ctx.column::<i32>("Id", "tag_id", ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)?;
//!         ctx.column::<String>("Text", "tag_text", ColumnFlags::UNIQUE_1)?;
//!         Ok(())
//!     })?
//!     .build()?;
//! let current = DatabaseDef::new("app", vec![]);
//!
//! let statements = emit_ddl(&diff(&current, &target)?);
//! assert!(matches!(statements[0], Statement::CreateTable { .. }));
//! # Ok::<(), codedb_core::Error>(())
//! ```
//!
//! ## Querying
//!
//! Values never reach the SQL text:
//!
//! ```rust
//! use std::sync::Arc;
//! use codedb_core::expr::{col, val};
//! use codedb_core::query::Sql;
//! use codedb_core::schema::{ColumnFlags, SchemaBuilder};
//!
//! let db = SchemaBuilder::new("app")
//!     .declare("tb_tag", |ctx| {
//!         ctx.column::<String>("Text", "tag_text", ColumnFlags::empty())?;
//!         Ok(())
//!     })?
//!     .build()?;
//! let tags = Arc::clone(&db.tables()[0]);
//! let text = Arc::clone(tags.column("Text")?);
//!
//! let mut sql = Sql::new();
//! let from = sql.from(&tags);
//! sql.where_clause(from, col(&text).equals(val("'; DROP TABLE tb_tag; --")))?;
//! let (text, parameters) = sql.build(from)?.command_text_and_parameters()?;
//! assert_eq!(text, "SELECT * FROM tb_tag t0 WHERE t0.tag_text=@p0;");
//! assert_eq!(parameters.len(), 1);
//! # Ok::<(), codedb_core::Error>(())
//! ```

pub mod command;
pub mod connection;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod expr;
pub mod introspect;
pub mod query;
pub mod schema;
pub mod value;

pub use command::{Argument, CodeBuffer, Commandable, DelayedCode, Parameter};
pub use connection::{
    BoundParameter, Command, Connection, ConnectionFactory, FromRow, Row, RowStream,
};
pub use ddl::{emit_ddl, Dialect, Environment, EnvironmentStatement, Statement};
pub use diff::{diff, DatabaseDelta, TableDelta};
pub use error::{ConstructionError, DriverError, DriverErrorKind, Error, Result};
pub use expr::Expr;
pub use introspect::Introspect;
pub use query::{NodeId, Sql};
pub use schema::{
    Column, ColumnDef, ColumnFlags, DatabaseDef, DeclareContext, DeclareTable, SchemaBuilder,
    SqlType, TableDef,
};
pub use value::{FromValue, ToValue, Value};
