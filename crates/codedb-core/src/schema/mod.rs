//! Schema model: logical columns, tables, databases and their
//! declaration.

mod column;
mod database;
mod declare;
mod flags;
mod table;
mod types;

pub use column::{Column, ColumnDef, ColumnRegistry, TableId};
pub use database::DatabaseDef;
pub use declare::{DeclareContext, DeclareTable, SchemaBuilder};
pub use flags::ColumnFlags;
pub use table::{ColumnSignature, IndexDef, IndexMethod, PrimaryKeyDef, TableDef, UniqueDef};
pub use types::{ScalarType, SqlType, SqlTyped};
