//! Schema declaration.
//!
//! A table shape is declared by binding members to logical columns on a
//! [`DeclareContext`]. The context is passed explicitly to the
//! declaration, so the logical column, the member name and the flags all
//! travel as arguments and declarations can run in any order, on any
//! thread.
//!
//! ```
//! use codedb_core::schema::{ColumnFlags, SchemaBuilder};
//!
//! let db = SchemaBuilder::new("app")
//!     .declare("tb_user", |ctx| {
//!         ctx.column::<i32>("UserID", "user_id", ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)?;
//!         ctx.column::<String>("UserName", "user_name", ColumnFlags::UNIQUE_1)?;
//!         Ok(())
//!     })
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! assert_eq!(db.tables().len(), 1);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::error::{ConstructionError, Result};

use super::column::{Column, ColumnDef, ColumnRegistry, TableId};
use super::database::DatabaseDef;
use super::flags::ColumnFlags;
use super::table::TableDef;
use super::types::SqlTyped;

/// A statically declared table shape.
///
/// Usually implemented with `#[derive(Table)]` from `codedb-derive`.
pub trait DeclareTable {
    /// Table name in the database.
    const TABLE_NAME: &'static str;

    /// Binds every member of the table on `ctx`.
    fn declare(ctx: &mut DeclareContext<'_>) -> Result<()>;

    /// Declares this table on its own, with a private registry.
    fn table_def() -> Result<TableDef> {
        let mut registry = ColumnRegistry::new();
        let mut ctx = DeclareContext::new(&mut registry, Self::TABLE_NAME);
        Self::declare(&mut ctx)?;
        ctx.finish()
    }
}

/// Build-time context for one table declaration.
pub struct DeclareContext<'r> {
    registry: &'r mut ColumnRegistry,
    id: TableId,
    table: String,
    columns: Vec<Arc<Column>>,
}

impl<'r> DeclareContext<'r> {
    /// Starts declaring `table`, sharing column definitions through
    /// `registry`.
    pub fn new(registry: &'r mut ColumnRegistry, table: impl Into<String>) -> Self {
        Self {
            registry,
            id: TableId::fresh(),
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Name of the table being declared.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Binds `member` to the logical column `name` of Rust type `T`.
    pub fn column<T: SqlTyped>(
        &mut self,
        member: &str,
        name: &str,
        flags: ColumnFlags,
    ) -> Result<Arc<Column>> {
        let def = self.registry.column::<T>(name, flags)?;
        self.bind(member, def)
    }

    /// Binds `member` to an already registered logical column.
    pub fn bind(&mut self, member: &str, def: Arc<ColumnDef>) -> Result<Arc<Column>> {
        if self.columns.iter().any(|c| c.member() == member) {
            return Err(ConstructionError::DuplicateColumn {
                table: self.table.clone(),
                name: member.to_string(),
            }
            .into());
        }
        if self.columns.iter().any(|c| c.name() == def.name) {
            return Err(ConstructionError::DuplicateColumn {
                table: self.table.clone(),
                name: def.name.clone(),
            }
            .into());
        }
        def.validate()?;

        let column = Column::bind(def, member, self.id, self.table.clone());
        self.columns.push(Arc::clone(&column));
        Ok(column)
    }

    /// Looks up a member bound earlier in this declaration.
    pub fn member(&self, member: &str) -> Result<&Arc<Column>> {
        self.columns
            .iter()
            .find(|c| c.member() == member)
            .ok_or_else(|| {
                ConstructionError::MissingColumnBinding {
                    table: self.table.clone(),
                    member: member.to_string(),
                }
                .into()
            })
    }

    /// Completes the declaration.
    pub fn finish(self) -> Result<TableDef> {
        debug!(table = %self.table, columns = self.columns.len(), "Declared table");
        Ok(TableDef::from_members(self.id, self.table, self.columns))
    }
}

/// Collects table declarations into a [`DatabaseDef`].
///
/// All tables share one [`ColumnRegistry`], so identical logical columns
/// declared by several tables resolve to one [`ColumnDef`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    registry: ColumnRegistry,
    tables: Vec<TableDef>,
}

impl SchemaBuilder {
    /// Starts a schema for database `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: ColumnRegistry::new(),
            tables: Vec::new(),
        }
    }

    /// The shared registry, for registering logical columns up front.
    pub fn registry(&mut self) -> &mut ColumnRegistry {
        &mut self.registry
    }

    /// Adds a table declared by type.
    pub fn table<T: DeclareTable>(self) -> Result<Self> {
        self.declare(T::TABLE_NAME, T::declare)
    }

    /// Adds a table declared by a closure.
    pub fn declare<F>(mut self, table: &str, declare: F) -> Result<Self>
    where
        F: FnOnce(&mut DeclareContext<'_>) -> Result<()>,
    {
        if self.tables.iter().any(|t| t.name() == table) {
            return Err(ConstructionError::DuplicateTable(table.to_string()).into());
        }
        let mut ctx = DeclareContext::new(&mut self.registry, table);
        declare(&mut ctx)?;
        let table = ctx.finish()?;
        self.tables.push(table);
        Ok(self)
    }

    /// Finishes the schema.
    pub fn build(self) -> Result<DatabaseDef> {
        Ok(DatabaseDef::new(self.name, self.tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::types::{ScalarType, SqlType};

    fn user(ctx: &mut DeclareContext<'_>) -> Result<()> {
        ctx.column::<i32>("UserID", "user_id", ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)?;
        ctx.column::<String>("UserName", "user_name", ColumnFlags::INDEX_1 | ColumnFlags::UNIQUE_1)?;
        Ok(())
    }

    #[test]
    fn declares_table() {
        let db = SchemaBuilder::new("app")
            .declare("tb_user", user)
            .unwrap()
            .build()
            .unwrap();
        let table = db.table("tb_user").unwrap();
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.column("UserID").unwrap().name(), "user_id");
        assert!(table.primary_key().is_some());
        assert_eq!(table.indices().len(), 1);
        assert_eq!(table.uniques().len(), 1);
    }

    #[test]
    fn duplicate_member_rejected() {
        let err = SchemaBuilder::new("app")
            .declare("t", |ctx| {
                ctx.column::<i32>("A", "a", ColumnFlags::empty())?;
                ctx.column::<i32>("A", "b", ColumnFlags::empty())?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::DuplicateColumn { ref name, .. }) if name == "A"
        ));
    }

    #[test]
    fn duplicate_column_name_rejected() {
        let err = SchemaBuilder::new("app")
            .declare("t", |ctx| {
                ctx.column::<i32>("A", "a", ColumnFlags::empty())?;
                ctx.column::<i32>("B", "a", ColumnFlags::INDEX_1)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::DuplicateColumn { ref name, .. }) if name == "a"
        ));
    }

    #[test]
    fn unrouted_member_rejected() {
        let err = SchemaBuilder::new("app")
            .declare("t", |ctx| {
                ctx.column::<i32>("A", "a", ColumnFlags::empty())?;
                ctx.member("B")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::MissingColumnBinding { ref member, .. }) if member == "B"
        ));
    }

    #[test]
    fn duplicate_table_rejected() {
        let err = SchemaBuilder::new("app")
            .declare("tb_user", user)
            .unwrap()
            .declare("tb_user", user)
            .unwrap_err();
        assert_eq!(err, ConstructionError::DuplicateTable("tb_user".into()).into());
    }

    #[test]
    fn shared_logical_column_across_tables() {
        let mut builder = SchemaBuilder::new("app");
        let shared = builder
            .registry()
            .define("user_id", SqlType::Scalar(ScalarType::Int32), ColumnFlags::empty())
            .unwrap();
        let db = builder
            .declare("tb_a", |ctx| {
                ctx.bind("UserID", Arc::clone(&shared))?;
                Ok(())
            })
            .unwrap()
            .declare("tb_b", |ctx| {
                ctx.column::<i32>("Owner", "user_id", ColumnFlags::empty())?;
                Ok(())
            })
            .unwrap()
            .build()
            .unwrap();

        let a = db.table("tb_a").unwrap().column("UserID").unwrap();
        let b = db.table("tb_b").unwrap().column("Owner").unwrap();
        assert!(Arc::ptr_eq(a.def(), b.def()));
        assert!(!Arc::ptr_eq(a, b));
        assert_ne!(a.table_id(), b.table_id());
    }

    #[test]
    fn declarations_are_isolated_per_context() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    SchemaBuilder::new(format!("db{i}"))
                        .declare("tb_user", user)
                        .and_then(SchemaBuilder::build)
                })
            })
            .collect();
        for handle in handles {
            let db = handle.join().unwrap().unwrap();
            assert_eq!(db.table("tb_user").unwrap().columns().len(), 2);
        }
    }
}
