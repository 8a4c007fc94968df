//! Logical columns, bound columns and the column registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConstructionError, Result};

use super::flags::ColumnFlags;
use super::types::{SqlType, SqlTyped};

/// A logical column: name, type and flags, independent of any table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as stored in the database.
    pub name: String,
    /// Logical type.
    pub sql_type: SqlType,
    /// Option bits.
    #[serde(default)]
    pub flags: ColumnFlags,
}

impl ColumnDef {
    /// Creates a column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType, flags: ColumnFlags) -> Self {
        Self {
            name: name.into(),
            sql_type,
            flags,
        }
    }

    /// Returns `true` if NULL is allowed.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.flags.contains(ColumnFlags::NULLABLE)
    }

    /// Returns `true` if the column auto-increments.
    #[must_use]
    pub const fn is_serial(&self) -> bool {
        self.flags.contains(ColumnFlags::SERIAL)
    }

    /// Returns `true` if the column defaults to the current timestamp.
    #[must_use]
    pub const fn is_default_now(&self) -> bool {
        self.flags.contains(ColumnFlags::DEFAULT_NOW)
    }

    /// Two definitions describe the same physical column when name, type
    /// and structural flags agree.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.name == other.name
            && self.sql_type == other.sql_type
            && self.flags.structural() == other.flags.structural()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_serial() && (self.sql_type.is_array() || !self.sql_type.scalar().supports_serial())
        {
            return Err(ConstructionError::SerialTypeMismatch {
                column: self.name.clone(),
                sql_type: self.sql_type.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.sql_type)
    }
}

/// Identity of one [`TableDef`](super::TableDef) instance.
///
/// Every table, including every aliased clone, receives a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u64);

impl TableId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A [`ColumnDef`] bound to exactly one table and one member slot.
///
/// Columns are always handled as `Arc<Column>`; two handles denote the
/// same column only if they point to the same allocation.
#[derive(Debug)]
pub struct Column {
    def: Arc<ColumnDef>,
    member: String,
    table_id: TableId,
    table_name: String,
}

impl Column {
    pub(crate) fn bind(
        def: Arc<ColumnDef>,
        member: impl Into<String>,
        table_id: TableId,
        table_name: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            def,
            member: member.into(),
            table_id,
            table_name: table_name.into(),
        })
    }

    /// The logical column.
    #[must_use]
    pub const fn def(&self) -> &Arc<ColumnDef> {
        &self.def
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Member slot the column is bound to.
    #[must_use]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Identity of the owning table.
    #[must_use]
    pub const fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Name of the owning table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// Maps logical column names to shared [`ColumnDef`] instances.
///
/// Registering the same name, type and flags twice returns the same
/// `Arc`, so tables declaring "the same logical column" share one
/// definition. Re-registering a name with a different type is an error.
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    defs: BTreeMap<String, Vec<Arc<ColumnDef>>>,
}

impl ColumnRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared definition for `name`, creating it if needed.
    pub fn define(
        &mut self,
        name: &str,
        sql_type: SqlType,
        flags: ColumnFlags,
    ) -> Result<Arc<ColumnDef>> {
        if let Some(variants) = self.defs.get(name) {
            if let Some(existing) = variants.first() {
                if existing.sql_type != sql_type {
                    return Err(ConstructionError::ConflictingColumnDef {
                        name: name.to_string(),
                        existing: existing.sql_type.to_string(),
                        requested: sql_type.to_string(),
                    }
                    .into());
                }
            }
            if let Some(found) = variants.iter().find(|d| d.flags == flags) {
                return Ok(Arc::clone(found));
            }
        }

        let def = ColumnDef::new(name, sql_type, flags);
        def.validate()?;
        debug!(column = %name, sql_type = %sql_type, flags = ?flags, "Registered column definition");
        let def = Arc::new(def);
        self.defs
            .entry(name.to_string())
            .or_default()
            .push(Arc::clone(&def));
        Ok(def)
    }

    /// Typed variant of [`define`](Self::define). Flags implied by the
    /// Rust type (nullability of `Option<T>`) are added.
    pub fn column<T: SqlTyped>(&mut self, name: &str, flags: ColumnFlags) -> Result<Arc<ColumnDef>> {
        self.define(name, T::SQL_TYPE, flags | T::implied_flags())
    }

    /// Returns the type registered for `name`.
    #[must_use]
    pub fn sql_type(&self, name: &str) -> Option<SqlType> {
        self.defs.get(name).and_then(|v| v.first()).map(|d| d.sql_type)
    }

    /// Number of distinct logical column names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::types::ScalarType;

    const INT4: SqlType = SqlType::Scalar(ScalarType::Int32);
    const TEXT: SqlType = SqlType::Scalar(ScalarType::Text);

    #[test]
    fn same_declaration_is_shared() {
        let mut registry = ColumnRegistry::new();
        let a = registry.define("user_id", INT4, ColumnFlags::empty()).unwrap();
        let b = registry.define("user_id", INT4, ColumnFlags::empty()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_flags_make_a_new_definition() {
        let mut registry = ColumnRegistry::new();
        let a = registry.define("user_id", INT4, ColumnFlags::empty()).unwrap();
        let b = registry
            .define("user_id", INT4, ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.sql_type("user_id"), Some(INT4));
    }

    #[test]
    fn conflicting_type_rejected() {
        let mut registry = ColumnRegistry::new();
        registry.define("name", TEXT, ColumnFlags::empty()).unwrap();
        let err = registry.define("name", INT4, ColumnFlags::empty()).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::ConflictingColumnDef { ref name, .. }) if name == "name"
        ));
    }

    #[test]
    fn serial_requires_integer() {
        let mut registry = ColumnRegistry::new();
        let err = registry.define("title", TEXT, ColumnFlags::SERIAL).unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::SerialTypeMismatch { .. })
        ));
        assert!(registry.define("id", INT4, ColumnFlags::SERIAL).is_ok());
    }

    #[test]
    fn typed_registration_adds_nullable() {
        let mut registry = ColumnRegistry::new();
        let def = registry
            .column::<Option<String>>("nickname", ColumnFlags::empty())
            .unwrap();
        assert!(def.is_nullable());
        assert_eq!(def.sql_type, TEXT);
    }

    #[test]
    fn same_shape_ignores_membership_flags() {
        let a = ColumnDef::new("a", INT4, ColumnFlags::INDEX_1);
        let b = ColumnDef::new("a", INT4, ColumnFlags::UNIQUE_2 | ColumnFlags::PRIMARY_KEY);
        assert!(a.same_shape(&b));
        let c = ColumnDef::new("a", INT4, ColumnFlags::NULLABLE);
        assert!(!a.same_shape(&c));
    }
}
