//! Table definitions and their key, index and unique constraints.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConstructionError, Result};

use super::column::{Column, ColumnDef, TableId};
use super::flags::ColumnFlags;
use super::types::SqlType;

/// Ordered (name, type) list used to match keys, indices and uniques
/// between two schemas. Constraint names never take part.
pub type ColumnSignature = Vec<(String, SqlType)>;

fn signature_of(columns: &[Arc<ColumnDef>]) -> ColumnSignature {
    columns
        .iter()
        .map(|c| (c.name.clone(), c.sql_type))
        .collect()
}

fn joined_names(columns: &[Arc<ColumnDef>]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join("_")
}

/// Storage method of an index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IndexMethod {
    /// The database default (b-tree).
    #[default]
    Default,
    /// Generalized inverted index, for arrays.
    Gin,
}

/// A named primary key over an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyDef {
    /// Constraint name.
    pub name: String,
    /// Key columns in order.
    pub columns: Vec<Arc<ColumnDef>>,
}

impl PrimaryKeyDef {
    /// Creates a primary key named `pkey_{table}_{columns}`.
    #[must_use]
    pub fn for_table(table: &str, columns: Vec<Arc<ColumnDef>>) -> Self {
        Self {
            name: format!("pkey_{table}_{}", joined_names(&columns)),
            columns,
        }
    }

    /// Matching signature.
    #[must_use]
    pub fn signature(&self) -> ColumnSignature {
        signature_of(&self.columns)
    }

    /// Returns `true` if the key covers a column named `name`.
    #[must_use]
    pub fn covers(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// A named index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Storage method.
    pub method: IndexMethod,
    /// Indexed columns in order.
    pub columns: Vec<Arc<ColumnDef>>,
}

impl IndexDef {
    /// Creates an index named `idx_{table}_{columns}`.
    #[must_use]
    pub fn for_table(table: &str, method: IndexMethod, columns: Vec<Arc<ColumnDef>>) -> Self {
        Self {
            name: format!("idx_{table}_{}", joined_names(&columns)),
            method,
            columns,
        }
    }

    /// Matching signature, the method included.
    #[must_use]
    pub fn signature(&self) -> (ColumnSignature, IndexMethod) {
        (signature_of(&self.columns), self.method)
    }

    /// Returns `true` if the index covers a column named `name`.
    #[must_use]
    pub fn covers(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// A named unique constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueDef {
    /// Constraint name.
    pub name: String,
    /// Constrained columns in order.
    pub columns: Vec<Arc<ColumnDef>>,
}

impl UniqueDef {
    /// Creates a unique constraint named `uniq_{table}_{columns}`.
    #[must_use]
    pub fn for_table(table: &str, columns: Vec<Arc<ColumnDef>>) -> Self {
        Self {
            name: format!("uniq_{table}_{}", joined_names(&columns)),
            columns,
        }
    }

    /// Matching signature.
    #[must_use]
    pub fn signature(&self) -> ColumnSignature {
        signature_of(&self.columns)
    }

    /// Returns `true` if the constraint covers a column named `name`.
    #[must_use]
    pub fn covers(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// The declared or introspected shape of one table.
///
/// A `TableDef` is not `Clone`: every column it holds is
/// bound to this instance. Use [`aliased_clone`](Self::aliased_clone) for
/// an independent copy, e.g. for a self-join.
#[derive(Debug)]
pub struct TableDef {
    id: TableId,
    name: String,
    columns: Vec<Arc<Column>>,
    primary_key: Option<PrimaryKeyDef>,
    indices: Vec<IndexDef>,
    uniques: Vec<UniqueDef>,
}

impl TableDef {
    /// Creates a table with explicit constraints, as read from a catalog.
    ///
    /// Members are named after their columns. Duplicate column names are
    /// kept so that the diff engine can report them.
    #[must_use]
    pub fn with_constraints(
        name: impl Into<String>,
        columns: Vec<Arc<ColumnDef>>,
        primary_key: Option<PrimaryKeyDef>,
        indices: Vec<IndexDef>,
        uniques: Vec<UniqueDef>,
    ) -> Self {
        let name = name.into();
        let id = TableId::fresh();
        let columns = columns
            .into_iter()
            .map(|def| {
                let member = def.name.clone();
                Column::bind(def, member, id, name.clone())
            })
            .collect();
        Self {
            id,
            name,
            columns,
            primary_key,
            indices,
            uniques,
        }
    }

    /// Creates a table from bound members, deriving the primary key,
    /// indices and uniques from column flags.
    pub(crate) fn from_members(
        id: TableId,
        name: String,
        columns: Vec<Arc<Column>>,
    ) -> Self {
        let defs: Vec<Arc<ColumnDef>> = columns.iter().map(|c| Arc::clone(c.def())).collect();

        let pk_columns: Vec<Arc<ColumnDef>> = defs
            .iter()
            .filter(|d| d.flags.contains(ColumnFlags::PRIMARY_KEY))
            .cloned()
            .collect();
        let primary_key =
            (!pk_columns.is_empty()).then(|| PrimaryKeyDef::for_table(&name, pk_columns));

        let mut indices = Vec::new();
        let mut uniques = Vec::new();
        for tier in 1..=4u8 {
            let index_columns: Vec<Arc<ColumnDef>> = defs
                .iter()
                .filter(|d| d.flags.index_tiers().contains(&tier))
                .cloned()
                .collect();
            if !index_columns.is_empty() {
                let method = if index_columns.iter().any(|d| d.flags.contains(ColumnFlags::GIN)) {
                    IndexMethod::Gin
                } else {
                    IndexMethod::Default
                };
                indices.push(IndexDef::for_table(&name, method, index_columns));
            }

            let unique_columns: Vec<Arc<ColumnDef>> = defs
                .iter()
                .filter(|d| d.flags.unique_tiers().contains(&tier))
                .cloned()
                .collect();
            if !unique_columns.is_empty() {
                uniques.push(UniqueDef::for_table(&name, unique_columns));
            }
        }

        Self {
            id,
            name,
            columns,
            primary_key,
            indices,
            uniques,
        }
    }

    /// Identity of this instance.
    #[must_use]
    pub const fn id(&self) -> TableId {
        self.id
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Logical column definitions in declaration order.
    pub fn column_defs(&self) -> impl Iterator<Item = &Arc<ColumnDef>> + '_ {
        self.columns.iter().map(|c| c.def())
    }

    /// Looks up the column bound to `member`.
    pub fn column(&self, member: &str) -> Result<&Arc<Column>> {
        self.columns
            .iter()
            .find(|c| c.member() == member)
            .ok_or_else(|| {
                ConstructionError::MissingColumnBinding {
                    table: self.name.clone(),
                    member: member.to_string(),
                }
                .into()
            })
    }

    /// Looks up a column by its database name.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Returns `true` if `column` is bound to this instance.
    #[must_use]
    pub fn owns(&self, column: &Column) -> bool {
        column.table_id() == self.id
    }

    /// Primary key, if any.
    #[must_use]
    pub const fn primary_key(&self) -> Option<&PrimaryKeyDef> {
        self.primary_key.as_ref()
    }

    /// Indices.
    #[must_use]
    pub fn indices(&self) -> &[IndexDef] {
        &self.indices
    }

    /// Unique constraints.
    #[must_use]
    pub fn uniques(&self) -> &[UniqueDef] {
        &self.uniques
    }

    /// Returns an independent copy: same name, same column shapes and
    /// constraints, but a fresh identity and fresh columns.
    #[must_use]
    pub fn aliased_clone(&self) -> Self {
        let id = TableId::fresh();
        let columns = self
            .columns
            .iter()
            .map(|c| Column::bind(Arc::clone(c.def()), c.member(), id, self.name.clone()))
            .collect();
        Self {
            id,
            name: self.name.clone(),
            columns,
            primary_key: self.primary_key.clone(),
            indices: self.indices.clone(),
            uniques: self.uniques.clone(),
        }
    }

    /// Compares the structure of two tables, ignoring identity, column
    /// order and constraint names. Columns match by name, as in the diff.
    #[must_use]
    pub fn same_structure(&self, other: &Self) -> bool {
        fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
            v.sort();
            v
        }

        self.name == other.name
            && self.columns.len() == other.columns.len()
            && self.column_defs().all(|a| {
                other
                    .column_by_name(&a.name)
                    .is_some_and(|b| a.same_shape(b.def()))
            })
            && self.primary_key.as_ref().map(PrimaryKeyDef::signature)
                == other.primary_key.as_ref().map(PrimaryKeyDef::signature)
            && sorted(self.indices.iter().map(IndexDef::signature).collect::<Vec<_>>())
                == sorted(other.indices.iter().map(IndexDef::signature).collect::<Vec<_>>())
            && sorted(self.uniques.iter().map(UniqueDef::signature).collect::<Vec<_>>())
                == sorted(other.uniques.iter().map(UniqueDef::signature).collect::<Vec<_>>())
    }
}

// ================================================================
// Serialization
// ================================================================

#[derive(Serialize, Deserialize)]
struct ColumnRepr {
    #[serde(flatten)]
    def: ColumnDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    member: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct KeyRepr {
    name: String,
    columns: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct IndexRepr {
    name: String,
    #[serde(default)]
    method: IndexMethod,
    columns: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct TableRepr {
    name: String,
    columns: Vec<ColumnRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary_key: Option<KeyRepr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    indices: Vec<IndexRepr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    uniques: Vec<KeyRepr>,
}

fn names_of(columns: &[Arc<ColumnDef>]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

impl From<&TableDef> for TableRepr {
    fn from(table: &TableDef) -> Self {
        Self {
            name: table.name.clone(),
            columns: table
                .columns
                .iter()
                .map(|c| ColumnRepr {
                    def: ColumnDef::clone(c.def()),
                    member: (c.member() != c.name()).then(|| c.member().to_string()),
                })
                .collect(),
            primary_key: table.primary_key.as_ref().map(|pk| KeyRepr {
                name: pk.name.clone(),
                columns: names_of(&pk.columns),
            }),
            indices: table
                .indices
                .iter()
                .map(|i| IndexRepr {
                    name: i.name.clone(),
                    method: i.method,
                    columns: names_of(&i.columns),
                })
                .collect(),
            uniques: table
                .uniques
                .iter()
                .map(|u| KeyRepr {
                    name: u.name.clone(),
                    columns: names_of(&u.columns),
                })
                .collect(),
        }
    }
}

impl TryFrom<TableRepr> for TableDef {
    type Error = String;

    fn try_from(repr: TableRepr) -> std::result::Result<Self, String> {
        let id = TableId::fresh();
        let defs: Vec<Arc<ColumnDef>> = repr
            .columns
            .iter()
            .map(|c| Arc::new(c.def.clone()))
            .collect();
        let resolve = |names: &[String]| -> std::result::Result<Vec<Arc<ColumnDef>>, String> {
            names
                .iter()
                .map(|n| {
                    defs.iter()
                        .find(|d| &d.name == n)
                        .cloned()
                        .ok_or_else(|| format!("table '{}' has no column '{n}'", repr.name))
                })
                .collect()
        };

        let primary_key = repr
            .primary_key
            .as_ref()
            .map(|k| {
                Ok::<_, String>(PrimaryKeyDef {
                    name: k.name.clone(),
                    columns: resolve(&k.columns)?,
                })
            })
            .transpose()?;
        let indices = repr
            .indices
            .iter()
            .map(|i| {
                Ok(IndexDef {
                    name: i.name.clone(),
                    method: i.method,
                    columns: resolve(&i.columns)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;
        let uniques = repr
            .uniques
            .iter()
            .map(|u| {
                Ok(UniqueDef {
                    name: u.name.clone(),
                    columns: resolve(&u.columns)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;

        let columns = repr
            .columns
            .iter()
            .zip(&defs)
            .map(|(c, def)| {
                let member = c.member.clone().unwrap_or_else(|| def.name.clone());
                Column::bind(Arc::clone(def), member, id, repr.name.clone())
            })
            .collect();

        Ok(Self {
            id,
            name: repr.name,
            columns,
            primary_key,
            indices,
            uniques,
        })
    }
}

impl Serialize for TableDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TableRepr::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableDef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = TableRepr::deserialize(deserializer)?;
        Self::try_from(repr).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::types::ScalarType;

    fn def(name: &str, ty: ScalarType, flags: ColumnFlags) -> Arc<ColumnDef> {
        Arc::new(ColumnDef::new(name, SqlType::Scalar(ty), flags))
    }

    fn sample() -> TableDef {
        let id = TableId::fresh();
        let columns = vec![
            Column::bind(
                def("user_id", ScalarType::Int32, ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL),
                "UserID",
                id,
                "tb_user",
            ),
            Column::bind(
                def("user_name", ScalarType::Text, ColumnFlags::INDEX_1 | ColumnFlags::UNIQUE_1),
                "UserName",
                id,
                "tb_user",
            ),
            Column::bind(
                def("create_date_time", ScalarType::Timestamp, ColumnFlags::INDEX_2 | ColumnFlags::DEFAULT_NOW),
                "CreateDateTime",
                id,
                "tb_user",
            ),
        ];
        TableDef::from_members(id, "tb_user".into(), columns)
    }

    // ================================================================
    // Constraints derived from flags
    // ================================================================

    #[test]
    fn primary_key_from_flags() {
        let table = sample();
        let pk = table.primary_key().unwrap();
        assert_eq!(pk.name, "pkey_tb_user_user_id");
        assert_eq!(pk.columns.len(), 1);
    }

    #[test]
    fn indices_per_tier() {
        let table = sample();
        let names: Vec<&str> = table.indices().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["idx_tb_user_user_name", "idx_tb_user_create_date_time"]);
        assert!(table.indices().iter().all(|i| i.method == IndexMethod::Default));
        assert_eq!(table.uniques().len(), 1);
        assert_eq!(table.uniques()[0].name, "uniq_tb_user_user_name");
    }

    #[test]
    fn composite_gin_index() {
        let id = TableId::fresh();
        let columns = vec![
            Column::bind(def("a", ScalarType::Int32, ColumnFlags::INDEX_1), "a", id, "t"),
            Column::bind(
                Arc::new(ColumnDef::new(
                    "tags",
                    SqlType::Array(ScalarType::Int32),
                    ColumnFlags::INDEX_1 | ColumnFlags::GIN,
                )),
                "tags",
                id,
                "t",
            ),
        ];
        let table = TableDef::from_members(id, "t".into(), columns);
        assert_eq!(table.indices().len(), 1);
        assert_eq!(table.indices()[0].name, "idx_t_a_tags");
        assert_eq!(table.indices()[0].method, IndexMethod::Gin);
    }

    // ================================================================
    // Lookup and identity
    // ================================================================

    #[test]
    fn member_lookup() {
        let table = sample();
        assert_eq!(table.column("UserName").unwrap().name(), "user_name");
        let err = table.column("Missing").unwrap_err();
        assert!(matches!(
            err,
            Error::Construction(ConstructionError::MissingColumnBinding { ref member, .. }) if member == "Missing"
        ));
    }

    #[test]
    fn aliased_clone_has_fresh_identity() {
        let table = sample();
        let alias = table.aliased_clone();
        assert_ne!(table.id(), alias.id());
        assert_eq!(table.name(), alias.name());
        for (a, b) in table.columns().iter().zip(alias.columns()) {
            assert!(!Arc::ptr_eq(a, b));
            assert_eq!(a.def(), b.def());
            assert_eq!(a.member(), b.member());
            assert!(alias.owns(b));
            assert!(!alias.owns(a));
        }
        assert!(table.same_structure(&alias));
    }

    #[test]
    fn column_order_is_not_structure() {
        let id = Arc::new(ColumnDef::new("id", SqlType::Scalar(ScalarType::Int32), ColumnFlags::empty()));
        let name = Arc::new(ColumnDef::new("name", SqlType::Scalar(ScalarType::Text), ColumnFlags::empty()));
        let nullable_name = Arc::new(ColumnDef::new(
            "name",
            SqlType::Scalar(ScalarType::Text),
            ColumnFlags::NULLABLE,
        ));
        let a = TableDef::with_constraints("t", vec![Arc::clone(&id), Arc::clone(&name)], None, vec![], vec![]);
        let b = TableDef::with_constraints("t", vec![Arc::clone(&name), Arc::clone(&id)], None, vec![], vec![]);
        let c = TableDef::with_constraints("t", vec![nullable_name, id], None, vec![], vec![]);
        assert!(a.same_structure(&b));
        assert!(!a.same_structure(&c));
    }

    // ================================================================
    // Serialization
    // ================================================================

    #[test]
    fn json_keeps_structure_and_members() {
        let table = sample();
        let json = serde_json::to_string(&table).unwrap();
        let back: TableDef = serde_json::from_str(&json).unwrap();
        assert!(table.same_structure(&back));
        assert_ne!(table.id(), back.id());
        assert_eq!(back.column("UserID").unwrap().name(), "user_id");
    }

    #[test]
    fn json_rejects_unknown_constraint_column() {
        let json = r#"{
            "name": "t",
            "columns": [{"name": "a", "sql_type": {"scalar": "int32"}}],
            "primary_key": {"name": "pk", "columns": ["b"]}
        }"#;
        let err = serde_json::from_str::<TableDef>(json).unwrap_err();
        assert!(err.to_string().contains("has no column 'b'"));
    }
}
