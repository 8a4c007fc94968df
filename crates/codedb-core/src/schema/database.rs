//! Database definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::table::TableDef;

/// A named list of tables: either read from a live catalog ("current")
/// or declared in code ("target").
#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseDef {
    name: String,
    tables: Vec<Arc<TableDef>>,
}

impl DatabaseDef {
    /// Creates a database definition.
    #[must_use]
    pub fn new(name: impl Into<String>, tables: Vec<TableDef>) -> Self {
        Self {
            name: name.into(),
            tables: tables.into_iter().map(Arc::new).collect(),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[Arc<TableDef>] {
        &self.tables
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Arc<TableDef>> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Compares the structure of two databases, ignoring table order,
    /// identities and constraint names.
    #[must_use]
    pub fn same_structure(&self, other: &Self) -> bool {
        self.tables.len() == other.tables.len()
            && self.tables.iter().all(|t| {
                other
                    .table(t.name())
                    .is_some_and(|o| t.same_structure(o))
            })
    }
}
