//! Schema diff engine.
//!
//! Compares a "current" (read from the catalog) and a "target" (declared
//! in code) [`DatabaseDef`] and produces a [`DatabaseDelta`] describing
//! the structural changes needed to go from one to the other.
//!
//! Tables and columns are matched by name. Primary keys are replaced as a
//! whole. Indices and uniques are matched by their column signature and
//! storage method; their names are ignored. A column whose type or
//! structural flags changed is dropped and added again, never altered.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{DiffSide, Error, Result};
use crate::schema::{ColumnDef, DatabaseDef, IndexDef, PrimaryKeyDef, TableDef, UniqueDef};

// ================================================================
// Public types
// ================================================================

/// Structural difference of one table present on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDelta {
    /// Table name.
    pub name: String,
    /// Columns to drop.
    pub columns_to_drop: Vec<Arc<ColumnDef>>,
    /// Columns to add.
    pub columns_to_add: Vec<Arc<ColumnDef>>,
    /// Primary key to drop.
    pub primary_key_to_drop: Option<PrimaryKeyDef>,
    /// Primary key to add.
    pub primary_key_to_add: Option<PrimaryKeyDef>,
    /// Indices to drop.
    pub indices_to_drop: Vec<IndexDef>,
    /// Indices to add.
    pub indices_to_add: Vec<IndexDef>,
    /// Unique constraints to drop.
    pub uniques_to_drop: Vec<UniqueDef>,
    /// Unique constraints to add.
    pub uniques_to_add: Vec<UniqueDef>,
}

impl TableDelta {
    /// Returns `true` if the table needs no change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns_to_drop.is_empty()
            && self.columns_to_add.is_empty()
            && self.primary_key_to_drop.is_none()
            && self.primary_key_to_add.is_none()
            && self.indices_to_drop.is_empty()
            && self.indices_to_add.is_empty()
            && self.uniques_to_drop.is_empty()
            && self.uniques_to_add.is_empty()
    }
}

/// Structural difference between two databases.
///
/// A table never appears both in `tables_to_drop` and in
/// `tables_to_modify`.
#[derive(Debug, Clone, Default)]
pub struct DatabaseDelta {
    /// Target database name.
    pub name: String,
    /// Tables only present in the current schema.
    pub tables_to_drop: Vec<Arc<TableDef>>,
    /// Tables only present in the target schema.
    pub tables_to_add: Vec<Arc<TableDef>>,
    /// Tables present on both sides whose structure differs.
    pub tables_to_modify: Vec<TableDelta>,
}

impl DatabaseDelta {
    /// Returns `true` if both schemas are structurally identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables_to_drop.is_empty()
            && self.tables_to_add.is_empty()
            && self.tables_to_modify.is_empty()
    }
}

// ================================================================
// Conflict detection
// ================================================================

fn conflict(side: DiffSide, table: &str, reason: String) -> Error {
    Error::DiffConflict {
        side,
        table: table.to_string(),
        reason,
    }
}

/// Rejects inputs the engine could only match by guessing: duplicate
/// table names, duplicate column names, or two indices or uniques with
/// the same signature in one table.
fn check_unambiguous(db: &DatabaseDef, side: DiffSide) -> Result<()> {
    let mut tables = BTreeSet::new();
    for table in db.tables() {
        if !tables.insert(table.name()) {
            return Err(conflict(side, table.name(), "table name appears twice".into()));
        }

        let mut columns = BTreeSet::new();
        for def in table.column_defs() {
            if !columns.insert(def.name.as_str()) {
                return Err(conflict(
                    side,
                    table.name(),
                    format!("column '{}' appears twice", def.name),
                ));
            }
        }

        let mut indices = BTreeSet::new();
        for index in table.indices() {
            if !indices.insert(index.signature()) {
                return Err(conflict(
                    side,
                    table.name(),
                    format!("index '{}' duplicates another index", index.name),
                ));
            }
        }

        let mut uniques = BTreeSet::new();
        for unique in table.uniques() {
            if !uniques.insert(unique.signature()) {
                return Err(conflict(
                    side,
                    table.name(),
                    format!("unique '{}' duplicates another unique", unique.name),
                ));
            }
        }
    }
    Ok(())
}

// ================================================================
// Table-level diff
// ================================================================

fn covers_any(columns: &[Arc<ColumnDef>], names: &BTreeSet<&str>) -> bool {
    columns.iter().any(|c| names.contains(c.name.as_str()))
}

/// Compares one table present on both sides.
fn diff_table(current: &TableDef, target: &TableDef) -> TableDelta {
    let table = target.name();
    let mut delta = TableDelta {
        name: table.to_string(),
        ..TableDelta::default()
    };

    // ---- Columns -------------------------------------------------
    // Names of columns that are dropped and re-added with a new shape.
    let mut replaced: BTreeSet<&str> = BTreeSet::new();

    for cur in current.column_defs() {
        match target.column_by_name(&cur.name) {
            None => {
                debug!(table, column = %cur.name, "Column only in current schema");
                delta.columns_to_drop.push(Arc::clone(cur));
            }
            Some(tgt) if !cur.same_shape(tgt.def()) => {
                warn!(
                    table,
                    column = %cur.name,
                    from = %cur.sql_type,
                    to = %tgt.def().sql_type,
                    "Column changed shape, replacing it with drop and add; existing data in the column is lost"
                );
                replaced.insert(cur.name.as_str());
                delta.columns_to_drop.push(Arc::clone(cur));
            }
            Some(_) => {}
        }
    }
    for tgt in target.column_defs() {
        let add = match current.column_by_name(&tgt.name) {
            None => true,
            Some(_) => replaced.contains(tgt.name.as_str()),
        };
        if add {
            delta.columns_to_add.push(Arc::clone(tgt));
        }
    }

    // ---- Primary key ---------------------------------------------
    let cur_pk = current.primary_key();
    let tgt_pk = target.primary_key();
    let pk_changed = match (cur_pk, tgt_pk) {
        (None, None) => false,
        (Some(c), Some(t)) => {
            c.signature() != t.signature()
                || covers_any(&c.columns, &replaced)
        }
        _ => true,
    };
    if pk_changed {
        delta.primary_key_to_drop = cur_pk.cloned();
        delta.primary_key_to_add = tgt_pk.cloned();
    }

    // ---- Indices -------------------------------------------------
    for cur in current.indices() {
        let kept = target
            .indices()
            .iter()
            .any(|t| t.signature() == cur.signature());
        if !kept || covers_any(&cur.columns, &replaced) {
            delta.indices_to_drop.push(cur.clone());
        }
    }
    for tgt in target.indices() {
        let existing = current
            .indices()
            .iter()
            .any(|c| c.signature() == tgt.signature());
        if !existing || covers_any(&tgt.columns, &replaced) {
            delta.indices_to_add.push(tgt.clone());
        }
    }

    // ---- Uniques -------------------------------------------------
    for cur in current.uniques() {
        let kept = target
            .uniques()
            .iter()
            .any(|t| t.signature() == cur.signature());
        if !kept || covers_any(&cur.columns, &replaced) {
            delta.uniques_to_drop.push(cur.clone());
        }
    }
    for tgt in target.uniques() {
        let existing = current
            .uniques()
            .iter()
            .any(|c| c.signature() == tgt.signature());
        if !existing || covers_any(&tgt.columns, &replaced) {
            delta.uniques_to_add.push(tgt.clone());
        }
    }

    delta
}

// ================================================================
// Database-level diff
// ================================================================

/// Compares two databases and returns the delta that turns `current`
/// into `target`.
///
/// # Errors
///
/// Returns [`Error::DiffConflict`] when either side contains duplicate
/// table or column names, or duplicate index or unique signatures.
pub fn diff(current: &DatabaseDef, target: &DatabaseDef) -> Result<DatabaseDelta> {
    check_unambiguous(current, DiffSide::Current)?;
    check_unambiguous(target, DiffSide::Target)?;

    let mut delta = DatabaseDelta {
        name: target.name().to_string(),
        ..DatabaseDelta::default()
    };

    for cur in current.tables() {
        if target.table(cur.name()).is_none() {
            debug!(table = %cur.name(), "Table only in current schema");
            delta.tables_to_drop.push(Arc::clone(cur));
        }
    }

    for tgt in target.tables() {
        match current.table(tgt.name()) {
            None => {
                debug!(table = %tgt.name(), "Table only in target schema");
                delta.tables_to_add.push(Arc::clone(tgt));
            }
            Some(cur) => {
                let table_delta = diff_table(cur, tgt);
                if !table_delta.is_empty() {
                    debug!(table = %tgt.name(), "Table structure differs");
                    delta.tables_to_modify.push(table_delta);
                }
            }
        }
    }

    Ok(delta)
}
