//! Reading the current schema from the PostgreSQL catalog.
//!
//! Three queries describe one schema: its columns, its primary key and
//! unique constraints, and its remaining indexes. Every value is cast to
//! `text`, so any driver can return them as [`Value::Text`] or
//! [`Value::Null`]. Placeholders use the core `@pN` form; drivers rewrite
//! them with [`to_positional`](crate::to_positional).

use std::sync::Arc;

use codedb_core::connection::{BoundParameter, Command, Connection, Row};
use codedb_core::introspect::Introspect;
use codedb_core::schema::{
    ColumnDef, ColumnFlags, DatabaseDef, IndexDef, IndexMethod, PrimaryKeyDef, TableDef, UniqueDef,
};
use codedb_core::value::Value;
use tracing::{debug, info};

use crate::dialect::parse_type_name;
use crate::error::{PgError, Result};

/// Columns of every base table: table, column, udt, nullable, default.
pub const COLUMNS_SQL: &str = "\
SELECT c.table_name::text, c.column_name::text, c.udt_name::text, c.is_nullable::text, c.column_default::text \
FROM information_schema.columns c \
JOIN information_schema.tables t ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
WHERE c.table_schema = @p0 AND t.table_type = 'BASE TABLE' \
ORDER BY c.table_name, c.ordinal_position";

/// Primary key and unique members: kind, table, constraint, column.
pub const CONSTRAINTS_SQL: &str = "\
SELECT tc.constraint_type::text, tc.table_name::text, tc.constraint_name::text, k.column_name::text \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage k ON k.constraint_schema = tc.constraint_schema \
AND k.constraint_name = tc.constraint_name AND k.table_name = tc.table_name \
WHERE tc.table_schema = @p0 AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
ORDER BY tc.table_name, tc.constraint_name, k.ordinal_position";

/// Plain index members: table, index, access method, column.
///
/// Indexes backing a constraint are reported by [`CONSTRAINTS_SQL`].
pub const INDEXES_SQL: &str = "\
SELECT t.relname::text, i.relname::text, am.amname::text, a.attname::text \
FROM pg_index x \
JOIN pg_class t ON t.oid = x.indrelid \
JOIN pg_class i ON i.oid = x.indexrelid \
JOIN pg_namespace n ON n.oid = t.relnamespace \
JOIN pg_am am ON am.oid = i.relam \
CROSS JOIN LATERAL unnest(x.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
WHERE n.nspname = @p0 AND NOT x.indisprimary \
AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = x.indexrelid) \
ORDER BY t.relname, i.relname, k.ord";

/// Column flags implied by a catalog column.
#[must_use]
pub fn column_flags(is_nullable: &str, default: Option<&str>) -> ColumnFlags {
    let mut flags = ColumnFlags::empty();
    if is_nullable.eq_ignore_ascii_case("YES") {
        flags |= ColumnFlags::NULLABLE;
    }
    if let Some(default) = default {
        let lower = default.to_ascii_lowercase();
        if lower.starts_with("nextval(") {
            flags |= ColumnFlags::SERIAL;
        } else if lower.contains("current_timestamp") || lower.contains("now()") {
            flags |= ColumnFlags::DEFAULT_NOW;
        }
    }
    flags
}

fn text<'r>(row: &'r Row, query: &'static str, index: usize) -> Result<&'r str> {
    row.text(index)
        .ok_or(PgError::MalformedRow { query, index })
}

fn optional_text<'r>(row: &'r Row, query: &'static str, index: usize) -> Result<Option<&'r str>> {
    match row.get(index) {
        Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s.as_str())),
        _ => Err(PgError::MalformedRow { query, index }),
    }
}

#[derive(Default)]
struct TableParts {
    name: String,
    columns: Vec<Arc<ColumnDef>>,
    primary_key: Option<PrimaryKeyDef>,
    indices: Vec<IndexDef>,
    uniques: Vec<UniqueDef>,
}

impl TableParts {
    fn resolve(&self, kind: &'static str, name: &str, column: &str) -> Result<Arc<ColumnDef>> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .cloned()
            .ok_or_else(|| PgError::UnknownColumn {
                kind,
                name: name.to_string(),
                table: self.name.clone(),
                column: column.to_string(),
            })
    }
}

struct Tables(Vec<TableParts>);

impl Tables {
    fn get_or_insert(&mut self, name: &str) -> &mut TableParts {
        let position = match self.0.iter().position(|t| t.name == name) {
            Some(position) => position,
            None => {
                self.0.push(TableParts {
                    name: name.to_string(),
                    ..TableParts::default()
                });
                self.0.len() - 1
            }
        };
        &mut self.0[position]
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut TableParts> {
        self.0.iter_mut().find(|t| t.name == name)
    }
}

/// Assembles a [`DatabaseDef`] from the rows of the three catalog queries.
///
/// Rows must be grouped the way the queries order them. Constraints and
/// indexes on tables without columns in the first result are ignored.
///
/// # Errors
///
/// Returns an error for malformed rows, unsupported column types, or
/// constraints naming unknown columns.
pub fn assemble(
    database: &str,
    column_rows: &[Row],
    constraint_rows: &[Row],
    index_rows: &[Row],
) -> Result<DatabaseDef> {
    let mut tables = Tables(Vec::new());

    for row in column_rows {
        let table = text(row, "columns", 0)?;
        let column = text(row, "columns", 1)?;
        let udt_name = text(row, "columns", 2)?;
        let is_nullable = text(row, "columns", 3)?;
        let default = optional_text(row, "columns", 4)?;
        let sql_type = parse_type_name(udt_name).ok_or_else(|| PgError::UnsupportedType {
            table: table.to_string(),
            column: column.to_string(),
            udt_name: udt_name.to_string(),
        })?;
        let def = ColumnDef::new(column, sql_type, column_flags(is_nullable, default));
        tables.get_or_insert(table).columns.push(Arc::new(def));
    }

    // (table, constraint) -> kind, columns
    let mut grouped: Vec<(String, String, String, Vec<String>)> = Vec::new();
    for row in constraint_rows {
        let kind = text(row, "constraints", 0)?;
        let table = text(row, "constraints", 1)?;
        let name = text(row, "constraints", 2)?;
        let column = text(row, "constraints", 3)?;
        match grouped.last_mut() {
            Some((t, n, _, columns)) if t == table && n == name => columns.push(column.to_string()),
            _ => grouped.push((
                table.to_string(),
                name.to_string(),
                kind.to_string(),
                vec![column.to_string()],
            )),
        }
    }
    for (table, name, kind, columns) in grouped {
        let Some(parts) = tables.get_mut(&table) else {
            continue;
        };
        let label = if kind == "PRIMARY KEY" { "primary key" } else { "unique" };
        let columns = columns
            .iter()
            .map(|c| parts.resolve(label, &name, c))
            .collect::<Result<Vec<_>>>()?;
        if kind == "PRIMARY KEY" {
            parts.primary_key = Some(PrimaryKeyDef { name, columns });
        } else {
            parts.uniques.push(UniqueDef { name, columns });
        }
    }

    let mut grouped: Vec<(String, String, IndexMethod, Vec<String>)> = Vec::new();
    for row in index_rows {
        let table = text(row, "indexes", 0)?;
        let name = text(row, "indexes", 1)?;
        let method = if text(row, "indexes", 2)? == "gin" {
            IndexMethod::Gin
        } else {
            IndexMethod::Default
        };
        let column = text(row, "indexes", 3)?;
        match grouped.last_mut() {
            Some((t, n, _, columns)) if t == table && n == name => columns.push(column.to_string()),
            _ => grouped.push((
                table.to_string(),
                name.to_string(),
                method,
                vec![column.to_string()],
            )),
        }
    }
    for (table, name, method, columns) in grouped {
        let Some(parts) = tables.get_mut(&table) else {
            continue;
        };
        let columns = columns
            .iter()
            .map(|c| parts.resolve("index", &name, c))
            .collect::<Result<Vec<_>>>()?;
        parts.indices.push(IndexDef {
            name,
            method,
            columns,
        });
    }

    let tables = tables
        .0
        .into_iter()
        .map(|t| TableDef::with_constraints(t.name, t.columns, t.primary_key, t.indices, t.uniques))
        .collect();
    Ok(DatabaseDef::new(database, tables))
}

fn read_rows<C: Command>(command: &mut C, sql: &str, schema: &str) -> Result<Vec<Row>> {
    let parameters = [BoundParameter {
        name: "@p0".to_string(),
        value: Value::Text(schema.to_string()),
    }];
    let rows = command
        .execute_reader(sql, &parameters)?
        .collect::<codedb_core::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Catalog reader for one PostgreSQL schema.
#[derive(Debug, Clone)]
pub struct PgIntrospector {
    database: String,
    schema: String,
}

impl PgIntrospector {
    /// Reads tables of the `public` schema.
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: "public".to_string(),
        }
    }

    /// Reads another schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Schema being read.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl<C: Connection + ?Sized> Introspect<C> for PgIntrospector {
    type Error = PgError;

    fn read_current_schema(&self, connection: &mut C) -> Result<DatabaseDef> {
        let mut command = connection.create_command()?;
        let columns = read_rows(&mut command, COLUMNS_SQL, &self.schema)?;
        let constraints = read_rows(&mut command, CONSTRAINTS_SQL, &self.schema)?;
        let indexes = read_rows(&mut command, INDEXES_SQL, &self.schema)?;
        debug!(
            schema = %self.schema,
            columns = columns.len(),
            constraints = constraints.len(),
            indexes = indexes.len(),
            "Catalog rows read"
        );
        let db = assemble(&self.database, &columns, &constraints, &indexes)?;
        info!(database = %self.database, tables = db.tables().len(), "Current schema read");
        Ok(db)
    }
}
