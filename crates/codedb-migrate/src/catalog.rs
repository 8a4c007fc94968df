//! Live catalog reads over `sqlx`.

use codedb_core::connection::Row as CatalogRow;
use codedb_core::schema::DatabaseDef;
use codedb_core::value::Value;
use codedb_pg::catalog::{COLUMNS_SQL, CONSTRAINTS_SQL, INDEXES_SQL};
use codedb_pg::{assemble, to_positional};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::Result;

fn convert(row: &PgRow) -> Result<CatalogRow> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        let value: Option<String> = row.try_get(index)?;
        values.push(value.map_or(Value::Null, Value::Text));
    }
    Ok(CatalogRow(values))
}

async fn fetch(pool: &PgPool, sql: &str, schema: &str) -> Result<Vec<CatalogRow>> {
    let sql = to_positional(sql);
    let rows = sqlx::query(&sql).bind(schema).fetch_all(pool).await?;
    rows.iter().map(convert).collect()
}

/// Reads the current schema of `schema` in the connected database.
///
/// # Errors
///
/// Returns an error if a catalog query fails or the catalog holds a
/// column type the schema model cannot represent.
pub async fn read_current_schema(pool: &PgPool, database: &str, schema: &str) -> Result<DatabaseDef> {
    let columns = fetch(pool, COLUMNS_SQL, schema).await?;
    let constraints = fetch(pool, CONSTRAINTS_SQL, schema).await?;
    let indexes = fetch(pool, INDEXES_SQL, schema).await?;
    debug!(
        schema,
        columns = columns.len(),
        constraints = constraints.len(),
        indexes = indexes.len(),
        "Catalog rows read"
    );
    let db = assemble(database, &columns, &constraints, &indexes)?;
    info!(database, tables = db.tables().len(), "Current schema read");
    Ok(db)
}
