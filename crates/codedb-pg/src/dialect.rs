//! PostgreSQL dialect.

use codedb_core::ddl::{Dialect, EnvironmentStatement};
use codedb_core::schema::{ScalarType, SqlType};

/// PostgreSQL text rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDialect {
    quote_identifiers: bool,
}

impl PgDialect {
    /// Creates a dialect emitting identifiers as declared.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            quote_identifiers: false,
        }
    }

    /// Wraps every identifier in double quotes.
    #[must_use]
    pub const fn with_quoted_identifiers(mut self, quote: bool) -> Self {
        self.quote_identifiers = quote;
        self
    }

    fn always_quote(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Catalog name of a scalar type.
#[must_use]
pub const fn scalar_type_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Bool => "bool",
        ScalarType::Char => "char",
        ScalarType::Int16 => "int2",
        ScalarType::Int32 => "int4",
        ScalarType::Int64 => "int8",
        ScalarType::Float32 => "float4",
        ScalarType::Float64 => "float8",
        ScalarType::Text => "text",
        ScalarType::Uuid => "uuid",
        ScalarType::Timestamp => "timestamp",
    }
}

fn scalar_from_name(name: &str) -> Option<ScalarType> {
    Some(match name {
        "bool" => ScalarType::Bool,
        "char" | "bpchar" => ScalarType::Char,
        "int2" => ScalarType::Int16,
        "int4" => ScalarType::Int32,
        "int8" => ScalarType::Int64,
        "float4" => ScalarType::Float32,
        "float8" => ScalarType::Float64,
        "text" | "varchar" => ScalarType::Text,
        "uuid" => ScalarType::Uuid,
        "timestamp" => ScalarType::Timestamp,
        _ => return None,
    })
}

/// Parses a catalog `udt_name`; arrays arrive as `_int4`.
#[must_use]
pub fn parse_type_name(udt_name: &str) -> Option<SqlType> {
    match udt_name.strip_prefix('_') {
        Some(element) => scalar_from_name(element).map(SqlType::Array),
        None => scalar_from_name(udt_name).map(SqlType::Scalar),
    }
}

impl Dialect for PgDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        if self.quote_identifiers {
            Self::always_quote(name)
        } else {
            name.to_string()
        }
    }

    fn map_type(&self, sql_type: SqlType, serial: bool) -> String {
        match sql_type {
            SqlType::Scalar(ScalarType::Int32) if serial => "serial4".to_string(),
            SqlType::Scalar(ScalarType::Int64) if serial => "serial8".to_string(),
            SqlType::Scalar(scalar) => scalar_type_name(scalar).to_string(),
            SqlType::Array(scalar) => format!("{}[]", scalar_type_name(scalar)),
        }
    }

    fn generate_environment_sql(&self, statement: &EnvironmentStatement) -> String {
        // Role and database names are always quoted.
        match statement {
            EnvironmentStatement::CreateRole { name, password } => format!(
                "CREATE ROLE {} PASSWORD '{}' LOGIN;",
                Self::always_quote(name),
                password.replace('\'', "''")
            ),
            EnvironmentStatement::CreateDatabase { name, owner } => format!(
                "CREATE DATABASE {} OWNER {};",
                Self::always_quote(name),
                Self::always_quote(owner)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codedb_core::ddl::{Environment, Statement};
    use codedb_core::schema::{ColumnDef, ColumnFlags, IndexDef, IndexMethod};
    use std::sync::Arc;

    fn col(name: &str, sql_type: SqlType, flags: ColumnFlags) -> Arc<ColumnDef> {
        Arc::new(ColumnDef::new(name, sql_type, flags))
    }

    // ================================================================
    // Types
    // ================================================================

    #[test]
    fn type_names() {
        let d = PgDialect::new();
        assert_eq!(d.map_type(SqlType::Scalar(ScalarType::Int64), false), "int8");
        assert_eq!(d.map_type(SqlType::Scalar(ScalarType::Int32), true), "serial4");
        assert_eq!(d.map_type(SqlType::Scalar(ScalarType::Int64), true), "serial8");
        assert_eq!(d.map_type(SqlType::Array(ScalarType::Text), false), "text[]");
        assert_eq!(d.map_type(SqlType::Scalar(ScalarType::Timestamp), false), "timestamp");
    }

    #[test]
    fn catalog_names_parse() {
        assert_eq!(parse_type_name("int4"), Some(SqlType::Scalar(ScalarType::Int32)));
        assert_eq!(parse_type_name("_text"), Some(SqlType::Array(ScalarType::Text)));
        assert_eq!(parse_type_name("bpchar"), Some(SqlType::Scalar(ScalarType::Char)));
        assert_eq!(parse_type_name("jsonb"), None);
    }

    // ================================================================
    // Statements
    // ================================================================

    #[test]
    fn create_table() {
        let sql = PgDialect::new().generate_sql(&Statement::CreateTable {
            table: "tb_event".into(),
            columns: vec![
                col("event_id", SqlType::Scalar(ScalarType::Int64), ColumnFlags::SERIAL),
                col(
                    "created",
                    SqlType::Scalar(ScalarType::Timestamp),
                    ColumnFlags::DEFAULT_NOW,
                ),
                col("tags", SqlType::Array(ScalarType::Text), ColumnFlags::NULLABLE),
            ],
        });
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS tb_event(event_id serial8 NOT NULL,created timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP,tags text[] NULL);"
        );
    }

    #[test]
    fn gin_index() {
        let tags = col("tags", SqlType::Array(ScalarType::Text), ColumnFlags::GIN);
        let index = IndexDef::for_table("tb_event", IndexMethod::Gin, vec![tags]);
        let sql = PgDialect::new().generate_sql(&Statement::AddIndex {
            table: "tb_event".into(),
            index,
        });
        assert_eq!(
            sql,
            "CREATE INDEX IF NOT EXISTS idx_tb_event_tags ON tb_event USING gin(tags);"
        );
    }

    #[test]
    fn drops() {
        let d = PgDialect::new();
        assert_eq!(
            d.generate_sql(&Statement::DropColumn {
                table: "t".into(),
                column: "c".into()
            }),
            "ALTER TABLE IF EXISTS t DROP COLUMN IF EXISTS c;"
        );
        assert_eq!(
            d.generate_sql(&Statement::DropPrimaryKey {
                table: "t".into(),
                name: "pkey_t_c".into()
            }),
            "ALTER TABLE IF EXISTS t DROP CONSTRAINT IF EXISTS pkey_t_c;"
        );
        assert_eq!(
            d.generate_sql(&Statement::DropIndex {
                table: "t".into(),
                name: "idx_t_c".into()
            }),
            "DROP INDEX IF EXISTS idx_t_c;"
        );
    }

    #[test]
    fn quoting() {
        let d = PgDialect::new().with_quoted_identifiers(true);
        assert_eq!(
            d.generate_sql(&Statement::DropTable { table: "we\"ird".into() }),
            "DROP TABLE IF EXISTS \"we\"\"ird\";"
        );
    }

    #[test]
    fn environment_statements_always_quote() {
        let d = PgDialect::new();
        assert_eq!(
            d.generate_environment_sql(&Environment::create_role("app", "s3cret")),
            "CREATE ROLE \"app\" PASSWORD 's3cret' LOGIN;"
        );
        assert_eq!(
            d.generate_environment_sql(&Environment::create_database("appdb", "app")),
            "CREATE DATABASE \"appdb\" OWNER \"app\";"
        );
    }
}
