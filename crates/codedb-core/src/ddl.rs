//! DDL emission.
//!
//! [`emit_ddl`] linearizes a [`DatabaseDelta`] into an ordered list of
//! [`Statement`]s. Turning a statement into text is the job of a
//! [`Dialect`]; the default methods produce the idempotent
//! `IF EXISTS` / `IF NOT EXISTS` forms and leave quoting and type names to
//! the implementor.

use std::sync::Arc;

use tracing::debug;

use crate::diff::DatabaseDelta;
use crate::schema::{ColumnDef, IndexDef, IndexMethod, PrimaryKeyDef, SqlType, TableDef, UniqueDef};

// ================================================================
// Statement vocabulary
// ================================================================

/// One schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Create a table with its columns (constraints follow separately).
    CreateTable {
        /// Table name.
        table: String,
        /// Columns in declaration order.
        columns: Vec<Arc<ColumnDef>>,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },
    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column to add.
        column: Arc<ColumnDef>,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Add a primary key constraint.
    AddPrimaryKey {
        /// Table name.
        table: String,
        /// Key to add.
        primary_key: PrimaryKeyDef,
    },
    /// Drop a primary key constraint.
    DropPrimaryKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Create an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index to create.
        index: IndexDef,
    },
    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// Add a unique constraint.
    AddUnique {
        /// Table name.
        table: String,
        /// Constraint to add.
        unique: UniqueDef,
    },
    /// Drop a unique constraint.
    DropUnique {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
}

impl Statement {
    /// Name of the table the statement applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AddPrimaryKey { table, .. }
            | Self::DropPrimaryKey { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddUnique { table, .. }
            | Self::DropUnique { table, .. } => table,
        }
    }

    /// Returns `true` if the statement can discard stored data.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::DropTable { .. } | Self::DropColumn { .. })
    }
}

/// Statements acting on the server rather than on a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentStatement {
    /// Create a login role.
    CreateRole {
        /// Role name.
        name: String,
        /// Login password.
        password: String,
    },
    /// Create a database owned by a role.
    CreateDatabase {
        /// Database name.
        name: String,
        /// Owning role.
        owner: String,
    },
}

/// Entry points for server-level operations.
pub struct Environment;

impl Environment {
    /// A login role with a password.
    #[must_use]
    pub fn create_role(name: impl Into<String>, password: impl Into<String>) -> EnvironmentStatement {
        EnvironmentStatement::CreateRole {
            name: name.into(),
            password: password.into(),
        }
    }

    /// A database owned by `owner`.
    #[must_use]
    pub fn create_database(name: impl Into<String>, owner: impl Into<String>) -> EnvironmentStatement {
        EnvironmentStatement::CreateDatabase {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

// ================================================================
// Emission
// ================================================================

fn create_table(table: &TableDef, out: &mut Vec<Statement>) {
    let name = table.name().to_string();
    out.push(Statement::CreateTable {
        table: name.clone(),
        columns: table.column_defs().cloned().collect(),
    });
    if let Some(pk) = table.primary_key() {
        out.push(Statement::AddPrimaryKey {
            table: name.clone(),
            primary_key: pk.clone(),
        });
    }
    for index in table.indices() {
        out.push(Statement::AddIndex {
            table: name.clone(),
            index: index.clone(),
        });
    }
    for unique in table.uniques() {
        out.push(Statement::AddUnique {
            table: name.clone(),
            unique: unique.clone(),
        });
    }
}

/// Linearizes a delta into statements.
///
/// Order: dropped tables; each added table with its primary key, indices
/// and uniques; then for each modified table the constraint drops
/// (primary key, indices, uniques), column drops, column adds and
/// constraint adds. Drops of constraints therefore always precede drops
/// of the columns they cover.
#[must_use]
pub fn emit_ddl(delta: &DatabaseDelta) -> Vec<Statement> {
    let mut out = Vec::new();

    for table in &delta.tables_to_drop {
        out.push(Statement::DropTable {
            table: table.name().to_string(),
        });
    }

    for table in &delta.tables_to_add {
        create_table(table, &mut out);
    }

    for t in &delta.tables_to_modify {
        let table = &t.name;
        if let Some(pk) = &t.primary_key_to_drop {
            out.push(Statement::DropPrimaryKey {
                table: table.clone(),
                name: pk.name.clone(),
            });
        }
        for index in &t.indices_to_drop {
            out.push(Statement::DropIndex {
                table: table.clone(),
                name: index.name.clone(),
            });
        }
        for unique in &t.uniques_to_drop {
            out.push(Statement::DropUnique {
                table: table.clone(),
                name: unique.name.clone(),
            });
        }
        for column in &t.columns_to_drop {
            out.push(Statement::DropColumn {
                table: table.clone(),
                column: column.name.clone(),
            });
        }
        for column in &t.columns_to_add {
            out.push(Statement::AddColumn {
                table: table.clone(),
                column: Arc::clone(column),
            });
        }
        if let Some(pk) = &t.primary_key_to_add {
            out.push(Statement::AddPrimaryKey {
                table: table.clone(),
                primary_key: pk.clone(),
            });
        }
        for index in &t.indices_to_add {
            out.push(Statement::AddIndex {
                table: table.clone(),
                index: index.clone(),
            });
        }
        for unique in &t.uniques_to_add {
            out.push(Statement::AddUnique {
                table: table.clone(),
                unique: unique.clone(),
            });
        }
    }

    debug!(database = %delta.name, statements = out.len(), "Emitted DDL");
    out
}

// ================================================================
// Dialect
// ================================================================

/// Dialect-specific text rendering of statements.
pub trait Dialect {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String;

    /// Maps a logical type to the dialect type name. `serial` asks for the
    /// auto-incrementing variant.
    fn map_type(&self, sql_type: SqlType, serial: bool) -> String;

    /// Renders a statement, terminated by `;`.
    fn generate_sql(&self, statement: &Statement) -> String {
        match statement {
            Statement::CreateTable { table, columns } => self.create_table(table, columns),
            Statement::DropTable { table } => self.drop_table(table),
            Statement::AddColumn { table, column } => self.add_column(table, column),
            Statement::DropColumn { table, column } => self.drop_column(table, column),
            Statement::AddPrimaryKey { table, primary_key } => {
                self.add_primary_key(table, primary_key)
            }
            Statement::DropPrimaryKey { table, name } | Statement::DropUnique { table, name } => {
                self.drop_constraint(table, name)
            }
            Statement::AddIndex { table, index } => self.add_index(table, index),
            Statement::DropIndex { name, .. } => self.drop_index(name),
            Statement::AddUnique { table, unique } => self.add_unique(table, unique),
        }
    }

    /// Renders every statement.
    fn generate_all(&self, statements: &[Statement]) -> Vec<String> {
        statements.iter().map(|s| self.generate_sql(s)).collect()
    }

    /// Column name, type, nullability and default.
    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.map_type(column.sql_type, column.is_serial())
        );
        sql.push_str(if column.is_nullable() { " NULL" } else { " NOT NULL" });
        if column.is_default_now() {
            sql.push_str(" DEFAULT CURRENT_TIMESTAMP");
        }
        sql
    }

    /// Comma separated quoted column names in parentheses.
    fn column_list(&self, columns: &[Arc<ColumnDef>]) -> String {
        let names: Vec<String> = columns
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect();
        format!("({})", names.join(","))
    }

    /// CREATE TABLE.
    fn create_table(&self, table: &str, columns: &[Arc<ColumnDef>]) -> String {
        let defs: Vec<String> = columns.iter().map(|c| self.column_definition(c)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {}({});",
            self.quote_identifier(table),
            defs.join(",")
        )
    }

    /// DROP TABLE.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", self.quote_identifier(table))
    }

    /// ADD COLUMN.
    fn add_column(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} ADD COLUMN {};",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// DROP COLUMN.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} DROP COLUMN IF EXISTS {};",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// ADD CONSTRAINT ... PRIMARY KEY.
    fn add_primary_key(&self, table: &str, primary_key: &PrimaryKeyDef) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} ADD CONSTRAINT {} PRIMARY KEY{};",
            self.quote_identifier(table),
            self.quote_identifier(&primary_key.name),
            self.column_list(&primary_key.columns)
        )
    }

    /// DROP CONSTRAINT, for primary keys and uniques.
    fn drop_constraint(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} DROP CONSTRAINT IF EXISTS {};",
            self.quote_identifier(table),
            self.quote_identifier(name)
        )
    }

    /// CREATE INDEX.
    fn add_index(&self, table: &str, index: &IndexDef) -> String {
        let method = match index.method {
            IndexMethod::Default => String::new(),
            IndexMethod::Gin => " USING gin".to_string(),
        };
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}{}{};",
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            method,
            self.column_list(&index.columns)
        )
    }

    /// DROP INDEX.
    fn drop_index(&self, name: &str) -> String {
        format!("DROP INDEX IF EXISTS {};", self.quote_identifier(name))
    }

    /// ADD CONSTRAINT ... UNIQUE.
    fn add_unique(&self, table: &str, unique: &UniqueDef) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} ADD CONSTRAINT {} UNIQUE{};",
            self.quote_identifier(table),
            self.quote_identifier(&unique.name),
            self.column_list(&unique.columns)
        )
    }

    /// Renders an environment statement.
    fn generate_environment_sql(&self, statement: &EnvironmentStatement) -> String {
        match statement {
            EnvironmentStatement::CreateRole { name, password } => format!(
                "CREATE ROLE {} PASSWORD '{}' LOGIN;",
                self.quote_identifier(name),
                password.replace('\'', "''")
            ),
            EnvironmentStatement::CreateDatabase { name, owner } => format!(
                "CREATE DATABASE {} OWNER {};",
                self.quote_identifier(name),
                self.quote_identifier(owner)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::schema::{ColumnFlags, DatabaseDef, SchemaBuilder};

    /// Bare rendering: identifiers as-is, logical type names.
    struct Plain;

    impl Dialect for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }

        fn quote_identifier(&self, name: &str) -> String {
            name.to_string()
        }

        fn map_type(&self, sql_type: SqlType, serial: bool) -> String {
            if serial {
                format!("serial_{sql_type}")
            } else {
                sql_type.to_string()
            }
        }
    }

    fn empty() -> DatabaseDef {
        DatabaseDef::new("app", vec![])
    }

    fn tags(extra: bool) -> DatabaseDef {
        SchemaBuilder::new("app")
            .declare("tb_tag", |ctx| {
                ctx.column::<i32>("TagID", "tag_id", ColumnFlags::PRIMARY_KEY | ColumnFlags::SERIAL)?;
                ctx.column::<String>("TagText", "tag_text", ColumnFlags::INDEX_1 | ColumnFlags::UNIQUE_1)?;
                if extra {
                    ctx.column::<Option<i64>>("Weight", "weight", ColumnFlags::INDEX_2)?;
                }
                Ok(())
            })
            .unwrap()
            .build()
            .unwrap()
    }

    // ================================================================
    // Statement order
    // ================================================================

    #[test]
    fn new_table_is_created_with_constraints() {
        let statements = emit_ddl(&diff(&empty(), &tags(false)).unwrap());
        assert_eq!(statements.len(), 4);
        assert!(matches!(&statements[0], Statement::CreateTable { table, columns } if table == "tb_tag" && columns.len() == 2));
        assert!(matches!(&statements[1], Statement::AddPrimaryKey { primary_key, .. } if primary_key.name == "pkey_tb_tag_tag_id"));
        assert!(matches!(&statements[2], Statement::AddIndex { index, .. } if index.name == "idx_tb_tag_tag_text"));
        assert!(matches!(&statements[3], Statement::AddUnique { unique, .. } if unique.name == "uniq_tb_tag_tag_text"));
    }

    #[test]
    fn dropped_table() {
        let statements = emit_ddl(&diff(&tags(false), &empty()).unwrap());
        assert_eq!(
            statements,
            vec![Statement::DropTable {
                table: "tb_tag".into()
            }]
        );
        assert!(statements[0].is_destructive());
    }

    #[test]
    fn constraint_drops_precede_column_drops() {
        let statements = emit_ddl(&diff(&tags(true), &tags(false)).unwrap());
        assert_eq!(statements.len(), 2);
        assert!(matches!(&statements[0], Statement::DropIndex { name, .. } if name == "idx_tb_tag_weight"));
        assert!(matches!(&statements[1], Statement::DropColumn { column, .. } if column == "weight"));
    }

    #[test]
    fn column_adds_precede_constraint_adds() {
        let statements = emit_ddl(&diff(&tags(false), &tags(true)).unwrap());
        assert_eq!(statements.len(), 2);
        assert!(matches!(&statements[0], Statement::AddColumn { column, .. } if column.name == "weight"));
        assert!(matches!(&statements[1], Statement::AddIndex { .. }));
    }

    #[test]
    fn empty_delta_emits_nothing() {
        assert!(emit_ddl(&diff(&tags(true), &tags(true)).unwrap()).is_empty());
    }

    // ================================================================
    // Default rendering
    // ================================================================

    #[test]
    fn default_rendering() {
        let sql = Plain.generate_all(&emit_ddl(&diff(&empty(), &tags(true)).unwrap()));
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE IF NOT EXISTS tb_tag(tag_id serial_int32 NOT NULL,tag_text text NOT NULL,weight int64 NULL);",
                "ALTER TABLE IF EXISTS tb_tag ADD CONSTRAINT pkey_tb_tag_tag_id PRIMARY KEY(tag_id);",
                "CREATE INDEX IF NOT EXISTS idx_tb_tag_tag_text ON tb_tag(tag_text);",
                "CREATE INDEX IF NOT EXISTS idx_tb_tag_weight ON tb_tag(weight);",
                "ALTER TABLE IF EXISTS tb_tag ADD CONSTRAINT uniq_tb_tag_tag_text UNIQUE(tag_text);",
            ]
        );
    }

    #[test]
    fn environment_rendering_escapes_password() {
        let sql = Plain.generate_environment_sql(&Environment::create_role("app", "it's"));
        assert_eq!(sql, "CREATE ROLE app PASSWORD 'it''s' LOGIN;");
        let sql = Plain.generate_environment_sql(&Environment::create_database("appdb", "app"));
        assert_eq!(sql, "CREATE DATABASE appdb OWNER app;");
    }
}
