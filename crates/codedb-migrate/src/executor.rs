//! Migration executor.
//!
//! Plans the DDL that takes a current schema to a target schema and
//! applies it against a PostgreSQL database.

use codedb_core::ddl::{emit_ddl, Dialect, EnvironmentStatement, Statement};
use codedb_core::diff::diff;
use codedb_core::error::{DriverError, DriverErrorKind};
use codedb_core::schema::DatabaseDef;
use codedb_pg::{driver_error, PgDialect};
use sqlx::postgres::PgPool;
use tracing::{debug, info, warn};

use crate::catalog::read_current_schema;
use crate::error::Result;

/// Converts a `sqlx` failure into the driver error taxonomy.
#[must_use]
pub fn classify(error: &sqlx::Error) -> DriverError {
    match error {
        sqlx::Error::Database(db) => driver_error(db.code().as_deref(), db.message()),
        other => DriverError::unknown(other.to_string()),
    }
}

/// Outcome of an environment statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOutcome {
    /// The role or database was created.
    Created,
    /// The role or database already existed.
    AlreadyExists,
    /// Dry run; nothing was executed.
    Skipped,
}

/// Computes the ordered statements that migrate `current` to `target`.
///
/// # Errors
///
/// Returns an error if either schema is ambiguous.
pub fn plan(current: &DatabaseDef, target: &DatabaseDef) -> Result<Vec<Statement>> {
    let delta = diff(current, target)?;
    let statements = emit_ddl(&delta);
    let destructive = statements.iter().filter(|s| s.is_destructive()).count();
    info!(
        database = %target.name(),
        statements = statements.len(),
        destructive,
        "Migration planned"
    );
    Ok(statements)
}

/// Executes DDL against a database.
pub struct MigrationExecutor {
    pool: PgPool,
    dialect: PgDialect,
    schema: String,
    dry_run: bool,
}

impl MigrationExecutor {
    /// Creates a new executor for the `public` schema.
    #[must_use]
    pub fn new(pool: PgPool, dialect: PgDialect) -> Self {
        Self {
            pool,
            dialect,
            schema: "public".to_string(),
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is returned but not executed).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Selects the catalog schema to read.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> &PgDialect {
        &self.dialect
    }

    /// Renders statements as SQL text.
    #[must_use]
    pub fn render(&self, statements: &[Statement]) -> Vec<String> {
        self.dialect.generate_all(statements)
    }

    /// Reads the live schema of the connected database.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub async fn current_schema(&self, database: &str) -> Result<DatabaseDef> {
        read_current_schema(&self.pool, database, &self.schema).await
    }

    /// Applies statements in order inside one transaction.
    ///
    /// Returns the SQL that was executed, or that would be in dry-run
    /// mode. On failure the transaction is rolled back.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn apply(&self, statements: &[Statement]) -> Result<Vec<String>> {
        let sql = self.render(statements);
        if self.dry_run {
            info!(statements = sql.len(), "Dry run, nothing executed");
            return Ok(sql);
        }
        if sql.is_empty() {
            info!("Schema is up to date");
            return Ok(sql);
        }

        let mut tx = self.pool.begin().await?;
        for (statement, text) in statements.iter().zip(&sql) {
            if statement.is_destructive() {
                warn!(table = %statement.table(), sql = %text, "Executing destructive SQL");
            } else {
                debug!(sql = %text, "Executing SQL");
            }
            sqlx::query(text).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(statements = sql.len(), "Migration applied successfully");
        Ok(sql)
    }

    /// Reads the live schema, plans against `target` and applies.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, planning or applying fails.
    pub async fn migrate(&self, target: &DatabaseDef) -> Result<Vec<String>> {
        let current = self.current_schema(target.name()).await?;
        let statements = plan(&current, target)?;
        self.apply(&statements).await
    }

    /// Runs an environment statement outside any transaction.
    ///
    /// A role or database that already exists is reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns an error for any other driver failure.
    pub async fn run_environment(&self, statement: &EnvironmentStatement) -> Result<EnvironmentOutcome> {
        let sql = self.dialect.generate_environment_sql(statement);
        if self.dry_run {
            debug!(sql = %sql, "Dry run, environment statement skipped");
            return Ok(EnvironmentOutcome::Skipped);
        }
        debug!(sql = %sql, "Executing environment SQL");
        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(_) => Ok(EnvironmentOutcome::Created),
            Err(e) => {
                let error = classify(&e);
                match error.kind {
                    DriverErrorKind::DuplicateObject | DriverErrorKind::DuplicateDatabase => {
                        warn!(code = ?error.code, message = %error.message, "Already exists");
                        Ok(EnvironmentOutcome::AlreadyExists)
                    }
                    _ => Err(codedb_core::Error::Driver(error).into()),
                }
            }
        }
    }
}
