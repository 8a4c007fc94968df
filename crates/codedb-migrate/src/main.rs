//! codedb-migrate CLI
//!
//! Command-line tool for diffing and migrating PostgreSQL schemas.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use codedb_migrate::catalog::read_current_schema;
use codedb_migrate::prelude::*;

/// Declarative schema migrations for PostgreSQL.
#[derive(Parser)]
#[command(name = "codedb-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "postgres://localhost/postgres")]
    database: String,

    /// Catalog schema holding the tables.
    #[arg(short, long, default_value = "public")]
    schema: String,

    /// Quote every identifier.
    #[arg(long)]
    quote_identifiers: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the live schema as JSON.
    Dump {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the DDL that migrates the current schema to the target.
    Plan {
        /// Target schema file.
        #[arg(short, long)]
        target: PathBuf,

        /// Current schema file (the live catalog if not specified).
        #[arg(short, long)]
        current: Option<PathBuf>,
    },

    /// Migrate the live database to the target schema.
    Apply {
        /// Target schema file.
        #[arg(short, long)]
        target: PathBuf,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a login role.
    CreateRole {
        /// Role name.
        #[arg(short, long)]
        name: String,

        /// Login password.
        #[arg(short, long, env = "CODEDB_ROLE_PASSWORD")]
        password: String,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a database owned by a role.
    CreateDatabase {
        /// Database name.
        #[arg(short, long)]
        name: String,

        /// Owning role.
        #[arg(short, long)]
        owner: String,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },
}

fn database_name(url: &str) -> &str {
    let path = url.rsplit('/').next().unwrap_or(url);
    path.split('?').next().unwrap_or(path)
}

fn report(outcome: EnvironmentOutcome, what: &str, name: &str) {
    match outcome {
        EnvironmentOutcome::Created => info!("{what} '{name}' created."),
        EnvironmentOutcome::AlreadyExists => info!("{what} '{name}' already exists."),
        EnvironmentOutcome::Skipped => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let dialect = PgDialect::new().with_quoted_identifiers(cli.quote_identifiers);

    // Plans between two files need no connection
    if let Commands::Plan {
        target,
        current: Some(current),
    } = &cli.command
    {
        let statements = plan(&load_schema(current)?, &load_schema(target)?)?;
        for sql in dialect.generate_all(&statements) {
            println!("{sql}");
        }
        return Ok(());
    }

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database)
        .await?;
    let db_name = database_name(&cli.database).to_string();

    match cli.command {
        Commands::Dump { output } => {
            let db = read_current_schema(&pool, &db_name, &cli.schema).await?;
            match output {
                Some(path) => {
                    save_schema(&db, &path)?;
                    info!("Schema written to {}", path.display());
                }
                None => println!("{}", to_json(&db)?),
            }
        }

        Commands::Plan { target, .. } => {
            let target = load_schema(&target)?;
            let current = read_current_schema(&pool, target.name(), &cli.schema).await?;
            let statements = plan(&current, &target)?;
            if statements.is_empty() {
                info!("No changes detected.");
            }
            for sql in dialect.generate_all(&statements) {
                println!("{sql}");
            }
        }

        Commands::Apply { target, dry_run } => {
            let target = load_schema(&target)?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            let executor = MigrationExecutor::new(pool, dialect)
                .schema(cli.schema)
                .dry_run(dry_run);
            let sql = executor.migrate(&target).await?;
            if dry_run {
                for text in &sql {
                    println!("{text}");
                }
            }
        }

        Commands::CreateRole {
            name,
            password,
            dry_run,
        } => {
            let statement = Environment::create_role(&name, password);
            if dry_run {
                println!("{}", dialect.generate_environment_sql(&statement));
            }
            let executor = MigrationExecutor::new(pool, dialect).dry_run(dry_run);
            report(executor.run_environment(&statement).await?, "Role", &name);
        }

        Commands::CreateDatabase {
            name,
            owner,
            dry_run,
        } => {
            let statement = Environment::create_database(&name, owner);
            if dry_run {
                println!("{}", dialect.generate_environment_sql(&statement));
            }
            let executor = MigrationExecutor::new(pool, dialect).dry_run(dry_run);
            report(executor.run_environment(&statement).await?, "Database", &name);
        }
    }

    Ok(())
}
