//! schemalog CLI
//!
//! Command-line tool for inspecting and extending a migration log.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use schemalog::prelude::*;

/// Log-driven schema migrations for SQLite.
#[derive(Parser)]
#[command(name = "schemalog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the migration log (one JSON file per version).
    #[arg(short, long, env = "SCHEMALOG_LOG_DIR", default_value = "migrations")]
    log_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema the migration log describes, as JSON.
    Show,

    /// Print the SQL that brings the logged schema to the desired one.
    Plan {
        /// Desired schema (JSON).
        #[arg(short, long, env = "SCHEMALOG_SCHEMA")]
        schema: PathBuf,

        /// Do not create the `modified` trigger on new or rebuilt tables.
        #[arg(long)]
        no_modified_trigger: bool,
    },

    /// Like `plan`, then append the change to the log as the next version.
    Make {
        /// Desired schema (JSON).
        #[arg(short, long, env = "SCHEMALOG_SCHEMA")]
        schema: PathBuf,

        /// Do not create the `modified` trigger on new or rebuilt tables.
        #[arg(long)]
        no_modified_trigger: bool,

        /// Print the records instead of writing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Report every record or source the log loader dropped.
    Check,
}

fn main() -> anyhow::Result<()> {
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

    let log = MigrationLog::from_dir(&cli.log_dir)
        .with_context(|| format!("Cannot read log directory {}", cli.log_dir.display()))?;

    match cli.command {
        Commands::Show => {
            let context = MigrationContext::from_log(&log);
            println!("{}", serde_json::to_string_pretty(context.table_context())?);
        }

        Commands::Plan {
            schema,
            no_modified_trigger,
        } => {
            let diff = diff_against(&log, &schema, no_modified_trigger)?;
            if diff.is_empty() {
                info!("Schema is up to date.");
            }
            for sql in diff.sql() {
                println!("{sql}");
            }
        }

        Commands::Make {
            schema,
            no_modified_trigger,
            dry_run,
        } => {
            let diff = diff_against(&log, &schema, no_modified_trigger)?;
            if diff.is_empty() {
                info!("Schema is up to date, nothing to write.");
                return Ok(());
            }

            let writer = MigrationWriter::from_diff(log.next_version(), &diff);
            if dry_run {
                println!("Would create {}:", cli.log_dir.join(writer.file_name()).display());
                println!("{}", writer.to_json()?);
            } else {
                let path = writer.write_to_dir(&cli.log_dir)?;
                info!(
                    version = writer.version(),
                    changes = diff.len(),
                    "Created {}",
                    path.display()
                );
            }
        }

        Commands::Check => {
            if log.diagnostics().is_empty() {
                info!(records = log.len(), "Migration log is clean.");
            } else {
                for diagnostic in log.diagnostics() {
                    warn!("{diagnostic}");
                }
                anyhow::bail!("{} problem(s) found in the migration log", log.diagnostics().len());
            }
        }
    }

    Ok(())
}

fn diff_against(
    log: &MigrationLog,
    schema: &Path,
    no_modified_trigger: bool,
) -> anyhow::Result<SchemaDiff> {
    let text = fs::read_to_string(schema)
        .with_context(|| format!("Cannot read schema {}", schema.display()))?;
    let desired: TableContext = serde_json::from_str(&text)
        .with_context(|| format!("Invalid schema {}", schema.display()))?;

    let options = if no_modified_trigger {
        DiffOptions::new().without_modified_trigger()
    } else {
        DiffOptions::new()
    };
    let context = MigrationContext::from_log(log);
    Ok(DiffGenerator::with_options(context.into_table_context(), options).analyze_diff(&desired))
}
