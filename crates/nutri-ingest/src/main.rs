//! nutri-ingest - reference nutrition dataset loader

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nutri_common::logging::{init_logging, LogConfig, LogLevel};
use nutri_ingest::config::{ErrorPolicy, IngestConfig, DEFAULT_DATA_DIR};
use nutri_ingest::db::{create_pool, run_migrations, DbConfig};
use nutri_ingest::{MemoryStore, PgReferenceStore, Pipeline, RunSummary, SourceResolver};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nutri-ingest")]
#[command(author, version, about = "Load the reference nutrition dataset into the database")]
struct Cli {
    /// Directory holding the source CSV files, searched recursively
    #[arg(long, env = "NUTRI_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Release folder whose files win when a dataset appears more than once
    #[arg(long, env = "NUTRI_RELEASE")]
    release: Option<String>,

    /// Synthesize a food_serving row for every loaded food
    #[arg(long)]
    sync_servings: bool,

    /// Rewrite existing food_serving rows instead of leaving them untouched
    #[arg(long)]
    update_servings: bool,

    /// Abort on the first record the database rejects
    #[arg(long)]
    strict: bool,

    /// Load at most this many rows per stage
    #[arg(long)]
    limit: Option<usize>,

    /// Load into memory only; the database is never contacted
    #[arg(long)]
    dry_run: bool,

    /// Apply pending migrations before loading
    #[arg(long)]
    migrate: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn ingest_config(&self) -> IngestConfig {
        let policy = if self.strict {
            ErrorPolicy::Strict
        } else {
            ErrorPolicy::Lenient
        };

        IngestConfig::new(&self.data_dir)
            .with_release(self.release.clone())
            .with_error_policy(policy)
            .with_servings(self.sync_servings, self.update_servings)
            .with_limit(self.limit)
            .with_progress(std::io::stderr().is_terminal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = init_logging(&log_config(cli.verbose)?)?;

    let config = cli.ingest_config();
    config.validate()?;

    let sources = SourceResolver::new(&config.data_dir)
        .prefer(config.release.clone())
        .resolve()?;

    let summary = if cli.dry_run {
        info!("Dry run: loading into memory");
        Pipeline::new(config, MemoryStore::new(), sources).run().await?
    } else {
        let db_config = DbConfig::from_env()?;
        let pool = create_pool(&db_config)
            .await
            .context("Failed to connect to the database")?;

        if cli.migrate {
            run_migrations(&pool).await?;
        }

        let store = PgReferenceStore::connect(&pool)
            .await
            .context("Failed to acquire a database connection")?;
        let summary = Pipeline::new(config, store, sources).run().await?;
        pool.close().await;
        summary
    };

    print_summary(&summary, cli.json)?;
    Ok(())
}

/// `LOG_*` settings, with `--verbose` taking precedence over `LOG_LEVEL`
fn log_config(verbose: bool) -> Result<LogConfig> {
    let mut config = LogConfig::builder()
        .log_file_prefix("nutri-ingest")
        .build()
        .merge_env()?;
    if verbose {
        config.level = LogLevel::Debug;
    }
    Ok(config)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_verbose_flag_beats_log_level() {
        std::env::set_var("LOG_LEVEL", "warn");

        assert_eq!(log_config(true).unwrap().level, LogLevel::Debug);
        assert_eq!(log_config(false).unwrap().level, LogLevel::Warn);

        std::env::remove_var("LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_default_level_is_info() {
        std::env::remove_var("LOG_LEVEL");
        assert_eq!(log_config(false).unwrap().level, LogLevel::Info);
    }

    #[test]
    fn test_update_servings_requires_sync() {
        let cli = Cli::parse_from(["nutri-ingest", "--data-dir", "/tmp/data", "--update-servings"]);
        assert!(cli.ingest_config().validate().is_err());

        let cli = Cli::parse_from(["nutri-ingest", "--data-dir", "/tmp/data", "--sync-servings", "--update-servings"]);
        assert!(cli.ingest_config().validate().is_ok());
    }
}
