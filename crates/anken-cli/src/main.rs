use std::path::PathBuf;

use anken_import::{reconciler_from_env, run_import_from_env, ImportConfig};
use anken_parser::listing_number;
use anken_storage::{fingerprint, PgEntryStore};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "anken")]
#[command(about = "Import job-listing text dumps into the anken database")]
struct Cli {
    /// Emit newline-delimited JSON logs.
    #[arg(long, global = true)]
    log_json: bool,
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse, reconcile and tag a `.txt` dump.
    Import { file: PathBuf },
    /// Parse a dump and print the result as JSON without touching the database.
    Parse { file: PathBuf },
    /// Recompute tags for every stored entry.
    Tag,
    /// Recompute stored fingerprints.
    Refingerprint,
    Migrate,
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.log_level);

    match cli.command {
        Commands::Import { file } => {
            let report = run_import_from_env(&file).await?;
            println!("import {}: {}", report.import_id, report.message);
            if !report.success {
                bail!("import of {} failed", file.display());
            }
        }
        Commands::Parse { file } => {
            let result = ImportConfig::from_env().listing_parser()?.parse_file(&file)?;
            let entries = result
                .entries
                .iter()
                .map(|indexed| {
                    json!({
                        "block_index": indexed.block_index,
                        "listing_number": listing_number(&indexed.entry.title),
                        "fingerprint": fingerprint(&indexed.entry),
                        "entry": indexed.entry,
                    })
                })
                .collect::<Vec<_>>();
            let out = json!({ "entries": entries, "errors": result.errors });
            println!(
                "{}",
                serde_json::to_string_pretty(&out).context("serializing parse result")?
            );
        }
        Commands::Tag => {
            let reconciler = reconciler_from_env(&ImportConfig::from_env()).await?;
            let summary = reconciler.retag_all().await?;
            println!(
                "retag complete: scanned={} updated={} failed={}",
                summary.scanned, summary.updated, summary.failed
            );
        }
        Commands::Refingerprint => {
            let reconciler = reconciler_from_env(&ImportConfig::from_env()).await?;
            let summary = reconciler.refingerprint_all().await?;
            println!(
                "refingerprint complete: scanned={} updated={} failed={}",
                summary.scanned, summary.updated, summary.failed
            );
        }
        Commands::Migrate => {
            let config = ImportConfig::from_env();
            let store = PgEntryStore::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            store.migrate().await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
