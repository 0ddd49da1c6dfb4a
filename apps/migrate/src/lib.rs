//! `journey-migrate`: convert flat-file journeys into SQLite databases.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use journey_store::{migrate_all, migrate_user, MigrationOptions, StoreConfig};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "journey-migrate")]
#[command(about = "Migrate learning journeys from flat JSON documents to SQLite", long_about = None)]
#[command(version)]
pub struct Args {
    /// Root directory holding <user>/<language> journeys
    #[arg(long, env = "JOURNEY_DATA_ROOT")]
    pub data_root: Option<PathBuf>,

    /// User to migrate
    #[arg(short, long, requires = "language", required_unless_present = "all")]
    pub user: Option<String>,

    /// Language of the journey to migrate
    #[arg(short, long, requires = "user")]
    pub language: Option<String>,

    /// Migrate every journey under the data root
    #[arg(long, conflicts_with_all = ["user", "language"])]
    pub all: bool,

    /// Replace an existing stats.db
    #[arg(long)]
    pub force: bool,

    /// Report what would be migrated without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Select the SQLite backend after a successful migration
    #[arg(long)]
    pub switch_backend: bool,

    /// How long to wait for a locked file, in milliseconds
    #[arg(long, env = "JOURNEY_LOCK_TIMEOUT_MS", default_value_t = 5000)]
    pub lock_timeout_ms: u64,
}

impl Args {
    fn options(&self) -> MigrationOptions {
        MigrationOptions {
            force: self.force,
            dry_run: self.dry_run,
            switch_backend: self.switch_backend,
        }
    }

    fn config(&self) -> anyhow::Result<StoreConfig> {
        let data_root = match &self.data_root {
            Some(root) => root.clone(),
            None => default_data_root()?,
        };
        Ok(StoreConfig::new(data_root).with_lock_timeout(Duration::from_millis(self.lock_timeout_ms)))
    }
}

/// `<local data dir>/journey`
pub fn default_data_root() -> anyhow::Result<PathBuf> {
    let base = dirs::data_local_dir().context("Could not determine local data directory")?;
    Ok(base.join("journey"))
}

/// Run the migration the arguments describe and return its JSON report.
pub fn execute(args: &Args) -> anyhow::Result<Value> {
    let config = args.config()?;
    tracing::info!(data_root = %config.data_root.display(), dry_run = args.dry_run, "Starting migration");

    if args.all {
        let summary = migrate_all(&config, args.options())
            .with_context(|| format!("Failed to scan {}", config.data_root.display()))?;
        tracing::info!(
            migrated = summary.migrated.len(),
            failed = summary.failed.len(),
            "Migration finished"
        );
        return Ok(serde_json::to_value(&summary)?);
    }

    let (Some(user), Some(language)) = (&args.user, &args.language) else {
        bail!("either --all or both --user and --language are required");
    };
    let report = migrate_user(&config, user, language, args.options())
        .with_context(|| format!("Failed to migrate {user}/{language}"))?;
    Ok(serde_json::to_value(&report)?)
}

pub fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let report = execute(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report
        .get("failed")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if failed > 0 {
        bail!("{failed} journey(s) failed to migrate");
    }
    Ok(())
}
