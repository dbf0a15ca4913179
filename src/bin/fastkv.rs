//! fastkv coordinator binary

use clap::{Args, Parser, Subcommand};
use fastkv::common::{parse_duration, CoordinatorConfig};
use fastkv::coordinator::{Coordinator, MetadataStore, VolumeClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fastkv")]
#[command(about = "fastkv coordinator: bloom-gated metadata in front of HTTP volume servers")]
#[command(version)]
struct Cli {
    /// Config file (TOML); defaults to ./fastkv.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator HTTP server
    Server,
    /// Scan the record store into a fresh bloom filter and report what it holds.
    ///
    /// Nothing is persisted: the filter lives in memory and `server` rebuilds
    /// it at startup, so this only checks the store.
    Rebuild,
    /// Move replicas to match the current volume list
    Rebalance,
}

#[derive(Args)]
struct Overrides {
    /// Path to the record database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Volume servers (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    volumes: Vec<String>,

    /// Replicas per key
    #[arg(long, global = true)]
    replicas: Option<usize>,

    /// Subvolumes (disks) per volume server
    #[arg(long, global = true)]
    subvolumes: Option<u32>,

    /// Fallback server for missing keys
    #[arg(long, global = true)]
    fallback: Option<String>,

    /// Volume response timeout (e.g. 500ms, 1s)
    #[arg(long, global = true)]
    voltimeout: Option<String>,

    /// Require UNLINK before DELETE
    #[arg(long, global = true)]
    protect: bool,

    /// Do not store or verify value checksums
    #[arg(long, global = true)]
    no_checksum: bool,

    /// Bloom filter lock discipline (exclusive, rw)
    #[arg(long, global = true)]
    lock: Option<String>,

    /// Port for the HTTP server
    #[arg(long, global = true)]
    port: Option<u16>,
}

impl Overrides {
    fn apply(self, config: &mut CoordinatorConfig) -> anyhow::Result<()> {
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if !self.volumes.is_empty() {
            config.volumes = self.volumes;
        }
        if let Some(replicas) = self.replicas {
            config.replicas = replicas;
        }
        if let Some(subvolumes) = self.subvolumes {
            config.subvolumes = subvolumes;
        }
        if self.fallback.is_some() {
            config.fallback = self.fallback;
        }
        if let Some(timeout) = self.voltimeout {
            let millis = parse_duration(&timeout)?.as_millis();
            config.volume_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        }
        if self.protect {
            config.protect = true;
        }
        if self.no_checksum {
            config.checksum = false;
        }
        if let Some(lock) = self.lock {
            config.lock_kind = lock.parse()?;
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file, then override with CLI arguments
    let mut config = CoordinatorConfig::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config)?;
    config.validate()?;

    let store = Arc::new(MetadataStore::open(&config.db_path)?);
    let transport = VolumeClient::new(config.volume_timeout())?;
    tracing::info!("volume servers: {:?}", config.volumes);

    match cli.command {
        Commands::Server => {
            let coordinator = Arc::new(Coordinator::open(config, store, transport)?);
            coordinator.serve().await?;
        }

        Commands::Rebuild => {
            let coordinator = Coordinator::new(config, store, transport)?;
            let report = coordinator.run_rebuild()?;
            println!("Rebuild report:");
            println!("  Records scanned: {}", report.scanned);
            println!("  Keys inserted: {}", report.inserted);
            println!("  Skipped: {}", report.skipped);
            println!("  Failed: {}", report.failed);
            println!("  Filter: {:?}", coordinator.filter_stats()?);
        }

        Commands::Rebalance => {
            let coordinator = Coordinator::new(config, store.clone(), transport)?;
            let report = coordinator.run_rebalance().await?;
            store.flush()?;
            println!("Rebalance report:");
            println!("  Keys checked: {}", report.keys_checked);
            println!("  Keys migrated: {}", report.keys_migrated);
            println!("  Keys failed: {}", report.keys_failed);
            println!("  Keys busy: {}", report.keys_busy);
            println!("  Copies: {}", report.copies);
            println!("  Removals: {}", report.removals);
        }
    }

    Ok(())
}
