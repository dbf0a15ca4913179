//! Configuration for the fastkv coordinator
//!
//! Values come from (lowest to highest priority) built-in defaults, an
//! optional TOML file, `FASTKV_*` environment variables, and finally the
//! command line. Everything is immutable once the coordinator starts.

use crate::bloom::LockKind;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// RocksDB path for records
    pub db_path: PathBuf,

    /// Volume servers (host:port)
    pub volumes: Vec<String>,

    /// Replication factor
    pub replicas: usize,

    /// Subvolumes (disks) per volume server
    pub subvolumes: u32,

    /// Server consulted when no replica of a key is reachable
    pub fallback: Option<String>,

    /// Volumes that do not answer within this many milliseconds count as down
    pub volume_timeout_ms: u64,

    /// Send UNLINK before DELETE
    pub protect: bool,

    /// Store and verify blake3 checksums of values
    pub checksum: bool,

    /// Lock discipline for the bloom filter
    pub lock_kind: LockKind,

    /// Capacity of the first bloom filter stage
    pub bloom_capacity: usize,

    /// False-positive target of the first stage
    pub bloom_fp_rate: f64,

    /// Capacity multiplier between stages
    pub bloom_growth: usize,

    /// False-positive tightening ratio between stages
    pub bloom_tightening: f64,

    /// Keys migrated concurrently during rebalance
    pub rebalance_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            db_path: PathBuf::new(),
            volumes: Vec::new(),
            replicas: 3,
            subvolumes: 10,
            fallback: None,
            volume_timeout_ms: 1000,
            protect: false,
            checksum: true,
            lock_kind: LockKind::ReadWrite,
            bloom_capacity: 100_000,
            bloom_fp_rate: 0.01,
            bloom_growth: 2,
            bloom_tightening: 0.9,
            rebalance_concurrency: 8,
        }
    }
}

impl CoordinatorConfig {
    /// Load defaults, then `file` (if given or if `fastkv.toml` exists), then env.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("fastkv").required(false)),
        };
        let settings = builder
            .add_source(
                config::Environment::with_prefix("FASTKV")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("volumes"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn volume_timeout(&self) -> Duration {
        Duration::from_millis(self.volume_timeout_ms)
    }

    /// Reject configurations the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("need a path to the database".into()));
        }
        if self.volumes.is_empty() {
            return Err(Error::InvalidConfig("need at least one volume".into()));
        }
        if self.volumes.iter().any(|v| v.trim().is_empty()) {
            return Err(Error::InvalidConfig("empty volume address".into()));
        }
        if self.replicas == 0 {
            return Err(Error::InvalidConfig("replicas must be at least 1".into()));
        }
        if self.volumes.len() < self.replicas {
            return Err(Error::InvalidConfig(format!(
                "need at least as many volumes as replicas ({} < {})",
                self.volumes.len(),
                self.replicas
            )));
        }
        if self.subvolumes == 0 {
            return Err(Error::InvalidConfig("subvolumes must be at least 1".into()));
        }
        if self.bloom_capacity == 0 {
            return Err(Error::InvalidConfig("bloom capacity must be positive".into()));
        }
        if !(self.bloom_fp_rate > 0.0 && self.bloom_fp_rate < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bloom fp rate must be in (0, 1), got {}",
                self.bloom_fp_rate
            )));
        }
        if self.bloom_growth == 0 {
            return Err(Error::InvalidConfig("bloom growth must be at least 1".into()));
        }
        if !(self.bloom_tightening > 0.0 && self.bloom_tightening < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bloom tightening ratio must be in (0, 1), got {}",
                self.bloom_tightening
            )));
        }
        if self.rebalance_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "rebalance concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
