//! # fastkv
//!
//! A key-value coordinator that keeps only metadata and leaves the values on
//! a set of plain HTTP volume servers:
//! - A scalable bloom filter short-circuits lookups of unknown keys
//! - Per-key try-locks serialize writers
//! - RocksDB holds one record per key (replica locations, status, checksum)
//! - HRW placement picks volumes; rebalance moves replicas when volumes change
//! - Rebuild restores the bloom filter from the record store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Coordinator                 │
//! │  bloom filter ─▶ RocksDB records         │
//! │  key locks, HRW placement                │
//! └───────────┬──────────────────────────────┘
//!             │ HTTP (GET/HEAD/PUT/DELETE/UNLINK)
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼────────┐
//! │ Volume 1   │   │ Volume 2   │   │ Volume 3   │
//! │ sv00..svNN │   │ sv00..svNN │   │ sv00..svNN │
//! └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Serve
//! fastkv server --db ./fastkv-db --volumes localhost:3001,localhost:3002,localhost:3003
//!
//! # Restore the bloom filter / move replicas after changing the volume list
//! fastkv rebuild --db ./fastkv-db --volumes ...
//! fastkv rebalance --db ./fastkv-db --volumes localhost:3001,localhost:3003,localhost:3004
//! ```

pub mod bloom;
pub mod common;
pub mod coordinator;
pub mod ops;

// Re-export commonly used types
pub use bloom::{LockKind, ScalableBloomFilter};
pub use common::{CoordinatorConfig, Error, Result};
pub use coordinator::{Coordinator, Record, RecordStatus};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
