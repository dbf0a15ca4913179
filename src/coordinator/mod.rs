//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Membership checks (scalable bloom filter in front of the record store)
//! - Write serialization (per-key try-locks)
//! - Record bookkeeping (key → replica locations and status)
//! - Placement decisions (HRW over the configured volumes)

pub mod http;
pub mod locks;
pub mod metadata;
pub mod placement;
pub mod record;
pub mod server;
pub mod volume_client;

pub use locks::{KeyGuard, KeyLockTable};
pub use metadata::{MemStore, MetadataStore, RecordStore};
pub use placement::PlacementManager;
pub use record::{Record, RecordStatus};
pub use server::Coordinator;
pub use volume_client::{VolumeClient, VolumeTransport};
