//! Common utilities and types shared across fastkv

pub mod config;
pub mod error;
pub mod hash;
pub mod utils;

pub use config::CoordinatorConfig;
pub use error::{Error, Result};
pub use hash::{blake3_hash, hrw_hash, volume_path};
pub use utils::{encode_key, parse_duration, validate_key};
