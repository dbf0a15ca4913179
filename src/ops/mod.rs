//! Maintenance passes run from the command line

pub mod rebalance;
pub mod rebuild;

pub use rebalance::{rebalance, RebalanceReport};
pub use rebuild::{rebuild_filter, RebuildReport};
