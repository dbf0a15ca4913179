//! Approximate membership for the coordinator
//!
//! A scalable bloom filter answers "might this key exist?" so that reads of
//! unknown keys never touch the record store. The filter is guarded by a
//! [`Mutex`] whose discipline (exclusive or reader-writer) is configurable.

pub mod filter;
pub mod mutex;

pub use filter::{BloomParams, BloomStage, FilterStats, ScalableBloomFilter};
pub use mutex::{LockKind, Mutex, ReadGuard, WriteGuard};
