//! Pluggable lock discipline for shared structures
//!
//! A [`Mutex`] is either fully exclusive (readers exclude each other) or a
//! reader-writer lock (readers share, writers exclude everyone). The kind is
//! picked once from configuration and never changes for the life of the lock.
//! Guards release on drop, so every exit path (including `?`) unlocks.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::{MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock discipline selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    Exclusive,
    #[serde(alias = "rw", alias = "read_write")]
    ReadWrite,
}

impl LockKind {
    /// Numeric code, as used on the command line and in older configs
    pub fn code(self) -> u8 {
        match self {
            LockKind::Exclusive => 1,
            LockKind::ReadWrite => 2,
        }
    }
}

impl TryFrom<u8> for LockKind {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(LockKind::Exclusive),
            2 => Ok(LockKind::ReadWrite),
            other => Err(Error::InvalidConfig(format!("unknown lock kind: {}", other))),
        }
    }
}

impl FromStr for LockKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exclusive" | "mutex" => Ok(LockKind::Exclusive),
            "readwrite" | "read_write" | "rw" => Ok(LockKind::ReadWrite),
            other => Err(Error::InvalidConfig(format!("unknown lock kind: {}", other))),
        }
    }
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKind::Exclusive => write!(f, "exclusive"),
            LockKind::ReadWrite => write!(f, "readwrite"),
        }
    }
}

/// A lock over `T` whose read side is shared or exclusive depending on its kind.
///
/// The reader-writer variant uses the platform `RwLock`, which does not let a
/// steady stream of readers starve a waiting writer.
#[derive(Debug)]
pub enum Mutex<T> {
    Exclusive(std::sync::Mutex<T>),
    ReadWrite(RwLock<T>),
}

/// Read access; shared only for [`LockKind::ReadWrite`]
pub enum ReadGuard<'a, T> {
    Exclusive(MutexGuard<'a, T>),
    Shared(RwLockReadGuard<'a, T>),
}

/// Write access; always exclusive
pub enum WriteGuard<'a, T> {
    Exclusive(MutexGuard<'a, T>),
    Unique(RwLockWriteGuard<'a, T>),
}

fn poisoned() -> Error {
    Error::BloomFilter("lock poisoned by a panicking holder".into())
}

impl<T> Mutex<T> {
    pub fn new(kind: LockKind, value: T) -> Self {
        match kind {
            LockKind::Exclusive => Mutex::Exclusive(std::sync::Mutex::new(value)),
            LockKind::ReadWrite => Mutex::ReadWrite(RwLock::new(value)),
        }
    }

    /// Build from a numeric kind code; unknown codes are a config error.
    pub fn from_code(code: u8, value: T) -> Result<Self> {
        Ok(Self::new(LockKind::try_from(code)?, value))
    }

    pub fn kind(&self) -> LockKind {
        match self {
            Mutex::Exclusive(_) => LockKind::Exclusive,
            Mutex::ReadWrite(_) => LockKind::ReadWrite,
        }
    }

    /// Acquire the read side (RLock). Released when the guard drops (RUnlock).
    pub fn read(&self) -> Result<ReadGuard<'_, T>> {
        match self {
            Mutex::Exclusive(m) => m.lock().map(ReadGuard::Exclusive).map_err(|_| poisoned()),
            Mutex::ReadWrite(rw) => rw.read().map(ReadGuard::Shared).map_err(|_| poisoned()),
        }
    }

    /// Acquire the write side (WLock). Released when the guard drops (WUnlock).
    pub fn write(&self) -> Result<WriteGuard<'_, T>> {
        match self {
            Mutex::Exclusive(m) => m.lock().map(WriteGuard::Exclusive).map_err(|_| poisoned()),
            Mutex::ReadWrite(rw) => rw.write().map(WriteGuard::Unique).map_err(|_| poisoned()),
        }
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            ReadGuard::Exclusive(g) => g,
            ReadGuard::Shared(g) => g,
        }
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            WriteGuard::Exclusive(g) => g,
            WriteGuard::Unique(g) => g,
        }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self {
            WriteGuard::Exclusive(g) => g,
            WriteGuard::Unique(g) => g,
        }
    }
}
