//! In-flight write table
//!
//! Writers claim a key before touching volumes or the record store. Claims
//! never block: a second writer for the same key is turned away immediately.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Set of keys currently being written
#[derive(Debug, Default)]
pub struct KeyLockTable {
    keys: Mutex<HashSet<Vec<u8>>>,
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashSet<Vec<u8>>> {
        // The set stays consistent even if a holder panicked mid-call.
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `key`. Returns false if another writer holds it.
    pub fn lock_key(&self, key: &[u8]) -> bool {
        let mut keys = self.table();
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.to_vec());
        true
    }

    /// Release `key`. Releasing an unclaimed key is a no-op.
    pub fn unlock_key(&self, key: &[u8]) {
        self.table().remove(key);
    }

    /// Claim `key` for the lifetime of the returned guard.
    pub fn try_acquire<'a>(&'a self, key: &[u8]) -> Option<KeyGuard<'a>> {
        if self.lock_key(key) {
            Some(KeyGuard {
                table: self,
                key: key.to_vec(),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, key: &[u8]) -> bool {
        self.table().contains(key)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Releases its key on drop
#[derive(Debug)]
pub struct KeyGuard<'a> {
    table: &'a KeyLockTable,
    key: Vec<u8>,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.table.unlock_key(&self.key);
    }
}
