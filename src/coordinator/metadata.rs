//! Record store
//!
//! The coordinator keeps one [`Record`](crate::coordinator::record::Record)
//! per key in an ordered store. RocksDB backs it in production; an in-memory
//! map serves tests and embedded use.

use crate::common::{Error, Result};
use rocksdb::{ColumnFamily, IteratorMode, Options, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

const CF_RECORDS: &str = "records";

/// Ordered key → bytes store
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visit every entry in key order. An error aborts the scan.
    fn scan(&self, visit: &mut dyn FnMut(&[u8], &[u8])) -> Result<()>;

    /// All entries, in key order
    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        self.scan(&mut |k, v| out.push((k.to_vec(), v.to_vec())))?;
        Ok(out)
    }
}

/// RocksDB-backed record store
pub struct MetadataStore {
    db: DB,
}

impl MetadataStore {
    /// Open or create metadata store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_RECORDS])?;

        Ok(Self { db })
    }

    fn records(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_RECORDS)
            .ok_or_else(|| Error::Internal(format!("missing column family {}", CF_RECORDS)))
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl RecordStore for MetadataStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.records()?, key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put_cf(self.records()?, key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete_cf(self.records()?, key)?;
        Ok(())
    }

    fn scan(&self, visit: &mut dyn FnMut(&[u8], &[u8])) -> Result<()> {
        for item in self.db.iterator_cf(self.records()?, IteratorMode::Start) {
            let (key, value) = item?;
            visit(&key, &value);
        }
        Ok(())
    }
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemStore {
    map: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.map
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }
}

impl RecordStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map()?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.map()?.remove(key);
        Ok(())
    }

    fn scan(&self, visit: &mut dyn FnMut(&[u8], &[u8])) -> Result<()> {
        for (k, v) in self.map()?.iter() {
            visit(k, v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn RecordStore) {
        store.put(b"b", b"2").unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"c", b"3").unwrap();

        assert_eq!(store.get(b"a").unwrap().unwrap(), b"1");
        assert!(store.get(b"missing").unwrap().is_none());

        store.delete(b"b").unwrap();
        assert!(store.get(b"b").unwrap().is_none());

        let keys: Vec<Vec<u8>> = store.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_metadata_store() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("records.db")).unwrap();
        exercise(&store);
        store.flush().unwrap();
    }

    #[test]
    fn test_metadata_store_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.db");
        {
            let store = MetadataStore::open(&path).unwrap();
            store.put(b"durable", b"yes").unwrap();
        }
        let store = MetadataStore::open(&path).unwrap();
        assert_eq!(store.get(b"durable").unwrap().unwrap(), b"yes");
    }

    #[test]
    fn test_mem_store() {
        exercise(&MemStore::new());
    }
}
