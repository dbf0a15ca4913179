//! Shared helpers for the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use fastkv::common::{blake3_hash, CoordinatorConfig, Error, Result};
use fastkv::coordinator::{Coordinator, VolumeTransport};
use fastkv::Record;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct VolumeState {
    blobs: Mutex<HashMap<(String, String), Bytes>>,
    down: Mutex<HashSet<String>>,
    stores: AtomicUsize,
    removes: AtomicUsize,
    unlinks: AtomicUsize,
}

/// In-memory volume servers. Clones share state.
#[derive(Clone, Default)]
pub struct MockVolumes {
    state: Arc<VolumeState>,
}

impl MockVolumes {
    pub fn insert(&self, volume: &str, path: &str, body: impl Into<Bytes>) {
        self.state
            .blobs
            .lock()
            .unwrap()
            .insert((volume.to_string(), path.to_string()), body.into());
    }

    pub fn get(&self, volume: &str, path: &str) -> Option<Bytes> {
        self.state
            .blobs
            .lock()
            .unwrap()
            .get(&(volume.to_string(), path.to_string()))
            .cloned()
    }

    pub fn holds(&self, volume: &str, path: &str) -> bool {
        self.get(volume, path).is_some()
    }

    /// Every request to `volume` fails as if it timed out.
    pub fn take_down(&self, volume: &str) {
        self.state.down.lock().unwrap().insert(volume.to_string());
    }

    pub fn stores(&self) -> usize {
        self.state.stores.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.state.removes.load(Ordering::SeqCst)
    }

    pub fn unlinks(&self) -> usize {
        self.state.unlinks.load(Ordering::SeqCst)
    }

    fn check_up(&self, volume: &str) -> Result<()> {
        if self.state.down.lock().unwrap().contains(volume) {
            return Err(Error::VolumeUnavailable {
                volume: volume.to_string(),
                reason: "operation timed out".into(),
            });
        }
        Ok(())
    }
}

impl VolumeTransport for MockVolumes {
    async fn exists(&self, volume: &str, path: &str) -> Result<bool> {
        self.check_up(volume)?;
        Ok(self.holds(volume, path))
    }

    async fn fetch(&self, volume: &str, path: &str) -> Result<Bytes> {
        self.check_up(volume)?;
        self.get(volume, path)
            .ok_or_else(|| Error::NotFound(format!("{}{}", volume, path)))
    }

    async fn store(&self, volume: &str, path: &str, body: Bytes) -> Result<()> {
        self.check_up(volume)?;
        self.state.stores.fetch_add(1, Ordering::SeqCst);
        self.insert(volume, path, body);
        Ok(())
    }

    async fn unlink(&self, volume: &str, _path: &str) -> Result<()> {
        self.check_up(volume)?;
        self.state.unlinks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, volume: &str, path: &str) -> Result<()> {
        self.check_up(volume)?;
        self.state.removes.fetch_add(1, Ordering::SeqCst);
        self.state
            .blobs
            .lock()
            .unwrap()
            .remove(&(volume.to_string(), path.to_string()));
        Ok(())
    }
}

pub fn config(volumes: &[&str]) -> CoordinatorConfig {
    CoordinatorConfig {
        db_path: PathBuf::from("unused"),
        volumes: volumes.iter().map(|v| v.to_string()).collect(),
        replicas: 2,
        subvolumes: 5,
        bloom_capacity: 128,
        ..Default::default()
    }
}

/// Write `body` the way a PUT does: copies on every target, then the record.
pub fn write(coordinator: &Coordinator<MockVolumes>, key: &[u8], body: &[u8]) -> Record {
    let placement = coordinator.placement();
    let targets = placement.select_volumes(key).unwrap();
    for volume in &targets {
        coordinator
            .transport()
            .insert(volume, &placement.path(key, volume), body.to_vec());
    }
    let record = Record::new(targets, Some(blake3_hash(body)));
    let _guard = coordinator.try_lock(key).unwrap();
    coordinator.put_record(key, &record).unwrap();
    record
}

pub fn record(coordinator: &Coordinator<MockVolumes>, key: &[u8]) -> Record {
    let bytes = coordinator.store().get(key).unwrap().unwrap();
    Record::decode(&bytes).unwrap()
}
