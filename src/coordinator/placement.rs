//! Replica placement using HRW hashing
//!
//! Every volume gets a per-key weight; a key's replicas go to the heaviest
//! `replicas` volumes that are up. Within a volume the key lands on one of
//! `subvolumes` disks, also picked from the key hash. The result depends only
//! on the key and the volume names, so repeated passes over an unchanged
//! volume set agree on the target.

use crate::common::{encode_key, hrw_hash, volume_path, CoordinatorConfig, Error, Result};

/// PlacementManager picks target volumes and on-volume paths for keys.
#[derive(Debug, Clone)]
pub struct PlacementManager {
    volumes: Vec<String>,
    replicas: usize,
    subvolumes: u32,
}

impl PlacementManager {
    pub fn new(volumes: Vec<String>, replicas: usize, subvolumes: u32) -> Self {
        Self {
            volumes,
            replicas,
            subvolumes,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.volumes.clone(), config.replicas, config.subvolumes)
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Configured volumes ranked by weight for `key`
    pub fn ranked(&self, key: &[u8]) -> Vec<String> {
        hrw_hash(key, &self.volumes)
    }

    /// Target set for `key`: the heaviest volumes for which `is_up` holds.
    ///
    /// May hold fewer than `replicas` entries when too many volumes are down.
    pub fn target_volumes(&self, key: &[u8], mut is_up: impl FnMut(&str) -> bool) -> Vec<String> {
        self.ranked(key)
            .into_iter()
            .filter(|v| is_up(v.as_str()))
            .take(self.replicas)
            .collect()
    }

    /// Target set assuming every volume is up; fails only without volumes.
    pub fn select_volumes(&self, key: &[u8]) -> Result<Vec<String>> {
        let selected = self.target_volumes(key, |_| true);
        if selected.is_empty() {
            return Err(Error::NoHealthyVolumes);
        }
        Ok(selected)
    }

    /// Path of `key` on `volume`
    pub fn path(&self, key: &[u8], volume: &str) -> String {
        volume_path(key, volume, self.subvolumes)
    }

    /// Path of `key` on the fallback server, which uses a flat layout
    pub fn fallback_path(&self, key: &[u8]) -> String {
        format!("/{}", encode_key(&String::from_utf8_lossy(key)))
    }
}
