//! Per-key record: where the replicas live and the key's lifecycle state

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Live key
    Present,
    /// Tombstone kept until purged
    SoftDeleted,
    /// Sentinel for keys the coordinator does not know; never persisted
    Hard,
}

/// Value stored per key in the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Volumes holding a replica, in placement order
    pub locations: Vec<String>,
    pub status: RecordStatus,
    /// blake3 of the value, when checksums are enabled
    pub checksum: Option<String>,
}

impl Record {
    pub fn new(locations: Vec<String>, checksum: Option<String>) -> Self {
        Self {
            locations,
            status: RecordStatus::Present,
            checksum,
        }
    }

    /// The "not found" sentinel
    pub fn hard() -> Self {
        Self {
            locations: Vec::new(),
            status: RecordStatus::Hard,
            checksum: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.status == RecordStatus::Present
    }

    pub fn is_hard(&self) -> bool {
        self.status == RecordStatus::Hard
    }

    /// Tombstone with the same locations
    pub fn soft_deleted(&self) -> Self {
        Self {
            status: RecordStatus::SoftDeleted,
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.is_hard() {
            return Err(Error::Internal("refusing to persist the not-found sentinel".into()));
        }
        bincode::serialize(self).map_err(|e| Error::Internal(format!("Serialize error: {}", e)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let record: Record =
            bincode::deserialize(bytes).map_err(|e| Error::Corrupted(e.to_string()))?;
        if record.is_hard() {
            return Err(Error::Corrupted("persisted not-found sentinel".into()));
        }
        Ok(record)
    }
}
