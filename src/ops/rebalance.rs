//! Move replicas to where placement says they belong
//!
//! For every live record the pass works out the target volumes (heaviest
//! reachable volumes for the key), copies the value onto targets that lack
//! it, removes copies from volumes that are no longer targets, and only then
//! rewrites the record's locations. Anything that fails leaves the record as
//! it was, so the next pass picks the key up again.

use crate::common::{blake3_hash, Error, Result};
use crate::coordinator::record::Record;
use crate::coordinator::volume_client::VolumeTransport;
use crate::coordinator::Coordinator;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RebalanceReport {
    pub keys_checked: usize,
    pub keys_migrated: usize,
    pub keys_failed: usize,
    /// Keys skipped because a writer held them
    pub keys_busy: usize,
    pub copies: usize,
    pub removals: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Unchanged,
    Migrated { copies: usize, removals: usize },
    Busy,
    Failed,
}

/// Volumes that timed out or refused a connection during this pass
#[derive(Debug, Default)]
struct PassHealth {
    down: Mutex<HashSet<String>>,
}

impl PassHealth {
    fn is_down(&self, volume: &str) -> bool {
        self.down
            .lock()
            .map(|down| down.contains(volume))
            .unwrap_or(false)
    }

    fn mark_down(&self, volume: &str) {
        if let Ok(mut down) = self.down.lock() {
            if down.insert(volume.to_string()) {
                tracing::warn!("volume {} is down for the rest of this pass", volume);
            }
        }
    }

    /// Unreachable volumes are skipped for the rest of the pass.
    fn note(&self, volume: &str, e: &Error) {
        if matches!(e, Error::VolumeUnavailable { .. }) {
            self.mark_down(volume);
        }
    }
}

/// Run one rebalance pass over every record.
///
/// Per-key failures are counted and logged; only a failed scan of the
/// record store aborts the pass.
pub async fn rebalance<T: VolumeTransport>(coordinator: &Coordinator<T>) -> Result<RebalanceReport> {
    let concurrency = coordinator.config().rebalance_concurrency.max(1);
    tracing::info!(
        "Starting rebalance over {} volumes ({} replicas, concurrency {})",
        coordinator.placement().volumes().len(),
        coordinator.placement().replicas(),
        concurrency
    );

    let mut keys = Vec::new();
    coordinator.store().scan(&mut |key, _| keys.push(key.to_vec()))?;

    let health = PassHealth::default();
    let outcomes: Vec<KeyOutcome> = stream::iter(keys)
        .map(|key| rebalance_key(coordinator, &health, key))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut report = RebalanceReport::default();
    for outcome in outcomes {
        report.keys_checked += 1;
        match outcome {
            KeyOutcome::Unchanged => {}
            KeyOutcome::Migrated { copies, removals } => {
                report.keys_migrated += 1;
                report.copies += copies;
                report.removals += removals;
            }
            KeyOutcome::Busy => report.keys_busy += 1,
            KeyOutcome::Failed => report.keys_failed += 1,
        }
    }

    tracing::info!(
        "Rebalance done: {} checked, {} migrated, {} failed, {} busy ({} copies, {} removals)",
        report.keys_checked,
        report.keys_migrated,
        report.keys_failed,
        report.keys_busy,
        report.copies,
        report.removals
    );
    Ok(report)
}

async fn rebalance_key<T: VolumeTransport>(
    coordinator: &Coordinator<T>,
    health: &PassHealth,
    key: Vec<u8>,
) -> KeyOutcome {
    let name = String::from_utf8_lossy(&key).into_owned();
    let Some(_guard) = coordinator.try_lock(&key) else {
        tracing::debug!("rebalance: {} is being written, skipping", name);
        return KeyOutcome::Busy;
    };

    // re-read under the lock; the scan may be stale
    let record = match coordinator.store().get(&key).and_then(|b| match b {
        Some(bytes) => Record::decode(&bytes).map(Some),
        None => Ok(None),
    }) {
        Ok(Some(record)) if record.is_present() => record,
        Ok(_) => return KeyOutcome::Unchanged,
        Err(e) => {
            tracing::warn!("rebalance: cannot read record for {}: {}", name, e);
            return KeyOutcome::Failed;
        }
    };

    match migrate(coordinator, health, &key, record).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("rebalance: {} left for the next pass: {}", name, e);
            KeyOutcome::Failed
        }
    }
}

async fn migrate<T: VolumeTransport>(
    coordinator: &Coordinator<T>,
    health: &PassHealth,
    key: &[u8],
    record: Record,
) -> Result<KeyOutcome> {
    let placement = coordinator.placement();
    let transport = coordinator.transport();

    // Walk the ranking, probing until enough reachable volumes are found.
    let mut target: Vec<String> = Vec::new();
    let mut holds: HashMap<String, bool> = HashMap::new();
    for volume in placement.ranked(key) {
        if target.len() == placement.replicas() {
            break;
        }
        if health.is_down(&volume) {
            continue;
        }
        match transport.exists(&volume, &placement.path(key, &volume)).await {
            Ok(present) => {
                holds.insert(volume.clone(), present);
                target.push(volume);
            }
            Err(e) => {
                tracing::debug!("rebalance: check of {} failed: {}", volume, e);
                health.note(&volume, &e);
            }
        }
    }
    if target.is_empty() {
        return Err(Error::NoHealthyVolumes);
    }

    let missing: Vec<&String> = target.iter().filter(|v| !holds[*v]).collect();
    let current: HashSet<&String> = record.locations.iter().collect();
    let wanted: HashSet<&String> = target.iter().collect();
    if missing.is_empty() && current == wanted {
        return Ok(KeyOutcome::Unchanged);
    }

    let mut copies = 0;
    if !missing.is_empty() {
        let body = fetch_replica(coordinator, health, key, &record, &target, &holds).await?;
        for volume in missing {
            transport
                .store(volume, &placement.path(key, volume), body.clone())
                .await
                .inspect_err(|e| health.note(volume, e))?;
            tracing::debug!("rebalance: copied {:?} to {}", String::from_utf8_lossy(key), volume);
            copies += 1;
        }
    }

    // Every target now holds the value; drop copies that are no longer wanted.
    let mut kept = Vec::new();
    let mut removals = 0;
    for volume in record.locations.iter().filter(|v| !wanted.contains(v)) {
        match remove_replica(coordinator, health, key, volume).await {
            Ok(()) => removals += 1,
            Err(e) => {
                tracing::warn!(
                    "rebalance: could not remove {:?} from {}: {}",
                    String::from_utf8_lossy(key),
                    volume,
                    e
                );
                kept.push(volume.clone());
            }
        }
    }

    let mut locations = target;
    locations.extend(kept);
    let changed = locations.iter().collect::<HashSet<_>>() != current;
    if changed {
        let updated = Record {
            locations,
            ..record
        };
        coordinator.store().put(key, &updated.encode()?)?;
    }

    if copies == 0 && removals == 0 && !changed {
        Ok(KeyOutcome::Unchanged)
    } else {
        Ok(KeyOutcome::Migrated { copies, removals })
    }
}

/// Read the value from a healthy replica, or from the fallback server.
async fn fetch_replica<T: VolumeTransport>(
    coordinator: &Coordinator<T>,
    health: &PassHealth,
    key: &[u8],
    record: &Record,
    target: &[String],
    holds: &HashMap<String, bool>,
) -> Result<Bytes> {
    let placement = coordinator.placement();
    let transport = coordinator.transport();
    let expected = record
        .checksum
        .as_ref()
        .filter(|_| coordinator.config().checksum);

    let mut sources: Vec<(String, String)> = target
        .iter()
        .filter(|v| holds.get(*v).copied().unwrap_or(false))
        .map(|v| (v.clone(), placement.path(key, v)))
        .collect();
    sources.extend(
        record
            .locations
            .iter()
            .filter(|v| !target.contains(v))
            .map(|v| (v.clone(), placement.path(key, v))),
    );
    if let Some(fallback) = &coordinator.config().fallback {
        sources.push((fallback.clone(), placement.fallback_path(key)));
    }

    let mut corrupt = None;
    for (volume, path) in sources {
        if health.is_down(&volume) {
            continue;
        }
        let body = match transport.fetch(&volume, &path).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("rebalance: source {} failed: {}", volume, e);
                health.note(&volume, &e);
                continue;
            }
        };
        if let Some(expected) = expected {
            let actual = blake3_hash(&body);
            if &actual != expected {
                tracing::warn!(
                    "rebalance: {} holds a corrupt copy of {:?}",
                    volume,
                    String::from_utf8_lossy(key)
                );
                corrupt = Some(actual);
                continue;
            }
        }
        return Ok(body);
    }

    match (corrupt, expected) {
        (Some(actual), Some(expected)) => Err(Error::ChecksumMismatch {
            expected: expected.clone(),
            actual,
        }),
        _ => Err(Error::NotFound(format!(
            "no readable replica of {:?}",
            String::from_utf8_lossy(key)
        ))),
    }
}

/// Remove one copy, leaving an UNLINK marker first when protection is on.
async fn remove_replica<T: VolumeTransport>(
    coordinator: &Coordinator<T>,
    health: &PassHealth,
    key: &[u8],
    volume: &str,
) -> Result<()> {
    if health.is_down(volume) {
        return Err(Error::VolumeUnavailable {
            volume: volume.to_string(),
            reason: "down earlier in this pass".into(),
        });
    }
    let path = coordinator.placement().path(key, volume);
    let transport = coordinator.transport();
    if coordinator.config().protect {
        transport
            .unlink(volume, &path)
            .await
            .inspect_err(|e| health.note(volume, e))?;
    }
    transport
        .remove(volume, &path)
        .await
        .inspect_err(|e| health.note(volume, e))
}
