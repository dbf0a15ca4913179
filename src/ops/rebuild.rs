//! Rebuild the bloom filter from the record store

use crate::common::Result;
use crate::coordinator::record::Record;
use crate::coordinator::volume_client::VolumeTransport;
use crate::coordinator::Coordinator;
use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RebuildReport {
    /// Records visited
    pub scanned: usize,
    /// Keys added to the new filter
    pub inserted: usize,
    /// Tombstones and undecodable records left out
    pub skipped: usize,
    /// Keys whose insert failed
    pub failed: usize,
}

/// Scan every record into a fresh filter, then swap it in.
///
/// Only live records are inserted. A failed insert is logged and skipped; a
/// failed scan aborts and leaves the current filter untouched. Writes that
/// land while the scan runs go into the fresh filter as well.
pub fn rebuild_filter<T: VolumeTransport>(coordinator: &Coordinator<T>) -> Result<RebuildReport> {
    tracing::info!("Starting bloom filter rebuild");

    let filter = coordinator.begin_rebuild()?;
    let mut report = RebuildReport::default();

    let scanned = coordinator.store().scan(&mut |key, value| {
        report.scanned += 1;
        match Record::decode(value) {
            Ok(record) if record.is_present() => match filter.add(key) {
                Ok(()) => report.inserted += 1,
                Err(e) => {
                    tracing::warn!("rebuild: add {:?} failed: {}", String::from_utf8_lossy(key), e);
                    report.failed += 1;
                }
            },
            Ok(_) => report.skipped += 1,
            Err(e) => {
                tracing::warn!(
                    "rebuild: skipping undecodable record {:?}: {}",
                    String::from_utf8_lossy(key),
                    e
                );
                report.skipped += 1;
            }
        }
    });
    if let Err(e) = scanned {
        tracing::warn!("Rebuild aborted after {} records: {}", report.scanned, e);
        coordinator.end_rebuild(false);
        return Err(e);
    }
    coordinator.end_rebuild(true);

    tracing::info!(
        "Rebuild done: {} scanned, {} inserted, {} skipped, {} failed",
        report.scanned,
        report.inserted,
        report.skipped,
        report.failed
    );
    Ok(report)
}
