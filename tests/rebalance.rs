//! Rebalance passes against in-memory volumes

mod common;

use common::{config, record, write, MockVolumes};
use fastkv::common::blake3_hash;
use fastkv::coordinator::{MemStore, RecordStore};
use fastkv::{Coordinator, CoordinatorConfig, Record, RecordStatus};
use std::collections::HashSet;
use std::sync::Arc;

fn coordinator(
    cfg: CoordinatorConfig,
    store: &Arc<MemStore>,
    volumes: &MockVolumes,
) -> Coordinator<MockVolumes> {
    let store: Arc<dyn RecordStore> = store.clone();
    Coordinator::new(cfg, store, volumes.clone()).unwrap()
}

fn keys(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("key-{}", i).into_bytes()).collect()
}

#[tokio::test]
async fn test_put_then_drop_a_volume() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();

    let before = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);
    let written = write(&before, b"a", b"hello");
    assert_eq!(written.locations.len(), 2);
    for volume in &written.locations {
        assert!(["v1", "v2", "v3", "v4"].contains(&volume.as_str()));
    }

    let after = coordinator(config(&["v1", "v3", "v4"]), &store, &volumes);
    let report = after.run_rebalance().await.unwrap();
    assert_eq!(report.keys_checked, 1);
    assert_eq!(report.keys_failed, 0);

    let moved = record(&after, b"a");
    assert_eq!(moved.locations.len(), 2);
    let placement = after.placement();
    for volume in &moved.locations {
        assert_ne!(volume, "v2");
        assert!(volumes.holds(volume, &placement.path(b"a", volume)));
    }
    assert!(!volumes.holds("v2", &placement.path(b"a", "v2")));
    assert_eq!(moved.checksum, written.checksum);
}

#[tokio::test]
async fn test_converges_and_is_idempotent() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();

    let before = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);
    for key in keys(50) {
        write(&before, &key, b"value");
    }

    let after = coordinator(config(&["v1", "v3", "v4"]), &store, &volumes);
    let first = after.run_rebalance().await.unwrap();
    assert_eq!(first.keys_checked, 50);
    assert_eq!(first.keys_failed, 0);
    assert!(first.keys_migrated > 0);
    assert_eq!(first.copies, first.removals);

    for key in keys(50) {
        let locations: HashSet<String> = record(&after, &key).locations.into_iter().collect();
        let wanted: HashSet<String> = after
            .placement()
            .select_volumes(&key)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(locations, wanted);
    }

    let stores = volumes.stores();
    let second = after.run_rebalance().await.unwrap();
    assert_eq!(second.keys_migrated, 0);
    assert_eq!(second.copies, 0);
    assert_eq!(second.removals, 0);
    assert_eq!(volumes.stores(), stores);
}

#[tokio::test]
async fn test_protect_unlinks_before_removing() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();

    let before = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);
    for key in keys(20) {
        write(&before, &key, b"value");
    }

    let cfg = CoordinatorConfig {
        protect: true,
        ..config(&["v1", "v3", "v4"])
    };
    let after = coordinator(cfg, &store, &volumes);
    let report = after.run_rebalance().await.unwrap();
    assert!(report.removals > 0);
    assert_eq!(volumes.unlinks(), report.removals);
    assert_eq!(volumes.removes(), report.removals);
}

#[tokio::test]
async fn test_copies_from_fallback() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();
    let cfg = CoordinatorConfig {
        fallback: Some("fb".into()),
        ..config(&["v1", "v2", "v3", "v4"])
    };
    let coord = coordinator(cfg, &store, &volumes);

    // the record exists but none of its copies do
    let body = b"from the fallback";
    let lost = Record::new(vec!["v1".into(), "v2".into()], Some(blake3_hash(body)));
    coord.put_record(b"old", &lost).unwrap();
    volumes.insert("fb", &coord.placement().fallback_path(b"old"), body.to_vec());

    let report = coord.run_rebalance().await.unwrap();
    assert_eq!(report.keys_failed, 0);
    assert_eq!(report.copies, 2);

    let placement = coord.placement();
    for volume in record(&coord, b"old").locations {
        assert_eq!(
            volumes.get(&volume, &placement.path(b"old", &volume)).unwrap(),
            &body[..]
        );
    }
}

#[tokio::test]
async fn test_down_volume_is_skipped() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();
    let coord = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);
    for key in keys(20) {
        write(&coord, &key, b"value");
    }

    volumes.take_down("v1");
    let report = coord.run_rebalance().await.unwrap();
    assert_eq!(report.keys_failed, 0);

    let placement = coord.placement();
    for key in keys(20) {
        let current = record(&coord, &key);
        let reachable = placement.target_volumes(&key, |v| v != "v1");
        for volume in &reachable {
            assert!(current.locations.contains(volume));
            assert!(volumes.holds(volume, &placement.path(&key, volume)));
        }
        // a copy that could not be removed stays listed
        let extra: Vec<_> = current
            .locations
            .iter()
            .filter(|v| !reachable.contains(v))
            .collect();
        assert!(extra.iter().all(|v| v.as_str() == "v1"));
    }

    // still down: nothing left to do
    let again = coord.run_rebalance().await.unwrap();
    assert_eq!(again.copies, 0);
    assert_eq!(again.keys_migrated, 0);
}

#[tokio::test]
async fn test_checksum_mismatch_fails_key() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();
    let coord = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);

    // the only copy sits on the lowest-ranked volume and is corrupt
    let last = coord.placement().ranked(b"k").pop().unwrap();
    let stale = Record::new(vec![last.clone()], Some(blake3_hash(b"good")));
    coord.put_record(b"k", &stale).unwrap();
    volumes.insert(&last, &coord.placement().path(b"k", &last), b"bad".to_vec());

    let report = coord.run_rebalance().await.unwrap();
    assert_eq!(report.keys_failed, 1);
    assert_eq!(report.copies, 0);
    assert_eq!(record(&coord, b"k"), stale);
}

#[tokio::test]
async fn test_checksum_off_copies_anyway() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();
    let cfg = CoordinatorConfig {
        checksum: false,
        ..config(&["v1", "v2", "v3", "v4"])
    };
    let coord = coordinator(cfg, &store, &volumes);

    let last = coord.placement().ranked(b"k").pop().unwrap();
    coord
        .put_record(b"k", &Record::new(vec![last.clone()], Some(blake3_hash(b"good"))))
        .unwrap();
    volumes.insert(&last, &coord.placement().path(b"k", &last), b"bad".to_vec());

    let report = coord.run_rebalance().await.unwrap();
    assert_eq!(report.keys_failed, 0);
    assert_eq!(report.copies, 2);
    assert_eq!(report.removals, 1);
    assert!(!record(&coord, b"k").locations.contains(&last));
}

#[tokio::test]
async fn test_locked_key_is_busy() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();
    let before = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);
    let written = write(&before, b"held", b"value");

    let after = coordinator(config(&["v3", "v4"]), &store, &volumes);
    assert!(after.lock_key(b"held"));
    let report = after.run_rebalance().await.unwrap();
    assert_eq!(report.keys_busy, 1);
    assert_eq!(record(&after, b"held"), written);
    after.unlock_key(b"held");
}

#[tokio::test]
async fn test_tombstones_are_left_alone() {
    let store = Arc::new(MemStore::new());
    let volumes = MockVolumes::default();
    let before = coordinator(config(&["v1", "v2", "v3", "v4"]), &store, &volumes);
    write(&before, b"gone", b"value");
    before.delete_record(b"gone").unwrap();

    let after = coordinator(config(&["v3", "v4"]), &store, &volumes);
    let report = after.run_rebalance().await.unwrap();
    assert_eq!(report.keys_checked, 1);
    assert_eq!(report.keys_migrated, 0);
    assert_eq!(volumes.stores(), 0);
    assert_eq!(record(&after, b"gone").status, RecordStatus::SoftDeleted);
}
