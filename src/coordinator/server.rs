//! Coordinator: bloom-gated reads, key-locked writes, record bookkeeping

use crate::bloom::{BloomParams, FilterStats, ScalableBloomFilter};
use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::http::create_router;
use crate::coordinator::locks::{KeyGuard, KeyLockTable};
use crate::coordinator::metadata::RecordStore;
use crate::coordinator::placement::PlacementManager;
use crate::coordinator::record::Record;
use crate::coordinator::volume_client::{VolumeClient, VolumeTransport};
use crate::ops::{RebalanceReport, RebuildReport};
use std::sync::{Arc, RwLock};

pub struct Coordinator<T = VolumeClient> {
    config: CoordinatorConfig,
    store: Arc<dyn RecordStore>,
    filter: RwLock<Arc<ScalableBloomFilter>>,
    /// Filter being filled by an in-progress rebuild
    rebuilding: RwLock<Option<Arc<ScalableBloomFilter>>>,
    locks: KeyLockTable,
    placement: PlacementManager,
    transport: T,
}

impl<T: VolumeTransport> Coordinator<T> {
    /// Build a coordinator with an empty filter.
    ///
    /// Keys already in `store` stay invisible to reads until a rebuild; use
    /// [`Coordinator::open`] to start from an existing store.
    pub fn new(config: CoordinatorConfig, store: Arc<dyn RecordStore>, transport: T) -> Result<Self> {
        config.validate()?;
        let filter = ScalableBloomFilter::new(config.lock_kind, bloom_params(&config))?;
        let placement = PlacementManager::from_config(&config);
        Ok(Self {
            config,
            store,
            filter: RwLock::new(Arc::new(filter)),
            rebuilding: RwLock::new(None),
            locks: KeyLockTable::new(),
            placement,
            transport,
        })
    }

    /// Build a coordinator and populate its filter from `store`.
    pub fn open(config: CoordinatorConfig, store: Arc<dyn RecordStore>, transport: T) -> Result<Self> {
        let coordinator = Self::new(config, store, transport)?;
        coordinator.run_rebuild()?;
        Ok(coordinator)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn placement(&self) -> &PlacementManager {
        &self.placement
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn locks(&self) -> &KeyLockTable {
        &self.locks
    }

    /// Current filter generation
    pub fn filter(&self) -> Arc<ScalableBloomFilter> {
        self.filter
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish a fresh, empty filter that writers feed alongside the current one.
    ///
    /// Writers already inside [`Coordinator::put_record`] finish first, so
    /// every key is either in the store before the rebuild scan starts or
    /// added to the returned filter.
    pub fn begin_rebuild(&self) -> Result<Arc<ScalableBloomFilter>> {
        let fresh = Arc::new(ScalableBloomFilter::new(
            self.config.lock_kind,
            bloom_params(&self.config),
        )?);
        *self.rebuilding.write().unwrap_or_else(|e| e.into_inner()) = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the pending filter, making it current when `publish` is set.
    ///
    /// Readers see the old filter or the new one, never a mix.
    pub fn end_rebuild(&self, publish: bool) {
        let mut pending = self.rebuilding.write().unwrap_or_else(|e| e.into_inner());
        if let Some(fresh) = pending.take().filter(|_| publish) {
            *self.filter.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        }
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn filter_stats(&self) -> Result<FilterStats> {
        self.filter().stats()
    }

    pub fn lock_key(&self, key: &[u8]) -> bool {
        self.locks.lock_key(key)
    }

    pub fn unlock_key(&self, key: &[u8]) {
        self.locks.unlock_key(key)
    }

    /// Claim `key` until the guard drops
    pub fn try_lock(&self, key: &[u8]) -> Option<KeyGuard<'_>> {
        self.locks.try_acquire(key)
    }

    /// Look up `key`, answering [`Record::hard`] for unknown keys.
    ///
    /// Keys the filter rules out never reach the store. A filter failure is
    /// treated as a miss. Store and decode failures are returned.
    pub fn get_record(&self, key: &[u8]) -> Result<Record> {
        let maybe_present = match self.filter().test(key) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Bloom filter test failed: {}", e);
                false
            }
        };
        if !maybe_present {
            return Ok(Record::hard());
        }

        match self.store.get(key)? {
            Some(bytes) => Record::decode(&bytes),
            None => Ok(Record::hard()),
        }
    }

    /// Persist `record` for `key`, registering the key in the filter first.
    ///
    /// During a rebuild the key also goes into the pending filter, and the
    /// rebuild cannot swap filters until the store write is done.
    /// Callers hold the key lock around this call.
    pub fn put_record(&self, key: &[u8], record: &Record) -> Result<()> {
        let bytes = record.encode()?;
        let pending = self.rebuilding.read().unwrap_or_else(|e| e.into_inner());
        let current = self.filter();
        for filter in std::iter::once(&current).chain(pending.as_ref()) {
            if let Err(e) = filter.add(key) {
                tracing::warn!("Bloom filter add failed: {}", e);
                return Err(e);
            }
        }
        self.store.put(key, &bytes)
    }

    /// Turn a live record into a tombstone. Returns the tombstone, or `None`
    /// if the key is unknown.
    pub fn delete_record(&self, key: &[u8]) -> Result<Option<Record>> {
        let record = self.get_record(key)?;
        if record.is_hard() {
            return Ok(None);
        }
        let tomb = record.soft_deleted();
        self.store.put(key, &tomb.encode()?)?;
        Ok(Some(tomb))
    }

    /// Physically drop the record for `key`. Its filter bits stay set.
    pub fn purge_record(&self, key: &[u8]) -> Result<()> {
        self.store.delete(key)
    }

    pub fn run_rebuild(&self) -> Result<RebuildReport> {
        crate::ops::rebuild::rebuild_filter(self)
    }

    pub async fn run_rebalance(&self) -> Result<RebalanceReport> {
        crate::ops::rebalance::rebalance(self).await
    }
}

impl<T: VolumeTransport + 'static> Coordinator<T> {
    /// Serve the HTTP API until ctrl-c
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let bind_addr = self.config.bind_addr;
        tracing::info!("Starting coordinator");
        tracing::info!("  HTTP API: {}", bind_addr);
        tracing::info!("  DB path: {}", self.config.db_path.display());
        tracing::info!("  Volumes: {}", self.config.volumes.join(","));
        tracing::info!("  Replicas: {}", self.config.replicas);
        tracing::info!("  Lock kind: {}", self.config.lock_kind);

        let router = create_router(self);
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;

        tracing::info!("Coordinator ready");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn bloom_params(config: &CoordinatorConfig) -> BloomParams {
    BloomParams {
        initial_capacity: config.bloom_capacity,
        fp_rate: config.bloom_fp_rate,
        growth: config.bloom_growth,
        tightening: config.bloom_tightening,
    }
}
