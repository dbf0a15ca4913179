//! Scalable bloom filter
//!
//! A growable sequence of fixed-size bloom stages. Each stage is sized for a
//! capacity and a false-positive target; once the tail stage has absorbed its
//! capacity a new stage is appended with `growth` times the capacity and a
//! target tightened by `tightening`. Old stages are never resized or rehashed.
//!
//! The probability that a never-inserted key tests positive is bounded by
//! `1 - Π(1 - p_i)` over the per-stage targets `p_i`, which stays below
//! `p_0 / (1 - tightening)` no matter how many stages are added.

use crate::bloom::mutex::{LockKind, Mutex};
use crate::common::{Error, Result};
use bloomfilter::Bloom;

/// One fixed-size bloom filter plus its fill bookkeeping
pub struct BloomStage {
    bloom: Bloom<[u8]>,
    capacity: usize,
    fp_rate: f64,
    count: usize,
}

impl BloomStage {
    /// Size a stage for `capacity` insertions at `fp_rate`.
    pub fn new(capacity: usize, fp_rate: f64) -> Result<Self> {
        if capacity == 0 || !(fp_rate > 0.0 && fp_rate < 1.0) {
            return Err(Error::BloomFilter(format!(
                "cannot size stage for capacity {} at fp rate {}",
                capacity, fp_rate
            )));
        }
        let bloom = Bloom::new_for_fp_rate(capacity, fp_rate).map_err(|e| {
            Error::BloomFilter(format!("stage for {} keys at {}: {}", capacity, fp_rate, e))
        })?;

        Ok(Self {
            bloom,
            capacity,
            fp_rate,
            count: 0,
        })
    }

    fn insert(&mut self, key: &[u8]) {
        self.bloom.set(key);
        self.count += 1;
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.bloom.check(key)
    }

    /// The stage has absorbed as many keys as its target allows
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fp_rate(&self) -> f64 {
        self.fp_rate
    }

    pub fn num_hashes(&self) -> u32 {
        self.bloom.number_of_hash_functions()
    }

    pub fn num_bits(&self) -> u64 {
        self.bloom.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl std::fmt::Debug for BloomStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomStage")
            .field("capacity", &self.capacity)
            .field("fp_rate", &self.fp_rate)
            .field("count", &self.count)
            .field("bits", &self.num_bits())
            .finish()
    }
}

/// Growth parameters, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    pub initial_capacity: usize,
    pub fp_rate: f64,
    pub growth: usize,
    pub tightening: f64,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            initial_capacity: 100_000,
            fp_rate: 0.01,
            growth: 2,
            tightening: 0.9,
        }
    }
}

impl BloomParams {
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity == 0 {
            return Err(Error::InvalidConfig("bloom capacity must be positive".into()));
        }
        if !(self.fp_rate > 0.0 && self.fp_rate < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bloom fp rate must be in (0, 1), got {}",
                self.fp_rate
            )));
        }
        if self.growth == 0 {
            return Err(Error::InvalidConfig("bloom growth must be at least 1".into()));
        }
        if !(self.tightening > 0.0 && self.tightening < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bloom tightening ratio must be in (0, 1), got {}",
                self.tightening
            )));
        }
        Ok(())
    }
}

/// Snapshot of a filter's shape
#[derive(Debug, Clone, serde::Serialize)]
pub struct FilterStats {
    pub stages: usize,
    pub keys: usize,
    pub capacity: usize,
    pub bits: u64,
    pub fp_bound: f64,
}

/// Append-only arena of stages, addressed by index
#[derive(Debug)]
struct Stages {
    arena: Vec<BloomStage>,
}

impl Stages {
    fn tail(&self) -> Option<&BloomStage> {
        self.arena.last()
    }
}

/// Bloom filter that grows by appending stages, guarded by one [`Mutex`]
#[derive(Debug)]
pub struct ScalableBloomFilter {
    params: BloomParams,
    stages: Mutex<Stages>,
}

impl ScalableBloomFilter {
    pub fn new(kind: LockKind, params: BloomParams) -> Result<Self> {
        params.validate()?;
        let first = BloomStage::new(params.initial_capacity, params.fp_rate)?;
        Ok(Self {
            params,
            stages: Mutex::new(kind, Stages { arena: vec![first] }),
        })
    }

    pub fn params(&self) -> BloomParams {
        self.params
    }

    pub fn lock_kind(&self) -> LockKind {
        self.stages.kind()
    }

    /// Insert `key`, appending a new stage first if the tail is full.
    pub fn add(&self, key: &[u8]) -> Result<()> {
        let mut stages = self.stages.write()?;

        let next = match stages.tail() {
            Some(tail) if !tail.is_full() => None,
            Some(tail) => Some((
                tail.capacity().saturating_mul(self.params.growth),
                tail.fp_rate() * self.params.tightening,
            )),
            None => Some((self.params.initial_capacity, self.params.fp_rate)),
        };
        if let Some((capacity, fp_rate)) = next {
            let stage = BloomStage::new(capacity, fp_rate)?;
            tracing::debug!(
                "bloom filter growing to {} stages (capacity {}, fp {:.6})",
                stages.arena.len() + 1,
                capacity,
                fp_rate
            );
            stages.arena.push(stage);
        }

        let tail = stages.arena.len() - 1;
        stages.arena[tail].insert(key);
        Ok(())
    }

    /// `false` means definitely absent; `true` means probably present.
    pub fn test(&self, key: &[u8]) -> Result<bool> {
        let stages = self.stages.read()?;
        Ok((0..stages.arena.len()).any(|i| stages.arena[i].contains(key)))
    }

    pub fn stats(&self) -> Result<FilterStats> {
        let stages = self.stages.read()?;
        let arena = &stages.arena;
        Ok(FilterStats {
            stages: arena.len(),
            keys: arena.iter().map(BloomStage::len).sum(),
            capacity: arena.iter().map(BloomStage::capacity).sum(),
            bits: arena.iter().map(BloomStage::num_bits).sum(),
            fp_bound: 1.0 - arena.iter().map(|s| 1.0 - s.fp_rate()).product::<f64>(),
        })
    }
}
