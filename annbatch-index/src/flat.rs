//! # Flat Index (Brute-Force Exact Search)
//!
//! The engine that scans everything. Used for:
//! 1. Ground truth when checking graph recall
//! 2. Small datasets where graph overhead isn't worth it
//! 3. Deterministic tests of the batch layer
//!
//! ## Layout
//! - Vectors stored slot-major in one contiguous buffer
//! - Labels map to slots through a hash map; slots never move
//! - Deleted slots stay in place and are skipped by search

use std::collections::{BinaryHeap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use tracing::{debug, trace};

use annbatch_core::error::{Error, Result};

use crate::simd::DistanceMetric;
use crate::traits::{AnnEngine, EngineParams, SearchResult};

const FLAT_INDEX_MAGIC: &[u8; 8] = b"ANNBFLAT";
const FLAT_INDEX_VERSION: u32 = 1;

#[derive(Default)]
struct FlatStore {
    /// Contiguous vector storage: [s0_d0, s0_d1, ..., s0_dn, s1_d0, ...]
    vectors: Vec<f32>,
    /// Slot -> label
    labels: Vec<usize>,
    /// Label -> slot
    slots: HashMap<usize, usize>,
    deleted: Vec<bool>,
}

/// Flat index for exact nearest neighbor search
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    store: RwLock<FlatStore>,
    capacity: AtomicUsize,
}

impl FlatIndex {
    /// Create new flat index
    pub fn new(dimension: usize, max_elements: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            store: RwLock::new(FlatStore {
                vectors: Vec::with_capacity(max_elements.min(1 << 20) * dimension),
                ..FlatStore::default()
            }),
            capacity: AtomicUsize::new(max_elements),
        }
    }

    /// Number of points not marked deleted
    pub fn live_count(&self) -> usize {
        self.store.read().deleted.iter().filter(|d| !**d).count()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl AnnEngine for FlatIndex {
    fn create(params: &EngineParams) -> Result<Self> {
        Ok(Self::new(params.dimension, params.max_elements, params.metric))
    }

    fn load(path: &Path, params: &EngineParams, max_elements: Option<usize>) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);

        // Header
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != FLAT_INDEX_MAGIC {
            return Err(Error::IndexCorruption {
                details: format!("{} is not a flat index file", path.display()),
            });
        }

        let version = file.read_u32::<LittleEndian>()?;
        if version != FLAT_INDEX_VERSION {
            return Err(Error::IndexCorruption {
                details: format!("Unsupported flat index version: {}", version),
            });
        }

        let dimension = file.read_u32::<LittleEndian>()? as usize;
        if dimension != params.dimension {
            return Err(Error::DimensionMismatch {
                expected: params.dimension,
                actual: dimension,
            });
        }
        let metric = DistanceMetric::from_u8(file.read_u8()?).ok_or_else(|| Error::IndexCorruption {
            details: "Invalid metric tag".to_string(),
        })?;
        if metric != params.metric {
            return Err(Error::Configuration {
                message: format!("index was saved with {:?}, opened as {:?}", metric, params.metric),
            });
        }

        let saved_capacity = file.read_u64::<LittleEndian>()? as usize;
        let n = file.read_u64::<LittleEndian>()? as usize;
        let capacity = max_elements.unwrap_or(saved_capacity);
        if capacity < n {
            return Err(Error::Configuration {
                message: format!("max_elements {} is below the {} stored items", capacity, n),
            });
        }

        let mut store = FlatStore::default();
        for slot in 0..n {
            let label = file.read_u64::<LittleEndian>()? as usize;
            let deleted = file.read_u8()? != 0;
            store.labels.push(label);
            store.deleted.push(deleted);
            store.slots.insert(label, slot);
        }

        store.vectors.reserve(n * dimension);
        for _ in 0..(n * dimension) {
            store.vectors.push(file.read_f32::<LittleEndian>()?);
        }

        debug!(path = %path.display(), items = n, capacity, "Loaded flat index");
        Ok(Self {
            dimension,
            metric,
            store: RwLock::new(store),
            capacity: AtomicUsize::new(capacity),
        })
    }

    fn add_point(&self, vector: &[f32], label: usize) -> Result<()> {
        self.check_dimension(vector)?;

        let mut store = self.store.write();
        if let Some(&slot) = store.slots.get(&label) {
            let start = slot * self.dimension;
            store.vectors[start..start + self.dimension].copy_from_slice(vector);
            store.deleted[slot] = false;
            return Ok(());
        }

        let capacity = self.capacity.load(Ordering::Acquire);
        if store.labels.len() >= capacity {
            return Err(Error::Engine {
                message: format!("The number of elements exceeds the specified limit ({})", capacity),
            });
        }

        let slot = store.labels.len();
        store.vectors.extend_from_slice(vector);
        store.labels.push(label);
        store.deleted.push(false);
        store.slots.insert(label, slot);
        Ok(())
    }

    fn search_knn(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let store = self.store.read();
        let dim = self.dimension;

        // Max-heap keeps the k smallest distances
        let mut heap: BinaryHeap<SearchResult> = BinaryHeap::with_capacity(k + 1);
        for (slot, &label) in store.labels.iter().enumerate() {
            if store.deleted[slot] {
                continue;
            }
            let start = slot * dim;
            let distance = self.metric.distance(query, &store.vectors[start..start + dim]);
            heap.push(SearchResult { label, distance });
            if heap.len() > k {
                heap.pop();
            }
        }

        Ok(heap.into_sorted_vec())
    }

    fn get_point(&self, label: usize) -> Result<Vec<f32>> {
        let store = self.store.read();
        let slot = *store.slots.get(&label).ok_or_else(|| Error::Engine {
            message: format!("Label {} not found", label),
        })?;
        let start = slot * self.dimension;
        Ok(store.vectors[start..start + self.dimension].to_vec())
    }

    fn mark_deleted(&self, label: usize) -> Result<()> {
        let mut store = self.store.write();
        let slot = *store.slots.get(&label).ok_or_else(|| Error::Engine {
            message: format!("Label {} not found", label),
        })?;
        if store.deleted[slot] {
            return Err(Error::Engine {
                message: format!("Label {} is already deleted", label),
            });
        }
        store.deleted[slot] = true;
        Ok(())
    }

    fn resize(&self, max_elements: usize) -> Result<()> {
        let mut store = self.store.write();
        let count = store.labels.len();
        if max_elements < count {
            return Err(Error::Engine {
                message: format!(
                    "Cannot resize to {}: index already holds {} elements",
                    max_elements, count
                ),
            });
        }
        let additional = (max_elements - count).min(1 << 20) * self.dimension;
        store.vectors.reserve(additional);
        self.capacity.store(max_elements, Ordering::Release);
        Ok(())
    }

    fn set_ef(&self, ef: usize) {
        // Exhaustive search has no beam
        trace!(ef, "Ignoring ef on flat index");
    }

    fn save(&self, path: &Path) -> Result<()> {
        let store = self.store.read();
        let mut file = BufWriter::new(File::create(path)?);

        // Header
        file.write_all(FLAT_INDEX_MAGIC)?;
        file.write_u32::<LittleEndian>(FLAT_INDEX_VERSION)?;
        file.write_u32::<LittleEndian>(self.dimension as u32)?;
        file.write_u8(self.metric as u8)?;
        file.write_u64::<LittleEndian>(self.capacity.load(Ordering::Acquire) as u64)?;
        file.write_u64::<LittleEndian>(store.labels.len() as u64)?;

        for (&label, &deleted) in store.labels.iter().zip(store.deleted.iter()) {
            file.write_u64::<LittleEndian>(label as u64)?;
            file.write_u8(deleted as u8)?;
        }

        for &v in store.vectors.iter() {
            file.write_f32::<LittleEndian>(v)?;
        }

        file.flush()?;
        debug!(path = %path.display(), items = store.labels.len(), "Saved flat index");
        Ok(())
    }

    fn element_count(&self) -> usize {
        self.store.read().labels.len()
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
