//! # Engine Traits
//!
//! The contract a nearest-neighbor engine has to meet to sit behind a
//! [`BatchIndex`](crate::batch::BatchIndex).
//!
//! Labels at this level are zero-based. Engines must be safe for concurrent
//! `add_point` calls at distinct labels and concurrent `search_knn` calls;
//! the batch layer adds no locking of its own.

use std::path::Path;

use annbatch_core::error::Result;

use crate::simd::DistanceMetric;

/// Search result with engine label and raw distance
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub label: usize,
    pub distance: f32,
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: the worst (largest) distance sits on top
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(self.label.cmp(&other.label))
    }
}

/// Construction parameters handed to an engine verbatim
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub dimension: usize,
    pub max_elements: usize,
    pub metric: DistanceMetric,
    /// Max out-degree per graph node
    pub m: usize,
    /// Search beam used while inserting
    pub ef_construction: usize,
}

impl EngineParams {
    pub fn new(dimension: usize, max_elements: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            max_elements,
            metric,
            m: 16,
            ef_construction: 200,
        }
    }
}

/// Approximate nearest neighbor engine
pub trait AnnEngine: Send + Sync {
    /// Create an empty engine
    fn create(params: &EngineParams) -> Result<Self>
    where
        Self: Sized;

    /// Load a saved engine. `max_elements`, when given, replaces the saved
    /// capacity and must be at least the saved element count.
    fn load(path: &Path, params: &EngineParams, max_elements: Option<usize>) -> Result<Self>
    where
        Self: Sized;

    /// Store `vector` under `label`. Re-adding an existing label replaces its vector.
    fn add_point(&self, vector: &[f32], label: usize) -> Result<()>;

    /// Up to `k` nearest live points, ascending by distance
    fn search_knn(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Stored vector for `label`
    fn get_point(&self, label: usize) -> Result<Vec<f32>>;

    /// Exclude `label` from future searches
    fn mark_deleted(&self, label: usize) -> Result<()>;

    /// Change the capacity ceiling
    fn resize(&self, max_elements: usize) -> Result<()>;

    /// Runtime search beam width
    fn set_ef(&self, ef: usize);

    /// Persist to `path`
    fn save(&self, path: &Path) -> Result<()>;

    /// Points ever stored, including soft-deleted ones
    fn element_count(&self) -> usize;

    /// Capacity ceiling
    fn capacity(&self) -> usize;

    fn dimension(&self) -> usize;

    fn metric(&self) -> DistanceMetric;
}
