//! # Vamana Graph Index
//!
//! Approximate nearest neighbor search over a navigable graph, built
//! incrementally one point at a time.
//!
//! ## Algorithm Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Vamana Graph Structure                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │     ┌───┐         ┌───┐         ┌───┐                       │
//! │     │ A │─────────│ B │─────────│ C │                       │
//! │     └─┬─┘         └─┬─┘         └─┬─┘                       │
//! │       │    ╲        │        ╱    │                         │
//! │       │      ╲      │      ╱      │                         │
//! │     ┌─┴─┐      ╲  ┌─┴─┐  ╱      ┌─┴─┐                       │
//! │     │ D │────────│ E │────────│ F │                         │
//! │     └───┘        └───┘        └───┘                         │
//! │       ▲                                                      │
//! │       └─ entry point (first inserted point)                  │
//! │                                                              │
//! │  • Each node keeps at most R neighbors (R = m)               │
//! │  • RobustPrune keeps edges pointing in diverse directions    │
//! │  • Deleted nodes are still traversed, never returned         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Insert
//! 1. Reserve a slot under the write lock
//! 2. Greedy search + RobustPrune under the read lock
//! 3. Link forward and reverse edges under the write lock
//!
//! The read and write locks are never held together, so inserts at distinct
//! labels and searches can run from any number of threads.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use tracing::debug;

use annbatch_core::error::{Error, Result};

use crate::simd::DistanceMetric;
use crate::traits::{AnnEngine, EngineParams, SearchResult};

const VAMANA_MAGIC: &[u8; 8] = b"ANNBVAMN";
const VAMANA_VERSION: u32 = 1;
const NO_ENTRY: u32 = u32::MAX;

/// Vamana index configuration
#[derive(Debug, Clone)]
pub struct VamanaConfig {
    /// Vector dimension
    pub dimension: usize,
    /// Max out-degree per node (R)
    pub max_degree: usize,
    /// Search list size during build (L)
    pub build_search_size: usize,
    /// Alpha parameter for RobustPrune (typically 1.2)
    pub alpha: f32,
    /// Distance metric
    pub metric: DistanceMetric,
}

impl Default for VamanaConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            max_degree: 16,
            build_search_size: 200,
            alpha: 1.2,
            metric: DistanceMetric::L2,
        }
    }
}

impl From<&EngineParams> for VamanaConfig {
    fn from(params: &EngineParams) -> Self {
        Self {
            dimension: params.dimension,
            max_degree: params.m.max(2),
            build_search_size: params.ef_construction.max(params.m),
            metric: params.metric,
            ..Self::default()
        }
    }
}

/// A node in the graph
struct Node {
    /// Engine label
    label: usize,
    /// Neighbor slots (not labels)
    neighbors: Vec<u32>,
    deleted: bool,
}

#[derive(Default)]
struct GraphStore {
    /// All vectors stored contiguously, slot-major
    vectors: Vec<f32>,
    nodes: Vec<Node>,
    /// Label -> slot
    slots: HashMap<usize, u32>,
    entry_point: Option<u32>,
}

impl GraphStore {
    #[inline]
    fn vector(&self, slot: u32, dim: usize) -> &[f32] {
        let start = slot as usize * dim;
        &self.vectors[start..start + dim]
    }
}

/// Vamana graph index
pub struct VamanaIndex {
    config: VamanaConfig,
    graph: RwLock<GraphStore>,
    capacity: AtomicUsize,
    /// Search beam width
    ef: AtomicUsize,
}

impl VamanaIndex {
    /// Create new empty index
    pub fn new(config: VamanaConfig, max_elements: usize) -> Self {
        Self {
            config,
            graph: RwLock::new(GraphStore::default()),
            capacity: AtomicUsize::new(max_elements),
            ef: AtomicUsize::new(10),
        }
    }

    pub fn config(&self) -> &VamanaConfig {
        &self.config
    }

    /// Current search beam width
    pub fn ef(&self) -> usize {
        self.ef.load(Ordering::Relaxed)
    }

    /// Greedy search from the entry point. Returns up to `search_size`
    /// slots ascending by distance, deleted ones included.
    fn greedy_search(&self, graph: &GraphStore, query: &[f32], search_size: usize) -> Vec<(u32, f32)> {
        let entry = match graph.entry_point {
            Some(entry) => entry,
            None => return Vec::new(),
        };
        let dim = self.config.dimension;
        let metric = self.config.metric;

        // Candidate set (min-heap by distance)
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat, u32)>> = BinaryHeap::new();
        // Result set (max-heap to track worst in top-L)
        let mut results: BinaryHeap<(OrderedFloat, u32)> = BinaryHeap::new();
        let mut visited: HashSet<u32> = HashSet::new();

        let entry_dist = metric.distance(query, graph.vector(entry, dim));
        candidates.push(Reverse((OrderedFloat(entry_dist), entry)));
        results.push((OrderedFloat(entry_dist), entry));
        visited.insert(entry);

        while let Some(Reverse((OrderedFloat(dist), slot))) = candidates.pop() {
            if results.len() >= search_size {
                if let Some(&(OrderedFloat(worst), _)) = results.peek() {
                    if dist > worst {
                        break;
                    }
                }
            }

            for &neighbor in &graph.nodes[slot as usize].neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let neighbor_dist = metric.distance(query, graph.vector(neighbor, dim));
                let admit = results.len() < search_size
                    || results.peek().map_or(true, |&(OrderedFloat(worst), _)| neighbor_dist < worst);
                if admit {
                    candidates.push(Reverse((OrderedFloat(neighbor_dist), neighbor)));
                    results.push((OrderedFloat(neighbor_dist), neighbor));
                    if results.len() > search_size {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<(u32, f32)> = results.into_iter().map(|(OrderedFloat(d), s)| (s, d)).collect();
        found.sort_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)).then(a.0.cmp(&b.0)));
        found
    }

    /// RobustPrune: select up to `max_degree` diverse neighbors for `node`
    fn robust_prune(&self, graph: &GraphStore, node: u32, candidates: &[(u32, f32)]) -> Vec<u32> {
        let dim = self.config.dimension;
        let alpha = self.config.alpha;
        let max_degree = self.config.max_degree;

        let mut remaining: Vec<(u32, f32)> = candidates.iter().copied().filter(|&(s, _)| s != node).collect();
        remaining.sort_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)));
        remaining.dedup_by_key(|c| c.0);

        let mut result: Vec<u32> = Vec::with_capacity(max_degree);
        while !remaining.is_empty() && result.len() < max_degree {
            let (best, _) = remaining.remove(0);
            result.push(best);

            // Drop candidates already covered by `best`
            let best_vec = graph.vector(best, dim);
            remaining.retain(|&(slot, dist)| {
                let dist_to_best = self.config.metric.distance(best_vec, graph.vector(slot, dim));
                dist < alpha * dist_to_best
            });
        }

        result
    }

    /// Neighbor list for `target` after adding an edge to `new_neighbor`
    fn relink(&self, graph: &GraphStore, target: u32, new_neighbor: u32) -> Vec<u32> {
        let dim = self.config.dimension;
        let existing = &graph.nodes[target as usize].neighbors;
        if existing.len() < self.config.max_degree {
            let mut neighbors = existing.clone();
            neighbors.push(new_neighbor);
            return neighbors;
        }

        let target_vec = graph.vector(target, dim);
        let candidates: Vec<(u32, f32)> = existing
            .iter()
            .copied()
            .chain(std::iter::once(new_neighbor))
            .map(|s| (s, self.config.metric.distance(target_vec, graph.vector(s, dim))))
            .collect();
        self.robust_prune(graph, target, &candidates)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl AnnEngine for VamanaIndex {
    fn create(params: &EngineParams) -> Result<Self> {
        Ok(Self::new(VamanaConfig::from(params), params.max_elements))
    }

    fn load(path: &Path, params: &EngineParams, max_elements: Option<usize>) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);

        // Header
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != VAMANA_MAGIC {
            return Err(Error::IndexCorruption {
                details: format!("{} is not a Vamana index file", path.display()),
            });
        }

        let version = file.read_u32::<LittleEndian>()?;
        if version != VAMANA_VERSION {
            return Err(Error::IndexCorruption {
                details: format!("Unsupported Vamana version: {}", version),
            });
        }

        let dimension = file.read_u32::<LittleEndian>()? as usize;
        if dimension != params.dimension {
            return Err(Error::DimensionMismatch {
                expected: params.dimension,
                actual: dimension,
            });
        }
        let max_degree = file.read_u32::<LittleEndian>()? as usize;
        let build_search_size = file.read_u32::<LittleEndian>()? as usize;
        let alpha = file.read_f32::<LittleEndian>()?;
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
        let entry_point = file.read_u32::<LittleEndian>()?;
        let capacity = max_elements.unwrap_or(saved_capacity);
        if capacity < n {
            return Err(Error::Configuration {
                message: format!("max_elements {} is below the {} stored items", capacity, n),
            });
        }

        let mut graph = GraphStore {
            entry_point: (entry_point != NO_ENTRY).then_some(entry_point),
            ..GraphStore::default()
        };

        // Nodes
        for slot in 0..n {
            let label = file.read_u64::<LittleEndian>()? as usize;
            let deleted = file.read_u8()? != 0;
            let neighbor_count = file.read_u32::<LittleEndian>()? as usize;
            let mut neighbors = Vec::with_capacity(neighbor_count);
            for _ in 0..neighbor_count {
                let neighbor = file.read_u32::<LittleEndian>()?;
                if neighbor as usize >= n {
                    return Err(Error::IndexCorruption {
                        details: format!("Node {} links to missing slot {}", slot, neighbor),
                    });
                }
                neighbors.push(neighbor);
            }
            graph.nodes.push(Node {
                label,
                neighbors,
                deleted,
            });
            graph.slots.insert(label, slot as u32);
        }

        // Vectors
        graph.vectors.reserve(n * dimension);
        for _ in 0..(n * dimension) {
            graph.vectors.push(file.read_f32::<LittleEndian>()?);
        }

        let config = VamanaConfig {
            dimension,
            max_degree,
            build_search_size,
            alpha,
            metric,
        };

        debug!(path = %path.display(), items = n, capacity, "Loaded Vamana index");
        Ok(Self {
            config,
            graph: RwLock::new(graph),
            capacity: AtomicUsize::new(capacity),
            ef: AtomicUsize::new(10),
        })
    }

    fn add_point(&self, vector: &[f32], label: usize) -> Result<()> {
        self.check_dimension(vector)?;
        let dim = self.config.dimension;

        // Reserve slot
        let slot = {
            let mut graph = self.graph.write();
            match graph.slots.get(&label).copied() {
                Some(slot) => {
                    let start = slot as usize * dim;
                    graph.vectors[start..start + dim].copy_from_slice(vector);
                    graph.nodes[slot as usize].deleted = false;
                    slot
                }
                None => {
                    let capacity = self.capacity.load(Ordering::Acquire);
                    if graph.nodes.len() >= capacity {
                        return Err(Error::Engine {
                            message: format!(
                                "The number of elements exceeds the specified limit ({})",
                                capacity
                            ),
                        });
                    }
                    let slot = graph.nodes.len() as u32;
                    graph.vectors.extend_from_slice(vector);
                    graph.nodes.push(Node {
                        label,
                        neighbors: Vec::new(),
                        deleted: false,
                    });
                    graph.slots.insert(label, slot);
                    if graph.entry_point.is_none() {
                        graph.entry_point = Some(slot);
                        return Ok(());
                    }
                    slot
                }
            }
        };

        // Connect to graph via greedy search + prune
        let new_neighbors = {
            let graph = self.graph.read();
            let candidates = self.greedy_search(&graph, vector, self.config.build_search_size);
            self.robust_prune(&graph, slot, &candidates)
        };

        let mut graph = self.graph.write();
        for &neighbor in &new_neighbors {
            if graph.nodes[neighbor as usize].neighbors.contains(&slot) {
                continue;
            }
            let relinked = self.relink(&graph, neighbor, slot);
            graph.nodes[neighbor as usize].neighbors = relinked;
        }
        graph.nodes[slot as usize].neighbors = new_neighbors;

        Ok(())
    }

    fn search_knn(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let graph = self.graph.read();
        let search_size = k.max(self.ef());
        let results = self.greedy_search(&graph, query, search_size);

        Ok(results
            .into_iter()
            .filter(|&(slot, _)| !graph.nodes[slot as usize].deleted)
            .take(k)
            .map(|(slot, distance)| SearchResult {
                label: graph.nodes[slot as usize].label,
                distance,
            })
            .collect())
    }

    fn get_point(&self, label: usize) -> Result<Vec<f32>> {
        let graph = self.graph.read();
        let slot = *graph.slots.get(&label).ok_or_else(|| Error::Engine {
            message: format!("Label {} not found", label),
        })?;
        Ok(graph.vector(slot, self.config.dimension).to_vec())
    }

    fn mark_deleted(&self, label: usize) -> Result<()> {
        let mut graph = self.graph.write();
        let slot = *graph.slots.get(&label).ok_or_else(|| Error::Engine {
            message: format!("Label {} not found", label),
        })?;
        let node = &mut graph.nodes[slot as usize];
        if node.deleted {
            return Err(Error::Engine {
                message: format!("Label {} is already deleted", label),
            });
        }
        node.deleted = true;
        Ok(())
    }

    fn resize(&self, max_elements: usize) -> Result<()> {
        let mut graph = self.graph.write();
        let count = graph.nodes.len();
        if max_elements < count {
            return Err(Error::Engine {
                message: format!(
                    "Cannot resize to {}: index already holds {} elements",
                    max_elements, count
                ),
            });
        }
        graph.nodes.reserve((max_elements - count).min(1 << 20));
        self.capacity.store(max_elements, Ordering::Release);
        Ok(())
    }

    fn set_ef(&self, ef: usize) {
        self.ef.store(ef, Ordering::Relaxed);
    }

    fn save(&self, path: &Path) -> Result<()> {
        let graph = self.graph.read();
        let mut file = BufWriter::new(File::create(path)?);

        // Header
        file.write_all(VAMANA_MAGIC)?;
        file.write_u32::<LittleEndian>(VAMANA_VERSION)?;
        file.write_u32::<LittleEndian>(self.config.dimension as u32)?;
        file.write_u32::<LittleEndian>(self.config.max_degree as u32)?;
        file.write_u32::<LittleEndian>(self.config.build_search_size as u32)?;
        file.write_f32::<LittleEndian>(self.config.alpha)?;
        file.write_u8(self.config.metric as u8)?;
        file.write_u64::<LittleEndian>(self.capacity.load(Ordering::Acquire) as u64)?;
        file.write_u64::<LittleEndian>(graph.nodes.len() as u64)?;
        file.write_u32::<LittleEndian>(graph.entry_point.unwrap_or(NO_ENTRY))?;

        // Node labels and neighbors
        for node in &graph.nodes {
            file.write_u64::<LittleEndian>(node.label as u64)?;
            file.write_u8(node.deleted as u8)?;
            file.write_u32::<LittleEndian>(node.neighbors.len() as u32)?;
            for &neighbor in &node.neighbors {
                file.write_u32::<LittleEndian>(neighbor)?;
            }
        }

        // Vectors
        for &v in &graph.vectors {
            file.write_f32::<LittleEndian>(v)?;
        }

        file.flush()?;
        debug!(path = %path.display(), items = graph.nodes.len(), "Saved Vamana index");
        Ok(())
    }

    fn element_count(&self) -> usize {
        self.graph.read().nodes.len()
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.config.metric
    }
}

/// Wrapper for f32 to implement Ord (for BinaryHeap)
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedFloat(f32);

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dim: usize, max: usize) -> EngineParams {
        EngineParams::new(dim, max, DistanceMetric::L2)
    }

    #[test]
    fn test_first_point_becomes_entry() {
        let index = VamanaIndex::create(&params(2, 4)).unwrap();
        index.add_point(&[1.0, 1.0], 7).unwrap();
        let results = index.search_knn(&[0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].label, 7);
        assert_eq!(results[0].distance, 2.0);
    }

    #[test]
    fn test_degree_bound_holds() {
        let mut p = params(2, 64);
        p.m = 4;
        let index = VamanaIndex::create(&p).unwrap();
        for i in 0..64 {
            let x = i as f32;
            index.add_point(&[x.sin() * x, x.cos() * x], i).unwrap();
        }
        let graph = index.graph.read();
        assert!(graph.nodes.iter().all(|n| n.neighbors.len() <= 4));
        assert!(graph.nodes.iter().skip(1).all(|n| !n.neighbors.is_empty()));
    }

    #[test]
    fn test_readd_replaces_vector() {
        let index = VamanaIndex::create(&params(2, 4)).unwrap();
        index.add_point(&[1.0, 0.0], 0).unwrap();
        index.add_point(&[0.0, 1.0], 1).unwrap();
        index.add_point(&[5.0, 5.0], 0).unwrap();
        assert_eq!(index.element_count(), 2);
        assert_eq!(index.get_point(0).unwrap(), vec![5.0, 5.0]);
    }

    #[test]
    fn test_capacity_enforced() {
        let index = VamanaIndex::create(&params(1, 1)).unwrap();
        index.add_point(&[0.0], 0).unwrap();
        assert!(matches!(index.add_point(&[1.0], 1), Err(Error::Engine { .. })));
        index.resize(2).unwrap();
        index.add_point(&[1.0], 1).unwrap();
        assert!(index.resize(1).is_err());
    }
}
