//! # Batch Index
//!
//! Maps matrix-shaped inserts and queries onto an engine's single-item API.
//!
//! ```text
//!   MatrixView ─► validate ─► parallel_for ─► worker per chunk
//!                                               │ normalize
//!                                               │ engine.add_point / search_knn
//!                                               │ distance transform
//!                                               ▼
//!                               chunk buffers ─► scatter into output layout
//! ```
//!
//! ## Labels
//! Callers see one-based `i64` labels; the engine stores zero-based `usize`
//! labels. Padded rows in batch results carry label `-1` and distance
//! `f32::MAX`.
//!
//! ## Cursor
//! The next label is always re-read from the engine's element count after a
//! mutation, never incremented locally.
//!
//! ## Concurrency
//! Mutating calls take `&mut self`; queries take `&self` and may run from
//! several threads at once.

use std::ops::Range;
use std::path::Path;

use tracing::{debug, info, warn};

use annbatch_core::config::{Config, SpaceKind};
use annbatch_core::error::{Error, Result, ResultExt};
use annbatch_core::metrics::{Metrics, Timer};
use annbatch_core::parallel::{parallel_for, ChunkOutcome};

use crate::matrix::{Layout, Matrix, MatrixView};
use crate::space::Space;
use crate::traits::{AnnEngine, EngineParams, SearchResult};

/// Label written into rows that could not be filled
pub const SENTINEL_LABEL: i64 = -1;
/// Distance written into rows that could not be filled
pub const SENTINEL_DISTANCE: f32 = f32::MAX;

/// Construction options for a fresh index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexOptions {
    pub space: SpaceKind,
    pub dimension: usize,
    pub max_elements: usize,
    /// Max out-degree per graph node, passed to the engine
    pub m: usize,
    /// Construction beam, passed to the engine
    pub ef_construction: usize,
}

impl IndexOptions {
    pub fn new(space: SpaceKind, dimension: usize, max_elements: usize) -> Self {
        Self {
            space,
            dimension,
            max_elements,
            m: 16,
            ef_construction: 200,
        }
    }

    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    fn engine_params(&self) -> EngineParams {
        EngineParams {
            m: self.m,
            ef_construction: self.ef_construction,
            ..EngineParams::new(self.dimension, self.max_elements, Space::new(self.space).metric)
        }
    }
}

/// Neighbors of one query, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborList {
    pub items: Vec<i64>,
    pub distances: Option<Vec<f32>>,
}

/// Neighbors of a batch of queries, in the layout of the query batch
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborMatrix {
    pub items: Matrix<i64>,
    pub distances: Option<Matrix<f32>>,
}

/// Results of one query chunk, item-major
struct QueryChunk {
    items: Vec<i64>,
    distances: Vec<f32>,
    padded_rows: usize,
}

/// Batch orchestrator over an [`AnnEngine`]
pub struct BatchIndex<E: AnnEngine> {
    engine: E,
    space: Space,
    dimension: usize,
    /// Next zero-based label
    cur_label: usize,
    num_threads: usize,
    grain_size: usize,
    metrics: Metrics,
}

impl<E: AnnEngine> BatchIndex<E> {
    /// Create an empty index
    pub fn new(options: IndexOptions) -> Result<Self> {
        if options.dimension == 0 {
            return Err(Error::Configuration {
                message: "dimension must be at least 1".to_string(),
            });
        }

        let engine = E::create(&options.engine_params())?;
        info!(
            dimension = options.dimension,
            max_elements = options.max_elements,
            space = ?options.space,
            "Created index"
        );
        Ok(Self::with_engine(engine, options.space))
    }

    /// Reconstruct from a saved engine file. `max_elements`, when given,
    /// becomes the new capacity and must cover the stored items.
    pub fn load(
        path: impl AsRef<Path>,
        space: SpaceKind,
        dimension: usize,
        max_elements: Option<usize>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let params = EngineParams::new(dimension, max_elements.unwrap_or(0), Space::new(space).metric);
        let engine = E::load(path, &params, max_elements)?;

        let index = Self::with_engine(engine, space);
        info!(
            path = %path.display(),
            items = index.cur_label,
            capacity = index.capacity(),
            "Loaded index"
        );
        Ok(index)
    }

    /// Build from the `[index]` and `[parallel]` sections of a config
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let options = IndexOptions::new(config.index.space, config.index.dimension, config.index.max_elements)
            .with_m(config.index.m)
            .with_ef_construction(config.index.ef_construction);

        let mut index = Self::new(options)?;
        index.set_ef(config.index.ef_search);
        index.set_num_threads(config.parallel.num_threads);
        index.set_grain_size(config.parallel.grain_size);
        Ok(index)
    }

    /// Wrap an engine that already holds data
    pub fn with_engine(engine: E, space: SpaceKind) -> Self {
        Self {
            dimension: engine.dimension(),
            cur_label: engine.element_count(),
            space: Space::new(space),
            engine,
            num_threads: 0,
            grain_size: 1,
            metrics: Metrics::new(),
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert one vector. Returns its label.
    pub fn add_item(&mut self, vector: &[f32]) -> Result<i64> {
        self.check_dimension(vector.len())?;
        self.check_capacity(1)?;

        let label = self.cur_label;
        let v = self.space.normalization.normalized(vector);
        if let Err(e) = self.engine.add_point(&v, label) {
            self.metrics.record_insert_failures(1);
            return Err(e);
        }

        self.cur_label = self.engine.element_count();
        self.metrics.record_added(1);
        Ok(label as i64 + 1)
    }

    /// Insert every item of `items`, labelled in item order. Returns the
    /// labels assigned.
    ///
    /// Shape and capacity are checked before anything is inserted. If the
    /// engine rejects some items the cursor still follows the engine and
    /// [`Error::IncompleteInsert`] is returned.
    pub fn add_items(&mut self, items: &MatrixView<'_>) -> Result<Range<i64>> {
        self.check_dimension(items.dimension())?;
        let n = items.nitems();
        let start = self.cur_label;
        if items.is_empty() {
            return Ok(start as i64 + 1..start as i64 + 1);
        }
        self.check_capacity(n)?;

        let timer = Timer::new("add_items");
        let engine = &self.engine;
        let normalization = self.space.normalization;

        let outcomes = parallel_for(0, n, self.num_threads, self.grain_size, |begin, end| {
            for i in begin..end {
                let mut v = items.item(i);
                normalization.apply(&mut v);
                engine.add_point(&v, start + i)?;
            }
            Ok(end - begin)
        });

        self.metrics.record_batch();
        let failed = count_failures(&outcomes);
        self.metrics.record_worker_failures(failed as u64);

        self.cur_label = self.engine.element_count();
        let inserted = self.cur_label.saturating_sub(start).min(n);
        self.metrics.record_added(inserted as u64);

        if inserted < n {
            self.metrics.record_insert_failures((n - inserted) as u64);
            warn!(requested = n, inserted, failed_chunks = failed, "Batch insert incomplete");
            return Err(Error::IncompleteInsert {
                requested: n,
                inserted,
            });
        }

        debug!(
            nitems = n,
            threads = self.num_threads,
            layout = ?items.layout(),
            first_label = start + 1,
            "Inserted batch"
        );
        timer.stop(n);
        Ok(start as i64 + 1..(start + n) as i64 + 1)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Labels of the `k` nearest neighbors of `vector`
    pub fn get_nns(&self, vector: &[f32], k: usize) -> Result<Vec<i64>> {
        Ok(self.get_nns_list(vector, k, false)?.items)
    }

    /// Labels and optionally distances of the `k` nearest neighbors.
    /// Fails if fewer than `k` are found.
    pub fn get_nns_list(&self, vector: &[f32], k: usize, include_distances: bool) -> Result<NeighborList> {
        self.check_dimension(vector.len())?;
        self.metrics.record_queries(1);

        let results = self.search(vector, k)?;
        if results.len() < k {
            self.metrics.record_failed_query();
            return Err(Error::InsufficientNeighbors {
                k,
                found: results.len(),
            });
        }

        let items = results.iter().map(|r| r.label as i64 + 1).collect();
        let distances = include_distances.then(|| {
            let mut d: Vec<f32> = results.iter().map(|r| r.distance).collect();
            self.space.transform.apply(&mut d);
            d
        });
        Ok(NeighborList { items, distances })
    }

    /// Labels of the `k` nearest neighbors of every query, in the layout of
    /// `queries`
    pub fn get_all_nns(&self, queries: &MatrixView<'_>, k: usize) -> Result<Matrix<i64>> {
        Ok(self.get_all_nns_list(queries, k, false)?.items)
    }

    /// Labels and optionally distances for every query.
    ///
    /// Rows that come up short are padded with [`SENTINEL_LABEL`] and
    /// [`SENTINEL_DISTANCE`] while the rest of the batch runs; afterwards
    /// the whole call fails with [`Error::IncompleteBatch`] if any row was
    /// padded.
    pub fn get_all_nns_list(
        &self,
        queries: &MatrixView<'_>,
        k: usize,
        include_distances: bool,
    ) -> Result<NeighborMatrix> {
        self.check_dimension(queries.dimension())?;
        let n = queries.nitems();
        let layout = queries.layout();
        let timer = Timer::new("get_all_nns");

        let outcomes = parallel_for(0, n, self.num_threads, self.grain_size, |begin, end| {
            self.query_chunk(queries, begin..end, k, include_distances)
        });

        self.metrics.record_batch();
        self.metrics.record_queries(n as u64);

        let mut items = Matrix::filled(n, k, layout, SENTINEL_LABEL);
        let mut distances = include_distances.then(|| Matrix::filled(n, k, layout, SENTINEL_DISTANCE));
        let mut padded_rows = 0;
        let failed = count_failures(&outcomes);
        self.metrics.record_worker_failures(failed as u64);

        for outcome in outcomes {
            let chunk = outcome.result?;
            items.scatter(outcome.range.start, &chunk.items);
            if let Some(d) = distances.as_mut() {
                d.scatter(outcome.range.start, &chunk.distances);
            }
            padded_rows += chunk.padded_rows;
        }

        if padded_rows > 0 {
            self.metrics.record_padded_rows(padded_rows as u64);
            self.metrics.record_failed_query();
            warn!(k, padded_rows, total_rows = n, "Batch query incomplete");
            return Err(Error::IncompleteBatch {
                k,
                failed_rows: padded_rows,
                total_rows: n,
            });
        }

        debug!(nitems = n, k, threads = self.num_threads, layout = ?layout, "Queried batch");
        timer.stop(n);
        Ok(NeighborMatrix { items, distances })
    }

    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let q = self.space.normalization.normalized(vector);
        self.engine.search_knn(&q, k)
    }

    fn query_chunk(
        &self,
        queries: &MatrixView<'_>,
        rows: Range<usize>,
        k: usize,
        include_distances: bool,
    ) -> Result<QueryChunk> {
        let len = rows.len();
        let mut chunk = QueryChunk {
            items: Vec::with_capacity(len * k),
            distances: Vec::with_capacity(if include_distances { len * k } else { 0 }),
            padded_rows: 0,
        };

        for i in rows {
            let results = self.search(&queries.item(i), k)?;
            if results.len() < k {
                chunk.padded_rows += 1;
                chunk.items.extend(std::iter::repeat(SENTINEL_LABEL).take(k));
                if include_distances {
                    chunk.distances.extend(std::iter::repeat(SENTINEL_DISTANCE).take(k));
                }
                continue;
            }
            chunk.items.extend(results.iter().map(|r| r.label as i64 + 1));
            if include_distances {
                chunk
                    .distances
                    .extend(results.iter().map(|r| self.space.transform.apply_one(r.distance)));
            }
        }
        Ok(chunk)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Stored vectors for `labels`, one item per label, dimension-major.
    /// Vectors come back as stored, i.e. after normalization.
    pub fn get_items(&self, labels: &[i64]) -> Result<Matrix<f32>> {
        let size = self.size();
        for &label in labels {
            self.check_label(label, size)?;
        }

        let n = labels.len();
        let dim = self.dimension;
        let engine = &self.engine;
        let outcomes = parallel_for(0, n, self.num_threads, self.grain_size, |begin, end| {
            let mut chunk = Vec::with_capacity((end - begin) * dim);
            for &label in &labels[begin..end] {
                chunk.extend(engine.get_point((label - 1) as usize)?);
            }
            Ok(chunk)
        });

        let mut out = Matrix::filled(n, dim, Layout::ColumnMajor, 0.0f32);
        for outcome in outcomes {
            let chunk = outcome.result?;
            out.scatter(outcome.range.start, &chunk);
        }
        Ok(out)
    }

    /// Persist the engine to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.engine
            .save(path)
            .with_context(|| format!("saving index to {}", path.display()))?;
        info!(path = %path.display(), items = self.size(), "Saved index");
        Ok(())
    }

    /// Runtime search beam width
    pub fn set_ef(&mut self, ef: usize) {
        self.engine.set_ef(ef);
    }

    /// Exclude `label` from future query results. Its label is not reused.
    pub fn mark_deleted(&mut self, label: i64) -> Result<()> {
        self.check_label(label, self.size())?;
        self.engine.mark_deleted((label - 1) as usize)?;
        self.metrics.record_deletion();
        debug!(label, "Marked deleted");
        Ok(())
    }

    /// Change the capacity ceiling. Bounds are checked by the engine.
    pub fn resize_index(&mut self, new_capacity: usize) -> Result<()> {
        let old = self.capacity();
        self.engine.resize(new_capacity)?;
        info!(from = old, to = new_capacity, "Resized index");
        Ok(())
    }

    /// Worker threads for batch calls; 0 runs on the calling thread
    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads;
    }

    /// Minimum items per worker chunk
    pub fn set_grain_size(&mut self, grain_size: usize) {
        self.grain_size = grain_size;
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Items ever stored, deleted ones included
    pub fn size(&self) -> usize {
        self.engine.element_count()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn capacity(&self) -> usize {
        self.engine.capacity()
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn grain_size(&self) -> usize {
        self.grain_size
    }

    pub fn space(&self) -> SpaceKind {
        self.space.kind
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    fn check_capacity(&self, requested: usize) -> Result<()> {
        let capacity = self.capacity();
        let available = capacity.saturating_sub(self.cur_label);
        if requested > available {
            return Err(Error::CapacityExceeded {
                requested,
                available,
                capacity,
            });
        }
        Ok(())
    }

    fn check_label(&self, label: i64, size: usize) -> Result<()> {
        if label < 1 || label as u64 > size as u64 {
            return Err(Error::BadLabel { label, size });
        }
        Ok(())
    }
}

fn count_failures<T>(outcomes: &[ChunkOutcome<T>]) -> usize {
    outcomes.iter().filter(|o| !o.is_ok()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::FlatIndex;
    use crate::simd::DistanceMetric;

    /// Flat engine that returns a single neighbor for queries with a
    /// negative first component
    struct OneHitEngine(FlatIndex);

    impl AnnEngine for OneHitEngine {
        fn create(params: &EngineParams) -> Result<Self> {
            Ok(Self(FlatIndex::create(params)?))
        }

        fn load(path: &Path, params: &EngineParams, max_elements: Option<usize>) -> Result<Self> {
            Ok(Self(FlatIndex::load(path, params, max_elements)?))
        }

        fn add_point(&self, vector: &[f32], label: usize) -> Result<()> {
            self.0.add_point(vector, label)
        }

        fn search_knn(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
            let mut results = self.0.search_knn(query, k)?;
            if query[0] < 0.0 {
                results.truncate(1);
            }
            Ok(results)
        }

        fn get_point(&self, label: usize) -> Result<Vec<f32>> {
            self.0.get_point(label)
        }

        fn mark_deleted(&self, label: usize) -> Result<()> {
            self.0.mark_deleted(label)
        }

        fn resize(&self, max_elements: usize) -> Result<()> {
            self.0.resize(max_elements)
        }

        fn set_ef(&self, ef: usize) {
            self.0.set_ef(ef)
        }

        fn save(&self, path: &Path) -> Result<()> {
            self.0.save(path)
        }

        fn element_count(&self) -> usize {
            self.0.element_count()
        }

        fn capacity(&self) -> usize {
            self.0.capacity()
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn metric(&self) -> DistanceMetric {
            self.0.metric()
        }
    }

    fn unit_index(threads: usize) -> BatchIndex<FlatIndex> {
        let mut index = BatchIndex::new(IndexOptions::new(SpaceKind::L2, 3, 10)).unwrap();
        index.set_num_threads(threads);
        index
    }

    #[test]
    fn test_add_item_returns_one_based_labels() {
        let mut index = unit_index(0);
        assert_eq!(index.add_item(&[1.0, 0.0, 0.0]).unwrap(), 1);
        assert_eq!(index.add_item(&[0.0, 1.0, 0.0]).unwrap(), 2);
        assert_eq!(index.size(), 2);
    }

    #[test]
    fn test_add_item_rejects_wrong_dimension() {
        let mut index = unit_index(0);
        let err = index.add_item(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_capacity_checked_before_insert() {
        let mut index = BatchIndex::<FlatIndex>::new(IndexOptions::new(SpaceKind::L2, 1, 2)).unwrap();
        let data = [1.0, 2.0, 3.0];
        let batch = MatrixView::row_major(&data, 3, 1).unwrap();
        let err = index.add_items(&batch).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded { requested: 3, available: 2, capacity: 2 }
        ));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut index = unit_index(4);
        let batch = MatrixView::row_major(&[], 0, 3).unwrap();
        assert_eq!(index.add_items(&batch).unwrap(), 1..1);
        let result = index.get_all_nns(&batch, 2).unwrap();
        assert_eq!(result.nitems(), 0);
    }

    #[test]
    fn test_bad_labels() {
        let mut index = unit_index(0);
        index.add_item(&[1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(index.mark_deleted(0), Err(Error::BadLabel { label: 0, size: 1 })));
        assert!(matches!(index.mark_deleted(2), Err(Error::BadLabel { label: 2, size: 1 })));
        assert!(matches!(index.get_items(&[1, 5]), Err(Error::BadLabel { label: 5, .. })));
    }
    #[test]
    fn test_short_row_padded_to_full_width() {
        let mut index = BatchIndex::<OneHitEngine>::new(IndexOptions::new(SpaceKind::Euclidean, 2, 10)).unwrap();
        for v in [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] {
            index.add_item(&v).unwrap();
        }

        // Second query is short
        let row_major = [1.0, 0.0, -1.0, 0.0, 0.0, 1.0];
        let col_major = [1.0, -1.0, 0.0, 0.0, 0.0, 1.0];
        let k = 2;
        for (data, layout) in [(&row_major, Layout::RowMajor), (&col_major, Layout::ColumnMajor)] {
            let queries = MatrixView::new(data, 3, 2, layout).unwrap();
            let chunk = index.query_chunk(&queries, 0..3, k, true).unwrap();
            assert_eq!(chunk.padded_rows, 1);
            assert_eq!(chunk.items.len(), 3 * k);
            assert_eq!(chunk.distances.len(), 3 * k);
            assert_eq!(&chunk.items[2..4], &[SENTINEL_LABEL; 2]);
            assert_eq!(&chunk.distances[2..4], &[SENTINEL_DISTANCE; 2]);

            let mut items = Matrix::filled(3, k, layout, 0i64);
            let mut distances = Matrix::filled(3, k, layout, 0.0f32);
            items.scatter(0, &chunk.items);
            distances.scatter(0, &chunk.distances);
            assert_eq!(items.item(0), vec![1, 3]);
            assert_eq!(items.item(1), vec![SENTINEL_LABEL, SENTINEL_LABEL]);
            assert_eq!(distances.item(1), vec![SENTINEL_DISTANCE, SENTINEL_DISTANCE]);
            assert_eq!(items.item(2), vec![2, 3]);
            assert_eq!(distances.item(2), vec![0.0, 1.0]);

            let flat = items.into_vec();
            let padded: Vec<i64> = (0..k).map(|j| flat[layout.offset(1, j, 3, k)]).collect();
            assert_eq!(padded, vec![SENTINEL_LABEL; 2]);
        }
    }

    #[test]
    fn test_split_chunks_pad_the_same_row() {
        let mut index = BatchIndex::<OneHitEngine>::new(IndexOptions::new(SpaceKind::L2, 2, 10)).unwrap();
        for v in [[1.0, 0.0], [0.0, 1.0]] {
            index.add_item(&v).unwrap();
        }
        let data = [1.0, 0.0, -1.0, 0.0, 0.0, 1.0];
        let queries = MatrixView::row_major(&data, 3, 2).unwrap();

        // A chunk holding only the short row is entirely sentinels
        let chunk = index.query_chunk(&queries, 1..2, 2, false).unwrap();
        assert_eq!(chunk.items, vec![SENTINEL_LABEL; 2]);
        assert!(chunk.distances.is_empty());

        let chunk = index.query_chunk(&queries, 2..3, 2, false).unwrap();
        assert_eq!(chunk.padded_rows, 0);
        assert_eq!(chunk.items, vec![2, 1]);
    }
}
