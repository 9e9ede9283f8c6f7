//! Index facade: construction, validation gates, synchronous operations,
//! and the background-indexing controller.
//!
//! A [`VectorIndex`] is a cheaply cloneable handle; all clones share one
//! mutex-guarded core (storage arena + HNSW graph). Synchronous
//! operations lock, work, and return. The two bulk operations
//! ([`add_batch`](VectorIndex::add_batch) and
//! [`load_vectors_from_file`](VectorIndex::load_vectors_from_file)) copy
//! their inputs, then run on a single worker thread that re-acquires the
//! mutex per item, so searches interleave with bulk ingestion and always
//! observe a consistent prefix of the batch.
//!
//! [`delete`](VectorIndex::delete) drops the core and bumps a generation
//! counter; an in-flight bulk task observes the bump at its next item
//! boundary and aborts, recording a deleted-state error in the last
//! result.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::codec;
use crate::config;
use crate::error::{IndexError, Result};
use crate::hnsw::{knn_search_filtered, GraphConfig, HnswGraph, VisitedSet};
use crate::metric::{Isa, MetricKind};
use crate::storage::{ScalarKind, VectorStore};

/// Construction options for [`VectorIndex::create`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Stored element representation. Default: f32.
    pub quantization: ScalarKind,
    /// Distance metric. Default: cosine.
    pub metric: MetricKind,
    /// Links per node above layer 0. Default: 16.
    pub m: usize,
    /// Construction beam width. Default: 64.
    pub ef_construction: usize,
    /// Search beam width. Default: 64.
    pub ef_search: usize,
    /// Seed for the layer-assignment RNG; fixed by default so identical
    /// insertion orders build identical graphs.
    pub level_seed: u64,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            quantization: ScalarKind::F32,
            metric: MetricKind::Cos,
            m: config::HNSW_DEFAULT_M,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            level_seed: config::LEVEL_RNG_SEED,
        }
    }
}

impl IndexOptions {
    /// Resolve string option values, as host bridges pass them.
    pub fn parse(quantization: &str, metric: &str) -> Result<Self> {
        let quantization = ScalarKind::from_name(quantization).ok_or_else(|| {
            IndexError::Config(format!("unknown quantization '{quantization}'"))
        })?;
        let metric = MetricKind::from_name(metric)
            .ok_or_else(|| IndexError::Config(format!("unknown metric '{metric}'")))?;
        Ok(Self {
            quantization,
            metric,
            ..Self::default()
        })
    }
}

/// One search hit: external key and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub key: i64,
    pub distance: f32,
}

/// Options for [`VectorIndex::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// When set, only these keys may appear in results. Traversal still
    /// crosses other nodes; the restriction applies to emission only.
    pub allowed_keys: Option<Vec<i64>>,
}

/// Timing returned by a successful [`add`](VectorIndex::add).
#[derive(Debug, Clone, Copy)]
pub struct AddOutcome {
    pub duration_ms: f64,
}

/// Progress of the in-flight background operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexingProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
}

/// Outcome of the most recent background operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastResult {
    pub duration_ms: f64,
    pub count: usize,
}

struct CoreState {
    store: VectorStore,
    graph: HnswGraph,
    visited: VisitedSet,
}

#[derive(Default)]
struct LastOutcome {
    duration_ms: f64,
    count: usize,
    error: Option<IndexError>,
}

enum Job {
    AddBatch {
        keys: Vec<i64>,
        vectors: Vec<f32>,
        generation: u64,
    },
    LoadFile {
        path: PathBuf,
        generation: u64,
    },
}

struct IndexInner {
    dimensions: u32,
    scalar: ScalarKind,
    metric: MetricKind,
    isa: Isa,
    state: Mutex<Option<CoreState>>,
    generation: AtomicU64,
    is_indexing: AtomicBool,
    progress_current: AtomicUsize,
    progress_total: AtomicUsize,
    last: Mutex<LastOutcome>,
    worker: Mutex<Option<mpsc::Sender<Job>>>,
}

/// Embeddable approximate-nearest-neighbor index.
#[derive(Clone)]
pub struct VectorIndex {
    inner: Arc<IndexInner>,
}

impl VectorIndex {
    /// Create an index for `dimensions`-element vectors.
    pub fn create(dimensions: u32, options: IndexOptions) -> Result<Self> {
        if dimensions == 0 {
            return Err(IndexError::Config("dimensions must be positive".into()));
        }
        if dimensions > config::MAX_DIMENSIONS {
            return Err(IndexError::Config(format!(
                "dimensions {dimensions} exceeds the maximum {}",
                config::MAX_DIMENSIONS
            )));
        }
        let graph_config = GraphConfig::new(options.m, options.ef_construction, options.ef_search)?;

        let mut store = VectorStore::new(dimensions as usize, options.quantization);
        store.reserve(config::INITIAL_CAPACITY)?;
        let graph = HnswGraph::with_seed(graph_config, options.level_seed);
        let isa = Isa::detect();

        tracing::debug!(
            "created index: dims={}, quantization={}, metric={}, isa={}",
            dimensions,
            options.quantization.name(),
            options.metric.name(),
            isa.name()
        );

        Ok(Self {
            inner: Arc::new(IndexInner {
                dimensions,
                scalar: options.quantization,
                metric: options.metric,
                isa,
                state: Mutex::new(Some(CoreState {
                    store,
                    graph,
                    visited: VisitedSet::default(),
                })),
                generation: AtomicU64::new(0),
                is_indexing: AtomicBool::new(false),
                progress_current: AtomicUsize::new(0),
                progress_total: AtomicUsize::new(0),
                last: Mutex::new(LastOutcome::default()),
                worker: Mutex::new(None),
            }),
        })
    }

    // ── Read-only properties ───────────────────────────────────────────

    /// Vector dimensionality, fixed at construction.
    pub fn dimensions(&self) -> u32 {
        self.inner.dimensions
    }

    /// Instruction set selected for the distance kernels.
    pub fn isa(&self) -> Isa {
        self.inner.isa
    }

    /// Number of live vectors.
    pub fn count(&self) -> Result<usize> {
        self.with_state(|state| Ok(state.store.len()))
    }

    /// Estimated resident memory in bytes: vector arena plus assumed
    /// per-node graph overhead plus a fixed base. Computed from counters
    /// under the mutex, never from graph internals, so it is safe to
    /// read during a background batch.
    pub fn memory_usage(&self) -> Result<usize> {
        self.with_state(|state| {
            let count = state.store.len();
            let dim = state.store.dim();
            let vector_bytes = count * dim * state.store.scalar_kind().element_size();
            let graph_bytes = count
                * (config::NODE_HEADER_BYTES + config::ESTIMATED_CONNECTIVITY * 8);
            Ok(vector_bytes + graph_bytes + config::BASE_MEMORY_OVERHEAD)
        })
    }

    /// `true` while a background operation runs.
    pub fn is_indexing(&self) -> bool {
        self.inner.is_indexing.load(Ordering::Acquire)
    }

    /// Progress of the in-flight background operation ({0, 0, 0.0} when
    /// idle).
    pub fn indexing_progress(&self) -> IndexingProgress {
        let current = self.inner.progress_current.load(Ordering::Acquire);
        let total = self.inner.progress_total.load(Ordering::Acquire);
        IndexingProgress {
            current,
            total,
            percentage: if total > 0 {
                current as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    // ── Synchronous mutators ───────────────────────────────────────────

    /// Insert a vector under a fresh key.
    pub fn add(&self, key: i64, vector: &[f32]) -> Result<AddOutcome> {
        self.ensure_alive()?;
        self.check_vector(vector)?;
        let start = Instant::now();
        self.with_state(|state| {
            insert_one(state, self.inner.metric, self.inner.isa, key, vector)
        })?;
        Ok(AddOutcome {
            duration_ms: start.elapsed().as_secs_f64() * 1e3,
        })
    }

    /// [`add`](Self::add) from a caller-owned byte range. The buffer must
    /// be 4-byte aligned and a whole number of f32 elements; it is copied
    /// before this call returns.
    pub fn add_raw(&self, key: i64, bytes: &[u8]) -> Result<AddOutcome> {
        self.ensure_alive()?;
        let vector = as_f32_slice(bytes)?;
        self.check_vector(vector)?;
        let start = Instant::now();
        self.with_state(|state| {
            insert_one(state, self.inner.metric, self.inner.isa, key, vector)
        })?;
        Ok(AddOutcome {
            duration_ms: start.elapsed().as_secs_f64() * 1e3,
        })
    }

    /// Tombstone a key. The slot is reclaimed by save-time compaction.
    pub fn remove(&self, key: i64) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        self.with_state(|state| {
            let slot = state.store.remove(key)?;
            state.graph.on_remove(slot, &state.store);
            Ok(())
        })
    }

    /// Replace a key's vector. An unknown key is treated as an insert.
    pub fn update(&self, key: i64, vector: &[f32]) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        self.check_vector(vector)?;
        self.with_state(|state| {
            if let Ok(slot) = state.store.remove(key) {
                state.graph.on_remove(slot, &state.store);
            }
            insert_one(state, self.inner.metric, self.inner.isa, key, vector)
        })
    }

    /// [`update`](Self::update) from a caller-owned byte range.
    pub fn update_raw(&self, key: i64, bytes: &[u8]) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        let vector = as_f32_slice(bytes)?;
        self.check_vector(vector)?;
        self.with_state(|state| {
            if let Ok(slot) = state.store.remove(key) {
                state.graph.on_remove(slot, &state.store);
            }
            insert_one(state, self.inner.metric, self.inner.isa, key, vector)
        })
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// k-nearest-neighbor search. Results are ascending by distance,
    /// ties broken by the smaller key; at most `min(k, count)` hits.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        options: Option<&SearchOptions>,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_alive()?;
        self.check_vector(query)?;
        let allowed: Option<HashSet<i64>> = options
            .and_then(|o| o.allowed_keys.as_ref())
            .map(|keys| keys.iter().copied().collect());
        self.with_state(|state| {
            let hits = knn_search_filtered(
                &state.graph,
                &state.store,
                self.inner.metric,
                self.inner.isa,
                query,
                k,
                allowed.as_ref(),
            );
            Ok(hits
                .into_iter()
                .map(|(distance, slot)| SearchHit {
                    key: state.store.key_of(slot),
                    distance,
                })
                .collect())
        })
    }

    /// [`search`](Self::search) from a caller-owned byte range.
    pub fn search_raw(
        &self,
        query_bytes: &[u8],
        k: usize,
        options: Option<&SearchOptions>,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_alive()?;
        let query = as_f32_slice(query_bytes)?;
        self.check_vector(query)?;
        self.search(query, k, options)
    }

    /// Fetch a key's vector as a fresh f32 buffer (dequantized for an i8
    /// index), or `None` when the key is absent.
    pub fn get_item_vector(&self, key: i64) -> Result<Option<Vec<f32>>> {
        self.ensure_alive()?;
        self.with_state(|state| {
            Ok(state.store.slot_of(key).map(|slot| {
                let mut out = vec![0.0f32; state.store.dim()];
                state.store.copy_to(slot, &mut out);
                out
            }))
        })
    }

    // ── Persistence ────────────────────────────────────────────────────

    /// Serialize the whole index to `path` (tombstones compacted).
    pub fn save(&self, path: &str) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        let path = codec::normalize_path(path)?;
        self.with_state(|state| {
            codec::save(&path, &state.store, &state.graph, self.inner.metric)
        })
    }

    /// Replace this index's contents with a previously saved image. The
    /// file's dimensionality, scalar kind, and metric must match this
    /// index's configuration. On a format or corruption error the
    /// in-memory state is untouched, but callers should treat the index
    /// as unusable and destroy it, per the recovery contract.
    pub fn load(&self, path: &str) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        let path = codec::normalize_path(path)?;
        let decoded = codec::load(&path)?;
        if decoded.dimensions != self.inner.dimensions {
            return Err(IndexError::Dimension {
                expected: self.inner.dimensions as usize,
                actual: decoded.dimensions as usize,
            });
        }
        if decoded.scalar != self.inner.scalar {
            return Err(IndexError::Format(format!(
                "file stores {} vectors but the index is configured for {}",
                decoded.scalar.name(),
                self.inner.scalar.name()
            )));
        }
        if decoded.metric != self.inner.metric {
            return Err(IndexError::Format(format!(
                "file uses metric '{}' but the index is configured for '{}'",
                decoded.metric.name(),
                self.inner.metric.name()
            )));
        }
        self.with_state(|state| {
            *state = CoreState {
                store: decoded.store,
                graph: decoded.graph,
                visited: VisitedSet::default(),
            };
            Ok(())
        })
    }

    // ── Background operations ──────────────────────────────────────────

    /// Queue a batch insert on the worker thread. `vectors` holds the
    /// concatenated data, `keys.len() × D` elements. Inputs are copied
    /// before this returns; poll [`is_indexing`](Self::is_indexing) and
    /// fetch the outcome with [`get_last_result`](Self::get_last_result).
    pub fn add_batch(&self, keys: &[i64], vectors: &[f32]) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        if keys.is_empty() {
            return Err(IndexError::Buffer("batch is empty".into()));
        }
        let dim = self.inner.dimensions as usize;
        if keys.len() * dim != vectors.len() {
            return Err(IndexError::Buffer(format!(
                "{} keys require {} vector elements, got {}",
                keys.len(),
                keys.len() * dim,
                vectors.len()
            )));
        }

        // Reserve up front so per-item inserts do not regrow mid-batch.
        self.with_state(|state| {
            let needed = state.store.slot_count() + keys.len() + config::BATCH_RESERVE_HEADROOM;
            state.store.reserve(needed)
        })?;

        let job = Job::AddBatch {
            keys: keys.to_vec(),
            vectors: vectors.to_vec(),
            generation: self.inner.generation.load(Ordering::Acquire),
        };
        self.begin_background(keys.len(), job)
    }

    /// [`add_batch`](Self::add_batch) from caller-owned byte ranges:
    /// little-endian i64 keys and f32 vectors.
    pub fn add_batch_raw(&self, key_bytes: &[u8], vector_bytes: &[u8]) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        let keys = as_i64_slice(key_bytes)?;
        let vectors = as_f32_slice(vector_bytes)?;
        self.add_batch(keys, vectors)
    }

    /// Queue a bulk load of a headerless raw-f32 vector file. Keys are
    /// assigned `0..N-1`; intended for freshly created indices. The file
    /// size is validated up front; an empty file completes immediately.
    pub fn load_vectors_from_file(&self, path: &str) -> Result<()> {
        self.ensure_alive()?;
        self.ensure_not_busy()?;
        let path = codec::normalize_path(path)?;

        let dim = self.inner.dimensions as usize;
        let stride = dim * 4;
        let file_len = std::fs::metadata(&path)?.len() as usize;
        if file_len % stride != 0 {
            return Err(IndexError::Format(format!(
                "raw vector file is {file_len} bytes, not a multiple of {stride}"
            )));
        }
        let total = file_len / stride;
        if total == 0 {
            return Ok(());
        }

        self.with_state(|state| {
            let needed = state.store.slot_count() + total + config::BATCH_RESERVE_HEADROOM;
            state.store.reserve(needed)
        })?;

        let job = Job::LoadFile {
            path,
            generation: self.inner.generation.load(Ordering::Acquire),
        };
        self.begin_background(total, job)
    }

    /// Outcome of the most recent background operation. Re-raises (and
    /// clears) the error when the operation failed.
    pub fn get_last_result(&self) -> Result<LastResult> {
        self.ensure_alive()?;
        let mut last = self.inner.last.lock();
        if let Some(error) = last.error.take() {
            return Err(error);
        }
        Ok(LastResult {
            duration_ms: last.duration_ms,
            count: last.count,
        })
    }

    /// Destroy the index. Idempotent; a running background task aborts
    /// at its next item boundary. Every later operation fails with
    /// [`IndexError::DeletedState`].
    pub fn delete(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let mut guard = self.inner.state.lock();
        if guard.take().is_some() {
            tracing::debug!("index deleted");
        }
    }

    // ── Gates and plumbing ─────────────────────────────────────────────

    fn ensure_alive(&self) -> Result<()> {
        if self.inner.state.lock().is_none() {
            return Err(IndexError::DeletedState);
        }
        Ok(())
    }

    fn ensure_not_busy(&self) -> Result<()> {
        if self.inner.is_indexing.load(Ordering::Acquire) {
            return Err(IndexError::Busy);
        }
        Ok(())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(IndexError::Buffer("vector is empty".into()));
        }
        let expected = self.inner.dimensions as usize;
        if vector.len() != expected {
            return Err(IndexError::Dimension {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.state.lock();
        let state = guard.as_mut().ok_or(IndexError::DeletedState)?;
        f(state)
    }

    /// Mark the controller busy, publish the progress target, and hand
    /// the job to the worker thread (spawning it on first use).
    fn begin_background(&self, total: usize, job: Job) -> Result<()> {
        if self.inner.is_indexing.swap(true, Ordering::AcqRel) {
            return Err(IndexError::Busy);
        }
        self.inner.progress_current.store(0, Ordering::Release);
        self.inner.progress_total.store(total, Ordering::Release);

        let mut worker = self.inner.worker.lock();
        if worker.is_none() {
            let (tx, rx) = mpsc::channel::<Job>();
            let weak = Arc::downgrade(&self.inner);
            std::thread::Builder::new()
                .name("hnswlite-worker".into())
                .spawn(move || worker_loop(rx, weak))
                .map_err(IndexError::Io)?;
            *worker = Some(tx);
        }
        if worker
            .as_ref()
            .expect("worker sender just installed")
            .send(job)
            .is_err()
        {
            self.inner.is_indexing.store(false, Ordering::Release);
            return Err(IndexError::Internal("background worker is gone".into()));
        }
        Ok(())
    }
}

/// Worker thread body: drain jobs until every index handle is dropped.
fn worker_loop(rx: mpsc::Receiver<Job>, inner: Weak<IndexInner>) {
    while let Ok(job) = rx.recv() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match job {
            Job::AddBatch {
                keys,
                vectors,
                generation,
            } => run_batch(&inner, &keys, &vectors, generation),
            Job::LoadFile { path, generation } => run_file_load(&inner, &path, generation),
        }
    }
}

/// Insert one vector: storage write, then graph linkage.
fn insert_one(
    state: &mut CoreState,
    metric: MetricKind,
    isa: Isa,
    key: i64,
    vector: &[f32],
) -> Result<()> {
    let slot = state.store.put(key, vector)?;
    let CoreState {
        store,
        graph,
        visited,
    } = state;
    graph.insert(slot, vector, store, metric, isa, visited);
    Ok(())
}

/// Batch body: per-item lock acquisition with generation checks, so
/// concurrent searches see a growing prefix and `delete()` cancels at
/// the next boundary.
fn run_batch(inner: &IndexInner, keys: &[i64], vectors: &[f32], generation: u64) {
    let start = Instant::now();
    let dim = inner.dimensions as usize;
    let mut completed = 0usize;
    let mut error: Option<IndexError> = None;

    for (i, &key) in keys.iter().enumerate() {
        let mut guard = inner.state.lock();
        if inner.generation.load(Ordering::Acquire) != generation {
            error = Some(IndexError::DeletedState);
            break;
        }
        let Some(state) = guard.as_mut() else {
            error = Some(IndexError::DeletedState);
            break;
        };
        let vector = &vectors[i * dim..(i + 1) * dim];
        match insert_one(state, inner.metric, inner.isa, key, vector) {
            Ok(()) => {
                completed += 1;
                inner.progress_current.store(i + 1, Ordering::Release);
            }
            Err(e) => {
                tracing::warn!("batch insert aborted at item {} (key {}): {}", i, key, e);
                error = Some(e);
                break;
            }
        }
    }

    finish_background(inner, start, completed, error);
}

/// File-load body: read and validate the raw file off-lock, then insert
/// item by item exactly like a batch.
fn run_file_load(inner: &IndexInner, path: &std::path::Path, generation: u64) {
    let start = Instant::now();
    let dim = inner.dimensions as usize;

    let vectors = match codec::read_raw_vectors(path, dim) {
        Ok(v) => v,
        Err(e) => {
            finish_background(inner, start, 0, Some(e));
            return;
        }
    };

    let total = vectors.len() / dim;
    let mut completed = 0usize;
    let mut error: Option<IndexError> = None;

    for i in 0..total {
        let mut guard = inner.state.lock();
        if inner.generation.load(Ordering::Acquire) != generation {
            error = Some(IndexError::DeletedState);
            break;
        }
        let Some(state) = guard.as_mut() else {
            error = Some(IndexError::DeletedState);
            break;
        };
        let vector = &vectors[i * dim..(i + 1) * dim];
        match insert_one(state, inner.metric, inner.isa, i as i64, vector) {
            Ok(()) => {
                completed += 1;
                inner.progress_current.store(i + 1, Ordering::Release);
            }
            Err(e) => {
                tracing::warn!("bulk load aborted at item {}: {}", i, e);
                error = Some(e);
                break;
            }
        }
    }

    finish_background(inner, start, completed, error);
}

fn finish_background(
    inner: &IndexInner,
    start: Instant,
    completed: usize,
    error: Option<IndexError>,
) {
    let duration_ms = start.elapsed().as_secs_f64() * 1e3;
    {
        let mut last = inner.last.lock();
        last.duration_ms = duration_ms;
        last.count = completed;
        last.error = error;
    }
    inner.is_indexing.store(false, Ordering::Release);
    tracing::debug!(
        "background operation finished: {} items in {:.1}ms",
        completed,
        duration_ms
    );
}

/// Reinterpret a byte range as f32 elements, enforcing the buffer
/// contract: non-empty, 4-byte aligned, whole elements.
fn as_f32_slice(bytes: &[u8]) -> Result<&[f32]> {
    if bytes.is_empty() {
        return Err(IndexError::Buffer("buffer is empty".into()));
    }
    if bytes.as_ptr() as usize % 4 != 0 {
        return Err(IndexError::Buffer(
            "buffer is not 4-byte aligned".into(),
        ));
    }
    if bytes.len() % 4 != 0 {
        return Err(IndexError::Buffer(format!(
            "buffer length {} is not a whole number of f32 elements",
            bytes.len()
        )));
    }
    // Alignment and length are verified above; any bit pattern is a
    // valid f32.
    Ok(unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, bytes.len() / 4) })
}

/// Reinterpret a byte range as i64 keys (8-byte aligned).
fn as_i64_slice(bytes: &[u8]) -> Result<&[i64]> {
    if bytes.is_empty() {
        return Err(IndexError::Buffer("key buffer is empty".into()));
    }
    if bytes.as_ptr() as usize % 8 != 0 {
        return Err(IndexError::Buffer(
            "key buffer is not 8-byte aligned".into(),
        ));
    }
    if bytes.len() % 8 != 0 {
        return Err(IndexError::Buffer(format!(
            "key buffer length {} is not a whole number of i64 keys",
            bytes.len()
        )));
    }
    Ok(unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i64, bytes.len() / 8) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_idle(index: &VectorIndex) {
        for _ in 0..2000 {
            if !index.is_indexing() {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("background operation never finished");
    }

    #[test]
    fn test_create_rejects_bad_config() {
        assert!(matches!(
            VectorIndex::create(0, IndexOptions::default()),
            Err(IndexError::Config(_))
        ));
        assert!(matches!(
            IndexOptions::parse("f16", "cos"),
            Err(IndexError::Config(_))
        ));
        assert!(matches!(
            IndexOptions::parse("f32", "euclid"),
            Err(IndexError::Config(_))
        ));
    }

    #[test]
    fn test_add_search_remove_cycle() {
        let index = VectorIndex::create(4, IndexOptions::default()).unwrap();
        index.add(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.count().unwrap(), 2);

        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].key, 1);
        assert!(hits[0].distance.abs() < 1e-6);

        index.remove(1).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, 2);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        index.add(1, &[1.0, 0.0]).unwrap();
        assert!(matches!(
            index.add(1, &[0.0, 1.0]),
            Err(IndexError::Duplicate(1))
        ));
    }

    #[test]
    fn test_dimension_gate() {
        let index = VectorIndex::create(4, IndexOptions::default()).unwrap();
        assert!(matches!(
            index.add(1, &[1.0, 0.0]),
            Err(IndexError::Dimension {
                expected: 4,
                actual: 2
            })
        ));
        assert!(matches!(
            index.search(&[1.0], 1, None),
            Err(IndexError::Dimension { .. })
        ));
    }

    #[test]
    fn test_update_unknown_key_is_add() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        index.update(5, &[1.0, 0.0]).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(
            index.get_item_vector(5).unwrap().unwrap(),
            vec![1.0, 0.0]
        );
    }

    #[test]
    fn test_get_item_vector_missing_is_none() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        assert!(index.get_item_vector(9).unwrap().is_none());
    }

    #[test]
    fn test_misaligned_buffer_rejected_without_mutation() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        let backing = vec![0u8; 16];
        let offset = if backing.as_ptr() as usize % 4 == 0 { 1 } else { 0 };
        let misaligned = &backing[offset..offset + 8];
        assert!(matches!(
            index.add_raw(1, misaligned),
            Err(IndexError::Buffer(_))
        ));
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_add_raw_round_trip() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        let values = [1.5f32, -2.5];
        let bytes: Vec<u8> = values.iter().flat_map(|x| x.to_le_bytes()).collect();
        index.add_raw(3, &bytes).unwrap();
        assert_eq!(
            index.get_item_vector(3).unwrap().unwrap(),
            vec![1.5, -2.5]
        );
    }

    #[test]
    fn test_batch_shape_mismatch() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        assert!(matches!(
            index.add_batch(&[1, 2], &[1.0, 0.0, 0.0]),
            Err(IndexError::Buffer(_))
        ));
    }

    #[test]
    fn test_background_batch_with_progress() {
        let index = VectorIndex::create(4, IndexOptions::default()).unwrap();
        let n = 500usize;
        let keys: Vec<i64> = (0..n as i64).collect();
        let vectors: Vec<f32> = (0..n * 4).map(|i| (i % 97) as f32 / 97.0).collect();

        index.add_batch(&keys, &vectors).unwrap();
        assert!(index.is_indexing());
        assert_eq!(index.indexing_progress().total, n);

        // Conflicting ops are rejected while the batch runs.
        assert!(matches!(
            index.add_batch(&[999], &[0.0; 4]),
            Err(IndexError::Busy)
        ));
        assert!(matches!(index.remove(0), Err(IndexError::Busy)));
        assert!(matches!(index.save("/tmp/x"), Err(IndexError::Busy)));

        wait_idle(&index);
        let result = index.get_last_result().unwrap();
        assert_eq!(result.count, n);
        assert!(result.duration_ms >= 0.0);
        assert_eq!(index.count().unwrap(), n);
        let progress = index.indexing_progress();
        assert_eq!(progress.current, n);
        assert!((progress.percentage - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_concurrent_search_during_batch() {
        let index = VectorIndex::create(4, IndexOptions::default()).unwrap();
        let n = 400usize;
        let keys: Vec<i64> = (0..n as i64).collect();
        let vectors: Vec<f32> = (0..n * 4).map(|i| ((i * 31) % 101) as f32 / 101.0).collect();
        index.add_batch(&keys, &vectors).unwrap();

        let mut last_seen = 0usize;
        while index.is_indexing() {
            let hits = index.search(&[0.5, 0.5, 0.5, 0.5], 10, None).unwrap();
            assert!(hits.len() >= last_seen.min(10));
            last_seen = hits.len();
        }
        wait_idle(&index);
        assert_eq!(index.count().unwrap(), n);
    }

    #[test]
    fn test_batch_error_reported_via_last_result() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        index.add(5, &[1.0, 0.0]).unwrap();
        // Key 5 collides mid-batch; the batch stops there.
        index
            .add_batch(&[4, 5, 6], &[0.1, 0.1, 0.2, 0.2, 0.3, 0.3])
            .unwrap();
        wait_idle(&index);
        assert!(matches!(
            index.get_last_result(),
            Err(IndexError::Duplicate(5))
        ));
        // The error was cleared by the failed fetch.
        let result = index.get_last_result().unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_delete_cancels_background_batch() {
        let index = VectorIndex::create(8, IndexOptions::default()).unwrap();
        let n = 5000usize;
        let keys: Vec<i64> = (0..n as i64).collect();
        let vectors: Vec<f32> = (0..n * 8).map(|i| ((i * 17) % 251) as f32 / 251.0).collect();
        index.add_batch(&keys, &vectors).unwrap();

        index.delete();
        assert!(matches!(index.count(), Err(IndexError::DeletedState)));
        // Idempotent.
        index.delete();

        wait_idle(&index);
        assert!(matches!(
            index.get_last_result(),
            Err(IndexError::DeletedState)
        ));
    }

    #[test]
    fn test_deleted_state_gates_everything() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        index.add(1, &[1.0, 0.0]).unwrap();
        index.delete();
        assert!(matches!(
            index.add(2, &[0.0, 1.0]),
            Err(IndexError::DeletedState)
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0], 1, None),
            Err(IndexError::DeletedState)
        ));
        assert!(matches!(
            index.get_item_vector(1),
            Err(IndexError::DeletedState)
        ));
        assert!(matches!(index.save("/tmp/x"), Err(IndexError::DeletedState)));
    }

    #[test]
    fn test_memory_usage_grows_with_count() {
        let index = VectorIndex::create(16, IndexOptions::default()).unwrap();
        let empty = index.memory_usage().unwrap();
        for key in 0..50i64 {
            let v: Vec<f32> = (0..16).map(|j| ((key as usize + j) % 7) as f32).collect();
            index.add(key, &v).unwrap();
        }
        let full = index.memory_usage().unwrap();
        assert!(full > empty);
        // 50 × 16 × 4 vector bytes plus per-node overhead.
        assert!(full - empty >= 50 * 16 * 4);
    }

    #[test]
    fn test_i8_index_quantized_round_trip() {
        let options = IndexOptions {
            quantization: ScalarKind::I8,
            ..IndexOptions::default()
        };
        let index = VectorIndex::create(4, options).unwrap();
        index.add(1, &[1.0, -0.5, 0.25, 0.0]).unwrap();
        let got = index.get_item_vector(1).unwrap().unwrap();
        let expected = [1.0, -0.5, 0.25, 0.0];
        for (g, e) in got.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 5e-3, "got {g}, expected {e}");
        }
    }

    #[test]
    fn test_path_gate_on_persistence_ops() {
        let index = VectorIndex::create(2, IndexOptions::default()).unwrap();
        assert!(matches!(
            index.save("/tmp/../etc/evil"),
            Err(IndexError::Path(_))
        ));
        assert!(matches!(index.load(""), Err(IndexError::Path(_))));
        assert!(matches!(
            index.load_vectors_from_file("data/../../x.raw"),
            Err(IndexError::Path(_))
        ));
    }
}
