//! # hnswlite
//!
//! Embeddable approximate-nearest-neighbor vector index for in-process
//! use on resource-constrained devices: sub-millisecond k-NN search over
//! a live, mutable collection of tens of thousands of vectors, with
//! optional int8 quantization and binary on-disk persistence.
//!
//! The index is an HNSW graph over a contiguous vector arena. Five
//! distance metrics (cosine, squared L2, inner product, Hamming, Jaccard)
//! dispatch to NEON or AVX2 kernels selected once at construction.
//! Mutations are serialized behind one mutex; bulk ingestion runs on a
//! single background worker that yields the lock between items, so
//! searches stay live while a batch indexes.
//!
//! ```no_run
//! use hnswlite::{IndexOptions, VectorIndex};
//!
//! let index = VectorIndex::create(4, IndexOptions::default())?;
//! index.add(1, &[1.0, 0.0, 0.0, 0.0])?;
//! index.add(2, &[0.0, 1.0, 0.0, 0.0])?;
//! let hits = index.search(&[1.0, 0.1, 0.0, 0.0], 2, None)?;
//! assert_eq!(hits[0].key, 1);
//! # Ok::<(), hnswlite::IndexError>(())
//! ```

/// Binary persistence: whole-index save/load and the raw bulk loader.
pub mod codec;
/// Construction defaults and tuning constants.
pub mod config;
/// Closed error taxonomy.
pub mod error;
/// HNSW graph: structure, insertion, search, visited set.
pub mod hnsw;
/// Index facade, factory, and background-indexing controller.
pub mod index;
/// Distance metrics with runtime SIMD dispatch.
pub mod metric;
/// f32 ↔ i8 scalar quantization.
pub mod quantization;
/// Vector arena, slot table, and key map.
pub mod storage;

pub use error::{IndexError, Result};
pub use index::{
    AddOutcome, IndexOptions, IndexingProgress, LastResult, SearchHit, SearchOptions, VectorIndex,
};
pub use metric::{Isa, MetricKind};
pub use storage::ScalarKind;
