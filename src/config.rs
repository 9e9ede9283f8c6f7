//! Global configuration constants.
//!
//! Construction defaults and tuning parameters live here; per-index
//! overrides are passed through [`IndexOptions`](crate::index::IndexOptions).

/// Default number of bidirectional links per HNSW node above layer 0.
///
/// Higher values improve recall but increase memory and build time.
/// Layer 0 uses twice this value.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default candidate list size during index construction.
///
/// Controls the beam width while collecting neighbors for a new node.
/// Higher values produce a better graph but slow down insertion.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 64;

/// Default candidate list size during search.
///
/// Higher values improve recall at the cost of latency. Searches use
/// `max(ef_search, k)`.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 64;

/// Seed for the level-assignment RNG.
///
/// Layer draws are deterministic for a given insertion order, which keeps
/// graph construction reproducible across runs and platforms.
pub const LEVEL_RNG_SEED: u64 = 0x5eed_1e5e;

/// Slots reserved when an index is created, before any insertion.
pub const INITIAL_CAPACITY: usize = 100;

/// Extra slots reserved beyond a batch's exact size, so a few point
/// inserts after the batch do not immediately trigger regrowth.
pub const BATCH_RESERVE_HEADROOM: usize = 100;

/// Maximum allowed dimensionality at construction.
pub const MAX_DIMENSIONS: u32 = 4096;

/// Assumed per-node header size for the memory-usage estimate, in bytes.
pub const NODE_HEADER_BYTES: usize = 64;

/// Assumed average connectivity for the memory-usage estimate.
pub const ESTIMATED_CONNECTIVITY: usize = 32;

/// Fixed base overhead for the memory-usage estimate, in bytes (1 MiB).
pub const BASE_MEMORY_OVERHEAD: usize = 1024 * 1024;
