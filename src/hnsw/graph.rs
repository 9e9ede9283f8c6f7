//! HNSW graph structure and construction parameters.
//!
//! The graph mirrors the storage slot table: slot `i` owns
//! `neighbors[i]` (one bounded list per layer) and `layers[i]` (its top
//! layer). Layer assignment draws from a geometric distribution via a
//! seeded RNG, so construction is reproducible for a given insertion
//! order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config;
use crate::error::{IndexError, Result};
use crate::storage::VectorStore;

/// Hard cap on layer assignment; layers are stored as `u8` on disk.
const MAX_LEVEL: usize = 63;

/// Tuning parameters for the HNSW graph.
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    /// Bidirectional links per node on layers above 0.
    pub m: usize,
    /// Links per node on layer 0 (2·M).
    pub m0: usize,
    /// Beam width while collecting neighbors for a new node.
    pub ef_construction: usize,
    /// Default beam width during search; queries use `max(ef_search, k)`.
    pub ef_search: usize,
    /// Level-generation multiplier, `1 / ln(M)`.
    pub ml: f64,
}

impl GraphConfig {
    /// Build a config, validating the parameters.
    pub fn new(m: usize, ef_construction: usize, ef_search: usize) -> Result<Self> {
        if m < 2 {
            return Err(IndexError::Config(format!("M must be at least 2, got {m}")));
        }
        if ef_construction == 0 || ef_search == 0 {
            return Err(IndexError::Config(
                "ef_construction and ef_search must be positive".into(),
            ));
        }
        Ok(Self {
            m,
            m0: m * 2,
            ef_construction,
            ef_search,
            ml: 1.0 / (m as f64).ln(),
        })
    }

    /// Link budget for a layer.
    #[inline]
    pub fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::new(
            config::HNSW_DEFAULT_M,
            config::HNSW_DEFAULT_EF_CONSTRUCTION,
            config::HNSW_DEFAULT_EF_SEARCH,
        )
        .expect("defaults are valid")
    }
}

/// Multi-layer neighbor graph over storage slots.
#[derive(Debug)]
pub struct HnswGraph {
    pub(crate) config: GraphConfig,
    /// `neighbors[slot][layer]`: bounded neighbor lists.
    pub(crate) neighbors: Vec<Vec<Vec<u32>>>,
    /// Top layer per slot.
    pub(crate) layers: Vec<u8>,
    /// Entry slot; always live while the index is non-empty.
    pub(crate) entry: Option<u32>,
    rng: StdRng,
}

impl HnswGraph {
    pub fn new(config: GraphConfig) -> Self {
        Self::with_seed(config, config::LEVEL_RNG_SEED)
    }

    pub fn with_seed(config: GraphConfig, seed: u64) -> Self {
        Self {
            config,
            neighbors: Vec::new(),
            layers: Vec::new(),
            entry: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Entry slot, or `None` while the graph is empty.
    pub fn entry(&self) -> Option<u32> {
        self.entry
    }

    /// Top layer of the entry point (0 for an empty graph).
    pub fn top_layer(&self) -> usize {
        self.entry
            .map(|slot| self.layers[slot as usize] as usize)
            .unwrap_or(0)
    }

    /// Top layer assigned to `slot`.
    #[inline]
    pub fn layer_of(&self, slot: u32) -> usize {
        self.layers[slot as usize] as usize
    }

    /// Draw a top layer for a new node: `floor(-ln(U) · mL)`.
    pub(crate) fn random_level(&mut self) -> usize {
        // Sample from (0, 1] so ln never sees zero.
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        ((-u.ln() * self.config.ml).floor() as usize).min(MAX_LEVEL)
    }

    /// Append empty neighbor lists for a node at `level`. The caller
    /// guarantees `slot` equals the current node count.
    pub(crate) fn push_node(&mut self, slot: u32, level: usize) {
        debug_assert_eq!(slot as usize, self.neighbors.len());
        let mut lists = Vec::with_capacity(level + 1);
        for _ in 0..=level {
            lists.push(Vec::new());
        }
        self.neighbors.push(lists);
        self.layers.push(level as u8);
    }

    /// Handle the tombstoning of `slot`: when it was the entry point,
    /// promote the live slot with the highest layer (ties to the
    /// smallest key).
    pub fn on_remove(&mut self, slot: u32, store: &VectorStore) {
        if self.entry != Some(slot) {
            return;
        }
        let mut best: Option<(usize, i64, u32)> = None;
        for live in store.live_slots() {
            let layer = self.layer_of(live);
            let key = store.key_of(live);
            let better = match best {
                None => true,
                Some((best_layer, best_key, _)) => {
                    layer > best_layer || (layer == best_layer && key < best_key)
                }
            };
            if better {
                best = Some((layer, key, live));
            }
        }
        self.entry = best.map(|(_, _, s)| s);
    }
}
