//! HNSW insertion with heuristic neighbor selection.
//!
//! Insertion runs in three phases: greedy descent from the entry point to
//! the node's layer, a beam search per layer collecting candidates, and
//! edge writing with reverse-edge pruning. Neighbor lists are purged of
//! tombstones whenever they are rewritten, so deleted slots drain out of
//! the graph as insertions touch their neighborhoods.

use crate::hnsw::graph::HnswGraph;
use crate::hnsw::search::search_layer;
use crate::hnsw::visited::VisitedSet;
use crate::metric::{Isa, MetricKind};
use crate::storage::VectorStore;

impl HnswGraph {
    /// Link the freshly stored `slot` into the graph. `vector` is the
    /// caller's raw f32 data; the store may hold it quantized.
    ///
    /// The caller must have written the vector to `store` first, so that
    /// `slot` equals the graph's next node id.
    pub fn insert(
        &mut self,
        slot: u32,
        vector: &[f32],
        store: &VectorStore,
        metric: MetricKind,
        isa: Isa,
        visited: &mut VisitedSet,
    ) {
        let level = self.random_level();
        self.push_node(slot, level);

        let Some(entry) = self.entry else {
            self.entry = Some(slot);
            return;
        };
        let top = self.layer_of(entry);
        let everything = |_: u32| true;

        // Phase 1: greedy descent through layers above the node's level.
        let mut current = entry;
        for layer in (level + 1..=top).rev() {
            let found = search_layer(
                self,
                store,
                metric,
                isa,
                vector,
                std::slice::from_ref(&current),
                1,
                layer,
                visited,
                &everything,
            );
            if let Some(&(_, nearest)) = found.first() {
                current = nearest;
            }
        }

        // Phase 2: collect diverse neighbors per layer, top-down.
        let link_top = level.min(top);
        let mut selected_per_layer: Vec<Vec<u32>> = vec![Vec::new(); link_top + 1];
        let mut scratch = vec![0.0f32; store.dim()];
        let mut entry_points = vec![current];
        for layer in (0..=link_top).rev() {
            let candidates = search_layer(
                self,
                store,
                metric,
                isa,
                vector,
                &entry_points,
                self.config.ef_construction,
                layer,
                visited,
                &everything,
            );
            let m_max = self.config.max_links(layer);
            selected_per_layer[layer] =
                select_diverse(store, metric, isa, &candidates, m_max, &mut scratch);

            entry_points.clear();
            entry_points.extend(candidates.iter().map(|&(_, s)| s));
            if entry_points.is_empty() {
                entry_points.push(entry);
            }
        }

        // Phase 3: write bidirectional edges; prune overflowing reverse
        // lists with the same diversity rule.
        let mut base_buf = vec![0.0f32; store.dim()];
        for (layer, selected) in selected_per_layer.iter().enumerate() {
            let m_max = self.config.max_links(layer);
            self.neighbors[slot as usize][layer] = selected.clone();

            for &nb in selected {
                let nbu = nb as usize;
                while self.neighbors[nbu].len() <= layer {
                    self.neighbors[nbu].push(Vec::new());
                }
                let list = &mut self.neighbors[nbu][layer];
                // Tombstone purge at touch time.
                list.retain(|&x| !store.is_deleted(x));
                list.push(slot);

                if list.len() > m_max {
                    store.copy_to(nb, &mut base_buf);
                    let mut candidates: Vec<(f32, u32)> = self.neighbors[nbu][layer]
                        .iter()
                        .map(|&c| (metric.distance(isa, &base_buf, store.read(c)), c))
                        .collect();
                    candidates.sort_unstable_by(|a, b| {
                        a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    self.neighbors[nbu][layer] =
                        select_diverse(store, metric, isa, &candidates, m_max, &mut scratch);
                }
            }
        }

        if level > top {
            self.entry = Some(slot);
        }
    }
}

/// Diversity-preserving neighbor selection.
///
/// Walks `candidates` (ascending by distance to the base vector) and
/// accepts one only when it is at least as close to the base as to every
/// already-accepted neighbor; this keeps long-range edges that a plain
/// top-M selection would discard. Remaining budget is backfilled with
/// the closest rejected candidates.
fn select_diverse(
    store: &VectorStore,
    metric: MetricKind,
    isa: Isa,
    candidates: &[(f32, u32)],
    m: usize,
    scratch: &mut [f32],
) -> Vec<u32> {
    let mut selected: Vec<u32> = Vec::with_capacity(m);

    for &(dist_to_base, cand) in candidates {
        if selected.len() >= m {
            break;
        }
        store.copy_to(cand, scratch);
        let diverse = selected
            .iter()
            .all(|&s| dist_to_base <= metric.distance(isa, scratch, store.read(s)));
        if diverse {
            selected.push(cand);
        }
    }

    if selected.len() < m {
        for &(_, cand) in candidates {
            if selected.len() >= m {
                break;
            }
            if !selected.contains(&cand) {
                selected.push(cand);
            }
        }
    }

    selected
}
