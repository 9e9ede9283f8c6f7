//! Layer search and k-NN queries over the HNSW graph.
//!
//! `search_layer` is the shared beam search used by both insertion and
//! queries: a min-heap frontier ordered by distance to the query and a
//! bounded max-heap of best results. Tombstoned and filtered-out nodes
//! still participate in traversal (they are the graph's connectivity)
//! but are never emitted as results.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashSet;

use ordered_float::OrderedFloat;

use crate::hnsw::graph::HnswGraph;
use crate::hnsw::visited::VisitedSet;
use crate::metric::{Isa, MetricKind};
use crate::storage::VectorStore;

/// Search one layer. Returns up to `ef` accepted nodes as
/// `(distance, slot)`, ascending by distance.
///
/// `accept` gates emission only; traversal expands every reachable
/// neighbor. `visited` is reset at the start of each call.
#[allow(clippy::too_many_arguments)]
pub(crate) fn search_layer<F: Fn(u32) -> bool>(
    graph: &HnswGraph,
    store: &VectorStore,
    metric: MetricKind,
    isa: Isa,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    accept: &F,
) -> Vec<(f32, u32)> {
    visited.grow(store.slot_count());
    visited.reset();

    // Min-heap frontier via Reverse; bounded max-heap of best results.
    let mut frontier: BinaryHeap<Reverse<(OrderedFloat<f32>, u32)>> =
        BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<(OrderedFloat<f32>, u32)> = BinaryHeap::with_capacity(ef + 1);
    let mut worst = f32::MAX;

    for &ep in entry_points {
        if !visited.mark(ep) {
            continue;
        }
        let dist = metric.distance(isa, query, store.read(ep));
        frontier.push(Reverse((OrderedFloat(dist), ep)));
        if !store.is_deleted(ep) && accept(ep) {
            results.push((OrderedFloat(dist), ep));
            if results.len() >= ef {
                worst = results.peek().map_or(f32::MAX, |r| r.0 .0);
            }
        }
    }

    while let Some(Reverse((OrderedFloat(dist), slot))) = frontier.pop() {
        if results.len() >= ef && dist > worst {
            break;
        }

        let lists = &graph.neighbors[slot as usize];
        if layer >= lists.len() {
            continue;
        }
        for &neighbor in &lists[layer] {
            if !visited.mark(neighbor) {
                continue;
            }
            let dist = metric.distance(isa, query, store.read(neighbor));
            if results.len() >= ef && dist >= worst {
                continue;
            }
            frontier.push(Reverse((OrderedFloat(dist), neighbor)));
            if !store.is_deleted(neighbor) && accept(neighbor) {
                results.push((OrderedFloat(dist), neighbor));
                if results.len() > ef {
                    results.pop();
                }
                if results.len() >= ef {
                    worst = results.peek().map_or(f32::MAX, |r| r.0 .0);
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|(OrderedFloat(dist), slot)| (dist, slot))
        .collect()
}

/// k-NN search. Returns up to `k` live slots as `(distance, slot)`,
/// ascending by distance with ties broken by the smaller external key.
pub fn knn_search(
    graph: &HnswGraph,
    store: &VectorStore,
    metric: MetricKind,
    isa: Isa,
    query: &[f32],
    k: usize,
) -> Vec<(f32, u32)> {
    knn_search_filtered(graph, store, metric, isa, query, k, None)
}

/// k-NN search restricted to `allowed` external keys. Traversal still
/// crosses non-allowed nodes; only result emission is filtered.
pub fn knn_search_filtered(
    graph: &HnswGraph,
    store: &VectorStore,
    metric: MetricKind,
    isa: Isa,
    query: &[f32],
    k: usize,
    allowed: Option<&HashSet<i64>>,
) -> Vec<(f32, u32)> {
    let Some(entry) = graph.entry() else {
        return Vec::new();
    };
    if k == 0 {
        return Vec::new();
    }

    let mut visited = VisitedSet::new(store.slot_count());

    // Greedy descent to layer 1: one nearest node per layer.
    let mut current = entry;
    let everything = |_: u32| true;
    for layer in (1..=graph.top_layer()).rev() {
        let found = search_layer(
            graph,
            store,
            metric,
            isa,
            query,
            std::slice::from_ref(&current),
            1,
            layer,
            &mut visited,
            &everything,
        );
        if let Some(&(_, nearest)) = found.first() {
            current = nearest;
        }
    }

    // Beam search on layer 0 with the result filter applied.
    let ef = graph.config().ef_search.max(k);
    let mut results = match allowed {
        Some(keys) => {
            let accept = |slot: u32| keys.contains(&store.key_of(slot));
            search_layer(
                graph,
                store,
                metric,
                isa,
                query,
                std::slice::from_ref(&current),
                ef,
                0,
                &mut visited,
                &accept,
            )
        }
        None => search_layer(
            graph,
            store,
            metric,
            isa,
            query,
            std::slice::from_ref(&current),
            ef,
            0,
            &mut visited,
            &everything,
        ),
    };

    // Deterministic order: ascending distance, then smaller key.
    results.sort_by_key(|&(dist, slot)| (OrderedFloat(dist), store.key_of(slot)));
    results.truncate(k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::graph::GraphConfig;
    use crate::storage::ScalarKind;

    fn build(vectors: &[(i64, [f32; 2])]) -> (HnswGraph, VectorStore) {
        let mut store = VectorStore::new(2, ScalarKind::F32);
        let mut graph = HnswGraph::new(GraphConfig::default());
        let mut visited = VisitedSet::default();
        for &(key, v) in vectors {
            let slot = store.put(key, &v).unwrap();
            graph.insert(
                slot,
                &v,
                &store,
                MetricKind::L2sq,
                Isa::detect(),
                &mut visited,
            );
        }
        (graph, store)
    }

    #[test]
    fn test_empty_graph_returns_nothing() {
        let store = VectorStore::new(2, ScalarKind::F32);
        let graph = HnswGraph::new(GraphConfig::default());
        let hits = knn_search(
            &graph,
            &store,
            MetricKind::L2sq,
            Isa::detect(),
            &[0.0, 0.0],
            3,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_nearest_first() {
        let (graph, store) = build(&[
            (1, [0.0, 0.0]),
            (2, [1.0, 0.0]),
            (3, [5.0, 5.0]),
            (4, [0.1, 0.1]),
        ]);
        let hits = knn_search(
            &graph,
            &store,
            MetricKind::L2sq,
            Isa::detect(),
            &[0.0, 0.0],
            2,
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(store.key_of(hits[0].1), 1);
        assert_eq!(store.key_of(hits[1].1), 4);
        assert!(hits[0].0 <= hits[1].0);
    }

    #[test]
    fn test_tombstones_excluded_but_traversed() {
        let (mut graph, mut store) = build(&[
            (1, [0.0, 0.0]),
            (2, [1.0, 0.0]),
            (3, [2.0, 0.0]),
            (4, [3.0, 0.0]),
        ]);
        let slot = store.remove(2).unwrap();
        graph.on_remove(slot, &store);

        let hits = knn_search(
            &graph,
            &store,
            MetricKind::L2sq,
            Isa::detect(),
            &[1.0, 0.0],
            4,
        );
        let keys: Vec<i64> = hits.iter().map(|&(_, s)| store.key_of(s)).collect();
        assert!(!keys.contains(&2));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_filter_restricts_results_only() {
        let (graph, store) = build(&[(1, [0.0, 0.0]), (2, [0.5, 0.0]), (3, [1.0, 0.0])]);
        let allowed: HashSet<i64> = [3].into_iter().collect();
        let hits = knn_search_filtered(
            &graph,
            &store,
            MetricKind::L2sq,
            Isa::detect(),
            &[0.0, 0.0],
            3,
            Some(&allowed),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(store.key_of(hits[0].1), 3);
    }

    #[test]
    fn test_equal_distances_tie_break_on_key() {
        let (graph, store) = build(&[(9, [1.0, 0.0]), (2, [0.0, 1.0]), (5, [-1.0, 0.0])]);
        // All three are at distance 1 from the origin.
        let hits = knn_search(
            &graph,
            &store,
            MetricKind::L2sq,
            Isa::detect(),
            &[0.0, 0.0],
            3,
        );
        let keys: Vec<i64> = hits.iter().map(|&(_, s)| store.key_of(s)).collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }
}
