//! HNSW search: greedy descent, single-layer beam search, and multi-layer KNN.
//!
//! Supports an optional predicate over labels applied during layer-0 traversal.
//! Filtered nodes are still used for navigation but excluded from results.
//! Searches take read locks only, one adjacency list at a time.

use crate::hnsw::graph::HnswGraph;
use crate::hnsw::visited::VisitedSet;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

thread_local! {
    /// Per-thread visited set, reused across searches and insertions on the same thread.
    static VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// A node with its distance to the query. Orders by distance, then by id, so equal
/// distances resolve to the lower internal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Scored {
    pub distance: OrderedFloat<f32>,
    pub id: u32,
}

impl Scored {
    #[inline]
    pub fn new(distance: f32, id: u32) -> Self {
        Self {
            distance: OrderedFloat(distance),
            id,
        }
    }
}

/// Run `f` with this thread's visited set, sized for `len` live ids.
///
/// A nested call on the same thread (a search filter that queries an index) gets a
/// fresh set instead of the pooled one.
pub(crate) fn with_visited<R>(len: usize, f: impl FnOnce(&mut VisitedSet) -> R) -> R {
    VISITED.with(|cell| match cell.try_borrow_mut() {
        Ok(mut visited) => {
            visited.reserve(len);
            f(&mut visited)
        }
        Err(_) => f(&mut VisitedSet::new(len)),
    })
}

/// Single-best greedy descent from `start` on layers `top` down to `bottom` inclusive.
/// Returns the closest node found on `bottom` and its distance.
pub(crate) fn greedy_descent(
    graph: &HnswGraph,
    query: &[f32],
    start: u32,
    top: usize,
    bottom: usize,
) -> Scored {
    let mut best = Scored::new(graph.distance_to(query, start), start);
    let mut neighbors = Vec::new();

    for layer in (bottom..=top).rev() {
        loop {
            let mut changed = false;
            graph.arena.neighbors_into(best.id, layer, &mut neighbors);
            for &n in &neighbors {
                let cand = Scored::new(graph.distance_to(query, n), n);
                if cand < best {
                    best = cand;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
    best
}

/// Beam search on a single layer.
///
/// Returns up to `ef` nodes admitted by `filter_fn`, ascending by distance.
/// `visited` is reset at the start of each call.
pub(crate) fn search_layer<F: Fn(u32) -> bool>(
    graph: &HnswGraph,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    filter_fn: &F,
) -> Vec<Scored> {
    visited.reset();
    let ef = ef.max(1);
    let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);
    // Cached worst kept distance, valid once results holds ef entries
    let mut worst = Scored::new(f32::INFINITY, u32::MAX);

    for &ep in entry_points {
        if !visited.mark(ep) {
            continue;
        }
        let scored = Scored::new(graph.distance_to(query, ep), ep);
        candidates.push(Reverse(scored));
        if filter_fn(ep) {
            results.push(scored);
            if results.len() > ef {
                results.pop();
            }
            if results.len() >= ef {
                worst = results.peek().copied().unwrap_or(worst);
            }
        }
    }

    let mut neighbors = Vec::new();
    while let Some(Reverse(current)) = candidates.pop() {
        // The closest frontier node is farther than the worst kept result: done
        if results.len() >= ef && current > worst {
            break;
        }

        graph.arena.neighbors_into(current.id, layer, &mut neighbors);
        for &n in &neighbors {
            if !visited.mark(n) {
                continue;
            }
            let scored = Scored::new(graph.distance_to(query, n), n);
            if results.len() < ef || scored < worst {
                candidates.push(Reverse(scored));
                if filter_fn(n) {
                    results.push(scored);
                    if results.len() > ef {
                        results.pop();
                    }
                    if results.len() >= ef {
                        worst = results.peek().copied().unwrap_or(worst);
                    }
                }
            }
        }
    }

    results.into_sorted_vec()
}

/// Multi-layer KNN search. Returns up to `k` `(label, distance)` pairs, ascending.
pub fn knn_search(graph: &HnswGraph, query: &[f32], k: usize) -> Vec<(u64, f32)> {
    knn_search_filtered(graph, query, k, &|_: u64| true)
}

/// Multi-layer KNN search with a label predicate applied during layer-0 traversal.
///
/// The beam width is `max(ef_search, k)`. If the filter leaves fewer than `k`
/// results, the search is retried with a doubled beam, up to 4× or the index size.
/// Fewer than `k` results are logged as a warning, never reported as an error.
pub fn knn_search_filtered<F: Fn(u64) -> bool>(
    graph: &HnswGraph,
    query: &[f32],
    k: usize,
    filter_fn: &F,
) -> Vec<(u64, f32)> {
    if k == 0 {
        return Vec::new();
    }
    debug_assert_eq!(query.len(), graph.dimension());

    let results = match graph.entry_point() {
        Some(ep) => with_visited(graph.len(), |visited| {
            let start = if ep.level > 0 {
                greedy_descent(graph, query, ep.id, ep.level, 1).id
            } else {
                ep.id
            };

            let by_label = |id: u32| graph.label_of(id).map_or(false, filter_fn);
            let base_ef = graph.ef_search().max(k);
            let max_ef = (base_ef * 4).min(graph.len());
            let mut ef = base_ef;
            loop {
                let found = search_layer(
                    graph,
                    query,
                    std::slice::from_ref(&start),
                    ef,
                    0,
                    visited,
                    &by_label,
                );
                if found.len() >= k || ef >= max_ef {
                    break found;
                }
                ef = (ef * 2).min(max_ef);
            }
        }),
        None => Vec::new(),
    };

    let out: Vec<(u64, f32)> = results
        .into_iter()
        .take(k)
        .filter_map(|s| graph.label_of(s.id).map(|label| (label, s.distance.0)))
        .collect();

    if out.len() < k && !graph.is_empty() {
        tracing::warn!(
            "Retrieved {} items instead of {}. Items in the index: {}",
            out.len(),
            k,
            graph.len()
        );
    }
    out
}

/// Exact KNN by linear scan. Baseline for recall measurements; `O(n)` per query.
pub fn brute_force_knn(graph: &HnswGraph, query: &[f32], k: usize) -> Vec<(u64, f32)> {
    let mut all: Vec<Scored> = graph
        .arena
        .iter()
        .map(|(id, node)| Scored::new(graph.distance(query, &node.vector), id))
        .collect();
    all.sort_unstable();
    all.into_iter()
        .take(k)
        .filter_map(|s| graph.label_of(s.id).map(|label| (label, s.distance.0)))
        .collect()
}
