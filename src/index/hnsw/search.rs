//! Layer search, multi-layer k-NN and the exhaustive fallback.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::distance::squared_l2;
use super::graph::HnswGraph;
use super::visited::VisitedSet;

thread_local! {
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// Frontier entry; `BinaryHeap` is a max-heap, so the distance is negated.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.neg_distance
            .cmp(&other.neg_distance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result entry; max-heap by distance so the worst result is on top.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders `(distance, id)` pairs closest first, ties by id.
#[inline]
pub(crate) fn by_distance_then_id(a: &(f32, u32), b: &(f32, u32)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Best-first search of one layer. Returns up to `ef` `(distance, id)` pairs, closest first.
pub(crate) fn search_layer(
    graph: &HnswGraph,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
) -> Vec<(f32, u32)> {
    visited.clear();
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    let mut worst = f32::MAX;

    for &ep in entry_points {
        if !visited.insert(ep) {
            continue;
        }
        let dist = squared_l2(query, graph.vector(ep));
        candidates.push(Candidate {
            neg_distance: OrderedFloat(-dist),
            id: ep,
        });
        results.push(ResultEntry {
            distance: OrderedFloat(dist),
            id: ep,
        });
        if results.len() > ef {
            results.pop();
        }
        worst = results.peek().map_or(f32::MAX, |r| r.distance.0);
    }

    while let Some(candidate) = candidates.pop() {
        let c_dist = -candidate.neg_distance.0;
        if results.len() >= ef && c_dist > worst {
            break;
        }

        for &neighbor in graph.neighbors_at(candidate.id, layer) {
            if !visited.insert(neighbor) {
                continue;
            }
            let dist = squared_l2(query, graph.vector(neighbor));
            if results.len() < ef || dist < worst {
                candidates.push(Candidate {
                    neg_distance: OrderedFloat(-dist),
                    id: neighbor,
                });
                results.push(ResultEntry {
                    distance: OrderedFloat(dist),
                    id: neighbor,
                });
                if results.len() > ef {
                    results.pop();
                }
                worst = results.peek().map_or(f32::MAX, |r| r.distance.0);
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// Greedy descent from the entry point to layer 0, then an `ef`-wide search there.
pub fn knn_search(graph: &HnswGraph, query: &[f32], k: usize, ef: usize) -> Vec<(f32, u32)> {
    let Some(entry_point) = graph.entry_point else {
        return Vec::new();
    };

    SEARCH_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();
        visited.ensure_capacity(graph.len());

        let mut current = entry_point;
        for layer in (1..=graph.max_layer).rev() {
            let nearest = search_layer(
                graph,
                query,
                std::slice::from_ref(&current),
                1,
                layer,
                &mut visited,
            );
            if let Some(&(_, id)) = nearest.first() {
                current = id;
            }
        }

        let mut results = search_layer(
            graph,
            query,
            std::slice::from_ref(&current),
            ef.max(k),
            0,
            &mut visited,
        );
        results.truncate(k);
        results
    })
}

/// Scores every node. Rank order is exact, ties broken by id.
pub fn exact_search(graph: &HnswGraph, query: &[f32], k: usize) -> Vec<(f32, u32)> {
    let mut scored: Vec<(f32, u32)> = (0..graph.len() as u32)
        .map(|id| (squared_l2(query, graph.vector(id)), id))
        .collect();
    scored.sort_by(by_distance_then_id);
    scored.truncate(k);
    scored
}
