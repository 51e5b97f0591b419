//! Node insertion with bidirectional links and heuristic pruning.

use std::collections::HashSet;

use super::distance::squared_l2;
use super::graph::HnswGraph;
use super::search::{by_distance_then_id, search_layer};
use super::visited::VisitedSet;

impl HnswGraph {
    /// Appends `vector` as node `len()` and links it into every layer up to its level.
    ///
    /// The caller guarantees `vector.len() == dimension`.
    pub fn insert(&mut self, vector: &[f32]) -> u32 {
        let id = self.len() as u32;
        let level = self.level_for(id);

        let Some(entry_point) = self.entry_point else {
            self.push_node(vector, level);
            self.entry_point = Some(id);
            self.max_layer = level;
            return id;
        };

        let mut visited = VisitedSet::new(self.len() + 1);
        let mut current = entry_point;

        // Greedy descent through layers the new node will not live on.
        for layer in (level + 1..=self.max_layer).rev() {
            let nearest = search_layer(
                self,
                vector,
                std::slice::from_ref(&current),
                1,
                layer,
                &mut visited,
            );
            if let Some(&(_, nid)) = nearest.first() {
                current = nid;
            }
        }

        let top = level.min(self.max_layer);
        let mut links: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut layer_eps = vec![current];
        for layer in (0..=top).rev() {
            let candidates = search_layer(
                self,
                vector,
                &layer_eps,
                self.config.ef_construction,
                layer,
                &mut visited,
            );
            let selected = select_neighbors_heuristic(self, &candidates, self.max_links(layer));
            links[layer] = selected.iter().map(|&(_, nid)| nid).collect();

            layer_eps.clear();
            layer_eps.extend(candidates.iter().map(|&(_, nid)| nid));
            if layer_eps.is_empty() {
                layer_eps.push(entry_point);
            }
        }

        self.push_node(vector, level);
        self.neighbors[id as usize] = links;

        for layer in 0..=top {
            let max_links = self.max_links(layer);
            let mine = self.neighbors[id as usize][layer].clone();
            for neighbor in mine {
                let nid = neighbor as usize;
                while self.neighbors[nid].len() <= layer {
                    self.neighbors[nid].push(Vec::new());
                }
                self.neighbors[nid][layer].push(id);

                if self.neighbors[nid][layer].len() > max_links {
                    let base = self.vector(neighbor);
                    let candidates: Vec<(f32, u32)> = self.neighbors[nid][layer]
                        .iter()
                        .map(|&cid| (squared_l2(base, self.vector(cid)), cid))
                        .collect();
                    let pruned = select_neighbors_heuristic(self, &candidates, max_links);
                    self.neighbors[nid][layer] = pruned.iter().map(|&(_, cid)| cid).collect();
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(id);
        }
        id
    }

    fn push_node(&mut self, vector: &[f32], level: usize) {
        self.vectors.extend_from_slice(vector);
        self.neighbors.push(vec![Vec::new(); level + 1]);
        self.levels.push(level as u8);
    }
}

/// Keeps a candidate only if it is closer to the base node than to every neighbor already
/// kept; leftover slots are filled with the closest unused candidates.
fn select_neighbors_heuristic(
    graph: &HnswGraph,
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<(f32, u32)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(by_distance_then_id);

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
    for &(dist_to_base, cid) in &sorted {
        if selected.len() >= m {
            break;
        }
        let candidate = graph.vector(cid);
        let diverse = selected
            .iter()
            .all(|&(_, sid)| dist_to_base <= squared_l2(candidate, graph.vector(sid)));
        if diverse {
            selected.push((dist_to_base, cid));
        }
    }

    if selected.len() < m {
        let chosen: HashSet<u32> = selected.iter().map(|&(_, id)| id).collect();
        for &(dist, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !chosen.contains(&cid) {
                selected.push((dist, cid));
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::super::graph::HnswConfig;
    use super::super::search::{exact_search, knn_search};
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect()
    }

    fn build(vectors: &[Vec<f32>], config: HnswConfig) -> HnswGraph {
        let mut graph = HnswGraph::new(vectors[0].len(), config);
        for v in vectors {
            graph.insert(v);
        }
        graph
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut graph = HnswGraph::new(2, HnswConfig::default());
        assert_eq!(graph.insert(&[0.0, 0.0]), 0);
        assert_eq!(graph.insert(&[1.0, 0.0]), 1);
        assert_eq!(graph.insert(&[0.0, 1.0]), 2);
        assert_eq!(graph.len(), 3);
        assert!(graph.check_consistency().is_ok());
    }

    #[test]
    fn test_degree_bounds_hold() {
        let config = HnswConfig::default().with_m(4).with_ef_construction(32);
        let graph = build(&random_vectors(300, 8, 7), config);

        assert!(graph.check_consistency().is_ok());
        for id in 0..graph.len() as u32 {
            assert!(graph.neighbors_at(id, 0).len() <= 8);
            for layer in 1..=graph.levels[id as usize] as usize {
                assert!(graph.neighbors_at(id, layer).len() <= 4);
            }
        }
    }

    #[test]
    fn test_same_seed_builds_same_graph() {
        let vectors = random_vectors(120, 6, 3);
        let config = HnswConfig::default().with_m(6).with_seed(99);
        let a = build(&vectors, config.clone());
        let b = build(&vectors, config);

        assert_eq!(a.neighbors, b.neighbors);
        assert_eq!(a.entry_point, b.entry_point);
    }

    #[test]
    fn test_graph_search_recall_against_exact() {
        let vectors = random_vectors(600, 16, 11);
        let config = HnswConfig::default().with_m(12).with_ef_construction(100);
        let graph = build(&vectors, config);
        let queries = random_vectors(20, 16, 12);

        let mut found = 0;
        for q in &queries {
            let exact: HashSet<u32> = exact_search(&graph, q, 10).iter().map(|r| r.1).collect();
            let approx = knn_search(&graph, q, 10, 128);
            assert_eq!(approx.len(), 10);
            found += approx.iter().filter(|r| exact.contains(&r.1)).count();
        }
        let recall = found as f32 / 200.0;
        assert!(recall >= 0.9, "recall@10 was {recall}");
    }

    #[test]
    fn test_search_finds_exact_vector() {
        let vectors = random_vectors(200, 8, 5);
        let graph = build(&vectors, HnswConfig::default().with_m(8));

        let hits = knn_search(&graph, &vectors[42], 1, 64);
        assert_eq!(hits[0].1, 42);
        assert_eq!(hits[0].0, 0.0);
    }

    #[test]
    fn test_search_empty_graph() {
        let graph = HnswGraph::new(4, HnswConfig::default());
        assert!(knn_search(&graph, &[0.0; 4], 5, 16).is_empty());
        assert!(exact_search(&graph, &[0.0; 4], 5).is_empty());
    }

    #[test]
    fn test_exact_search_orders_by_distance_then_id() {
        let mut graph = HnswGraph::new(1, HnswConfig::default());
        for x in [3.0, 1.0, -1.0, 1.0] {
            graph.insert(&[x]);
        }
        let ids: Vec<u32> = exact_search(&graph, &[0.0], 4).iter().map(|r| r.1).collect();
        assert_eq!(ids, vec![1, 2, 3, 0]);
    }
}
