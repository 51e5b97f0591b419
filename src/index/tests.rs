use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use super::hnsw::HnswConfig;
use super::*;
use crate::evidence::QueryScores;
use crate::snapshot::SnapshotError;

fn record(i: usize) -> EvidenceRecord {
    EvidenceRecord::new(format!("ev-{i}"), format!("Title {i}"), format!("content {i}"))
}

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn filled(config: IndexConfig, n: usize) -> (VectorIndex, Vec<Vec<f32>>) {
    let dim = config.dimension;
    let index = VectorIndex::new(config).unwrap();
    let vectors = random_vectors(n, dim, 42);
    let records: Vec<EvidenceRecord> = (0..n).map(record).collect();
    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    assert!(index.add(&vectors, &records, Some(&ids)).unwrap());
    (index, vectors)
}

fn graph_config(dim: usize) -> IndexConfig {
    IndexConfig::new(dim)
        .with_hnsw(HnswConfig::default().with_m(8).with_ef_construction(64))
        .with_exact_search_threshold(0)
}

mod add_search_tests {
    use super::*;

    #[test]
    fn test_add_and_search_nearest() {
        let index = VectorIndex::new(IndexConfig::new(2)).unwrap();
        let vectors = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]];
        let records: Vec<EvidenceRecord> = (0..3).map(record).collect();
        index.add(&vectors, &records, None).unwrap();

        let hits = index.search(&[0.9, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[0].metadata.id, "ev-1");
        assert_eq!(hits[1].position, 0);
        assert!(hits[0].similarity > hits[1].similarity);
        assert!(hits.iter().all(|h| h.similarity > 0.0 && h.similarity <= 1.0));
    }

    #[test]
    fn test_identical_vector_has_similarity_one() {
        let (index, vectors) = filled(IndexConfig::new(4), 10);
        let hits = index.search(&vectors[3], 1).unwrap();
        assert_eq!(hits[0].position, 3);
        assert_eq!(hits[0].similarity, 1.0);
    }

    #[test]
    fn test_length_mismatch_is_rejected_before_writing() {
        let index = VectorIndex::new(IndexConfig::new(2)).unwrap();
        let vectors = vec![vec![0.0, 0.0], vec![1.0, 1.0]];

        let err = index.add(&vectors, &[record(0)], None).unwrap_err();
        assert!(matches!(
            err,
            IndexError::LengthMismatch {
                field: "metadata",
                expected: 2,
                actual: 1
            }
        ));

        let ids = vec!["a".to_string()];
        let err = index
            .add(&vectors, &[record(0), record(1)], Some(&ids))
            .unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { field: "ids", .. }));
        assert!(index.is_empty());
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let index = VectorIndex::new(IndexConfig::new(3)).unwrap();
        let vectors = vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0]];
        let err = index
            .add(&vectors, &[record(0), record(1)], None)
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty());

        assert!(matches!(
            index.search(&[1.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_batch_returns_false() {
        let index = VectorIndex::new(IndexConfig::new(2)).unwrap();
        assert!(!index.add(&[], &[], None).unwrap());
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_empty_index_and_zero_k() {
        let index = VectorIndex::new(IndexConfig::new(2)).unwrap();
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());

        let (index, _) = filled(IndexConfig::new(2), 5);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_top_k_larger_than_index() {
        let (index, _) = filled(IndexConfig::new(3), 4);
        assert_eq!(index.search(&[0.0, 0.0, 0.0], 50).unwrap().len(), 4);
    }

    #[test]
    fn test_graph_mode_search_returns_sorted_hits() {
        let (index, vectors) = filled(graph_config(8), 300);
        assert!(!index.stats().exhaustive);

        let hits = index.search(&vectors[17], 10).unwrap();
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].position, 17);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_stored_metadata_has_no_scores_or_embedding() {
        let index = VectorIndex::new(IndexConfig::new(2)).unwrap();
        let mut rec = record(0).with_embedding(vec![1.0, 2.0]);
        rec.scores = QueryScores {
            similarity_score: Some(0.9),
            final_rank: Some(1),
            ..Default::default()
        };
        index.add(&[vec![1.0, 2.0]], &[rec], None).unwrap();

        let stored = index.get(0).unwrap();
        assert!(stored.embedding.is_none());
        assert!(stored.scores.is_empty());
        assert_eq!(index.vector(0), Some(vec![1.0, 2.0]));
        assert_eq!(index.vector(1), None);
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn test_get_by_id() {
        let (index, _) = filled(IndexConfig::new(2), 5);
        let (pos, rec) = index.get_by_id("ev-3").unwrap();
        assert_eq!(pos, 3);
        assert_eq!(rec.title, "Title 3");
        assert_eq!(index.position_of("ev-0"), Some(0));
        assert!(index.get_by_id("missing").is_none());
    }

    #[test]
    fn test_repeated_id_points_at_newest_and_empty_ids_skipped() {
        let index = VectorIndex::new(IndexConfig::new(1)).unwrap();
        let ids = vec!["dup".to_string(), String::new(), "dup".to_string()];
        let records = vec![record(0), record(1), record(2)];
        index
            .add(&[vec![0.0], vec![1.0], vec![2.0]], &records, Some(&ids))
            .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.position_of("dup"), Some(2));
        assert_eq!(index.position_of(""), None);
        assert_eq!(index.stats().registered_ids, 1);
    }

    #[test]
    fn test_generation_moves_on_every_write() {
        let dir = TempDir::new().unwrap();
        let index = VectorIndex::new(IndexConfig::new(2)).unwrap();
        assert_eq!(index.generation(), 0);

        assert!(!index.add(&[], &[], None).unwrap());
        assert_eq!(index.generation(), 0);

        index.add(&[vec![1.0, 0.0]], &[record(0)], None).unwrap();
        let after_add = index.generation();
        assert!(after_add > 0);
        index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(index.generation(), after_add);

        index.persist(dir.path()).unwrap();
        index.clear();
        let after_clear = index.generation();
        assert!(after_clear > after_add);
        index.reload(dir.path()).unwrap();
        assert!(index.generation() > after_clear);
    }

    #[test]
    fn test_clear_resets_everything() {
        let (index, _) = filled(IndexConfig::new(2), 5);
        index.clear();
        assert!(index.is_empty());
        assert!(index.get_by_id("ev-1").is_none());
        assert_eq!(index.stats().registered_ids, 0);
        assert_eq!(index.dimension(), 2);

        index.add(&[vec![1.0, 1.0]], &[record(9)], None).unwrap();
        assert_eq!(index.len(), 1);
    }
}

mod persist_tests {
    use super::*;

    fn positions(index: &VectorIndex, queries: &[Vec<f32>]) -> Vec<Vec<usize>> {
        queries
            .iter()
            .map(|q| {
                index
                    .search(q, 10)
                    .unwrap()
                    .iter()
                    .map(|h| h.position)
                    .collect()
            })
            .collect()
    }

    fn assert_round_trip(config: IndexConfig) {
        let dir = TempDir::new().unwrap();
        let (index, _) = filled(config.clone(), 250);
        let queries = random_vectors(15, config.dimension, 7);
        let before = positions(&index, &queries);

        index.persist(dir.path()).unwrap();
        assert!(VectorIndex::exists(dir.path()));

        let reloaded = VectorIndex::open(config, dir.path()).unwrap();
        assert_eq!(reloaded.len(), 250);
        assert_eq!(positions(&reloaded, &queries), before);
        assert_eq!(reloaded.get_by_id("ev-100").unwrap().0, 100);
        assert_eq!(reloaded.get(5), index.get(5));
    }

    #[test]
    fn test_reload_gives_identical_results_in_graph_mode() {
        assert_round_trip(graph_config(6));
    }

    #[test]
    fn test_reload_gives_identical_results_in_exact_mode() {
        assert_round_trip(IndexConfig::new(6));
    }

    #[test]
    fn test_open_without_files_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(!VectorIndex::exists(dir.path()));
        let index = VectorIndex::open(IndexConfig::new(4), dir.path()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_reload_rejects_other_dimension() {
        let dir = TempDir::new().unwrap();
        let (index, _) = filled(IndexConfig::new(4), 5);
        index.persist(dir.path()).unwrap();

        let other = VectorIndex::new(IndexConfig::new(8)).unwrap();
        assert!(matches!(
            other.reload(dir.path()),
            Err(IndexError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_reload_rejects_mismatched_side_table() {
        let dir = TempDir::new().unwrap();
        let (index, _) = filled(IndexConfig::new(4), 5);
        index.persist(dir.path()).unwrap();

        let path = dir.path().join(METADATA_FILE);
        let mut table: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        table["node_count"] = serde_json::json!(6);
        std::fs::write(&path, serde_json::to_vec(&table).unwrap()).unwrap();

        let fresh = VectorIndex::new(IndexConfig::new(4)).unwrap();
        assert!(matches!(
            fresh.reload(dir.path()),
            Err(IndexError::Corrupted { .. })
        ));
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_reload_detects_tampered_graph() {
        let dir = TempDir::new().unwrap();
        let (index, _) = filled(IndexConfig::new(4), 5);
        index.persist(dir.path()).unwrap();

        let path = dir.path().join(INDEX_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let err = index.reload(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Snapshot(SnapshotError::ChecksumMismatch)
        ));
        // Failed reload leaves the live state alone.
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_reload_applies_saved_exact_search_threshold() {
        let dir = TempDir::new().unwrap();
        let (index, _) = filled(IndexConfig::new(4).with_exact_search_threshold(1000), 20);
        index.persist(dir.path()).unwrap();

        let reloaded = VectorIndex::open(graph_config(4), dir.path()).unwrap();
        assert_eq!(reloaded.exact_search_threshold(), 1000);
        assert!(reloaded.stats().exhaustive);

        reloaded.clear();
        assert_eq!(reloaded.exact_search_threshold(), 0);
    }

    #[test]
    fn test_persist_overwrites_previous_copy() {
        let dir = TempDir::new().unwrap();
        let (index, _) = filled(IndexConfig::new(3), 4);
        index.persist(dir.path()).unwrap();
        index.add(&[vec![0.5, 0.5, 0.5]], &[record(4)], None).unwrap();
        index.persist(dir.path()).unwrap();

        let reloaded = VectorIndex::open(IndexConfig::new(3), dir.path()).unwrap();
        assert_eq!(reloaded.len(), 5);
    }
}

mod concurrency_tests {
    use super::*;

    #[test]
    fn test_concurrent_add_and_search_stay_aligned() {
        let index = Arc::new(VectorIndex::new(graph_config(4)).unwrap());
        let writer = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for batch in 0..20 {
                    let vectors = random_vectors(10, 4, batch);
                    let records: Vec<EvidenceRecord> =
                        (0..10).map(|i| record(batch as usize * 10 + i)).collect();
                    index.add(&vectors, &records, None).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|seed| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for q in random_vectors(50, 4, 100 + seed) {
                        for hit in index.search(&q, 5).unwrap() {
                            let expected = format!("ev-{}", hit.position);
                            assert_eq!(hit.metadata.id, expected);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(index.len(), 200);
    }
}
