use super::*;
use tempfile::TempDir;

const DIM: usize = 32;

fn provider_with(mock: &MockEmbeddingBackend, config: EmbeddingConfig) -> EmbeddingProvider {
    EmbeddingProvider::with_backend(Box::new(mock.clone()), config).unwrap()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

mod config_tests {
    use super::*;

    #[test]
    fn test_embedding_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.dimension, crate::constants::DEFAULT_EMBEDDING_DIM);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.flush_every, DEFAULT_FLUSH_EVERY);
        assert!(config.model_path.is_none());
        assert!(config.cache_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embedding_config_rejects_zero_values() {
        let config = EmbeddingConfig::stub(DIM).with_batch_size(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));

        assert!(EmbeddingConfig::stub(0).validate().is_err());
    }

    #[test]
    fn test_embedding_config_rejects_empty_model_path() {
        let config = EmbeddingConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(EmbeddingError::InvalidConfig { .. })
        ));
    }
}

mod provider_tests {
    use super::*;

    #[test]
    fn test_stub_provider_encodes_unit_vectors() {
        let provider = EmbeddingProvider::load(EmbeddingConfig::stub(DIM)).unwrap();
        let v = provider.encode("Vaccines undergo clinical trials").unwrap();

        assert_eq!(v.len(), DIM);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
        assert_eq!(provider.backend_name(), Some("hashing"));
        assert!(provider.is_available());
    }

    #[test]
    fn test_encode_is_deterministic_and_whitespace_insensitive() {
        let provider = EmbeddingProvider::load(EmbeddingConfig::stub(DIM)).unwrap();
        let a = provider.encode("monsoon  rainfall\nforecast").unwrap();
        let b = provider.encode(" monsoon rainfall forecast ").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_empty_text_bypasses_cache() {
        let mock = MockEmbeddingBackend::new(DIM);
        let provider = provider_with(&mock, EmbeddingConfig::stub(DIM));

        let v = provider.encode("   \n\t ").unwrap();

        assert_eq!(v, vec![0.0; DIM]);
        assert_eq!(mock.calls(), 0);
        assert_eq!(provider.cached_entries(), 0);
    }

    #[test]
    fn test_encode_hits_cache_on_repeat() {
        let mock = MockEmbeddingBackend::new(DIM);
        let provider = provider_with(&mock, EmbeddingConfig::stub(DIM));

        let first = provider.encode("election results").unwrap();
        let second = provider.encode("election   results").unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.calls(), 1);
        assert_eq!(provider.cached_entries(), 1);
    }

    #[test]
    fn test_unavailable_provider() {
        let provider = EmbeddingProvider::unavailable(EmbeddingConfig::stub(DIM));

        assert!(!provider.is_available());
        assert!(matches!(
            provider.encode("anything"),
            Err(EmbeddingError::Unavailable { .. })
        ));
        assert!(matches!(
            provider.encode_batch(&["a", "b"]),
            Err(EmbeddingError::Unavailable { .. })
        ));
        assert_eq!(provider.model_info().backend, None);
    }

    #[test]
    fn test_load_or_degrade_with_missing_model() {
        let dir = TempDir::new().unwrap();
        let provider = EmbeddingProvider::load_or_degrade(EmbeddingConfig::new(dir.path()));
        assert!(!provider.is_available());
    }

    #[test]
    fn test_backend_dimension_must_match() {
        let mock = MockEmbeddingBackend::new(DIM + 1);
        let err = EmbeddingProvider::with_backend(Box::new(mock), EmbeddingConfig::stub(DIM))
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: DIM,
                actual: 33
            }
        ));
    }

    #[test]
    fn test_encode_batch_only_computes_misses_and_keeps_order() {
        let mock = MockEmbeddingBackend::new(DIM);
        let provider = provider_with(&mock, EmbeddingConfig::stub(DIM).with_batch_size(2));

        let cached = provider.encode("alpha").unwrap();
        assert_eq!(mock.texts_seen(), 1);

        let texts = ["beta", "alpha", "", "gamma", "delta"];
        let out = provider.encode_batch(&texts).unwrap();

        assert_eq!(out.len(), 5);
        assert_eq!(out[1], cached);
        assert_eq!(out[2], vec![0.0; DIM]);
        assert_eq!(out[0], provider.encode("beta").unwrap());
        assert_eq!(out[4], provider.encode("delta").unwrap());
        // beta, gamma, delta in chunks of two.
        assert_eq!(mock.texts_seen(), 4);
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn test_encode_batch_failed_chunk_becomes_zero_vectors() {
        let mock = MockEmbeddingBackend::new(DIM).failing_on("poison");
        let provider = provider_with(&mock, EmbeddingConfig::stub(DIM).with_batch_size(2));

        let out = provider
            .encode_batch(&["poison pill", "neighbor", "healthy text"])
            .unwrap();

        assert_eq!(out[0], vec![0.0; DIM]);
        assert_eq!(out[1], vec![0.0; DIM]);
        assert!(dot(&out[2], &out[2]) > 0.99);
        assert_eq!(provider.cached_entries(), 1);
    }

    #[test]
    fn test_wrong_output_dimension_is_rejected() {
        let mock = MockEmbeddingBackend::new(DIM).emitting_dimension(DIM / 2);
        let provider = provider_with(&mock, EmbeddingConfig::stub(DIM));

        assert!(matches!(
            provider.encode("text"),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
        assert_eq!(provider.encode_batch(&["text"]).unwrap()[0], vec![0.0; DIM]);
    }

    #[test]
    fn test_compute_similarity() {
        let provider = EmbeddingProvider::unavailable(EmbeddingConfig::stub(DIM));

        assert!((provider.compute_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(provider.compute_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(provider.compute_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(provider.compute_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_find_similar_sorted_descending() {
        let provider = EmbeddingProvider::unavailable(EmbeddingConfig::stub(DIM));
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.1], vec![1.0, 1.0]];

        let ranked = provider.find_similar(&[1.0, 0.0], &candidates, 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 1);
        assert_eq!(ranked[1].0, 2);
        assert!(ranked[0].1 >= ranked[1].1);
    }
}

mod cache_file_tests {
    use super::*;

    #[test]
    fn test_cache_file_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.rkyv");
        let config = EmbeddingConfig::stub(DIM).with_cache_path(&path);

        let first = EmbeddingProvider::load(config.clone()).unwrap();
        let original = first.encode("persist me").unwrap();
        assert_eq!(first.flush().unwrap(), 1);
        assert!(path.exists());

        let mock = MockEmbeddingBackend::new(DIM);
        let second = provider_with(&mock, config);
        assert_eq!(second.cached_entries(), 1);
        assert_eq!(second.encode("persist me").unwrap(), original);
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn test_cache_file_flushes_every_n_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.rkyv");
        let config = EmbeddingConfig::stub(DIM)
            .with_cache_path(&path)
            .with_flush_every(3);
        let provider = EmbeddingProvider::load(config).unwrap();

        provider.encode("one").unwrap();
        provider.encode("two").unwrap();
        assert!(!path.exists());

        provider.encode("three").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_cache_file_with_other_dimension_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.rkyv");

        let small =
            EmbeddingProvider::load(EmbeddingConfig::stub(8).with_cache_path(&path)).unwrap();
        small.encode("text").unwrap();
        small.flush().unwrap();

        let large =
            EmbeddingProvider::load(EmbeddingConfig::stub(DIM).with_cache_path(&path)).unwrap();
        assert_eq!(large.cached_entries(), 0);
        assert_eq!(large.encode("text").unwrap().len(), DIM);
    }

    #[test]
    fn test_corrupt_cache_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.rkyv");
        std::fs::write(&path, b"definitely not a cache file").unwrap();

        let provider =
            EmbeddingProvider::load(EmbeddingConfig::stub(DIM).with_cache_path(&path)).unwrap();
        assert_eq!(provider.cached_entries(), 0);
    }

    #[test]
    fn test_failed_flush_keeps_pending_count() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = EmbeddingConfig::stub(DIM)
            .with_cache_path(blocker.join("embeddings.rkyv"))
            .with_flush_every(2);
        let provider = EmbeddingProvider::load(config).unwrap();

        provider.encode("one").unwrap();
        provider.encode("two").unwrap();
        assert_eq!(provider.unflushed_entries(), 2);
        assert!(provider.flush().is_err());
        assert_eq!(provider.unflushed_entries(), 2);

        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(provider.flush().unwrap(), 2);
        assert_eq!(provider.unflushed_entries(), 0);
    }

    #[test]
    fn test_flush_without_path_is_noop() {
        let provider = EmbeddingProvider::load(EmbeddingConfig::stub(DIM)).unwrap();
        provider.encode("text").unwrap();
        assert_eq!(provider.flush().unwrap(), 0);
    }

    #[test]
    fn test_model_info() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.rkyv");
        let provider =
            EmbeddingProvider::load(EmbeddingConfig::stub(DIM).with_cache_path(&path)).unwrap();
        provider.encode("a").unwrap();
        provider.encode("b").unwrap();

        let info = provider.model_info();
        assert_eq!(info.backend.as_deref(), Some("hashing"));
        assert_eq!(info.dimension, DIM);
        assert_eq!(info.cached_entries, 2);
        assert_eq!(info.cache_path, Some(path));
    }
}
