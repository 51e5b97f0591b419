use super::*;
use crate::embedding::mock::MockCrossEncoder;
use tempfile::TempDir;

fn record(id: &str, title: &str, content: &str, similarity: f32) -> EvidenceRecord {
    let mut r = EvidenceRecord::new(id, title, content);
    r.scores.similarity_score = Some(similarity);
    r
}

fn corpus() -> Vec<EvidenceRecord> {
    vec![
        record(
            "digital",
            "Digital India initiative",
            "Government expands broadband access in rural districts.",
            0.62,
        ),
        record(
            "social",
            "Misinformation on social media",
            "Platforms struggle to moderate viral false claims.",
            0.58,
        ),
        record(
            "vaccine",
            "Vaccine safety",
            "Clinical trials and monitoring confirm vaccine safety for the public.",
            0.55,
        ),
    ]
}

fn ids(records: &[EvidenceRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

mod config_tests {
    use super::*;

    #[test]
    fn test_reranker_config_defaults() {
        let config = RerankerConfig::default();
        assert!(config.model_path.is_none());
        assert_eq!(config.max_passage_chars, DEFAULT_MAX_PASSAGE_CHARS);
        assert_eq!(config.fusion, ScoreFusion::new(0.3, 0.7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reranker_config_validation() {
        assert!(
            RerankerConfig::stub()
                .with_max_passage_chars(0)
                .validate()
                .is_err()
        );
        assert!(RerankerConfig::new("").validate().is_err());
        assert!(
            RerankerConfig::stub()
                .with_fusion(ScoreFusion::new(-1.0, 0.5))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let err = Reranker::load(RerankerConfig::stub().with_max_passage_chars(0)).unwrap_err();
        assert!(matches!(err, RerankerError::InvalidConfig { .. }));
    }
}

mod encoder_tests {
    use super::*;

    #[test]
    fn test_lexical_full_overlap() {
        let encoder = LexicalCrossEncoder::new();
        assert!((encoder.score("vaccine safety", "Vaccine safety") - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_lexical_no_overlap() {
        let encoder = LexicalCrossEncoder::new();
        assert!((encoder.score("vaccine safety", "monsoon rainfall") + 4.0).abs() < 1e-5);
        assert_eq!(encoder.score("the of and", "anything"), -4.0);
    }

    #[test]
    fn test_lexical_partial_overlap_ranks_between() {
        let encoder = LexicalCrossEncoder::new();
        let full = encoder.score("vaccine safety data", "vaccine safety data");
        let partial = encoder.score("vaccine safety data", "vaccine rollout");
        let none = encoder.score("vaccine safety data", "broadband rollout");
        assert!(full > partial && partial > none);
    }

    #[test]
    fn test_bert_cross_encoder_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            BertCrossEncoder::load(&missing, MAX_SEQ_LEN),
            Err(RerankerError::ModelNotFound { .. })
        ));
        assert!(matches!(
            BertCrossEncoder::load(dir.path(), MAX_SEQ_LEN),
            Err(RerankerError::ModelLoadFailed { .. })
        ));
    }
}

mod rerank_tests {
    use super::*;

    #[test]
    fn test_passage_text_truncates_content() {
        let reranker = Reranker::stub();
        let long = "a".repeat(600);
        let text = reranker.passage_text(&EvidenceRecord::new("e", "Title", long));

        assert!(text.starts_with("Title aaa"));
        assert!(text.ends_with("..."));
        assert_eq!(text.chars().count(), "Title ".len() + 500 + 3);

        let untitled = reranker.passage_text(&EvidenceRecord::new("e", "", "short body"));
        assert_eq!(untitled, "short body");
    }

    #[test]
    fn test_rerank_promotes_relevant_passage() {
        let reranker = Reranker::stub();
        let out = reranker.rerank("vaccine safety and misinformation", &corpus(), None);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].id, "vaccine");
        for r in &out {
            assert!(r.scores.rerank_score.is_some());
            let combined = r.scores.combined_score.unwrap();
            assert!((0.0..=1.0).contains(&combined));
        }
    }

    #[test]
    fn test_rerank_output_is_sorted_by_combined_score() {
        let reranker = Reranker::stub();
        let out = reranker.rerank("social media misinformation claims", &corpus(), None);

        for pair in out.windows(2) {
            assert!(pair[0].scores.combined_score >= pair[1].scores.combined_score);
        }
    }

    #[test]
    fn test_rerank_truncates_to_top_k() {
        let reranker = Reranker::stub();
        let out = reranker.rerank("vaccine safety", &corpus(), Some(1));
        assert_eq!(ids(&out), vec!["vaccine"]);
    }

    #[test]
    fn test_rerank_ties_keep_input_order() {
        let reranker = Reranker::stub();
        let passages = vec![
            record("first", "same title", "same body", 0.5),
            record("second", "same title", "same body", 0.5),
            record("third", "same title", "same body", 0.5),
        ];
        let out = reranker.rerank("unrelated query words", &passages, None);
        assert_eq!(ids(&out), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rerank_empty_input() {
        assert!(Reranker::stub().rerank("q", &[], Some(5)).is_empty());
    }

    #[test]
    fn test_unavailable_is_passthrough() {
        let reranker = Reranker::unavailable(RerankerConfig::stub());
        let passages = corpus();

        assert!(matches!(
            reranker.try_rerank("vaccine safety", &passages, None),
            Err(RerankerError::NotAvailable { .. })
        ));
        let out = reranker.rerank("vaccine safety", &passages, Some(1));
        assert_eq!(out, passages);
    }

    #[test]
    fn test_failing_scorer_is_passthrough() {
        let mock = MockCrossEncoder::failing();
        let reranker =
            Reranker::with_encoder(Box::new(mock.clone()), RerankerConfig::stub()).unwrap();
        let passages = corpus();

        assert!(reranker.try_rerank("q", &passages, None).is_err());
        assert_eq!(reranker.rerank("q", &passages, None), passages);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_short_scorer_output_is_rejected() {
        let encoder = Box::new(MockCrossEncoder::short_output());
        let reranker = Reranker::with_encoder(encoder, RerankerConfig::stub()).unwrap();
        let passages = corpus();

        assert!(matches!(
            reranker.try_rerank("vaccine", &passages, None),
            Err(RerankerError::ScoreCountMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(reranker.rerank("vaccine", &passages, None), passages);
    }

    #[test]
    fn test_fusion_weights_change_order() {
        let similarity_only = Reranker::with_encoder(
            Box::new(LexicalCrossEncoder::new()),
            RerankerConfig::stub().with_fusion(ScoreFusion::new(1.0, 0.0)),
        )
        .unwrap();
        let out = similarity_only.rerank("vaccine safety", &corpus(), None);
        assert_eq!(ids(&out), vec!["digital", "social", "vaccine"]);
    }

    #[test]
    fn test_batch_rerank() {
        let reranker = Reranker::stub();
        let lists = vec![corpus(), corpus()];

        let out = reranker.batch_rerank(&["vaccine safety", "social media"], &lists, Some(1));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0][0].id, "vaccine");
        assert_eq!(out[1][0].id, "social");

        let mismatched = reranker.batch_rerank(&["only one"], &lists, None);
        assert_eq!(mismatched, lists);
    }

    #[test]
    fn test_model_info() {
        let info = Reranker::stub().model_info();
        assert_eq!(info.backend.as_deref(), Some("lexical"));
        assert!(info.model_loaded);
        assert_eq!(info.model_type, "cross_encoder");

        let down = Reranker::unavailable(RerankerConfig::stub()).model_info();
        assert!(!down.model_loaded);
        assert!(down.backend.is_none());
    }

    #[test]
    fn test_load_or_degrade_missing_model() {
        let dir = TempDir::new().unwrap();
        let reranker = Reranker::load_or_degrade(RerankerConfig::new(dir.path().join("absent")));
        assert!(!reranker.is_model_loaded());
    }
}
