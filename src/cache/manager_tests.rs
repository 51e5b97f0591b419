use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backend::CacheBackend;
use super::error::CacheError;
use super::manager::CacheManager;
use super::memory::MemoryCache;
use super::test_support::{BrokenBackend, UndeletableBackend};

const HOUR: Duration = Duration::from_secs(3600);

fn manager() -> CacheManager {
    CacheManager::new(Arc::new(MemoryCache::new(10, HOUR)))
}

#[test]
fn test_hit_rate_zero_without_requests() {
    let manager = manager();
    assert_eq!(manager.hit_rate(), 0.0);
    assert_eq!(manager.metrics().hits + manager.metrics().misses, 0);
}

#[test]
fn test_hits_misses_and_rate() {
    let manager = manager();
    manager.set("a", b"1", None).unwrap();

    assert!(manager.get("a").is_some());
    assert!(manager.get("a").is_some());
    assert!(manager.get("a").is_some());
    assert!(manager.get("missing").is_none());

    let metrics = manager.metrics();
    assert_eq!(metrics.hits, 3);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.sets, 1);
    assert!((metrics.hit_rate - 0.75).abs() < 1e-9);
}

#[test]
fn test_delete_counts() {
    let manager = manager();
    manager.set("a", b"1", None).unwrap();

    assert!(manager.delete("a"));
    assert!(!manager.delete("a"));
    assert_eq!(manager.metrics().deletes, 2);
}

#[test]
fn test_json_helpers() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        claim: String,
        score: f32,
    }

    let manager = manager();
    let payload = Payload {
        claim: "water is wet".to_string(),
        score: 0.5,
    };
    assert!(manager.set_json("p", &payload, None).unwrap());

    let read: Payload = manager.get_json("p").unwrap();
    assert_eq!(read, payload);
}

#[test]
fn test_undecodable_json_is_a_miss() {
    let manager = manager();
    manager.set("p", b"not json", None).unwrap();

    let read: Option<Vec<u32>> = manager.get_json("p");
    assert!(read.is_none());

    let metrics = manager.metrics();
    assert_eq!(metrics.hits, 0);
    assert_eq!(metrics.misses, 1);
    assert!(manager.backend().get("p").unwrap().is_none());
}

#[test]
fn test_failed_drop_of_undecodable_value_is_counted() {
    let manager = CacheManager::new(Arc::new(UndeletableBackend(MemoryCache::new(10, HOUR))));
    manager.set("p", b"not json", None).unwrap();

    let read: Option<Vec<u32>> = manager.get_json("p");
    assert!(read.is_none());

    let metrics = manager.metrics();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.errors, 1);
    assert!(manager.backend().get("p").unwrap().is_some());
}

#[test]
fn test_backend_errors_degrade() {
    let manager = CacheManager::new(Arc::new(BrokenBackend));

    assert!(manager.get("k").is_none());
    assert!(!manager.set("k", b"v", None).unwrap());
    assert!(!manager.delete("k"));
    assert!(!manager.clear());
    assert!(manager.report().backend.is_none());

    let metrics = manager.metrics();
    assert_eq!(metrics.errors, 5);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.sets, 0);
}

#[test]
fn test_zero_ttl_still_surfaces() {
    let failing = CacheManager::new(Arc::new(BrokenBackend));
    let err = failing.set("k", b"v", Some(Duration::ZERO)).unwrap_err();
    assert!(matches!(err, CacheError::InvalidTtl));

    assert!(matches!(
        manager().set("k", b"v", Some(Duration::ZERO)),
        Err(CacheError::InvalidTtl)
    ));
}

#[test]
fn test_reset_metrics() {
    let manager = manager();
    manager.get("missing");
    manager.reset_metrics();
    assert_eq!(manager.metrics().misses, 0);
}
