use std::time::Duration;

use super::backend::CacheBackend;
use super::error::CacheError;
use super::memory::MemoryCache;
use super::types::BackendKind;

const HOUR: Duration = Duration::from_secs(3600);

#[test]
fn test_memory_set_and_get() {
    let cache = MemoryCache::new(10, HOUR);
    cache.set("k", b"value", None).unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(b"value".to_vec()));
    assert_eq!(cache.get("missing").unwrap(), None);
    assert_eq!(cache.kind(), BackendKind::Memory);
}

#[test]
fn test_memory_set_is_idempotent() {
    let cache = MemoryCache::new(10, HOUR);
    cache.set("k", b"v", None).unwrap();
    cache.set("k", b"v", None).unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(cache.len(), 1);

    let entry = cache.peek("k").expect("entry present");
    assert_eq!(entry.access_count, 1);
}

#[test]
fn test_memory_access_count_tracks_every_get() {
    let cache = MemoryCache::new(10, HOUR);
    cache.set("k", b"v", None).unwrap();
    for _ in 0..5 {
        cache.get("k").unwrap();
    }

    let entry = cache.peek("k").unwrap();
    assert_eq!(entry.access_count, 5);
    assert_eq!(cache.get_entry("k").unwrap().unwrap().access_count, 6);
    assert_eq!(cache.stats().unwrap().total_accesses, 6);
}

#[test]
fn test_memory_replace_resets_entry() {
    let cache = MemoryCache::new(10, HOUR);
    cache.set("k", b"old", None).unwrap();
    cache.get("k").unwrap();
    cache.set("k", b"new", Some(Duration::from_secs(5))).unwrap();

    let entry = cache.peek("k").unwrap();
    assert_eq!(entry.value, b"new".to_vec());
    assert_eq!(entry.access_count, 0);
    assert_eq!(entry.ttl(), Duration::from_secs(5));
}

#[test]
fn test_memory_lru_evicts_exactly_one_oldest() {
    let cache = MemoryCache::new(2, HOUR);
    cache.set("a", b"1", None).unwrap();
    cache.set("b", b"2", None).unwrap();
    assert!(cache.get("a").unwrap().is_some());

    cache.set("c", b"3", None).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.contains_key("a"));
    assert!(!cache.contains_key("b"));
    assert!(cache.contains_key("c"));
}

#[test]
fn test_memory_replacing_at_capacity_does_not_evict() {
    let cache = MemoryCache::new(2, HOUR);
    cache.set("a", b"1", None).unwrap();
    cache.set("b", b"2", None).unwrap();
    cache.set("a", b"1b", None).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.contains_key("a"));
    assert!(cache.contains_key("b"));
}

#[test]
fn test_memory_size_never_exceeds_max() {
    let cache = MemoryCache::new(3, HOUR);
    for i in 0..20 {
        cache.set(&format!("key-{i}"), b"x", None).unwrap();
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.len(), 3);
    assert!(cache.contains_key("key-19"));
}

#[test]
fn test_memory_entry_expires_on_get() {
    let cache = MemoryCache::new(10, HOUR);
    cache
        .set("short", b"v", Some(Duration::from_millis(50)))
        .unwrap();
    assert!(cache.get("short").unwrap().is_some());

    std::thread::sleep(Duration::from_millis(120));

    assert_eq!(cache.get("short").unwrap(), None);
    assert!(!cache.contains_key("short"));
}

#[test]
fn test_memory_zero_ttl_rejected() {
    let cache = MemoryCache::new(10, HOUR);
    let err = cache.set("k", b"v", Some(Duration::ZERO)).unwrap_err();

    assert!(matches!(err, CacheError::InvalidTtl));
    assert!(cache.is_empty());
}

#[test]
fn test_memory_delete_and_clear() {
    let cache = MemoryCache::new(10, HOUR);
    cache.set("a", b"1", None).unwrap();
    cache.set("b", b"2", None).unwrap();

    assert!(cache.delete("a").unwrap());
    assert!(!cache.delete("a").unwrap());

    cache.clear().unwrap();
    assert!(cache.is_empty());
}

#[test]
fn test_memory_sweep_and_stats() {
    let cache = MemoryCache::new(10, HOUR);
    cache.set("keep", b"1", None).unwrap();
    cache.set("drop", b"2", Some(Duration::from_millis(20))).unwrap();
    cache.get("keep").unwrap();

    std::thread::sleep(Duration::from_millis(60));

    let stats = cache.stats().unwrap();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.expired_entries, 1);
    assert_eq!(stats.total_accesses, 1);
    assert_eq!(stats.max_size, 10);

    assert_eq!(cache.sweep_expired().unwrap(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.sweep_expired().unwrap(), 0);
}

#[test]
fn test_memory_sweep_interval() {
    let cache = MemoryCache::new(10, HOUR).with_sweep_interval(Duration::from_secs(7));
    assert_eq!(cache.sweep_interval(), Some(Duration::from_secs(7)));
}
