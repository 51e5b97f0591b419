//! Tests against a live server.
//! Run with: cargo test --lib distributed -- --ignored

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::backend::CacheBackend;
use super::distributed::RedisCache;

const HOUR: Duration = Duration::from_secs(3600);

fn redis_url() -> String {
    std::env::var("FACTLENS_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into())
}

fn unique_prefix() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!(
        "factlens-test:{}:{}:",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

fn connect(prefix: &str, max_size: usize) -> RedisCache {
    let cache = RedisCache::connect(&redis_url(), prefix, max_size, HOUR);
    assert!(!cache.is_fallback(), "redis not reachable at {}", redis_url());
    cache
}

#[test]
#[ignore]
fn test_redis_access_counts_and_lru() {
    let prefix = unique_prefix();
    let cache = connect(&prefix, 2);
    cache.set("a", b"1", None).unwrap();
    cache.set("b", b"2", None).unwrap();
    for _ in 0..3 {
        cache.get("a").unwrap();
    }
    assert_eq!(cache.get_entry("a").unwrap().unwrap().access_count, 4);

    cache.set("c", b"3", None).unwrap();
    assert_eq!(cache.get("b").unwrap(), None);
    assert_eq!(cache.get("a").unwrap(), Some(b"1".to_vec()));

    let stats = cache.stats().unwrap();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.total_accesses, 5);
    cache.clear().unwrap();
}

#[test]
#[ignore]
fn test_redis_reads_never_clobber_writes() {
    let prefix = unique_prefix();
    let writer = connect(&prefix, 10);
    let reader = connect(&prefix, 10);
    writer.set("k", b"0", None).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..200 {
                reader.get("k").unwrap();
            }
        });
        scope.spawn(|| {
            for i in 1..=200 {
                writer.set("k", i.to_string().as_bytes(), None).unwrap();
            }
        });
    });

    assert_eq!(writer.get("k").unwrap(), Some(b"200".to_vec()));
    writer.clear().unwrap();
}

#[test]
#[ignore]
fn test_redis_concurrent_writers_respect_max_size() {
    let prefix = unique_prefix();
    let first = connect(&prefix, 5);
    let second = connect(&prefix, 5);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..50 {
                first.set(&format!("a{i}"), b"v", None).unwrap();
            }
        });
        scope.spawn(|| {
            for i in 0..50 {
                second.set(&format!("b{i}"), b"v", None).unwrap();
            }
        });
    });

    assert_eq!(first.stats().unwrap().entries, 5);
    first.clear().unwrap();
}
