//! BLAKE3-based keys for embedding caches, query-result caches and feature hashing.

use blake3::Hasher;

/// Trims and collapses internal whitespace runs to a single space.
///
/// Everything that hashes text for a cache key goes through this first, so `"a  b"` and
/// `" a b "` share one entry.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the hex BLAKE3 digest of the normalized text.
#[inline]
pub fn hash_text(text: &str) -> String {
    blake3::hash(normalize_text(text).as_bytes())
        .to_hex()
        .to_string()
}

/// Computes a 64-bit hash of the input using BLAKE3, truncated from 256 bits.
///
/// Used for feature hashing and other places where a collision only costs precision,
/// never correctness. Use [`hash_text`] when the value is a cache key.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Cache key for a full `retrieve_and_rerank` call.
///
/// Fields are separated so `("ab", 1)` and `("a", "b1")` can never collide.
pub fn hash_query(
    query: &str,
    initial_top_k: usize,
    final_top_k: usize,
    min_similarity: f32,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"query|");
    hasher.update(normalize_text(query).as_bytes());
    hasher.update(b"|");
    hasher.update(&(initial_top_k as u64).to_le_bytes());
    hasher.update(&(final_top_k as u64).to_le_bytes());
    hasher.update(&min_similarity.to_bits().to_le_bytes());
    hasher.finalize().to_hex().to_string()
}
