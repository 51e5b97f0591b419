//! Squared Euclidean distance and the similarity derived from it.

/// Squared L2 distance. Lower is closer.
///
/// Accumulates in four lanes so the compiler can vectorize the loop.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = [0.0f32; 4];
    let chunks = a.len() / 4;
    for i in 0..chunks {
        let base = i * 4;
        for lane in 0..4 {
            let d = a[base + lane] - b[base + lane];
            acc[lane] += d * d;
        }
    }
    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for i in chunks * 4..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

/// Maps a non-negative distance into `(0, 1]`; identical vectors score `1`.
#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}
