//! Embedding vector arithmetic and the BLOB codec used by the store.
//!
//! Centroids are persisted as little-endian f32 arrays; all accumulation
//! happens in f64 so repeated incremental updates don't drift.

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Running-mean centroid update:
/// `new[i] = (old[i] * count + sample[i]) / (count + 1)`.
pub fn incremental_mean(centroid: &[f32], member_count: i64, sample: &[f32]) -> Vec<f32> {
    debug_assert_eq!(centroid.len(), sample.len());
    let count = member_count.max(0) as f64;
    centroid
        .iter()
        .zip(sample.iter())
        .map(|(c, s)| ((f64::from(*c) * count + f64::from(*s)) / (count + 1.0)) as f32)
        .collect()
}

/// Arithmetic mean over a member set, accumulated in f64.
/// Returns `None` for an empty set.
pub fn mean(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut acc = vec![0.0f64; first.len()];
    for v in vectors {
        for (slot, x) in acc.iter_mut().zip(v.iter()) {
            *slot += f64::from(*x);
        }
    }
    let n = vectors.len() as f64;
    Some(acc.into_iter().map(|sum| (sum / n) as f32).collect())
}

/// Encodes a vector as little-endian f32 bytes for the BLOB column.
pub fn to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for x in vector {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Decodes a BLOB column back into a vector. Trailing partial floats are
/// dropped rather than panicking on a corrupt row.
pub fn from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn incremental_matches_batch_mean() {
        let members = vec![
            vec![1.0f32, 2.0, 3.0],
            vec![2.0, 3.0, 4.0],
            vec![3.0, 4.0, 5.0],
        ];

        let mut centroid = members[0].clone();
        for (i, m) in members.iter().enumerate().skip(1) {
            centroid = incremental_mean(&centroid, i as i64, m);
        }

        let batch = mean(&members).unwrap();
        for (inc, full) in centroid.iter().zip(batch.iter()) {
            assert!((inc - full).abs() < 1e-5);
        }
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75, f32::MIN_POSITIVE];
        assert_eq!(from_blob(&to_blob(&v)), v);
    }

    #[test]
    fn corrupt_blob_truncates() {
        let mut blob = to_blob(&[1.0, 2.0]);
        blob.pop();
        assert_eq!(from_blob(&blob), vec![1.0]);
    }
}
