//! Deterministic local embedding — the pipeline's baseline correctness net.
//!
//! Hashes the input text to a 32-bit integer, seeds a fixed-dimension vector
//! through a sinusoidal function of `(hash + index)`, then L2-normalizes.
//! Identical input always produces an identical vector, with no network
//! dependency and no error path.

/// FNV-1a, 32-bit. Stable across platforms and process runs.
fn fnv1a(text: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in text.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

/// Embed `text` into a `dimension`-length L2-normalized vector.
pub fn local_embed(text: &str, dimension: usize) -> Vec<f32> {
    let seed = fnv1a(text);
    let mut vector: Vec<f32> = (0..dimension)
        .map(|i| ((seed as f64) + (i as f64)).sin() as f32)
        .collect();

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Cosine similarity between two vectors of equal length. Mismatched or
/// empty vectors score 0 rather than erroring — callers filter on score.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_embed_is_deterministic() {
        let a = local_embed("quarterly objectives", 768);
        let b = local_embed("quarterly objectives", 768);
        assert_eq!(a, b);
    }

    #[test]
    fn test_local_embed_is_normalized() {
        let v = local_embed("sprint planning", 768);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_different_inputs_differ() {
        let a = local_embed("alpha", 64);
        let b = local_embed("beta", 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_dimension_is_respected() {
        assert_eq!(local_embed("x", 16).len(), 16);
        assert_eq!(local_embed("x", 768).len(), 768);
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let v = local_embed("same text", 64);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);

        let other = local_embed("entirely different", 64);
        let sim = cosine_similarity(&v, &other);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_cosine_similarity_length_mismatch_is_zero() {
        let a = local_embed("x", 64);
        let b = local_embed("x", 32);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
