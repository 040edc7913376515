//! Shared vector math.

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// Accumulates in `f64` so `cosine_distance(v, v)` is exactly zero for any
/// non-zero `v`. A zero-norm operand is treated as orthogonal (distance 1).
/// Panics in debug builds if the lengths differ.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 1.0;
    }
    let cos = (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0);
    (1.0 - cos) as f32
}

/// Similarity score `1 - cosine_distance(a, b)`.
///
/// Identical directions score 1.0, orthogonal vectors 0.0, opposite -1.0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_distance(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_similarity_is_one() {
        let vectors: [&[f32]; 3] = [
            &[1.0, 2.0, 3.0],
            &[0.001, -5.0, 1e4, 0.25],
            &[-0.3; 2048],
        ];
        for v in vectors {
            assert_eq!(similarity(v, v), 1.0);
            assert_eq!(cosine_distance(v, v), 0.0);
        }
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 2.0], &[-1.0, -2.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let v = [0.2, -1.5, 3.0, 0.0, 7.25];
        let w = [1.0, 0.5, -2.0, 4.0, 0.125];
        assert_eq!(similarity(&v, &w), similarity(&w, &v));
    }

    #[test]
    fn test_scale_invariant() {
        let v = [0.2, -1.5, 3.0];
        let scaled = [2.0, -15.0, 30.0];
        assert!((similarity(&v, &scaled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        assert_eq!(similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
