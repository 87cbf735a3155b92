//! Cosine similarity and exhaustive top-k ranking.

use rayon::prelude::*;
use std::cmp::Ordering;
use wide::f32x8;

use crate::config::Number;
use crate::error::{Result, SemdexError};

const LANES: usize = 8;

/// Cosine similarity of `a` and `b` in `[-1, 1]`.
///
/// Vectors of different length are rejected. If either vector has zero
/// magnitude the similarity is exactly `0.0`.
pub fn cosine_similarity(a: &[Number], b: &[Number]) -> Result<Number> {
    if a.len() != b.len() {
        return Err(SemdexError::InvalidArgument(format!(
            "vector length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot_product = f32x8::splat(0.0);
    let mut mag_a = f32x8::splat(0.0);
    let mut mag_b = f32x8::splat(0.0);

    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        let va = lanes(ca);
        let vb = lanes(cb);
        dot_product += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    let mut scalar_dot_product = dot_product.reduce_add();
    let mut scalar_mag_a = mag_a.reduce_add();
    let mut scalar_mag_b = mag_b.reduce_add();

    for (&x, &y) in tail_a.iter().zip(tail_b) {
        scalar_dot_product += x * y;
        scalar_mag_a += x * x;
        scalar_mag_b += y * y;
    }

    if scalar_mag_a == 0.0 || scalar_mag_b == 0.0 {
        return Ok(0.0);
    }

    let denominator = scalar_mag_a.sqrt() * scalar_mag_b.sqrt();
    Ok((scalar_dot_product / denominator).clamp(-1.0, 1.0))
}

fn lanes(chunk: &[Number]) -> f32x8 {
    let mut buf = [0.0; LANES];
    buf.copy_from_slice(chunk);
    f32x8::from(buf)
}

/// Divide every component by the euclidean norm. All-zero vectors are left as is.
pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > 0.0 {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Exhaustive top-k by cosine similarity.
///
/// Returns `(original index, score)` pairs, best first, at most `k` of them.
/// Equal scores keep ascending index order.
pub fn find_top_k(query: &[Number], vectors: &[Vec<Number>], k: usize) -> Result<Vec<(usize, Number)>> {
    check_k(k)?;
    let scored = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| cosine_similarity(query, v).map(|score| (i, score)))
        .collect::<Result<Vec<_>>>()?;
    Ok(rank(scored, k))
}

/// Same ranking as [`find_top_k`], scoring candidates on the rayon pool.
pub fn find_top_k_par(
    query: &[Number],
    vectors: &[Vec<Number>],
    k: usize,
) -> Result<Vec<(usize, Number)>> {
    check_k(k)?;
    let scored = vectors
        .par_iter()
        .enumerate()
        .map(|(i, v)| cosine_similarity(query, v).map(|score| (i, score)))
        .collect::<Result<Vec<_>>>()?;
    Ok(rank(scored, k))
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(SemdexError::InvalidArgument(
            "top_k must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn rank(mut scored: Vec<(usize, Number)>, k: usize) -> Vec<(usize, Number)> {
    scored.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
        Some(Ordering::Equal) | None => a.0.cmp(&b.0),
        Some(order) => order,
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: Number = 1e-4;

    #[test]
    fn identical_vectors_score_one() {
        let v: Vec<Number> = (1..=19).map(|i| i as Number * 0.37).collect();
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < TOLERANCE, "got {score}");
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let score = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(score.abs() < TOLERANCE);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let a = [0.5, -1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let b: Vec<Number> = a.iter().map(|x| -x).collect();
        let score = cosine_similarity(&a, &b).unwrap();
        assert!((score + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn zero_vector_scores_exactly_zero() {
        assert_eq!(cosine_similarity(&[0.0; 10], &[1.0; 10]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[1.0; 3], &[0.0; 3]).unwrap(), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a: Vec<Number> = (0..37).map(|i| ((i * 7) % 11) as Number - 5.0).collect();
        let b: Vec<Number> = (0..37).map(|i| ((i * 3) % 13) as Number - 6.0).collect();
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn simd_path_matches_scalar_reference() {
        let a: Vec<Number> = (0..384).map(|i| ((i % 17) as Number).sin()).collect();
        let b: Vec<Number> = (0..384).map(|i| ((i % 23) as Number).cos()).collect();
        let dot: Number = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let na: Number = a.iter().map(|x| x * x).sum::<Number>().sqrt();
        let nb: Number = b.iter().map(|x| x * x).sum::<Number>().sqrt();
        let score = cosine_similarity(&a, &b).unwrap();
        assert!((score - dot / (na * nb)).abs() < TOLERANCE);
    }

    #[test]
    fn length_mismatch_is_invalid() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, SemdexError::InvalidArgument(_)));
    }

    #[test]
    fn top_k_orders_by_score() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.707, 0.707],
            vec![0.9, 0.1],
        ];
        let top = find_top_k(&[1.0, 0.0], &vectors, 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 0);
        assert!((top[0].1 - 1.0).abs() < TOLERANCE);
        assert_eq!(top[1].0, 3);
        assert!((top[1].1 - 0.994).abs() < 1e-3);
    }

    #[test]
    fn top_k_ties_keep_index_order() {
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]];
        let top = find_top_k(&[1.0, 0.0], &vectors, 3).unwrap();
        let indices: Vec<usize> = top.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn top_k_is_capped_by_candidates() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(find_top_k(&[1.0, 1.0], &vectors, 10).unwrap().len(), 2);
        assert!(find_top_k(&[1.0, 1.0], &[], 10).unwrap().is_empty());
    }

    #[test]
    fn top_k_zero_is_invalid() {
        let err = find_top_k(&[1.0], &[vec![1.0]], 0).unwrap_err();
        assert!(matches!(err, SemdexError::InvalidArgument(_)));
    }

    #[test]
    fn parallel_scan_ranks_identically() {
        let vectors: Vec<Vec<Number>> = (0..200)
            .map(|i| vec![(i % 7) as Number, (i % 5) as Number, 1.0])
            .collect();
        let query = [0.3, 0.9, 0.1];
        assert_eq!(
            find_top_k(&query, &vectors, 15).unwrap(),
            find_top_k_par(&query, &vectors, 15).unwrap()
        );
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let mut v = vec![0.0; 4];
        normalize_vector(&mut v);
        assert_eq!(v, vec![0.0; 4]);

        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((v[0] - 0.6).abs() < TOLERANCE && (v[1] - 0.8).abs() < TOLERANCE);
    }
}
