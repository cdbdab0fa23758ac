//! Vector arithmetic shared by encoders and stores.

use crate::error::{VindexError, VindexResult};

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean length of a vector.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divides `v` by its L2 norm in place.
///
/// A zero or non-finite norm cannot be turned into a direction and is
/// reported as an encoding failure.
pub fn normalize(v: &mut [f32]) -> VindexResult<()> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(VindexError::Encoding {
            reason: format!("cannot normalize vector with norm {norm}"),
        });
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

/// Similarity matrix of `query` rows against `gallery` rows.
///
/// `result[i][j] = dot(query[i], gallery[j])`, which is cosine similarity
/// for unit vectors.
pub fn similarity_matrix(query: &[Vec<f32>], gallery: &[Vec<f32>]) -> VindexResult<Vec<Vec<f32>>> {
    query
        .iter()
        .map(|q| {
            gallery
                .iter()
                .map(|g| {
                    if q.len() != g.len() {
                        return Err(VindexError::DimensionMismatch {
                            expected: q.len(),
                            actual: g.len(),
                        });
                    }
                    Ok(dot(q, g))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_and_norm() {
        let a = [1.0, 0.0, 0.0];
        assert!((dot(&a, &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(dot(&a, &[0.0, 1.0, 0.0]).abs() < 1e-6);
        assert!((dot(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_rejects_zero_vector() {
        let mut v = vec![0.0; 8];
        assert!(matches!(
            normalize(&mut v),
            Err(VindexError::Encoding { .. })
        ));
    }

    #[test]
    fn test_similarity_matrix_matches_dot() {
        let mut a = vec![0.2, 0.9, 0.1];
        let mut b = vec![0.7, 0.1, 0.4];
        normalize(&mut a).unwrap();
        normalize(&mut b).unwrap();

        let m = similarity_matrix(&[a.clone()], &[a.clone(), b.clone()]).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].len(), 2);
        assert!((m[0][0] - 1.0).abs() < 1e-5);
        assert!((m[0][1] - dot(&a, &b)).abs() < 1e-6);
        assert!((-1.0..=1.0).contains(&m[0][1]));
    }

    #[test]
    fn test_similarity_matrix_dimension_mismatch() {
        let err = similarity_matrix(&[vec![1.0, 0.0]], &[vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, VindexError::DimensionMismatch { .. }));
    }
}
