//! Similarity computation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Tolerance used when checking that a vector is unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    l2_norm_f64(v) as f32
}

// Squares of very small or very large components leave the f32 range.
fn l2_norm_f64(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt()
}

/// Scale `v` to unit length.
///
/// A zero or non-finite norm is a [`EmbeddingError::DegenerateVector`]:
/// such a vector has no direction and no provider should return one.
pub fn normalize(v: &[f32]) -> Result<Embedding> {
    let norm = l2_norm_f64(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbeddingError::DegenerateVector { norm: norm as f32 });
    }
    Ok(v.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0. Zero vectors have no direction and
/// yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    let magnitude = l2_norm_f64(a) * l2_norm_f64(b);

    if magnitude == 0.0 || !magnitude.is_finite() {
        return Ok(0.0);
    }

    Ok((dot / magnitude).clamp(-1.0, 1.0) as f32)
}

/// One ranked neighbor of a matrix row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Row/column position of the neighbor.
    pub index: usize,

    /// Cosine similarity to the query row.
    pub score: f32,
}

/// Dense all-pairs cosine similarity over unit vectors.
///
/// Built once for a whole corpus; every query after that is a row scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    scores: Vec<f32>,
}

impl SimilarityMatrix {
    /// Build the matrix over `vectors`, which must already be normalized.
    ///
    /// Only the upper triangle is computed; the lower one is mirrored from
    /// it, so the result is exactly symmetric.
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self> {
        let n = vectors.len();
        let dimension = vectors.first().map_or(0, |v| v.as_ref().len());

        for v in vectors {
            let v = v.as_ref();
            if v.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                });
            }
            let norm = l2_norm(v);
            if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
                return Err(EmbeddingError::NotNormalized { norm });
            }
        }

        let mut scores = vec![0.0f32; n * n];
        for i in 0..n {
            let a = vectors[i].as_ref();
            scores[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let b = vectors[j].as_ref();
                let score = dot_product(a, b)?.clamp(-1.0, 1.0);
                scores[i * n + j] = score;
                scores[j * n + i] = score;
            }
        }

        Ok(Self { n, scores })
    }

    /// Number of rows (and columns).
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Similarity between rows `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i < self.n && j < self.n {
            Some(self.scores[i * self.n + j])
        } else {
            None
        }
    }

    /// Row `i` of the matrix.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        (i < self.n).then(|| &self.scores[i * self.n..(i + 1) * self.n])
    }

    /// The `k` rows most similar to row `i`, excluding `i` itself.
    ///
    /// Sorted by descending score; equal scores keep the lower index first.
    pub fn ranked_neighbors(&self, i: usize, k: usize) -> Vec<Neighbor> {
        let Some(row) = self.row(i) else {
            return Vec::new();
        };

        let mut ranked: Vec<Neighbor> = row
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(index, score)| Neighbor {
                index,
                score: *score,
            })
            .collect();

        ranked.sort_by_key(|n| (Reverse(OrderedFloat(n.score)), n.index));
        ranked.truncate(k);
        ranked
    }

    /// The nearest distinct neighbor of row `i`.
    pub fn top_neighbor(&self, i: usize) -> Option<Neighbor> {
        self.ranked_neighbors(i, 1).into_iter().next()
    }
}
