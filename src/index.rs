//! # VectorIndex
//!
//! Exact cosine-similarity index over an append-only embedding matrix.
//!
//! The index keeps two things:
//! - the **raw matrix**, row-major, exactly as the embedder produced it (this is what
//!   gets persisted);
//! - a **derived cache**: the L2-normalised rows plus whatever structure the selected
//!   [`SearchBackend`] builds from them. The cache is rebuilt whenever rows are added
//!   and can always be recomputed from the raw matrix.
//!
//! Rows are normalised when the cache is built and queries are normalised at search
//! time, so a given (row, query) pair scores the same regardless of call order or of
//! the backend in use. Equal scores rank by insertion order.
//!
//! ## Backends
//! - [`IndexBackend::Flat`]: exhaustive scan over the normalised rows.
//! - [`IndexBackend::Hora`]: the `hora` brute-force index (dot-product metric) produces
//!   the candidate rows; scores are recomputed from the normalised rows.

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::bruteforce_idx::BruteForceIndex;
use hora::index::bruteforce_params::BruteForceParams;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Which backing structure answers searches. Chosen once, at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Flat,
    Hora,
}

impl IndexBackend {
    fn instantiate(self) -> Box<dyn SearchBackend> {
        match self {
            IndexBackend::Flat => Box::new(FlatBackend),
            IndexBackend::Hora => Box::new(HoraBackend::default()),
        }
    }
}

/// Search structure built from the normalised matrix.
///
/// `normalized` is row-major with `dimension` columns; `query` is already normalised.
/// Implementations return at most `k` `(row, score)` pairs ranked by
/// [`rank_top_k`].
pub trait SearchBackend: Send + Sync {
    fn rebuild(&mut self, normalized: &[f32], dimension: usize) -> Result<()>;

    fn search(&self, normalized: &[f32], dimension: usize, query: &[f32], k: usize)
    -> Vec<(usize, f32)>;
}

/// Exhaustive scan.
#[derive(Debug, Default)]
pub struct FlatBackend;

impl SearchBackend for FlatBackend {
    fn rebuild(&mut self, _normalized: &[f32], _dimension: usize) -> Result<()> {
        Ok(())
    }

    fn search(
        &self,
        normalized: &[f32],
        dimension: usize,
        query: &[f32],
        k: usize,
    ) -> Vec<(usize, f32)> {
        let scored = normalized
            .chunks_exact(dimension)
            .enumerate()
            .map(|(row, vector)| (row, dot(query, vector)))
            .collect();
        rank_top_k(scored, k)
    }
}

/// `hora` brute-force index used as the candidate generator.
#[derive(Default)]
pub struct HoraBackend {
    index: Option<BruteForceIndex<f32, usize>>,
    rows: usize,
}

impl SearchBackend for HoraBackend {
    fn rebuild(&mut self, normalized: &[f32], dimension: usize) -> Result<()> {
        let rows = normalized.len() / dimension;
        if rows == 0 {
            self.index = None;
            self.rows = 0;
            return Ok(());
        }

        let mut index = BruteForceIndex::<f32, usize>::new(dimension, &BruteForceParams::default());
        for (row, vector) in normalized.chunks_exact(dimension).enumerate() {
            index
                .add(vector, row)
                .map_err(|e| RagError::Index(format!("hora add failed: {e}")))?;
        }
        index
            .build(Metric::DotProduct)
            .map_err(|e| RagError::Index(format!("hora build failed: {e}")))?;

        self.index = Some(index);
        self.rows = rows;
        Ok(())
    }

    fn search(
        &self,
        normalized: &[f32],
        dimension: usize,
        query: &[f32],
        k: usize,
    ) -> Vec<(usize, f32)> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        // hora's own distance is only used for candidate selection; asking for every
        // row keeps equal-score rows at the cut-off from being dropped arbitrarily.
        let scored = index
            .search(query, self.rows)
            .into_iter()
            .filter(|row| *row < self.rows)
            .map(|row| {
                let vector = &normalized[row * dimension..(row + 1) * dimension];
                (row, dot(query, vector))
            })
            .collect();
        rank_top_k(scored, k)
    }
}

/// Sort by score descending, lower row first on ties, keep `k`.
pub fn rank_top_k(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.dedup_by_key(|(row, _)| *row);
    scored.truncate(k);
    scored
}

/// Scale `vector` to unit length. Zero vectors stay zero.
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|x| (f64::from(*x) / norm) as f32).collect()
}

/// Inner product of two unit vectors, clamped to the cosine range.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let sum = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum::<f64>();
    sum.clamp(-1.0, 1.0) as f32
}

pub struct VectorIndex {
    kind: IndexBackend,
    dimension: Option<usize>,
    raw: Vec<f32>,
    normalized: Vec<f32>,
    rows: usize,
    backend: Box<dyn SearchBackend>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("kind", &self.kind)
            .field("dimension", &self.dimension)
            .field("rows", &self.rows)
            .finish()
    }
}

impl VectorIndex {
    /// Empty index whose dimension is fixed by the first vector added.
    pub fn new(kind: IndexBackend) -> Self {
        Self {
            kind,
            dimension: None,
            raw: Vec::new(),
            normalized: Vec::new(),
            rows: 0,
            backend: kind.instantiate(),
        }
    }

    /// Empty index with the dimension fixed up front.
    pub fn with_dimension(kind: IndexBackend, dimension: usize) -> Self {
        let mut index = Self::new(kind);
        index.dimension = Some(dimension);
        index
    }

    /// Rebuild an index from a persisted row-major matrix.
    ///
    /// # Errors
    /// [`RagError::DimensionMismatch`] if `raw` is not a whole number of rows.
    pub fn from_raw(kind: IndexBackend, dimension: usize, raw: Vec<f32>) -> Result<Self> {
        if (dimension == 0 && !raw.is_empty()) || (dimension != 0 && raw.len() % dimension != 0) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: raw.len() % dimension.max(1),
            });
        }
        let mut index = Self::with_dimension(kind, dimension);
        let rows: Vec<Vec<f32>> = if dimension == 0 {
            Vec::new()
        } else {
            raw.chunks_exact(dimension).map(<[f32]>::to_vec).collect()
        };
        index.add(&rows)?;
        Ok(index)
    }

    /// Append rows. Nothing is mutated unless every row has the index's dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let expected = self.dimension.unwrap_or(first.len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let mut normalized = self.normalized.clone();
        for vector in vectors {
            normalized.extend(normalize(vector));
        }
        if expected > 0 {
            self.backend.rebuild(&normalized, expected)?;
        }

        for vector in vectors {
            self.raw.extend_from_slice(vector);
        }
        self.normalized = normalized;
        self.rows += vectors.len();
        self.dimension = Some(expected);
        Ok(())
    }

    /// Up to `k` `(row, score)` pairs, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if k == 0 || self.rows == 0 {
            return Ok(Vec::new());
        }
        let dimension = self.dimension.unwrap_or(0);
        if query.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if dimension == 0 {
            return Ok(rank_top_k((0..self.rows).map(|row| (row, 0.0)).collect(), k));
        }
        let query = normalize(query);
        Ok(self.backend.search(&self.normalized, dimension, &query, k))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn backend(&self) -> IndexBackend {
        self.kind
    }

    /// Row-major raw embedding matrix.
    pub fn raw_matrix(&self) -> &[f32] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain cosine similarity over raw vectors, used as the ranking oracle.
    fn cosine(a: &[f32], b: &[f32]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
        let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }

    fn oracle(rows: &[Vec<f32>], query: &[f32], k: usize) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i, cosine(r, query)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    /// Small xorshift so the synthetic sets are reproducible.
    struct XorShift(u64);

    impl XorShift {
        fn next_f32(&mut self) -> f32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            ((self.0 % 2001) as f32 / 1000.0) - 1.0
        }

        fn vector(&mut self, dim: usize) -> Vec<f32> {
            (0..dim).map(|_| self.next_f32()).collect()
        }
    }

    fn check_against_oracle(kind: IndexBackend) {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        let dim = 8;
        let rows: Vec<Vec<f32>> = (0..25).map(|_| rng.vector(dim)).collect();
        let mut index = VectorIndex::new(kind);
        // Two batches to exercise append semantics.
        index.add(&rows[..10]).unwrap();
        index.add(&rows[10..]).unwrap();
        assert_eq!(index.rows(), 25);

        for _ in 0..10 {
            let query = rng.vector(dim);
            for k in 0..=27 {
                let got = index.search(&query, k).unwrap();
                let want = oracle(&rows, &query, k);
                assert_eq!(got.len(), want.len(), "k={k}");
                for (i, ((g_row, g_score), (w_row, w_score))) in got.iter().zip(&want).enumerate() {
                    assert!(
                        (*g_score as f64 - w_score).abs() < 1e-6,
                        "score {g_score} vs {w_score}"
                    );
                    // Rows whose oracle scores sit within float noise may legitimately swap.
                    let near_tie = [i.wrapping_sub(1), i + 1]
                        .iter()
                        .filter_map(|j| want.get(*j))
                        .any(|(_, s)| (s - w_score).abs() < 1e-5);
                    if !near_tie {
                        assert_eq!(g_row, w_row);
                    }
                }
            }
        }
    }

    #[test]
    fn test_flat_matches_brute_force_oracle() {
        check_against_oracle(IndexBackend::Flat);
    }

    #[test]
    fn test_hora_matches_brute_force_oracle() {
        check_against_oracle(IndexBackend::Hora);
    }

    #[test]
    fn test_add_and_search() {
        let mut index = VectorIndex::new(IndexBackend::Flat);
        index
            .add(&[vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, 1);
        assert!(results[1].1 > 0.9);
    }

    #[test]
    fn test_scale_invariance() {
        let mut index = VectorIndex::new(IndexBackend::Flat);
        index.add(&[vec![3.0, 4.0], vec![-4.0, 3.0]]).unwrap();
        let a = index.search(&[0.3, 0.4], 2).unwrap();
        let b = index.search(&[30.0, 40.0], 2).unwrap();
        assert_eq!(a, b);
        assert!((a[0].1 - 1.0).abs() < 1e-6);
        assert!(a[1].1.abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        for kind in [IndexBackend::Flat, IndexBackend::Hora] {
            let mut index = VectorIndex::new(kind);
            index
                .add(&[
                    vec![0.0, 1.0],
                    vec![1.0, 0.0],
                    vec![2.0, 0.0],
                    vec![1.0, 0.0],
                ])
                .unwrap();
            let results = index.search(&[5.0, 0.0], 3).unwrap();
            let rows: Vec<usize> = results.iter().map(|r| r.0).collect();
            assert_eq!(rows, vec![1, 2, 3], "{kind:?}");
        }
    }

    #[test]
    fn test_empty_and_zero_k() {
        let index = VectorIndex::new(IndexBackend::Hora);
        assert!(index.search(&[1.0, 2.0], 5).unwrap().is_empty());

        let mut index = VectorIndex::new(IndexBackend::Flat);
        index.add(&[vec![1.0, 2.0]]).unwrap();
        assert!(index.search(&[1.0, 2.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_untouched() {
        let mut index = VectorIndex::new(IndexBackend::Flat);
        index.add(&[vec![1.0, 0.0, 0.0]]).unwrap();

        let err = index.add(&[vec![0.0, 1.0, 0.0], vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(index.rows(), 1);
        assert_eq!(index.raw_matrix().len(), 3);

        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(RagError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let mut index = VectorIndex::new(IndexBackend::Flat);
        index.add(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1], (0, 0.0));
    }

    #[test]
    fn test_from_raw_rebuilds_same_rankings() {
        let mut index = VectorIndex::new(IndexBackend::Flat);
        index
            .add(&[vec![1.0, 2.0], vec![2.0, -1.0], vec![-1.0, -1.0]])
            .unwrap();
        let rebuilt =
            VectorIndex::from_raw(IndexBackend::Hora, 2, index.raw_matrix().to_vec()).unwrap();
        assert_eq!(rebuilt.rows(), 3);
        assert_eq!(
            index.search(&[1.0, 1.0], 3).unwrap(),
            rebuilt.search(&[1.0, 1.0], 3).unwrap()
        );

        assert!(VectorIndex::from_raw(IndexBackend::Flat, 2, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_hora_rows_track_the_built_index() {
        let mut backend = HoraBackend::default();
        let rows = [normalize(&[1.0, 0.0]), normalize(&[0.0, 1.0]), normalize(&[1.0, 1.0])];
        let flat: Vec<f32> = rows.concat();

        backend.rebuild(&flat[..4], 2).unwrap();
        assert_eq!(backend.rows, 2);
        assert_eq!(backend.search(&flat[..4], 2, &rows[2], 5).len(), 2);

        backend.rebuild(&flat, 2).unwrap();
        assert_eq!(backend.rows, 3);
        assert_eq!(backend.search(&flat, 2, &rows[2], 5)[0].0, 2);

        backend.rebuild(&[], 2).unwrap();
        assert_eq!(backend.rows, 0);
        assert!(backend.index.is_none());
        assert!(backend.search(&[], 2, &rows[0], 5).is_empty());
    }
}
