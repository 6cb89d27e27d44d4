//! Nearest-neighbor search over chunk embeddings.

use std::cmp::Ordering;

use thiserror::Error;
use tracing::debug;

/// Errors surfaced by index construction and search.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// An entry's embedding length disagreed with the index dimensionality.
    #[error("embedding for chunk {chunk_id} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Identifier of the offending chunk.
        chunk_id: usize,
        /// Dimensionality fixed by the first stored vector.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
    /// The query embedding length disagreed with the index dimensionality.
    #[error("query embedding has {actual} dimensions, index stores {expected}")]
    QueryDimensionMismatch {
        /// Dimensionality shared by the stored vectors.
        expected: usize,
        /// Dimensionality of the query vector.
        actual: usize,
    },
    /// A search was attempted against an index with no entries.
    #[error("search attempted against an empty index")]
    EmptyIndex,
}

/// Single search result: chunk id plus squared Euclidean distance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Identifier supplied when the vector was stored.
    pub chunk_id: usize,
    /// Squared Euclidean distance to the query vector.
    pub distance: f32,
}

/// Nearest-neighbor capability over a fixed set of chunk embeddings.
///
/// [`FlatIndex`] is the baseline backend; an approximate structure can be
/// substituted behind this trait without touching callers.
pub trait VectorIndex {
    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// True when no vectors are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality shared by every stored vector (0 for an empty index).
    fn dimensions(&self) -> usize;

    /// Returns up to `k` hits ordered by non-decreasing distance.
    ///
    /// `k` beyond the stored count returns everything available; searching an
    /// empty index fails with [`IndexError::EmptyIndex`].
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError>;
}

/// Exhaustive-scan index holding every vector in insertion order.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    entries: Vec<(usize, Vec<f32>)>,
}

impl FlatIndex {
    /// Builds an index from `(chunk_id, embedding)` pairs.
    ///
    /// Dimensionality is fixed by the first entry; any later entry of a
    /// different length fails with [`IndexError::DimensionMismatch`] naming
    /// the offending chunk. Vectors are never truncated or padded.
    pub fn build(entries: Vec<(usize, Vec<f32>)>) -> Result<Self, IndexError> {
        let dimensions = entries.first().map(|(_, vector)| vector.len()).unwrap_or(0);
        for (chunk_id, vector) in &entries {
            if vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    chunk_id: *chunk_id,
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
        }
        debug!(vectors = entries.len(), dimensions, "flat index built");
        Ok(Self {
            dimensions,
            entries,
        })
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.entries.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if query.len() != self.dimensions {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(chunk_id, vector)| SearchHit {
                chunk_id: *chunk_id,
                distance: squared_distance(query, vector),
            })
            .collect();
        // Stable sort keeps insertion order for exact-distance ties.
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Squared Euclidean distance. Monotonic with the true distance, so rankings
/// are identical while the square root is skipped.
fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let delta = x - y;
            delta * delta
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        FlatIndex::build(vec![
            (0, vec![0.0, 0.0]),
            (1, vec![3.0, 4.0]),
            (2, vec![1.0, 1.0]),
        ])
        .expect("build index")
    }

    #[test]
    fn search_orders_hits_by_non_decreasing_distance() {
        let index = sample_index();
        let hits = index.search(&[0.0, 0.0], 3).expect("search");
        assert_eq!(
            hits.iter().map(|hit| hit.chunk_id).collect::<Vec<_>>(),
            vec![0, 2, 1]
        );
        assert!(hits.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
    }

    #[test]
    fn best_hit_matches_brute_force_recomputation() {
        let entries = vec![
            (0, vec![0.2, 0.9, 0.1]),
            (1, vec![0.8, 0.1, 0.4]),
            (2, vec![0.5, 0.5, 0.5]),
        ];
        let query = [0.6, 0.2, 0.45];
        let index = FlatIndex::build(entries.clone()).expect("build index");
        let best = &index.search(&query, 1).expect("search")[0];
        let expected = entries
            .iter()
            .map(|(chunk_id, vector)| (*chunk_id, squared_distance(&query, vector)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .unwrap();
        assert_eq!(best.chunk_id, expected.0);
        assert_eq!(best.distance, expected.1);
    }

    #[test]
    fn k_beyond_stored_count_returns_everything() {
        let index = sample_index();
        let hits = index.search(&[0.0, 0.0], 10).expect("search");
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn k_zero_returns_no_hits() {
        let index = sample_index();
        assert!(index.search(&[0.0, 0.0], 0).expect("search").is_empty());
    }

    #[test]
    fn empty_index_search_fails() {
        let index = FlatIndex::build(Vec::new()).expect("build index");
        assert_eq!(index.search(&[], 1), Err(IndexError::EmptyIndex));
    }

    #[test]
    fn mismatched_entry_dimensionality_names_the_offending_chunk() {
        let err = FlatIndex::build(vec![(7, vec![1.0, 2.0]), (9, vec![1.0])])
            .expect_err("dimension mismatch");
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                chunk_id: 9,
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn mismatched_query_dimensionality_fails() {
        let index = sample_index();
        assert_eq!(
            index.search(&[1.0, 2.0, 3.0], 1),
            Err(IndexError::QueryDimensionMismatch {
                expected: 2,
                actual: 3,
            })
        );
    }

    #[test]
    fn exact_distance_ties_preserve_insertion_order() {
        let index = FlatIndex::build(vec![
            (5, vec![1.0, 0.0]),
            (3, vec![0.0, 1.0]),
            (8, vec![-1.0, 0.0]),
        ])
        .expect("build index");
        let hits = index.search(&[0.0, 0.0], 3).expect("search");
        assert_eq!(
            hits.iter().map(|hit| hit.chunk_id).collect::<Vec<_>>(),
            vec![5, 3, 8]
        );
    }

    #[test]
    fn identical_builds_return_identical_results() {
        let entries = vec![(0, vec![0.1, 0.2]), (1, vec![0.9, 0.8])];
        let first = FlatIndex::build(entries.clone()).expect("build index");
        let second = FlatIndex::build(entries).expect("build index");
        let query = [0.4, 0.4];
        assert_eq!(
            first.search(&query, 2).expect("search"),
            second.search(&query, 2).expect("search")
        );
    }
}
