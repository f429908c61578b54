/// In-memory vector similarity index.
///
/// Holds the training feature matrix, one row per record, and answers top-N
/// nearest-neighbor queries with a deterministic ordering: descending score,
/// then ascending row index. Rows and queries are expected to be unit-length
/// or all-zero (see `vectorizer::l2_normalize`), so the similarity score is
/// a plain dot product.
use std::cmp::Ordering;

use crate::error::CommonError;

/// One scored row from a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    rows: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build an index over a fixed feature matrix.
    ///
    /// Every row must have the stated dimension; the row order defines the
    /// index positions used by lookups.
    pub fn from_rows(dimension: usize, rows: Vec<Vec<f32>>) -> Result<Self, CommonError> {
        for (position, row) in rows.iter().enumerate() {
            if row.len() != dimension {
                return Err(CommonError::Index(format!(
                    "row {position} has dimension {}, index expects {dimension}",
                    row.len()
                )));
            }
        }
        Ok(Self { dimension, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Score every row against `query` and return the top `limit` neighbors.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, CommonError> {
        if query.len() != self.dimension {
            return Err(CommonError::Index(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }
        let mut scored: Vec<Neighbor> = self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| Neighbor { index, score: dot(query, row) })
            .collect();
        sort_neighbors(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }

    /// The top `limit` rows most similar to the row at `index`, excluding
    /// the row itself.
    pub fn neighbors_of(&self, index: usize, limit: usize) -> Result<Vec<Neighbor>, CommonError> {
        let query = self.rows.get(index).ok_or_else(|| {
            CommonError::Index(format!("row {index} out of bounds for {} rows", self.rows.len()))
        })?;
        let mut scored: Vec<Neighbor> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .map(|(position, row)| Neighbor { index: position, score: dot(query, row) })
            .collect();
        sort_neighbors(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> VectorIndex {
        VectorIndex::from_rows(
            2,
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![0.6, 0.8],
            ],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_descending_score() {
        let index = sample_index();
        let neighbors = index.search(&[1.0, 0.0], 4).expect("search");
        assert_eq!(neighbors[0].index, 0);
        assert_eq!(neighbors[1].index, 2);
        assert_eq!(neighbors[2].index, 3);
        assert_eq!(neighbors[3].index, 1);
    }

    #[test]
    fn equal_scores_order_by_ascending_index() {
        let index = sample_index();
        let neighbors = index.search(&[0.0, 1.0], 4).expect("search");
        // Rows 0 and 2 both score zero; the lower index wins.
        let zero_scored: Vec<usize> = neighbors
            .iter()
            .filter(|n| n.score == 0.0)
            .map(|n| n.index)
            .collect();
        assert_eq!(zero_scored, vec![0, 2]);
    }

    #[test]
    fn neighbors_of_excludes_the_probe_row() {
        let index = sample_index();
        for probe in 0..index.len() {
            let neighbors = index.neighbors_of(probe, 10).expect("neighbors");
            assert!(neighbors.iter().all(|n| n.index != probe));
            assert_eq!(neighbors.len(), index.len() - 1);
        }
    }

    #[test]
    fn limit_truncates_results() {
        let index = sample_index();
        let neighbors = index.neighbors_of(0, 1).expect("neighbors");
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].index, 2);
    }

    #[test]
    fn out_of_bounds_probe_is_an_error() {
        let index = sample_index();
        let err = index.neighbors_of(9, 1).unwrap_err();
        assert!(matches!(err, CommonError::Index(_)));
    }

    #[test]
    fn mismatched_row_dimension_is_rejected() {
        let err = VectorIndex::from_rows(3, vec![vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, CommonError::Index(_)));
    }

    #[test]
    fn mismatched_query_dimension_is_rejected() {
        let index = sample_index();
        let err = index.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, CommonError::Index(_)));
    }
}
