//! Exact-equality deduplication of sample rows and the broadcast step that
//! maps per-unique results back onto every original row.

use super::{SampleMatrix, SampleVector};
use crate::error::{Result, SweepError};
use std::collections::BTreeMap;

/// Bit pattern used as the equality key. `-0.0` and `0.0` compare equal as
/// floats, so they must share a key.
fn row_key(row: &[f64]) -> Vec<u64> {
    row.iter()
        .map(|v| if *v == 0.0 { 0u64 } else { v.to_bits() })
        .collect()
}

/// Every distinct vector of a `SampleMatrix` exactly once, in first-seen
/// order, plus the row → unique index assignment.
#[derive(Debug, Clone, Default)]
pub struct UniqueSampleSet {
    vectors: Vec<SampleVector>,
    assignment: Vec<usize>,
}

impl UniqueSampleSet {
    pub fn from_matrix(matrix: &SampleMatrix) -> Self {
        let mut index: BTreeMap<Vec<u64>, usize> = BTreeMap::new();
        let mut vectors = Vec::new();
        let mut assignment = Vec::with_capacity(matrix.len());

        for row in matrix.rows() {
            let slot = *index.entry(row_key(row)).or_insert_with(|| {
                vectors.push(row.clone());
                vectors.len() - 1
            });
            assignment.push(slot);
        }

        Self {
            vectors,
            assignment,
        }
    }

    /// Number of distinct vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Number of rows in the matrix this set was built from
    pub fn original_len(&self) -> usize {
        self.assignment.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.original_len() - self.len()
    }

    pub fn vectors(&self) -> &[SampleVector] {
        &self.vectors
    }

    /// Unique index holding original row `row`
    pub fn unique_index(&self, row: usize) -> Option<usize> {
        self.assignment.get(row).copied()
    }

    /// Expand per-unique results to one entry per original row.
    ///
    /// Duplicated rows receive clones of the same value, so they are
    /// identical down to the byte.
    pub fn broadcast<T: Clone>(&self, unique_results: &[T]) -> Result<Vec<T>> {
        if unique_results.len() != self.vectors.len() {
            return Err(SweepError::analysis(format!(
                "broadcast expects {} unique results, got {}",
                self.vectors.len(),
                unique_results.len()
            )));
        }
        Ok(self
            .assignment
            .iter()
            .map(|&slot| unique_results[slot].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> SampleMatrix {
        let cols = rows.first().map_or(0, Vec::len);
        SampleMatrix::from_rows(cols, rows).unwrap()
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        let m = matrix(vec![
            vec![1.0, 2.0],
            vec![3.0, 4.0],
            vec![1.0, 2.0],
            vec![5.0, 6.0],
            vec![3.0, 4.0],
        ]);
        let set = UniqueSampleSet::from_matrix(&m);
        assert_eq!(set.len(), 3);
        assert_eq!(set.original_len(), 5);
        assert_eq!(set.duplicate_count(), 2);
        assert_eq!(set.vectors()[2], vec![5.0, 6.0]);
        assert_eq!(set.unique_index(4), Some(1));
    }

    #[test]
    fn test_signed_zero_is_one_vector() {
        let m = matrix(vec![vec![0.0, 1.0], vec![-0.0, 1.0]]);
        assert_eq!(UniqueSampleSet::from_matrix(&m).len(), 1);
    }

    #[test]
    fn test_near_equal_rows_stay_distinct() {
        let m = matrix(vec![vec![0.1 + 0.2], vec![0.3]]);
        assert_eq!(UniqueSampleSet::from_matrix(&m).len(), 2);
    }

    #[test]
    fn test_broadcast() {
        let m = matrix(vec![vec![1.0], vec![2.0], vec![1.0]]);
        let set = UniqueSampleSet::from_matrix(&m);
        let out = set.broadcast(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(out, vec!["a", "b", "a"]);

        assert!(set.broadcast(&["only".to_string()]).is_err());
    }
}
