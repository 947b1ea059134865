use serde::Serialize;
use sprs::CsMat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

use crate::errors::AppError;
use crate::matrix::RatingMatrix;

/// A matrix row and its cosine distance to the queried row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f64,
}

impl Neighbor {
    pub fn new(row: usize, distance: f64) -> Self {
        Self { row, distance }
    }
}

// Ordered by distance, then row, so the heap root is always the worst candidate
// kept so far and ties resolve towards the lower row index.
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row.cmp(&other.row))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

/// Exact cosine nearest-neighbour search over the rows of a [`RatingMatrix`].
///
/// Dot products are accumulated only for rows that share at least one user with
/// the query, by walking the query row and then the columns it touches. Rows
/// without any overlap have cosine distance 1.
///
/// The index is immutable after `build`, so it can be shared across threads.
#[derive(Debug)]
pub struct SimilarityIndex {
    representations: CsMat<f64>,
    representations_transposed: CsMat<f64>,
    l2norms: Vec<f64>,
}

impl SimilarityIndex {
    pub fn build(matrix: &RatingMatrix) -> Self {
        let representations = matrix.csr().to_owned();
        let representations_transposed: CsMat<f64> = representations.to_csc();

        let l2norms: Vec<f64> = (0..representations.rows())
            .map(|row| {
                representations
                    .outer_view(row)
                    .map(|vector| vector.iter().map(|(_, value)| value * value).sum::<f64>())
                    .unwrap_or(0.0)
                    .sqrt()
            })
            .collect();

        debug!("Built similarity index over {} rows", l2norms.len());

        Self {
            representations,
            representations_transposed,
            l2norms,
        }
    }

    pub fn len(&self) -> usize {
        self.l2norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l2norms.is_empty()
    }

    /// The `k` rows closest to `row`, the row itself included at distance 0,
    /// ordered by ascending distance and then ascending row index.
    pub fn query(&self, row: usize, k: usize) -> Result<Vec<Neighbor>, AppError> {
        let num_rows = self.len();
        let query_vector = self
            .representations
            .outer_view(row)
            .ok_or_else(|| AppError::not_found(format!("row {} is outside the rating matrix", row)))?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut accumulator = RowAccumulator::new(num_rows);
        for (column, value) in query_vector.iter() {
            if let Some(raters) = self.representations_transposed.outer_view(column) {
                for (other_row, other_value) in raters.iter() {
                    accumulator.add_to(other_row, value * other_value);
                }
            }
        }

        // The query row always leads; only the other rows compete for the rest.
        let others = (k - 1).min(num_rows.saturating_sub(1));
        let mut topk = TopK::new(others);

        let mut overlapping = vec![false; num_rows];
        accumulator.drain(|other_row, dot| {
            overlapping[other_row] = true;
            if other_row != row {
                topk.offer(Neighbor::new(other_row, self.distance(row, other_row, dot)));
            }
        });

        if topk.len() < others {
            for other_row in 0..num_rows {
                if other_row != row && !overlapping[other_row] {
                    topk.offer(Neighbor::new(other_row, 1.0));
                    if topk.len() == others {
                        break;
                    }
                }
            }
        }

        let mut neighbors = Vec::with_capacity(k.min(num_rows));
        neighbors.push(Neighbor::new(row, 0.0));
        neighbors.extend(topk.into_sorted_vec());
        Ok(neighbors)
    }

    fn distance(&self, row: usize, other_row: usize, dot: f64) -> f64 {
        let norms = self.l2norms[row] * self.l2norms[other_row];
        if norms == 0.0 {
            return 1.0;
        }
        (1.0 - dot / norms).clamp(0.0, 1.0)
    }
}

/// Bounded max-heap keeping the `k` smallest neighbours offered to it.
struct TopK {
    heap: BinaryHeap<Neighbor>,
    k: usize,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k),
            k,
        }
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn offer(&mut self, candidate: Neighbor) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(mut top) = self.heap.peek_mut() {
            if candidate < *top {
                *top = candidate;
            }
        }
    }

    fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

/// Sparse accumulator for the dot products of one query row against all rows.
struct RowAccumulator {
    sums: Vec<f64>,
    non_zeros: Vec<isize>,
    head: isize,
}

const NONE: f64 = 0.0;
const NOT_OCCUPIED: isize = -1;
const NO_HEAD: isize = -2;

impl RowAccumulator {
    fn new(num_rows: usize) -> Self {
        Self {
            sums: vec![NONE; num_rows],
            non_zeros: vec![NOT_OCCUPIED; num_rows],
            head: NO_HEAD,
        }
    }

    fn add_to(&mut self, row: usize, value: f64) {
        self.sums[row] += value;

        if self.non_zeros[row] == NOT_OCCUPIED {
            self.non_zeros[row] = self.head;
            self.head = row as isize;
        }
    }

    /// Hands every touched row and its sum to `visit`, leaving the accumulator empty.
    fn drain<F: FnMut(usize, f64)>(&mut self, mut visit: F) {
        while self.head != NO_HEAD {
            let row = self.head as usize;
            visit(row, self.sums[row]);

            self.head = self.non_zeros[row];
            self.sums[row] = NONE;
            self.non_zeros[row] = NOT_OCCUPIED;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Rating;

    /*
    import numpy as np
    A = np.array(
            [[1, 1, 1, 0, 1],
             [0, 1, 0, 1, 0],
             [0, 1, 1, 0, 1],
             [0, 0, 0, 1, 0]])
    cosine similarities:
    [[1.         0.35355339 0.8660254  0.        ]
     [0.35355339 1.         0.40824829 0.70710678]
     [0.8660254  0.40824829 1.         0.        ]
     [0.         0.70710678 0.         1.        ]]
    */
    fn mini_example() -> RatingMatrix {
        let cells = [
            (0, 0), (0, 1), (0, 2), (0, 4),
            (1, 1), (1, 3),
            (2, 1), (2, 2), (2, 4),
            (3, 3),
        ];
        let ratings: Vec<Rating> = cells
            .iter()
            .map(|&(movie, user)| Rating::new(movie, user, 1.0))
            .collect();
        RatingMatrix::build(&ratings).unwrap()
    }

    fn check_neighbor(entry: &Neighbor, expected_row: usize, expected_distance: f64) {
        assert_eq!(entry.row, expected_row);
        assert!(
            (entry.distance - expected_distance).abs() < 0.0001,
            "row {}: expected distance {}, got {}",
            expected_row,
            expected_distance,
            entry.distance
        );
    }

    #[test]
    fn test_mini_example() {
        let index = SimilarityIndex::build(&mini_example());
        assert_eq!(index.len(), 4);

        let n0 = index.query(0, 4).unwrap();
        assert_eq!(n0.len(), 4);
        check_neighbor(&n0[0], 0, 0.0);
        check_neighbor(&n0[1], 2, 1.0 - 0.8660254);
        check_neighbor(&n0[2], 1, 1.0 - 0.35355339);
        check_neighbor(&n0[3], 3, 1.0);

        let n1 = index.query(1, 3).unwrap();
        assert_eq!(n1.len(), 3);
        check_neighbor(&n1[0], 1, 0.0);
        check_neighbor(&n1[1], 3, 1.0 - 0.70710678);
        check_neighbor(&n1[2], 2, 1.0 - 0.40824829);

        let n3 = index.query(3, 2).unwrap();
        check_neighbor(&n3[0], 3, 0.0);
        check_neighbor(&n3[1], 1, 1.0 - 0.70710678);
    }

    #[test]
    fn test_query_includes_self_first() {
        let index = SimilarityIndex::build(&mini_example());
        for row in 0..index.len() {
            let neighbors = index.query(row, 1).unwrap();
            assert_eq!(neighbors.len(), 1);
            check_neighbor(&neighbors[0], row, 0.0);
        }
    }

    #[test]
    fn test_self_survives_identical_lower_rows() {
        let ratings: Vec<Rating> = (1..=4)
            .flat_map(|movie| [Rating::new(movie, 1, 4.0), Rating::new(movie, 2, 2.0)])
            .collect();
        let index = SimilarityIndex::build(&RatingMatrix::build(&ratings).unwrap());

        let neighbors = index.query(3, 2).unwrap();
        assert_eq!(neighbors.len(), 2);
        check_neighbor(&neighbors[0], 3, 0.0);
        check_neighbor(&neighbors[1], 0, 0.0);

        let alone = index.query(3, 1).unwrap();
        assert_eq!(alone.len(), 1);
        check_neighbor(&alone[0], 3, 0.0);
    }

    #[test]
    fn test_non_overlapping_rows_fill_at_distance_one() {
        let index = SimilarityIndex::build(&mini_example());

        // Row 2 shares no user with row 3.
        let neighbors = index.query(3, 10).unwrap();
        assert_eq!(neighbors.len(), 4);
        check_neighbor(&neighbors[2], 0, 1.0);
        check_neighbor(&neighbors[3], 2, 1.0);
    }

    #[test]
    fn test_sorted_by_distance() {
        let index = SimilarityIndex::build(&mini_example());
        for row in 0..index.len() {
            let neighbors = index.query(row, index.len()).unwrap();
            assert!(neighbors.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
        }
    }

    #[test]
    fn test_out_of_range_row_is_not_found() {
        let index = SimilarityIndex::build(&mini_example());
        let err = index.query(99, 3).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_zero_k() {
        let index = SimilarityIndex::build(&mini_example());
        assert!(index.query(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_magnitude_does_not_matter() {
        let ratings = vec![
            Rating::new(1, 1, 1.0),
            Rating::new(1, 2, 2.0),
            Rating::new(2, 1, 2.5),
            Rating::new(2, 2, 5.0),
        ];
        let index = SimilarityIndex::build(&RatingMatrix::build(&ratings).unwrap());

        let neighbors = index.query(0, 2).unwrap();
        check_neighbor(&neighbors[1], 1, 0.0);
    }

    #[test]
    fn test_topk_keeps_smallest() {
        let mut topk = TopK::new(2);
        topk.offer(Neighbor::new(5, 0.9));
        topk.offer(Neighbor::new(1, 0.2));
        topk.offer(Neighbor::new(3, 0.5));
        topk.offer(Neighbor::new(4, 0.5));

        let kept = topk.into_sorted_vec();
        assert_eq!(kept.len(), 2);
        check_neighbor(&kept[0], 1, 0.2);
        check_neighbor(&kept[1], 3, 0.5);
    }
}
