use sprs::{CsMat, CsVecView, TriMat};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::data::Rating;
use crate::errors::AppError;

/// Movie × user rating matrix in CSR form.
///
/// Rows are movies in ascending `movieId` order and columns are users in
/// ascending `userId` order. Cells without a rating are implicit zeros. The
/// row order is fixed at build time and is the only way to translate the
/// positional rows returned by the similarity index back to movie ids.
#[derive(Debug)]
pub struct RatingMatrix {
    ratings: CsMat<f64>,
    movie_ids: Vec<i64>,
    user_ids: Vec<i64>,
    rows_by_movie: HashMap<i64, usize>,
}

impl RatingMatrix {
    pub fn build(ratings: &[Rating]) -> Result<Self, AppError> {
        if ratings.is_empty() {
            return Err(AppError::data("cannot build a rating matrix from an empty rating table"));
        }

        // BTreeMap gives the (movie, user) ordering and catches duplicates in one pass.
        let mut cells: BTreeMap<(i64, i64), f64> = BTreeMap::new();
        let mut repeated = 0usize;

        for rating in ratings {
            if !rating.rating.is_finite() || rating.rating < 0.0 {
                return Err(AppError::data(format!(
                    "invalid rating {} for movie {} by user {}",
                    rating.rating, rating.movie_id, rating.user_id
                )));
            }

            match cells.insert((rating.movie_id, rating.user_id), rating.rating) {
                Some(previous) if previous != rating.rating => {
                    return Err(AppError::data(format!(
                        "conflicting ratings {} and {} for movie {} by user {}",
                        previous, rating.rating, rating.movie_id, rating.user_id
                    )));
                }
                Some(_) => repeated += 1,
                None => {}
            }
        }

        if repeated > 0 {
            debug!("Collapsed {} repeated identical ratings", repeated);
        }

        let mut movie_ids: Vec<i64> = cells.keys().map(|&(movie_id, _)| movie_id).collect();
        movie_ids.dedup();

        let mut user_ids: Vec<i64> = cells.keys().map(|&(_, user_id)| user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let rows_by_movie: HashMap<i64, usize> = movie_ids
            .iter()
            .enumerate()
            .map(|(row, &movie_id)| (movie_id, row))
            .collect();
        let columns_by_user: HashMap<i64, usize> = user_ids
            .iter()
            .enumerate()
            .map(|(column, &user_id)| (user_id, column))
            .collect();

        let mut triplets = TriMat::with_capacity((movie_ids.len(), user_ids.len()), cells.len());
        for (&(movie_id, user_id), &value) in &cells {
            triplets.add_triplet(rows_by_movie[&movie_id], columns_by_user[&user_id], value);
        }
        let ratings: CsMat<f64> = triplets.to_csr();

        info!(
            "Built rating matrix with {} movies, {} users and {} ratings",
            movie_ids.len(),
            user_ids.len(),
            ratings.nnz()
        );

        Ok(Self {
            ratings,
            movie_ids,
            user_ids,
            rows_by_movie,
        })
    }

    pub fn num_movies(&self) -> usize {
        self.movie_ids.len()
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn nnz(&self) -> usize {
        self.ratings.nnz()
    }

    pub fn density(&self) -> f64 {
        let cells = self.num_movies() * self.num_users();
        if cells == 0 {
            0.0
        } else {
            self.nnz() as f64 / cells as f64
        }
    }

    pub fn movie_id(&self, row: usize) -> Option<i64> {
        self.movie_ids.get(row).copied()
    }

    pub fn row_of(&self, movie_id: i64) -> Option<usize> {
        self.rows_by_movie.get(&movie_id).copied()
    }

    pub fn movie_ids(&self) -> &[i64] {
        &self.movie_ids
    }

    pub fn user_ids(&self) -> &[i64] {
        &self.user_ids
    }

    pub fn row_vector(&self, row: usize) -> Option<CsVecView<'_, f64>> {
        self.ratings.outer_view(row)
    }

    pub(crate) fn csr(&self) -> &CsMat<f64> {
        &self.ratings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings(triples: &[(i64, i64, f64)]) -> Vec<Rating> {
        triples
            .iter()
            .map(|&(movie_id, user_id, rating)| Rating::new(movie_id, user_id, rating))
            .collect()
    }

    #[test]
    fn test_rows_and_columns_are_sorted() {
        let matrix = RatingMatrix::build(&ratings(&[
            (30, 7, 4.0),
            (10, 2, 3.5),
            (20, 7, 1.0),
            (10, 7, 5.0),
        ]))
        .unwrap();

        assert_eq!(matrix.movie_ids(), &[10, 20, 30]);
        assert_eq!(matrix.user_ids(), &[2, 7]);
        assert_eq!(matrix.num_movies(), 3);
        assert_eq!(matrix.num_users(), 2);
        assert_eq!(matrix.nnz(), 4);

        let row: Vec<(usize, f64)> = matrix
            .row_vector(0)
            .unwrap()
            .iter()
            .map(|(column, &value)| (column, value))
            .collect();
        assert_eq!(row, vec![(0, 3.5), (1, 5.0)]);
    }

    #[test]
    fn test_row_mapping_round_trips() {
        let matrix = RatingMatrix::build(&ratings(&[
            (593, 1, 4.0),
            (1, 1, 4.0),
            (296, 2, 5.0),
            (2571, 3, 4.5),
            (1, 3, 3.0),
        ]))
        .unwrap();

        for row in 0..matrix.num_movies() {
            let movie_id = matrix.movie_id(row).unwrap();
            assert_eq!(matrix.row_of(movie_id), Some(row));
        }
        assert_eq!(matrix.movie_id(matrix.num_movies()), None);
        assert_eq!(matrix.row_of(42), None);
    }

    #[test]
    fn test_same_input_same_layout() {
        let forward = ratings(&[(3, 1, 2.0), (1, 2, 4.0), (2, 3, 5.0), (1, 1, 1.0)]);
        let mut backward = forward.clone();
        backward.reverse();

        let a = RatingMatrix::build(&forward).unwrap();
        let b = RatingMatrix::build(&backward).unwrap();

        assert_eq!(a.movie_ids(), b.movie_ids());
        assert_eq!(a.user_ids(), b.user_ids());
        let cells = |m: &RatingMatrix| -> Vec<(f64, (usize, usize))> {
            m.csr().iter().map(|(&value, position)| (value, position)).collect()
        };
        assert_eq!(cells(&a), cells(&b));
    }

    #[test]
    fn test_empty_input_is_data_error() {
        assert!(matches!(RatingMatrix::build(&[]), Err(AppError::DataError(_))));
    }

    #[test]
    fn test_conflicting_duplicate_is_data_error() {
        let result = RatingMatrix::build(&ratings(&[(1, 1, 4.0), (1, 1, 2.5)]));
        assert!(matches!(result, Err(AppError::DataError(_))));
    }

    #[test]
    fn test_identical_duplicate_collapses() {
        let matrix = RatingMatrix::build(&ratings(&[(1, 1, 4.0), (1, 1, 4.0), (2, 1, 3.0)])).unwrap();
        assert_eq!(matrix.nnz(), 2);
        assert_eq!(matrix.row_vector(0).unwrap().get(0), Some(&4.0));
    }

    #[test]
    fn test_invalid_rating_is_data_error() {
        assert!(RatingMatrix::build(&ratings(&[(1, 1, f64::NAN)])).is_err());
        assert!(RatingMatrix::build(&ratings(&[(1, 1, -1.0)])).is_err());
    }

    #[test]
    fn test_density() {
        let matrix = RatingMatrix::build(&ratings(&[(1, 1, 4.0), (2, 2, 3.0)])).unwrap();
        assert!((matrix.density() - 0.5).abs() < 1e-12);
    }
}
