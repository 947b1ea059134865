use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::{load_ratings, Catalog, Movie, PlotTable, Rating};
use crate::errors::AppError;
use crate::genres::{self, GenreCounts};
use crate::matrix::RatingMatrix;
use crate::similarity::SimilarityIndex;

/// Longest recommendation list ever returned.
pub const MAX_RECOMMENDATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub movie_id: i64,
    pub title: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieInfo {
    pub movie_id: i64,
    pub title: String,
    pub release_date: Option<String>,
    pub imdb_id: Option<i64>,
    pub runtime: Option<f64>,
    pub genres: String,
    pub overview: Option<String>,
}

impl MovieInfo {
    /// IMDb identifiers are zero-padded to seven digits.
    pub fn imdb_tag(&self) -> Option<String> {
        self.imdb_id.map(|id| format!("tt{:07}", id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub movies: usize,
    pub rated_movies: usize,
    pub users: usize,
    pub ratings: usize,
    pub density: f64,
    pub movies_with_plots: usize,
}

/// Everything a query needs, loaded once and read-only afterwards.
pub struct Recommender {
    catalog: Catalog,
    plots: PlotTable,
    matrix: RatingMatrix,
    index: SimilarityIndex,
    list_len: usize,
    /// Rated movies with no catalog entry; they can occupy neighbour slots.
    orphans: usize,
}

impl Recommender {
    pub fn load(config: &Config) -> Result<Self, AppError> {
        let catalog = Catalog::load(config.movies_path())?;
        let ratings = load_ratings(config.ratings_path())?;
        let plots = PlotTable::load(config.plots_path())?;

        Self::new(catalog, plots, &ratings, config.recommendation_count)
    }

    pub fn new(
        catalog: Catalog,
        plots: PlotTable,
        ratings: &[Rating],
        list_len: usize,
    ) -> Result<Self, AppError> {
        info!("Initializing recommender");

        let matrix = RatingMatrix::build(ratings)?;

        let orphans = matrix
            .movie_ids()
            .iter()
            .filter(|&&movie_id| catalog.get_movie(movie_id).is_none())
            .count();
        if orphans > 0 {
            warn!("{} rated movies are missing from the catalog and will never be recommended", orphans);
        }

        let unrated = catalog.len().saturating_sub(matrix.num_movies() - orphans);
        if unrated > 0 {
            warn!("{} catalog movies have no ratings and cannot be queried", unrated);
        }

        let index = SimilarityIndex::build(&matrix);
        let list_len = list_len.min(MAX_RECOMMENDATIONS);

        info!(
            "Recommender ready: {} movies, {} users, {} recommendations per query",
            matrix.num_movies(),
            matrix.num_users(),
            list_len
        );

        Ok(Self {
            catalog,
            plots,
            matrix,
            index,
            list_len,
            orphans,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn matrix(&self) -> &RatingMatrix {
        &self.matrix
    }

    pub fn list_len(&self) -> usize {
        self.list_len
    }

    /// Movies whose rating pattern is closest to `title`, nearest first.
    pub fn recommend(&self, title: &str) -> Result<Vec<Recommendation>, AppError> {
        let movie = self.resolve(title)?;
        let row = self.matrix.row_of(movie.movie_id).ok_or_else(|| {
            AppError::not_found(format!("no ratings recorded for movie {:?}", title))
        })?;

        debug!("Getting recommendations for {:?} (movie {}, row {})", title, movie.movie_id, row);

        // The query row comes back in its own result and orphan rows are skipped below.
        let wanted = self.list_len + 1 + self.orphans;
        let mut neighbors = self.index.query(row, wanted)?;
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let recommendations = neighbors
            .into_iter()
            .filter(|neighbor| neighbor.row != row)
            .filter_map(|neighbor| {
                let movie_id = self.matrix.movie_id(neighbor.row)?;
                match self.catalog.get_movie(movie_id) {
                    Some(candidate) => Some(Recommendation {
                        movie_id,
                        title: candidate.title.clone(),
                        distance: neighbor.distance,
                    }),
                    None => {
                        warn!("Skipping neighbour {} which is not in the catalog", movie_id);
                        None
                    }
                }
            })
            .take(self.list_len)
            .collect();

        Ok(recommendations)
    }

    pub fn aggregate_genres(&self, recommendations: &[Recommendation]) -> GenreCounts {
        genres::aggregate_genres(&self.catalog, recommendations)
    }

    pub fn movie_info(&self, title: &str) -> Result<MovieInfo, AppError> {
        let movie = self.resolve(title)?;
        let plot = self.plots.get(movie.movie_id).ok_or_else(|| {
            AppError::not_found(format!("no data available for movie {:?}", title))
        })?;

        Ok(MovieInfo {
            movie_id: movie.movie_id,
            title: movie.title.clone(),
            release_date: plot.release_date.clone(),
            imdb_id: plot.imdb_id,
            runtime: plot.runtime,
            genres: movie.display_genres(),
            overview: plot.overview.clone(),
        })
    }

    pub fn search_titles(&self, query: &str) -> Vec<&Movie> {
        self.catalog.search(query)
    }

    pub fn stats(&self) -> DatasetStats {
        let catalog_ids: HashSet<i64> = self.catalog.movies().iter().map(|m| m.movie_id).collect();
        let movies_with_plots = catalog_ids
            .iter()
            .filter(|&&movie_id| self.plots.get(movie_id).is_some())
            .count();

        DatasetStats {
            movies: self.catalog.len(),
            rated_movies: self.matrix.num_movies(),
            users: self.matrix.num_users(),
            ratings: self.matrix.nnz(),
            density: self.matrix.density(),
            movies_with_plots,
        }
    }

    fn resolve(&self, title: &str) -> Result<&Movie, AppError> {
        self.catalog
            .id_for_title(title)
            .and_then(|movie_id| self.catalog.get_movie(movie_id))
            .ok_or_else(|| AppError::not_found(format!("movie {:?}", title)))
    }
}
