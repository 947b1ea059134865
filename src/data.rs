use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::AppError;

/// Placeholder MovieLens uses for movies without any genre tag.
pub const NO_GENRES: &str = "(no genres listed)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub movie_id: i64,
    pub title: String,
    pub genres: String,
}

impl Movie {
    /// Individual genre tags, with empty entries and the MovieLens placeholder removed.
    pub fn genre_tags(&self) -> impl Iterator<Item = &str> {
        self.genres
            .split('|')
            .map(str::trim)
            .filter(|genre| !genre.is_empty() && *genre != NO_GENRES)
    }

    pub fn display_genres(&self) -> String {
        self.genre_tags().collect::<Vec<_>>().join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub movie_id: i64,
    pub user_id: i64,
    pub rating: f64,
}

impl Rating {
    pub fn new(movie_id: i64, user_id: i64, rating: f64) -> Self {
        Self { movie_id, user_id, rating }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoviePlot {
    pub movie_id: i64,
    pub imdb_id: Option<i64>,
    pub tmdb_id: Option<i64>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<f64>,
}

/// The movie catalog with its lookup indexes.
#[derive(Debug, Default)]
pub struct Catalog {
    movies: Vec<Movie>,
    by_id: HashMap<i64, usize>,
    by_title: HashMap<String, i64>,
}

impl Catalog {
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self, AppError> {
        let path = csv_path.as_ref();
        info!("Loading movies from CSV: {:?}", path);

        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| AppError::data(format!("cannot open movie catalog {:?}: {}", path, e)))?;

        let mut movies = Vec::new();
        for result in reader.deserialize() {
            let record: MovieRecord = result.map_err(|e| malformed(path, e))?;
            movies.push(Movie {
                movie_id: record.movie_id,
                title: record.title.unwrap_or_default(),
                genres: record.genres.unwrap_or_default(),
            });
        }

        let catalog = Self::from_movies(movies)?;
        info!("Loaded {} movies", catalog.len());
        Ok(catalog)
    }

    pub fn from_movies(movies: Vec<Movie>) -> Result<Self, AppError> {
        let mut by_id = HashMap::with_capacity(movies.len());
        let mut by_title = HashMap::with_capacity(movies.len());

        for (position, movie) in movies.iter().enumerate() {
            if by_id.insert(movie.movie_id, position).is_some() {
                return Err(AppError::data(format!(
                    "duplicate movieId {} in movie catalog",
                    movie.movie_id
                )));
            }

            if movie.title.is_empty() {
                warn!("Movie {} has no title and cannot be looked up by name", movie.movie_id);
                continue;
            }

            // First occurrence wins so lookups stay stable across runs.
            if let Some(existing) = by_title.get(&movie.title) {
                warn!(
                    "Title {:?} is shared by movies {} and {}; keeping {}",
                    movie.title, existing, movie.movie_id, existing
                );
            } else {
                by_title.insert(movie.title.clone(), movie.movie_id);
            }
        }

        Ok(Self { movies, by_id, by_title })
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn get_movie(&self, movie_id: i64) -> Option<&Movie> {
        self.by_id.get(&movie_id).map(|&position| &self.movies[position])
    }

    pub fn id_for_title(&self, title: &str) -> Option<i64> {
        self.by_title.get(title).copied()
    }

    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    /// Case-insensitive substring match over titles, in catalog order.
    pub fn search(&self, query: &str) -> Vec<&Movie> {
        let query_lower = query.trim().to_lowercase();

        self.movies
            .iter()
            .filter(|movie| movie.title.to_lowercase().contains(&query_lower))
            .collect()
    }
}

pub fn load_ratings<P: AsRef<Path>>(csv_path: P) -> Result<Vec<Rating>, AppError> {
    let path = csv_path.as_ref();
    info!("Loading ratings from CSV: {:?}", path);

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::data(format!("cannot open rating table {:?}: {}", path, e)))?;

    let mut ratings = Vec::new();
    for result in reader.deserialize() {
        let record: RatingRecord = result.map_err(|e| malformed(path, e))?;
        ratings.push(Rating::new(record.movie_id, record.user_id, record.rating));
    }

    info!("Loaded {} ratings", ratings.len());
    Ok(ratings)
}

/// Plot metadata keyed by movie id.
#[derive(Debug, Default)]
pub struct PlotTable {
    plots: HashMap<i64, MoviePlot>,
}

impl PlotTable {
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self, AppError> {
        let path = csv_path.as_ref();
        info!("Loading movie plots from CSV: {:?}", path);

        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| AppError::data(format!("cannot open plot table {:?}: {}", path, e)))?;

        let mut plots = Vec::new();
        for result in reader.deserialize() {
            let record: PlotRecord = result.map_err(|e| malformed(path, e))?;
            plots.push(MoviePlot {
                movie_id: record.movie_id,
                imdb_id: record.imdb_id,
                tmdb_id: record.tmdb_id,
                overview: record.overview.filter(|s| !s.trim().is_empty()),
                release_date: record.release_date.filter(|s| !s.trim().is_empty()),
                runtime: record.runtime,
            });
        }

        let table = Self::from_plots(plots);
        info!("Loaded plot data for {} movies", table.len());
        Ok(table)
    }

    pub fn from_plots(plots: Vec<MoviePlot>) -> Self {
        let mut by_id = HashMap::with_capacity(plots.len());

        for plot in plots {
            if by_id.contains_key(&plot.movie_id) {
                debug!("Ignoring repeated plot row for movie {}", plot.movie_id);
                continue;
            }
            by_id.insert(plot.movie_id, plot);
        }

        Self { plots: by_id }
    }

    pub fn get(&self, movie_id: i64) -> Option<&MoviePlot> {
        self.plots.get(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }
}

fn malformed(path: &Path, e: csv::Error) -> AppError {
    AppError::data(format!("malformed record in {:?}: {}", path, e))
}

#[derive(Debug, Deserialize)]
struct MovieRecord {
    #[serde(rename = "movieId")]
    movie_id: i64,
    title: Option<String>,
    genres: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RatingRecord {
    #[serde(rename = "userId")]
    user_id: i64,
    #[serde(rename = "movieId")]
    movie_id: i64,
    rating: f64,
    #[serde(default)]
    #[allow(dead_code)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PlotRecord {
    #[serde(rename = "movieId")]
    movie_id: i64,
    #[serde(rename = "imdbId", default)]
    imdb_id: Option<i64>,
    #[serde(rename = "tmdbId", default, deserialize_with = "lenient_id")]
    tmdb_id: Option<i64>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_float")]
    runtime: Option<f64>,
}

/// pandas writes nullable integer columns as floats ("862.0").
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(parse_whole_id))
}

fn parse_whole_id(raw: &str) -> Option<i64> {
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Some(value as i64)
        }
        _ => {
            debug!("Ignoring non-integral id {:?}", raw);
            None
        }
    }
}

fn lenient_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok()))
}
