use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::recommender::MAX_RECOMMENDATIONS;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub movies_file: String,
    pub ratings_file: String,
    pub plots_file: String,
    pub recommendation_count: usize,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            movies_file: "movie_data.csv".to_string(),
            ratings_file: "rating_data.csv".to_string(),
            plots_file: "movie_plots.csv".to_string(),
            recommendation_count: MAX_RECOMMENDATIONS,
            log_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            data_dir: env::var("MOVIE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),

            movies_file: env::var("MOVIES_CSV").unwrap_or(defaults.movies_file),

            ratings_file: env::var("RATINGS_CSV").unwrap_or(defaults.ratings_file),

            plots_file: env::var("PLOTS_CSV").unwrap_or(defaults.plots_file),

            recommendation_count: match env::var("RECOMMENDATION_COUNT") {
                Ok(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .context("Invalid RECOMMENDATION_COUNT")?
                    .min(MAX_RECOMMENDATIONS),
                Err(_) => defaults.recommendation_count,
            },

            log_file: env::var("MOVIE_LOG_FILE").ok().map(PathBuf::from),
        })
    }

    pub fn movies_path(&self) -> PathBuf {
        self.data_dir.join(&self.movies_file)
    }

    pub fn ratings_path(&self) -> PathBuf {
        self.data_dir.join(&self.ratings_file)
    }

    pub fn plots_path(&self) -> PathBuf {
        self.data_dir.join(&self.plots_file)
    }
}
