//! Item-to-item movie recommendations from rating patterns.
//!
//! Ratings are pivoted into a sparse movie × user matrix, movies are compared by
//! cosine distance between their rows, and the nearest rows are translated back
//! to catalog titles. Genre aggregation and plot metadata lookup sit on top.

pub mod config;
pub mod data;
pub mod display;
pub mod errors;
pub mod genres;
pub mod matrix;
pub mod recommender;
pub mod similarity;

pub use errors::AppError;
pub use recommender::{MovieInfo, Recommendation, Recommender};
