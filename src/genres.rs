use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use crate::data::Catalog;
use crate::recommender::Recommendation;

/// Genre tag frequencies over a set of recommended movies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenreCounts {
    counts: HashMap<String, usize>,
}

impl GenreCounts {
    pub fn get(&self, genre: &str) -> usize {
        self.counts.get(genre).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(genre, &count)| (genre.as_str(), count))
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Most frequent first; equal counts ordered by tag.
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    fn add_movie<'a>(&mut self, tags: impl Iterator<Item = &'a str>) {
        // A tag listed twice for one movie still counts once.
        let unique: BTreeSet<&str> = tags.collect();
        for tag in unique {
            *self.counts.entry(tag.to_string()).or_insert(0) += 1;
        }
    }
}

/// Count genre tags across the movies of a recommendation list.
///
/// Movies with no genre data contribute nothing; a recommendation whose movie
/// is no longer in the catalog is skipped with a warning.
pub fn aggregate_genres(catalog: &Catalog, recommendations: &[Recommendation]) -> GenreCounts {
    let mut counts = GenreCounts::default();

    for recommendation in recommendations {
        match catalog.get_movie(recommendation.movie_id) {
            Some(movie) => counts.add_movie(movie.genre_tags()),
            None => warn!(
                "Recommended movie {} ({:?}) is missing from the catalog",
                recommendation.movie_id, recommendation.title
            ),
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Movie;

    fn catalog(movies: &[(i64, &str, &str)]) -> Catalog {
        Catalog::from_movies(
            movies
                .iter()
                .map(|&(movie_id, title, genres)| Movie {
                    movie_id,
                    title: title.to_string(),
                    genres: genres.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn recommendation(movie_id: i64, title: &str) -> Recommendation {
        Recommendation {
            movie_id,
            title: title.to_string(),
            distance: 0.5,
        }
    }

    #[test]
    fn test_counts_shared_genres() {
        let catalog = catalog(&[(1, "A", "Action|Comedy"), (2, "B", "Comedy|Drama"), (3, "C", "Horror")]);
        let counts = aggregate_genres(&catalog, &[recommendation(1, "A"), recommendation(2, "B")]);

        assert_eq!(counts.len(), 3);
        assert_eq!(counts.get("Action"), 1);
        assert_eq!(counts.get("Comedy"), 2);
        assert_eq!(counts.get("Drama"), 1);
        assert_eq!(counts.get("Horror"), 0);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_missing_genres_contribute_nothing() {
        let catalog = catalog(&[(1, "A", ""), (2, "B", "(no genres listed)"), (3, "C", "Western")]);
        let counts = aggregate_genres(
            &catalog,
            &[recommendation(1, "A"), recommendation(2, "B"), recommendation(3, "C")],
        );

        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("Western"), 1);
    }

    #[test]
    fn test_unknown_movie_is_skipped() {
        let catalog = catalog(&[(1, "A", "Drama")]);
        let counts = aggregate_genres(&catalog, &[recommendation(1, "A"), recommendation(99, "Gone")]);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_repeated_tag_counts_once_per_movie() {
        let catalog = catalog(&[(1, "A", "Drama|Drama"), (2, "B", "Drama")]);
        let counts = aggregate_genres(&catalog, &[recommendation(1, "A"), recommendation(2, "B")]);
        assert_eq!(counts.get("Drama"), 2);
    }

    #[test]
    fn test_sorted_by_count_then_name() {
        let catalog = catalog(&[
            (1, "A", "Thriller|Crime"),
            (2, "B", "Crime|Action"),
            (3, "C", "Thriller|Crime"),
        ]);
        let counts = aggregate_genres(
            &catalog,
            &[recommendation(1, "A"), recommendation(2, "B"), recommendation(3, "C")],
        );

        assert_eq!(counts.sorted(), vec![("Crime", 3), ("Thriller", 2), ("Action", 1)]);
    }

    #[test]
    fn test_empty_list() {
        let catalog = catalog(&[(1, "A", "Drama")]);
        assert!(aggregate_genres(&catalog, &[]).is_empty());
    }
}
