use crate::genres::GenreCounts;
use crate::recommender::{DatasetStats, MovieInfo, Recommendation};

const BAR_WIDTH: usize = 30;

pub fn format_recommendations(query: &str, recommendations: &[Recommendation]) -> String {
    let mut out = format!("Movies similar to {}\n", query);

    if recommendations.is_empty() {
        out.push_str("  (no other rated movies)\n");
        return out;
    }

    let title_width = recommendations
        .iter()
        .map(|r| r.title.chars().count())
        .max()
        .unwrap_or(0)
        .max("RECOMMENDATIONS".len());

    out.push_str(&format!(
        "{:>4}  {:<width$}  {:>8}\n",
        "#",
        "RECOMMENDATIONS",
        "Distance",
        width = title_width
    ));
    for (rank, recommendation) in recommendations.iter().enumerate() {
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:>8.4}\n",
            rank + 1,
            recommendation.title,
            recommendation.distance,
            width = title_width
        ));
    }
    out
}

/// Horizontal bar chart, most frequent genre on top.
pub fn format_genre_chart(counts: &GenreCounts) -> String {
    let mut out = String::from("Recommendations by Genre\n");

    let sorted = counts.sorted();
    let Some(&(_, max_count)) = sorted.first() else {
        out.push_str("  (no genre data)\n");
        return out;
    };

    let label_width = sorted.iter().map(|(genre, _)| genre.chars().count()).max().unwrap_or(0);
    for (genre, count) in sorted {
        let bar = (count * BAR_WIDTH).div_ceil(max_count);
        out.push_str(&format!("  {:>width$} | {} {}\n", genre, "#".repeat(bar), count, width = label_width));
    }
    out
}

pub fn format_movie_info(info: &MovieInfo) -> String {
    let missing = || "n/a".to_string();
    let runtime = info.runtime.map(|minutes| format!("{:.0}", minutes));
    let genres = if info.genres.is_empty() { "n/a" } else { info.genres.as_str() };

    [
        format!("Title:         {}", info.title),
        format!("Release Date:  {}", info.release_date.clone().unwrap_or_else(missing)),
        format!("IMDB ID:       {}", info.imdb_tag().unwrap_or_else(missing)),
        format!("Runtime(min):  {}", runtime.unwrap_or_else(missing)),
        format!("Genre(s):      {}", genres),
        format!("Overview:      {}", info.overview.clone().unwrap_or_else(missing)),
    ]
    .iter()
    .map(|line| format!("{}\n", line))
    .collect()
}

pub fn format_stats(stats: &DatasetStats) -> String {
    [
        format!("Movies in catalog:   {}", stats.movies),
        format!("Movies with ratings: {}", stats.rated_movies),
        format!("Movies with plots:   {}", stats.movies_with_plots),
        format!("Users:               {}", stats.users),
        format!("Ratings:             {}", stats.ratings),
        format!("Matrix density:      {:.4}%", stats.density * 100.0),
    ]
    .iter()
    .map(|line| format!("{}\n", line))
    .collect()
}
