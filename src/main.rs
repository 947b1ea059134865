use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use movie_neighbors::config::Config;
use movie_neighbors::display;
use movie_neighbors::genres::GenreCounts;
use movie_neighbors::{AppError, Recommendation, Recommender};

#[derive(Parser)]
#[command(name = "movie-neighbors")]
#[command(about = "Recommend movies with similar rating patterns")]
struct Args {
    /// Directory holding the movie, rating and plot CSV files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Movie catalog file name (movieId,title,genres)
    #[arg(long)]
    movies: Option<String>,

    /// Rating table file name (userId,movieId,rating,timestamp)
    #[arg(long)]
    ratings: Option<String>,

    /// Plot metadata file name
    #[arg(long)]
    plots: Option<String>,

    /// Number of recommendations per query (at most 10)
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Movies similar to TITLE, with a genre breakdown
    Recommend { title: String },
    /// Genre counts across the recommendations for TITLE
    Genres { title: String },
    /// Plot, release date, runtime and genres for TITLE
    Info { title: String },
    /// Catalog titles containing QUERY
    Search {
        query: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Dataset summary
    Stats,
}

#[derive(Serialize)]
struct RecommendationOutput<'a> {
    query: &'a str,
    recommendations: &'a [Recommendation],
    genres: Vec<GenreCount<'a>>,
}

#[derive(Serialize)]
struct GenreCount<'a> {
    genre: &'a str,
    count: usize,
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = apply_args(Config::from_env()?, &args);

    init_tracing(config.log_file.as_ref())?;

    info!("Starting movie-neighbors");
    info!("Data directory: {:?}", config.data_dir);

    let recommender = match Recommender::load(&config) {
        Ok(recommender) => recommender,
        Err(e) => {
            error!("Failed to load movie data: {}", e);
            eprintln!("Failed to load movie data: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    match run(&recommender, &args) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(AppError::NotFound(what)) => {
            info!("Lookup failed: {}", what);
            eprintln!("Movie not found. Please choose from list. ({})", what);
            if let Some(title) = queried_title(&args.command) {
                suggest_titles(&recommender, title);
            }
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            error!("Query failed: {}", e);
            Err(e.into())
        }
    }
}

fn apply_args(mut config: Config, args: &Args) -> Config {
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(movies) = &args.movies {
        config.movies_file = movies.clone();
    }
    if let Some(ratings) = &args.ratings {
        config.ratings_file = ratings.clone();
    }
    if let Some(plots) = &args.plots {
        config.plots_file = plots.clone();
    }
    if let Some(count) = args.count {
        config.recommendation_count = count;
    }
    if let Some(log_file) = &args.log_file {
        config.log_file = Some(log_file.clone());
    }
    config
}

fn init_tracing(log_file: Option<&PathBuf>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;

            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run(recommender: &Recommender, args: &Args) -> Result<(), AppError> {
    match &args.command {
        Command::Recommend { title } => {
            let recommendations = recommender.recommend(title)?;
            let counts = recommender.aggregate_genres(&recommendations);

            if args.json {
                let output = RecommendationOutput {
                    query: title,
                    recommendations: &recommendations,
                    genres: genre_rows(&counts),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", display::format_recommendations(title, &recommendations));
                println!();
                print!("{}", display::format_genre_chart(&counts));
            }
        }
        Command::Genres { title } => {
            let recommendations = recommender.recommend(title)?;
            let counts = recommender.aggregate_genres(&recommendations);

            if args.json {
                println!("{}", serde_json::to_string_pretty(&genre_rows(&counts))?);
            } else {
                print!("{}", display::format_genre_chart(&counts));
            }
        }
        Command::Info { title } => {
            let info = recommender.movie_info(title)?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{}", display::format_movie_info(&info));
            }
        }
        Command::Search { query, limit } => {
            let matches = recommender.search_titles(query);
            info!("{} titles match {:?}", matches.len(), query);

            if args.json {
                let shown: Vec<_> = matches.into_iter().take(*limit).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else if matches.is_empty() {
                println!("No titles contain {:?}", query);
            } else {
                for movie in matches.iter().take(*limit) {
                    println!("{}", movie.title);
                }
                if matches.len() > *limit {
                    println!("... and {} more", matches.len() - limit);
                }
            }
        }
        Command::Stats => {
            let stats = recommender.stats();

            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", display::format_stats(&stats));
            }
        }
    }
    Ok(())
}

fn genre_rows(counts: &GenreCounts) -> Vec<GenreCount<'_>> {
    counts
        .sorted()
        .into_iter()
        .map(|(genre, count)| GenreCount { genre, count })
        .collect()
}

fn queried_title(command: &Command) -> Option<&str> {
    match command {
        Command::Recommend { title } | Command::Genres { title } | Command::Info { title } => {
            Some(title.as_str())
        }
        _ => None,
    }
}

fn suggest_titles(recommender: &Recommender, title: &str) {
    let suggestions = recommender.search_titles(title);
    if suggestions.is_empty() {
        return;
    }

    eprintln!("Did you mean:");
    for movie in suggestions.iter().take(5) {
        eprintln!("  {}", movie.title);
    }
}
