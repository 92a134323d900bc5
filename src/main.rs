use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use metavault::ingest::scanner;
use metavault::{FavoriteInput, MetaStore, PerceptualHashes, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file. Overrides the configured path.
    #[arg(short, long, global = true)]
    db: Option<PathBuf>,

    /// JSON settings file. Without it, defaults plus `.env` overrides apply.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the metadata document extracted for one file.
    Ingest {
        file: PathBuf,
        #[arg(short, long)]
        metadata: PathBuf,
        /// Perceptual hash as `algorithm=hex`, repeatable.
        #[arg(long = "hash")]
        hashes: Vec<String>,
        #[arg(long)]
        favorite: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Import every file under a directory.
    Scan {
        dir: PathBuf,
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
    Search {
        query: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Field change history of a file, given its id or path.
    History {
        file: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    Stats,
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    Similar {
        hash: String,
        #[arg(short, long)]
        threshold: Option<u32>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long)]
        algorithm: Option<String>,
    },
    Delete {
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    Toggle {
        file_id: i64,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_hashes(raw: &[String]) -> Result<Option<PerceptualHashes>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(algorithm, hex)| (algorithm.trim().to_string(), hex.trim().to_string()))
                .ok_or_else(|| anyhow!("Expected algorithm=hex, got '{}'", pair))
        })
        .collect::<Result<PerceptualHashes>>()
        .map(Some)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::discover()?,
    };
    if let Some(db) = args.db {
        settings.db_path = db;
    }
    info!("DB: {:?}", settings.db_path);

    let db_path = settings.db_path.clone();
    let store = MetaStore::open(&db_path, settings).context("Failed to open database")?;

    match args.command {
        Command::Ingest { file, metadata, hashes, favorite, notes, tags } => {
            let raw = fs::read_to_string(&metadata)
                .with_context(|| format!("Failed to read metadata document {:?}", metadata))?;
            let document: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse metadata document {:?}", metadata))?;
            let hashes = parse_hashes(&hashes)?;
            let favorite = (favorite || notes.is_some() || !tags.is_empty())
                .then(|| FavoriteInput { notes, tags });

            let file_id = store.upsert(&file, &document, hashes.as_ref(), favorite.as_ref())?;
            print_json(&serde_json::json!({ "file_id": file_id }))?;
        }
        Command::Scan { dir, workers } => {
            let report = scanner::run_scan(&store, &dir, workers, true)?;
            print_json(&report)?;
        }
        Command::Search { query, limit, offset } => {
            print_json(&store.search(&query, limit, offset))?;
        }
        Command::History { file, limit, offset } => {
            let entries = match file.parse::<i64>() {
                Ok(file_id) => store.history(file_id, limit, offset),
                Err(_) => store.history_for_path(&PathBuf::from(&file), limit, offset),
            };
            print_json(&entries)?;
        }
        Command::Stats => print_json(&store.stats())?,
        Command::Favorites { action } => match action {
            FavoritesAction::List { limit } => print_json(&store.list_favorites(limit))?,
            FavoritesAction::Toggle { file_id, notes, tags } => {
                let tags = (!tags.is_empty()).then_some(tags);
                let favorited = store.toggle_favorite(file_id, notes.as_deref(), tags.as_deref())?;
                print_json(&serde_json::json!({ "file_id": file_id, "favorite": favorited }))?;
            }
        },
        Command::Similar { hash, threshold, limit, algorithm } => {
            let threshold = threshold.unwrap_or(store.settings().similarity.default_threshold);
            let matches = match algorithm {
                Some(algorithm) => store.find_similar_with(&algorithm, &hash, threshold, limit),
                None => store.find_similar(&hash, threshold, limit),
            };
            print_json(&matches)?;
        }
        Command::Delete { path } => {
            let deleted = store.delete(&path)?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
    }

    store.close();
    Ok(())
}
