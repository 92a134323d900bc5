//! Embedded metadata store with field-level change history, a small query
//! language, perceptual-hash similarity search and favorites.

pub mod database;
pub mod error;
pub mod ingest;
pub mod media;
pub mod query;
pub mod similarity;
pub mod utils;

pub use database::models::{ChangeType, FavoriteEntry, FavoriteInput, FileRecord, HistoryEntry, SearchResults, Stats};
pub use database::store::{MetaStore, PerceptualHashes};
pub use error::{Error, Result};
pub use ingest::flatten::{FieldKey, FieldMap, Flattener};
pub use similarity::SimilarMatch;
pub use utils::config::Settings;
