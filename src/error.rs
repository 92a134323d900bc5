use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare database directory {path:?}: {source}")]
    StorageDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database Error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Database Pool Error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    /// Source bytes could not be read while hashing or inspecting a file.
    pub fn is_read(&self) -> bool {
        matches!(self, Error::Read { .. })
    }

    /// A transaction, commit or connection failure. Prior state is untouched.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Pool(_) | Error::StorageDir { .. })
    }
}
