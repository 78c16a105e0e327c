use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage unavailable at {path:?}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Cache has been closed")]
    Closed,

    #[error("Record not found in {table}: {key}")]
    NotFound { table: &'static str, key: String },

    #[error("Malformed id list on measurement item {item_id}: {source}")]
    CorruptIdList {
        item_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl CacheError {
    pub fn unavailable(
        path: &Path,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CacheError::Unavailable {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    }

    pub fn not_found(table: &'static str, key: impl ToString) -> Self {
        CacheError::NotFound {
            table,
            key: key.to_string(),
        }
    }

    /// True for lookups of records that vanished between dependent reads.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
