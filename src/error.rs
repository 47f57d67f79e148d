use std::path::PathBuf;

use thiserror::Error;

use crate::types::UserId;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("scenario '{name}' not found in {path}")]
    UnknownScenario { name: String, path: PathBuf },
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache entry '{key}' is not a valid {expected}")]
    CacheEntry { key: String, expected: &'static str },
    #[error("horizon {horizon} outside 1..={max}")]
    Horizon { horizon: usize, max: usize },
    #[error("baseline trace has no practice for user {0}")]
    MismatchedTraces(UserId),
}

impl SimError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
