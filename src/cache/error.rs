use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures inside the storage engine.
///
/// Public cache operations never surface these to request handlers; they are
/// logged and turned into a miss or a `false` result.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("path {path} resolves outside the cache directory")]
    PathEscape { path: PathBuf },
    #[error("failed to encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid cache key `{0}`")]
    InvalidKey(String),
}

impl StorageError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path_escape(path: &Path) -> Self {
        Self::PathEscape {
            path: path.to_path_buf(),
        }
    }

    /// Stable short code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::PathEscape { .. } => "path_escape",
            Self::Encode(_) => "encode",
            Self::InvalidKey(_) => "invalid_key",
        }
    }
}
