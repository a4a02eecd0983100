//! Adapter errors.

use std::path::PathBuf;

/// Errors raised while reading, mutating or restoring a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Snapshot or knowledge storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] skilltune_storage::StorageError),

    /// I/O error on the configuration document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encode/decode error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Version generation failed
    #[error(transparent)]
    Core(#[from] skilltune_core::CoreError),

    /// Configuration file extension is neither JSON nor YAML
    #[error("Unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Empty path or empty path segment
    #[error("Invalid target path: {0:?}")]
    InvalidPath(String),

    /// An intermediate value on the path exists but is not a map
    #[error("Path {path:?} is not navigable at segment {segment:?}")]
    PathNotNavigable {
        /// Full dotted path
        path: String,
        /// Segment whose value is not a map
        segment: String,
    },

    /// The document root is not a map
    #[error("Configuration root is not a map: {}", .0.display())]
    NotAMap(PathBuf),
}
