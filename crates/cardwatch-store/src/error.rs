use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data directory not found: {0}")]
    DataDirNotFound(PathBuf),

    #[error("unknown record: {0}")]
    UnknownRecord(String),

    #[error("{path}: top level is not a mapping")]
    NotAMapping { path: PathBuf },

    #[error("{path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisting {path}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

/// Why a single change could not be written into a record's text.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    #[error("field '{0}' not found in file")]
    AnchorNotFound(String),

    #[error("existing block for '{field}' does not parse: {source}")]
    BlockParse {
        field: String,
        source: serde_yaml::Error,
    },

    #[error("patched file no longer parses: {0}")]
    Reparse(serde_yaml::Error),

    #[error("patched file reads back '{field}' as {found}")]
    Readback { field: String, found: String },

    #[error("change to '{0}' left the file unchanged")]
    NoEffect(String),
}
