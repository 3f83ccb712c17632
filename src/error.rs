//! Error type shared by every operation in the crate.
//!
//! Fatal conditions abort the current operation with one of
//! these variants. Recoverable conditions (a failed file in
//! a batch, an all-masked image, ...) are reported as
//! `tracing` warnings instead and never surface here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Wrong record type, malformed matrix shape or a bad
    /// parameter value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("column `{0}` not found in table")]
    MissingColumn(String),

    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),

    /// No valid (non-missing) values where some are required.
    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("checkpoint encoding: {0}")]
    Checkpoint(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Failures while decoding radiometric metadata.
    #[error("radiometric import: {0:#}")]
    Radiometric(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Map a `NotFound` io error on `path` to
    /// [`Error::FileNotFound`].
    pub(crate) fn from_io_at(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(err)
        }
    }
}
