use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `chunkzip` crate.
///
/// Planning variants are raised before any output exists. `Io` on the output
/// path and `Protocol` abort a run that is already writing; the pipeline removes
/// the partial archive in that case.
#[derive(Error, Debug)]
pub enum ArchiverError {
    /// The input root does not exist.
    #[error("input path '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    /// The input root exists but is not a directory.
    #[error("input path '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The input root contains no regular files.
    #[error("input folder '{}' is empty", .0.display())]
    EmptyInput(PathBuf),

    /// A file path cannot be represented as an archive name.
    #[error("cannot archive '{}': {reason}", .path.display())]
    InvalidName { path: PathBuf, reason: String },

    /// Two source files mapped to the same archive name.
    #[error("duplicate archive name '{0}'")]
    DuplicateName(String),

    /// A file would need more chunks than the header can count.
    #[error("'{}' needs {chunks} chunks, more than the format allows", .path.display())]
    TooManyChunks { path: PathBuf, chunks: u64 },

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A configuration value is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The chunk result stream violated the scheduler contract.
    #[error("assembly protocol violation: {0}")]
    Protocol(String),

    /// The archive being decoded is malformed.
    #[error("format error: {0}")]
    Format(String),

    /// Serialization of a report failed.
    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ArchiverError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::Io { source, path: path.into() }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for ArchiverError {
    fn from(err: std::io::Error) -> Self {
        ArchiverError::Io { source: err, path: PathBuf::new() }
    }
}

/// Failure of a single chunk. Never fatal to the run.
#[derive(Error, Debug)]
pub enum ChunkError {
    /// The designated byte range could not be read after planning.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// The codec rejected the chunk.
    #[error("codec failed: {0}")]
    Codec(#[source] std::io::Error),
}

/// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ArchiverError>;
