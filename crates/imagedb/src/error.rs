#![forbid(unsafe_code)]

use imagedb_transcode::TranscodeError;
use thiserror::Error;

/// Result type used by `imagedb`.
pub type ImageDbResult<T> = Result<T, ImageDbError>;

/// Errors produced by cache operations.
///
/// Notes:
/// - A missing original or derivative at a read path is a normal outcome and
///   surfaces as `Ok(None)`, never as an error.
/// - Multi-derivative operations keep processing after individual failures
///   and report the collected failures via [`ImageDbError::Partial`].
#[derive(Debug, Error)]
pub enum ImageDbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image {name:?} already exists; use force to replace it")]
    AlreadyExists { name: String },

    #[error("exactly one of width or height must be given, and it must be positive")]
    InvalidSizeSpec,

    #[error("invalid image name {name:?}")]
    InvalidName { name: String },

    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("unsupported output format for {name:?}")]
    UnsupportedFormat { name: String },

    #[error("generation failed for {name:?}: {source}")]
    Generation {
        name: String,
        #[source]
        source: TranscodeError,
    },

    #[error("builder configuration error: {0}")]
    Config(&'static str),

    #[error("partial failure: {} of {total} derivative operations failed", .errors.len())]
    Partial {
        total: usize,
        errors: Vec<ImageDbError>,
    },

    #[error("operation cancelled")]
    Cancelled,
}
