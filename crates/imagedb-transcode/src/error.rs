#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

/// Result type used by `imagedb-transcode`.
pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Errors produced by transcoder implementations.
///
/// Notes:
/// - Higher-level crates wrap this error to add domain context (image name,
///   derivative key, etc.).
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input file {0:?} does not exist")]
    InputMissing(PathBuf),

    #[error("cannot find {name:?} binary")]
    MissingBinary { name: &'static str },

    #[error("identify failed for {input:?}: {detail}")]
    Probe { input: PathBuf, detail: String },

    #[error("unparseable identify output for {input:?}: {output:?}")]
    BadProbeOutput { input: PathBuf, output: String },

    #[error("convert failed: {detail}")]
    Convert { detail: String },

    #[error("operation cancelled")]
    Cancelled,
}
