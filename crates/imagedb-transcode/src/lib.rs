#![forbid(unsafe_code)]

//! # imagedb-transcode
//!
//! The image-transcoding collaborator consumed by `imagedb`.
//!
//! ## Public contract
//!
//! The explicit public contract is the [`Transcoder`] trait: given an input
//! file, an output path and an optional [`Resize`] target, produce a complete
//! resized copy at the output path or fail without leaving one behind.
//!
//! ## What this crate is NOT about (normative)
//!
//! - no cache semantics, no path layout, no derivative bookkeeping;
//! - no image-quality or format-conversion policy beyond "the output path's
//!   extension selects the output format".
//!
//! [`MagickTranscoder`] is the process-backed implementation driving the
//! ImageMagick `convert`/`identify` binaries. Callers that want a different
//! engine implement [`Transcoder`] themselves.

mod error;
mod magick;
mod resize;
mod transcoder;

pub use error::{TranscodeError, TranscodeResult};
pub use magick::MagickTranscoder;
pub use resize::Resize;
pub use transcoder::Transcoder;
