#![forbid(unsafe_code)]

use std::path::Path;

use async_trait::async_trait;

use crate::{Resize, TranscodeResult};

/// Image-transcoding capability.
///
/// ## Normative
///
/// - `transcode` produces a complete, correctly resized copy of `input` at
///   `output`, in the format implied by `output`'s extension.
/// - With `resize: None` the output is a straight format-normalized copy.
/// - When the requested dimension is greater than or equal to the source's
///   corresponding dimension, the implementation copies the input verbatim
///   instead of upscaling.
/// - On failure no file may remain at `output`. Callers typically pass a
///   staging path and rename into place themselves; implementations must
///   still not leave partial output behind on their own account.
/// - Implementations are deterministic for a given (input, resize) pair.
#[async_trait]
pub trait Transcoder: Send + Sync + 'static {
    /// Produce a resized (or format-normalized) copy of `input` at `output`.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        resize: Option<Resize>,
    ) -> TranscodeResult<()>;
}
