#![forbid(unsafe_code)]

//! ImageMagick process backend.
//!
//! Drives the external `convert` and `identify` binaries. Scaling preserves
//! aspect ratio (`-scale <w>` / `-scale x<h>`); a request at or above the
//! source dimension degrades to a verbatim copy so images are never upscaled.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{Resize, TranscodeError, TranscodeResult, Transcoder};

const SEARCH_DIRS: [&str; 2] = ["/usr/local/bin", "/usr/bin"];

/// [`Transcoder`] implementation backed by ImageMagick processes.
///
/// Dimensions are probed with `identify` before each scaling transcode so the
/// no-upscale policy can be applied. The wrapped processes are killed when the
/// cancellation token fires; a cancelled transcode surfaces as
/// [`TranscodeError::Cancelled`].
#[derive(Clone, Debug)]
pub struct MagickTranscoder {
    convert: PathBuf,
    identify: PathBuf,
    cancel: CancellationToken,
}

impl MagickTranscoder {
    /// Create a transcoder with explicit binary paths.
    pub fn new(
        convert: impl Into<PathBuf>,
        identify: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            convert: convert.into(),
            identify: identify.into(),
            cancel,
        }
    }

    /// Locate `convert` and `identify` in the conventional install dirs.
    pub fn discover(cancel: CancellationToken) -> TranscodeResult<Self> {
        let convert = find_binary("convert")?;
        let identify = find_binary("identify")?;
        Ok(Self::new(convert, identify, cancel))
    }

    /// Probe `(width, height)` of an existing image via `identify`.
    pub async fn probe(&self, input: &Path) -> TranscodeResult<(u32, u32)> {
        let mut cmd = Command::new(&self.identify);
        cmd.arg(input);
        let output = self.run(cmd).await?;
        if !output.status.success() {
            return Err(TranscodeError::Probe {
                input: input.to_path_buf(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_identify_output(&stdout).ok_or_else(|| TranscodeError::BadProbeOutput {
            input: input.to_path_buf(),
            output: stdout.into_owned(),
        })
    }

    async fn run(&self, mut cmd: Command) -> TranscodeResult<std::process::Output> {
        cmd.kill_on_drop(true);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TranscodeError::Cancelled),
            output = cmd.output() => Ok(output?),
        }
    }

    async fn convert(&self, args: &[&str], input: &Path, output: &Path) -> TranscodeResult<()> {
        let mut cmd = Command::new(&self.convert);
        cmd.args(["-colorspace", "RGB"])
            .args(args)
            .arg(input)
            .arg(output);
        let out = self.run(cmd).await?;
        tracing::debug!(convert = ?self.convert, args = ?args, input = ?input, status = ?out.status, "ran convert");
        if !out.status.success() {
            // `convert` usually does not write output on failure; remove any
            // partial file so nothing half-formed remains at the target.
            let _ = tokio::fs::remove_file(output).await;
            return Err(TranscodeError::Convert {
                detail: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for MagickTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        resize: Option<Resize>,
    ) -> TranscodeResult<()> {
        if !tokio::fs::try_exists(input).await? {
            return Err(TranscodeError::InputMissing(input.to_path_buf()));
        }
        match resize {
            Some(Resize::Width(w)) => {
                let (src_w, _) = self.probe(input).await?;
                if w >= src_w {
                    tracing::debug!(input = ?input, requested = w, source = src_w, "no upscale, copying verbatim");
                    tokio::fs::copy(input, output).await?;
                    Ok(())
                } else {
                    let scale = w.to_string();
                    self.convert(&["-scale", &scale], input, output).await
                }
            }
            Some(Resize::Height(h)) => {
                let (_, src_h) = self.probe(input).await?;
                if h >= src_h {
                    tracing::debug!(input = ?input, requested = h, source = src_h, "no upscale, copying verbatim");
                    tokio::fs::copy(input, output).await?;
                    Ok(())
                } else {
                    let scale = format!("x{h}");
                    self.convert(&["-scale", &scale], input, output).await
                }
            }
            None => self.convert(&[], input, output).await,
        }
    }
}

fn find_binary(name: &'static str) -> TranscodeResult<PathBuf> {
    for dir in SEARCH_DIRS {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(TranscodeError::MissingBinary { name })
}

/// Parse the `WxH` geometry token out of `identify` line output, e.g.
/// `photo.jpg JPEG 1024x768 1024x768+0+0 8-bit sRGB 187KB ...`.
fn parse_identify_output(stdout: &str) -> Option<(u32, u32)> {
    let geometry = stdout.split_whitespace().nth(2)?;
    let (w, h) = geometry.split_once('x')?;
    let h: String = h.chars().take_while(char::is_ascii_digit).collect();
    Some((w.parse().ok()?, h.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("photo.jpg JPEG 1024x768 1024x768+0+0 8-bit sRGB 187KB 0.000u 0:00.000", Some((1024, 768)))]
    #[case("a.png PNG 60x40 60x40+0+0 8-bit sRGB", Some((60, 40)))]
    #[case("b.gif GIF 1x1+0+0", Some((1, 1)))]
    #[case("c.jpg JPEG geometry missing", None)]
    #[case("", None)]
    #[case("only two", None)]
    fn identify_parsing(#[case] line: &str, #[case] expected: Option<(u32, u32)>) {
        assert_eq!(parse_identify_output(line), expected);
    }

    #[rstest]
    #[case(Resize::Width(60), 60)]
    #[case(Resize::Height(135), 135)]
    fn resize_value(#[case] resize: Resize, #[case] value: u32) {
        assert_eq!(resize.value(), value);
    }
}
