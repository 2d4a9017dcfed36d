#![forbid(unsafe_code)]

/// Target dimension for a transcode.
///
/// Exactly one axis is scaled; the other follows the source aspect ratio.
/// Values are pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resize {
    /// Scale so the output is `value` pixels wide.
    Width(u32),
    /// Scale so the output is `value` pixels tall.
    Height(u32),
}

impl Resize {
    /// The requested pixel value, regardless of axis.
    #[must_use]
    pub fn value(&self) -> u32 {
        match self {
            Self::Width(v) | Self::Height(v) => *v,
        }
    }
}

impl std::fmt::Display for Resize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Width(v) => write!(f, "w{v}"),
            Self::Height(v) => write!(f, "h{v}"),
        }
    }
}
