#![forbid(unsafe_code)]

use imagedb_transcode::Resize;

use crate::error::{ImageDbError, ImageDbResult};

/// Size request for a derivative: exactly one axis, in pixels.
///
/// Together with an image name this forms the derivative key; the derivative
/// for `("photo.jpg", Width(60))` lives at `w/60/photo.jpg`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeSpec {
    Width(u32),
    Height(u32),
}

impl SizeSpec {
    /// Validate a raw `(width, height)` option pair.
    ///
    /// `(None, None)` means "no size" (`Ok(None)`); anything other than
    /// exactly one positive value is [`ImageDbError::InvalidSizeSpec`].
    pub fn from_options(width: Option<u32>, height: Option<u32>) -> ImageDbResult<Option<Self>> {
        let spec = match (width, height) {
            (None, None) => return Ok(None),
            (Some(w), None) => Self::Width(w),
            (None, Some(h)) => Self::Height(h),
            (Some(_), Some(_)) => return Err(ImageDbError::InvalidSizeSpec),
        };
        spec.validate()?;
        Ok(Some(spec))
    }

    /// Dimension values are positive pixel counts.
    pub fn validate(&self) -> ImageDbResult<()> {
        if self.value() == 0 {
            return Err(ImageDbError::InvalidSizeSpec);
        }
        Ok(())
    }

    /// The requested pixel value, regardless of axis.
    #[must_use]
    pub fn value(&self) -> u32 {
        match self {
            Self::Width(v) | Self::Height(v) => *v,
        }
    }

    /// Directory segment for this axis (`"w"` or `"h"`).
    #[must_use]
    pub(crate) fn dir(&self) -> &'static str {
        match self {
            Self::Width(_) => "w",
            Self::Height(_) => "h",
        }
    }
}

impl From<SizeSpec> for Resize {
    fn from(spec: SizeSpec) -> Self {
        match spec {
            SizeSpec::Width(w) => Resize::Width(w),
            SizeSpec::Height(h) => Resize::Height(h),
        }
    }
}

/// Options recognized by [`Db::fetch`](crate::Db::fetch).
///
/// The default value is a bare fetch: resolve the original against the
/// public root, no generation options.
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Desired width in pixels. Mutually exclusive with `height`.
    pub width: Option<u32>,
    /// Desired height in pixels. Mutually exclusive with `width`.
    pub height: Option<u32>,
    /// Resolve against the storage root instead of the public root.
    pub absolute: bool,
    /// Per-call fallback override. `Some(Some(name))` substitutes `name` for
    /// a missing original; `Some(None)` suppresses the configured fallback
    /// for this call; `None` defers to the namespace configuration.
    pub not_found: Option<Option<String>>,
    /// Never generate the requested derivative; a cache miss resolves to the
    /// fallback (which may itself be generated) or `None`.
    pub require_exists: bool,
    /// Suppress the `Create` hook for this call.
    pub skip_hook: bool,
    /// Regenerate even when the derivative is already cached.
    pub force_regenerate: bool,
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    #[must_use]
    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn absolute(mut self) -> Self {
        self.absolute = true;
        self
    }

    /// Substitute `name` for a missing original on this call only.
    #[must_use]
    pub fn not_found(mut self, name: impl Into<String>) -> Self {
        self.not_found = Some(Some(name.into()));
        self
    }

    /// Suppress the configured fallback for this call only.
    #[must_use]
    pub fn no_fallback(mut self) -> Self {
        self.not_found = Some(None);
        self
    }

    #[must_use]
    pub fn require_exists(mut self) -> Self {
        self.require_exists = true;
        self
    }

    #[must_use]
    pub fn skip_hook(mut self) -> Self {
        self.skip_hook = true;
        self
    }

    #[must_use]
    pub fn force_regenerate(mut self) -> Self {
        self.force_regenerate = true;
        self
    }

    /// Validated size spec from the raw width/height fields.
    pub fn size(&self) -> ImageDbResult<Option<SizeSpec>> {
        SizeSpec::from_options(self.width, self.height)
    }

    /// True when no option at all is set (a bare fetch of the original).
    pub(crate) fn is_bare(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && !self.absolute
            && self.not_found.is_none()
            && !self.require_exists
            && !self.skip_hook
            && !self.force_regenerate
    }

    /// True when at least one size-affecting option is present. A non-bare
    /// call without any of these is malformed.
    pub(crate) fn has_size_affecting_option(&self) -> bool {
        self.width.is_some() || self.height.is_some() || self.absolute || self.not_found.is_some()
    }
}

/// Options recognized by [`Db::store`](crate::Db::store).
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    /// Store under this name instead of the source file's base name.
    pub name: Option<String>,
    /// Overwrite an existing original instead of failing.
    pub force: bool,
}

impl StoreOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}
