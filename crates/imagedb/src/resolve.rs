#![forbid(unsafe_code)]

//! Pure path resolution. No I/O happens here; resolved locations are a
//! deterministic function of (root, name, size) whether or not the files
//! exist.

use std::path::{Path, PathBuf};

use crate::{
    error::{ImageDbError, ImageDbResult},
    options::SizeSpec,
};

pub(crate) const ORIGINALS_DIR: &str = "originals";
pub(crate) const GROUPS_DIR: &str = "groups";

/// Output extensions the transcoder contract supports, lowercase.
const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "gif", "png"];

/// Root pair for one namespace: the storage root owns the files, the public
/// root is used for caller-facing locations (e.g. composing URLs).
#[derive(Clone, Debug)]
pub(crate) struct Layout {
    storage_root: PathBuf,
    public_root: PathBuf,
}

impl Layout {
    pub(crate) fn new(storage_root: PathBuf, public_root: Option<PathBuf>) -> Self {
        let public_root = public_root.unwrap_or_else(|| storage_root.clone());
        Self {
            storage_root,
            public_root,
        }
    }

    /// Layout of the child namespace `group` under `groups/`.
    pub(crate) fn child(&self, group: &str) -> Self {
        Self {
            storage_root: self.storage_root.join(GROUPS_DIR).join(group),
            public_root: self.public_root.join(GROUPS_DIR).join(group),
        }
    }

    pub(crate) fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub(crate) fn public_root(&self) -> &Path {
        &self.public_root
    }

    /// Machine-facing location, for real filesystem operations.
    pub(crate) fn storage(&self, name: &str, size: Option<SizeSpec>) -> PathBuf {
        resolve(&self.storage_root, name, size)
    }

    /// Caller-facing location, resolved against the public root.
    pub(crate) fn public(&self, name: &str, size: Option<SizeSpec>) -> PathBuf {
        resolve(&self.public_root, name, size)
    }

    /// Storage or public location, selected by `absolute`.
    pub(crate) fn resolve(&self, name: &str, size: Option<SizeSpec>, absolute: bool) -> PathBuf {
        if absolute {
            self.storage(name, size)
        } else {
            self.public(name, size)
        }
    }

    pub(crate) fn originals_dir(&self) -> PathBuf {
        self.storage_root.join(ORIGINALS_DIR)
    }

    pub(crate) fn dimension_dir(&self, dir: &str) -> PathBuf {
        self.storage_root.join(dir)
    }

    pub(crate) fn groups_dir(&self) -> PathBuf {
        self.storage_root.join(GROUPS_DIR)
    }
}

fn resolve(root: &Path, name: &str, size: Option<SizeSpec>) -> PathBuf {
    match size {
        None => root.join(ORIGINALS_DIR).join(name),
        Some(spec) => root.join(spec.dir()).join(spec.value().to_string()).join(name),
    }
}

/// Reject names that would escape the layout: empty, path separators, `..`
/// or `.` components. The resolver only ever joins a single final segment.
pub(crate) fn validate_name(name: &str) -> ImageDbResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return Err(ImageDbError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Extension gate for derivative generation: `.jpg`, `.jpeg`, `.gif`, `.png`,
/// case-insensitive.
pub(crate) fn supported_format(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
}
