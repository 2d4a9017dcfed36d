#![forbid(unsafe_code)]

//! Listing and querying. The filesystem is the source of truth: everything
//! here is derived by enumerating directories, never from in-memory state.

use std::path::Path;

use crate::{
    db::Db,
    error::{ImageDbError, ImageDbResult},
    options::SizeSpec,
    resolve::{validate_name, GROUPS_DIR},
};

/// Which derivative sizes of an original currently exist on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub name: String,
    /// Widths with a cached derivative, ascending.
    pub widths: Vec<u32>,
    /// Heights with a cached derivative, ascending.
    pub heights: Vec<u32>,
}

impl ImageInfo {
    /// All recorded sizes as specs, widths first.
    pub(crate) fn size_specs(&self) -> impl Iterator<Item = SizeSpec> + '_ {
        self.widths
            .iter()
            .copied()
            .map(SizeSpec::Width)
            .chain(self.heights.iter().copied().map(SizeSpec::Height))
    }
}

impl Db {
    /// Names of all originals in this namespace, excluding groups. No
    /// ordering guarantee beyond filesystem enumeration order.
    pub async fn list_originals(&self) -> ImageDbResult<Vec<String>> {
        list_file_names(&self.layout().originals_dir()).await
    }

    /// The original's name plus the widths and heights for which a
    /// derivative currently exists, or `None` if the original is absent.
    pub async fn describe(&self, name: &str) -> ImageDbResult<Option<ImageInfo>> {
        validate_name(name)?;
        if !tokio::fs::try_exists(self.layout().storage(name, None)).await? {
            return Ok(None);
        }
        Ok(Some(ImageInfo {
            name: name.to_string(),
            widths: scan_dimension(&self.layout().dimension_dir("w"), name).await?,
            heights: scan_dimension(&self.layout().dimension_dir("h"), name).await?,
        }))
    }

    /// Shell-style wildcard match against the originals, returning matching
    /// names (not paths).
    pub async fn glob(&self, pattern: &str) -> ImageDbResult<Vec<String>> {
        let matcher = globset::Glob::new(pattern)
            .map_err(|source| ImageDbError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();
        let mut names = self.list_originals().await?;
        names.retain(|name| matcher.is_match(name));
        Ok(names)
    }

    /// Names of immediate child namespaces existing on disk under `groups/`.
    pub async fn list_groups(&self) -> ImageDbResult<Vec<String>> {
        let dir = self.layout().groups_dir();
        debug_assert!(dir.ends_with(GROUPS_DIR));
        let mut groups = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // No group was ever created.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(groups),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                groups.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(groups)
    }
}

async fn list_file_names(dir: &Path) -> ImageDbResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Scan `w/` or `h/` for numeric subdirectories containing a file named
/// `name`. Returned values are sorted ascending for determinism.
async fn scan_dimension(dir: &Path, name: &str) -> ImageDbResult<Vec<u32>> {
    let mut values = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(values),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let Ok(value) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        if tokio::fs::try_exists(entry.path().join(name)).await? {
            values.push(value);
        }
    }
    values.sort_unstable();
    Ok(values)
}
