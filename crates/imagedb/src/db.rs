#![forbid(unsafe_code)]

//! Namespace tree and the derivative generation engine.
//!
//! A [`Db`] is one cache namespace rooted at a directory. Child namespaces
//! ("groups") live under `groups/<name>` and are full, isolated caches of
//! their own; they hold a weak back-reference to the parent used only for
//! fallback-image inheritance.
//!
//! Generation is single-flight per derivative key: concurrent fetches for the
//! same `(name, axis, value)` collapse onto one transcoder invocation, while
//! distinct keys proceed in parallel. Derivative files appear atomically via
//! a staging file renamed into place.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use imagedb_transcode::{TranscodeError, Transcoder};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ImageDbError, ImageDbResult},
    event::{CreateEvent, DeleteEvent},
    hooks::Hooks,
    options::{FetchOptions, SizeSpec, StoreOptions},
    resolve::{supported_format, validate_name, Layout},
};

/// Key of one derivative within a namespace. At most one generation may be
/// in flight per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FlightKey {
    name: String,
    size: SizeSpec,
}

struct Shared {
    layout: Layout,
    /// Non-owning back-reference, used only for upward fallback lookup.
    parent: Option<Weak<Shared>>,
    fallback_image: RwLock<Option<String>>,
    use_fallback: AtomicBool,
    children: DashMap<String, Db>,
    flights: DashMap<FlightKey, Arc<Mutex<()>>>,
    hooks: Option<Arc<dyn Hooks>>,
    transcoder: Arc<dyn Transcoder>,
    cancel: CancellationToken,
}

impl Shared {
    /// Own fallback name, else the nearest ancestor's.
    fn effective_fallback(&self) -> Option<String> {
        if let Some(name) = self.fallback_image.read().clone() {
            return Some(name);
        }
        let mut parent = self.parent.clone();
        while let Some(weak) = parent {
            let Some(shared) = weak.upgrade() else { break };
            if let Some(name) = shared.fallback_image.read().clone() {
                return Some(name);
            }
            parent = shared.parent.clone();
        }
        None
    }
}

/// One cache namespace. Cheap to clone; clones share the same node.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("storage_root", &self.shared.layout.storage_root())
            .field("public_root", &self.shared.layout.public_root())
            .field("use_fallback", &self.use_fallback())
            .finish_non_exhaustive()
    }
}

/// Constructor for a root [`Db`].
///
/// `storage_root` and `transcoder` are required; the public root defaults to
/// the storage root.
pub struct DbBuilder {
    storage_root: Option<PathBuf>,
    public_root: Option<PathBuf>,
    fallback_image: Option<String>,
    use_fallback: bool,
    hooks: Option<Arc<dyn Hooks>>,
    transcoder: Option<Arc<dyn Transcoder>>,
    cancel: Option<CancellationToken>,
}

impl Default for DbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DbBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage_root: None,
            public_root: None,
            fallback_image: None,
            use_fallback: false,
            hooks: None,
            transcoder: None,
            cancel: None,
        }
    }

    /// Directory owning this namespace's files. Required.
    #[must_use]
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Root used for caller-facing locations (e.g. an HTTP alias pointing at
    /// the storage root). Defaults to the storage root.
    #[must_use]
    pub fn public_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.public_root = Some(root.into());
        self
    }

    /// Name of the "not found" image local to this namespace.
    #[must_use]
    pub fn fallback_image(mut self, name: impl Into<String>) -> Self {
        self.fallback_image = Some(name.into());
        self
    }

    /// Enable fallback substitution for missing originals.
    #[must_use]
    pub fn use_fallback(mut self, enabled: bool) -> Self {
        self.use_fallback = enabled;
        self
    }

    /// Event sink notified of create/delete operations.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The external transcoding collaborator. Required.
    #[must_use]
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the root namespace, eagerly creating its subdirectories.
    pub fn build(self) -> ImageDbResult<Db> {
        let storage_root = self
            .storage_root
            .ok_or(ImageDbError::Config("storage_root is required"))?;
        let transcoder = self
            .transcoder
            .ok_or(ImageDbError::Config("transcoder is required"))?;
        if let Some(name) = &self.fallback_image {
            validate_name(name)?;
        }
        Db::from_shared(Shared {
            layout: Layout::new(storage_root, self.public_root),
            parent: None,
            fallback_image: RwLock::new(self.fallback_image),
            use_fallback: AtomicBool::new(self.use_fallback),
            children: DashMap::new(),
            flights: DashMap::new(),
            hooks: self.hooks,
            transcoder,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl Db {
    #[must_use]
    pub fn builder() -> DbBuilder {
        DbBuilder::new()
    }

    fn from_shared(shared: Shared) -> ImageDbResult<Self> {
        // Eager layout creation; existence of these dirs is assumed by every
        // operation afterwards.
        std::fs::create_dir_all(shared.layout.originals_dir())?;
        std::fs::create_dir_all(shared.layout.dimension_dir("w"))?;
        std::fs::create_dir_all(shared.layout.dimension_dir("h"))?;
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub fn storage_root(&self) -> &Path {
        self.shared.layout.storage_root()
    }

    pub fn public_root(&self) -> &Path {
        self.shared.layout.public_root()
    }

    pub fn use_fallback(&self) -> bool {
        self.shared.use_fallback.load(Ordering::Relaxed)
    }

    pub fn set_use_fallback(&self, enabled: bool) {
        self.shared.use_fallback.store(enabled, Ordering::Relaxed);
    }

    /// Effective fallback image name: this namespace's, else the nearest
    /// ancestor's, else none.
    pub fn fallback_image(&self) -> Option<String> {
        self.shared.effective_fallback()
    }

    /// Set (or clear) this namespace's own fallback image name.
    pub fn set_fallback_image(&self, name: Option<String>) -> ImageDbResult<()> {
        if let Some(name) = &name {
            validate_name(name)?;
        }
        *self.shared.fallback_image.write() = name;
        Ok(())
    }

    /// Resolve the location `name` would occupy, whether or not it exists.
    /// Pure; selected by the `width`/`height`/`absolute` options.
    pub fn resolve(&self, name: &str, options: &FetchOptions) -> ImageDbResult<PathBuf> {
        validate_name(name)?;
        let size = options.size()?;
        Ok(self.shared.layout.resolve(name, size, options.absolute))
    }

    /// The memoized child namespace `name`, constructed on first access under
    /// `groups/<name>`. Exactly one instance wins under concurrent first
    /// access; `use_fallback` is inherited at construction time.
    pub fn child(&self, name: &str) -> ImageDbResult<Db> {
        validate_name(name)?;
        match self.shared.children.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let child = Db::from_shared(Shared {
                    layout: self.shared.layout.child(name),
                    parent: Some(Arc::downgrade(&self.shared)),
                    fallback_image: RwLock::new(None),
                    use_fallback: AtomicBool::new(self.use_fallback()),
                    children: DashMap::new(),
                    flights: DashMap::new(),
                    hooks: self.shared.hooks.clone(),
                    transcoder: Arc::clone(&self.shared.transcoder),
                    cancel: self.shared.cancel.clone(),
                })?;
                entry.insert(child.clone());
                Ok(child)
            }
        }
    }

    /// Store an original image from `source`.
    ///
    /// Fails with [`ImageDbError::AlreadyExists`] when the name is taken and
    /// `force` is not set. Returns the storage path of the stored original.
    pub async fn store(
        &self,
        source: impl AsRef<Path>,
        options: StoreOptions,
    ) -> ImageDbResult<PathBuf> {
        let source = source.as_ref();
        let name = match &options.name {
            Some(name) => name.clone(),
            None => source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| ImageDbError::InvalidName {
                    name: source.display().to_string(),
                })?,
        };
        validate_name(&name)?;
        let target = self.shared.layout.storage(&name, None);
        if file_exists(&target).await? && !options.force {
            return Err(ImageDbError::AlreadyExists { name });
        }
        copy_atomic(source, &target).await?;
        tracing::debug!(name = %name, path = ?target, forced = options.force, "stored original");
        self.emit_create(CreateEvent {
            original: Some(target.clone()),
            forced: options.force,
            ..Default::default()
        });
        Ok(target)
    }

    /// Fetch an original or derivative.
    ///
    /// Returns the resolved location, generating a missing derivative from
    /// the original on the way, or `None` when the request resolves to
    /// nothing (missing original, no applicable fallback).
    pub async fn fetch(&self, name: &str, options: FetchOptions) -> ImageDbResult<Option<PathBuf>> {
        validate_name(name)?;
        let size = options.size()?;

        // A non-bare call with no size-affecting option is malformed.
        if !options.is_bare() && size.is_none() && !options.has_size_affecting_option() {
            return Err(ImageDbError::InvalidSizeSpec);
        }

        // Fallback substitution: a missing original is replaced by the
        // per-call override or the namespace's effective fallback.
        let mut name = name.to_string();
        let mut require_exists = options.require_exists;
        let original = self.shared.layout.storage(&name, None);
        if !file_exists(&original).await? && self.use_fallback() {
            let fallback = match &options.not_found {
                Some(per_call) => per_call.clone(),
                None => self.fallback_image(),
            };
            match fallback {
                Some(fallback) => {
                    validate_name(&fallback)?;
                    name = fallback;
                    // The restriction applies to the requested name only; the
                    // substituted fallback may still be generated.
                    require_exists = false;
                }
                None => return Ok(None),
            }
        }

        let Some(size) = size else {
            // Original only: resolved location iff the file exists.
            let original = self.shared.layout.storage(&name, None);
            if file_exists(&original).await? {
                return Ok(Some(self.shared.layout.resolve(&name, None, options.absolute)));
            }
            return Ok(None);
        };

        self.fetch_derivative(name, size, require_exists, &options)
            .await
    }

    /// Cache hit / miss / generation for one derivative key.
    async fn fetch_derivative(
        &self,
        name: String,
        size: SizeSpec,
        require_exists: bool,
        options: &FetchOptions,
    ) -> ImageDbResult<Option<PathBuf>> {
        let mut name = name;
        let mut require_exists = require_exists;
        loop {
            let target = self.shared.layout.storage(&name, Some(size));
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Hit without locking; a fully generated file never changes
            // under us except by explicit regeneration.
            if !options.force_regenerate && file_exists(&target).await? {
                return Ok(Some(self.shared.layout.resolve(&name, Some(size), options.absolute)));
            }

            let lock = self.flight_lock(&name, size);
            let guard = lock.lock().await;

            // Re-check under the key lock: another flight may have generated
            // the file while we waited.
            let existed = file_exists(&target).await?;
            if existed && !options.force_regenerate {
                return Ok(Some(self.shared.layout.resolve(&name, Some(size), options.absolute)));
            }

            if require_exists {
                drop(guard);
                if self.use_fallback() {
                    let fallback = match &options.not_found {
                        Some(per_call) => per_call.clone(),
                        None => self.fallback_image(),
                    };
                    if let Some(fallback) = fallback {
                        validate_name(&fallback)?;
                        name = fallback;
                        require_exists = false;
                        continue;
                    }
                }
                return Ok(None);
            }

            if self.shared.cancel.is_cancelled() {
                return Err(ImageDbError::Cancelled);
            }
            if !supported_format(&name) {
                return Err(ImageDbError::UnsupportedFormat { name });
            }

            let original = self.shared.layout.storage(&name, None);
            self.generate(&name, &original, &target, size).await?;
            drop(guard);

            tracing::debug!(
                name = %name,
                target = ?target,
                autogenerated = !existed,
                "generated derivative"
            );
            if !options.skip_hook {
                self.emit_create(CreateEvent {
                    original: Some(original),
                    derived: vec![target],
                    size: Some(size),
                    autogenerated: !existed,
                    ..Default::default()
                });
            }
            return Ok(Some(self.shared.layout.resolve(&name, Some(size), options.absolute)));
        }
    }

    /// Run the transcoder into a staging file and rename it into place, so a
    /// failed or cancelled generation leaves nothing at the target path.
    async fn generate(
        &self,
        name: &str,
        original: &Path,
        target: &Path,
        size: SizeSpec,
    ) -> ImageDbResult<()> {
        let parent = target.parent().ok_or_else(|| no_parent(target))?;
        // The staging file keeps the target's extension: the transcoder picks
        // the output format from it.
        let suffix = target
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let staging = tempfile::Builder::new()
            .prefix(".imagedb-")
            .suffix(&suffix)
            .tempfile_in(parent)?;
        match self
            .shared
            .transcoder
            .transcode(original, staging.path(), Some(size.into()))
            .await
        {
            Ok(()) => {}
            Err(TranscodeError::Cancelled) => return Err(ImageDbError::Cancelled),
            Err(source) => {
                return Err(ImageDbError::Generation {
                    name: name.to_string(),
                    source,
                })
            }
        }
        staging.persist(target).map_err(|e| ImageDbError::Io(e.error))?;
        Ok(())
    }

    /// Force regeneration of derivatives from the original.
    ///
    /// With a size spec, exactly that derivative is (re)generated. Without
    /// one, every derivative currently on disk is regenerated; failures are
    /// collected and the remaining derivatives still processed.
    pub async fn update(
        &self,
        name: &str,
        size: Option<SizeSpec>,
    ) -> ImageDbResult<Option<PathBuf>> {
        validate_name(name)?;

        if let Some(size) = size {
            size.validate()?;
            let options = with_size(FetchOptions::new(), size).force_regenerate().skip_hook();
            let path = self.fetch(name, options).await?;
            if let Some(path) = &path {
                self.emit_create(CreateEvent {
                    derived: vec![path.clone()],
                    size: Some(size),
                    update: true,
                    ..Default::default()
                });
            }
            return Ok(path);
        }

        let Some(info) = self.describe(name).await? else {
            return Ok(None);
        };
        let original = self.shared.layout.public(name, None);
        let total = info.widths.len() + info.heights.len();
        let mut derived = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for size in info.size_specs() {
            let options = with_size(FetchOptions::new(), size).force_regenerate().skip_hook();
            match self.fetch(name, options).await {
                Ok(Some(path)) => derived.push(path),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(name = %name, size = ?size, error = %error, "update failed for derivative");
                    errors.push(error);
                }
            }
        }
        self.emit_create(CreateEvent {
            original: Some(original.clone()),
            derived,
            update: true,
            ..Default::default()
        });
        if !errors.is_empty() {
            return Err(ImageDbError::Partial { total, errors });
        }
        Ok(Some(original))
    }

    /// Delete an original and all its derivatives, or a single derivative
    /// when a size spec is given.
    pub async fn delete(
        &self,
        name: &str,
        size: Option<SizeSpec>,
    ) -> ImageDbResult<Option<PathBuf>> {
        validate_name(name)?;

        if let Some(size) = size {
            size.validate()?;
            let path = self.shared.layout.storage(name, Some(size));
            // Deleting an absent derivative is a no-op, not an error.
            remove_if_exists(&path).await?;
            self.emit_delete(DeleteEvent {
                original: None,
                derived: vec![path.clone()],
            });
            return Ok(Some(path));
        }

        let Some(info) = self.describe(name).await? else {
            return Ok(None);
        };
        let original = self.shared.layout.storage(name, None);
        let total = info.widths.len() + info.heights.len() + 1;
        let mut derived = Vec::new();
        let mut errors = Vec::new();
        if let Err(error) = remove_if_exists(&original).await {
            errors.push(error);
        }
        for size in info.size_specs() {
            let path = self.shared.layout.storage(name, Some(size));
            match remove_if_exists(&path).await {
                Ok(()) => derived.push(path),
                Err(error) => {
                    tracing::warn!(path = ?path, error = %error, "failed to delete derivative");
                    errors.push(error);
                }
            }
        }
        self.emit_delete(DeleteEvent {
            original: Some(original.clone()),
            derived,
        });
        if !errors.is_empty() {
            return Err(ImageDbError::Partial { total, errors });
        }
        Ok(Some(original))
    }

    /// Rename an original including every sized version.
    ///
    /// Regenerates each derivative size recorded under the old name, then
    /// deletes the old name's whole tree. Returns the new original's storage
    /// path, or `None` when `old` does not exist.
    pub async fn rename(
        &self,
        old: &str,
        new: &str,
        force: bool,
    ) -> ImageDbResult<Option<PathBuf>> {
        validate_name(old)?;
        validate_name(new)?;
        let Some(info) = self.describe(old).await? else {
            return Ok(None);
        };
        if self.describe(new).await?.is_some() {
            if !force {
                return Err(ImageDbError::AlreadyExists {
                    name: new.to_string(),
                });
            }
            self.delete(new, None).await?;
        }
        let old_original = self.shared.layout.storage(old, None);
        let stored = self
            .store(&old_original, StoreOptions::new().name(new))
            .await?;
        let total = info.widths.len() + info.heights.len();
        let mut errors = Vec::new();
        for size in info.size_specs() {
            if let Err(error) = self.fetch(new, with_size(FetchOptions::new(), size)).await {
                tracing::warn!(old = %old, new = %new, size = ?size, error = %error, "rename failed to regenerate derivative");
                errors.push(error);
            }
        }
        self.delete(old, None).await?;
        if !errors.is_empty() {
            return Err(ImageDbError::Partial { total, errors });
        }
        Ok(Some(stored))
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.shared.layout
    }

    fn flight_lock(&self, name: &str, size: SizeSpec) -> Arc<Mutex<()>> {
        self.shared
            .flights
            .entry(FlightKey {
                name: name.to_string(),
                size,
            })
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn emit_create(&self, event: CreateEvent) {
        let Some(hooks) = self.shared.hooks.clone() else {
            return;
        };
        // Spawned so a slow or panicking hook cannot block or fail us.
        tokio::spawn(async move { hooks.on_create(&event) });
    }

    fn emit_delete(&self, event: DeleteEvent) {
        let Some(hooks) = self.shared.hooks.clone() else {
            return;
        };
        tokio::spawn(async move { hooks.on_delete(&event) });
    }
}

fn with_size(options: FetchOptions, size: SizeSpec) -> FetchOptions {
    match size {
        SizeSpec::Width(w) => options.width(w),
        SizeSpec::Height(h) => options.height(h),
    }
}

async fn file_exists(path: &Path) -> ImageDbResult<bool> {
    Ok(tokio::fs::try_exists(path).await?)
}

async fn remove_if_exists(path: &Path) -> ImageDbResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Copy `source` to `target` via a staging file in the target's directory,
/// so the target only ever appears fully formed.
async fn copy_atomic(source: &Path, target: &Path) -> ImageDbResult<()> {
    let parent = target.parent().ok_or_else(|| no_parent(target))?;
    tokio::fs::create_dir_all(parent).await?;
    let staging = tempfile::Builder::new()
        .prefix(".imagedb-")
        .tempfile_in(parent)?;
    tokio::fs::copy(source, staging.path()).await?;
    staging.persist(target).map_err(|e| ImageDbError::Io(e.error))?;
    Ok(())
}

fn no_parent(path: &Path) -> ImageDbError {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("path {} has no parent directory", path.display()),
    )
    .into()
}
