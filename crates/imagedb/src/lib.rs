#![forbid(unsafe_code)]

//! # imagedb
//!
//! Filesystem-backed derivative cache for images.
//!
//! An original asset is stored once; resized variants ("derivatives") are
//! derived on demand, cached on disk and served by path. Callers never track
//! which sizes exist.
//!
//! ## Public contract
//!
//! The explicit public contract is the [`Db`] type (built via [`DbBuilder`])
//! and the option/event types it consumes and emits. Everything else should
//! be considered an implementation detail.
//!
//! ## Disk layout (normative)
//!
//! ```text
//! <root>/originals/<name>
//! <root>/w/<width>/<name>
//! <root>/h/<height>/<name>
//! <root>/groups/<group>/...      (recursively the same layout)
//! ```
//!
//! The filesystem is the source of truth: an original exists iff its file
//! under `originals/` exists; a derivative is cached iff its file exists.
//! Names are opaque strings including the format extension (`photo.jpg` and
//! `photo.png` are distinct assets) and must not contain path separators.
//!
//! ## Guarantees
//!
//! - resolved paths are a pure function of (root, name, size);
//! - at most one generation is in flight per derivative key; concurrent
//!   fetches for the same key collapse onto one transcoder invocation;
//! - a derivative file is never observable half-written (temp + rename);
//! - hooks are fire-and-forget: a slow or failing hook never blocks or
//!   fails the triggering operation.

mod db;
mod error;
mod event;
mod hooks;
mod list;
mod options;
mod resolve;

pub use db::{Db, DbBuilder};
pub use error::{ImageDbError, ImageDbResult};
pub use event::{CacheEvent, CreateEvent, DeleteEvent};
pub use hooks::{EventBus, Hooks};
pub use list::ImageInfo;
pub use options::{FetchOptions, SizeSpec, StoreOptions};

// The transcoding collaborator contract, re-exported so embedders can plug in
// their own engine without importing the transcode crate directly.
pub use imagedb_transcode::{MagickTranscoder, Resize, TranscodeError, Transcoder};
