#![forbid(unsafe_code)]

use std::path::PathBuf;

use crate::options::SizeSpec;

/// Structural change notification emitted by the cache.
#[derive(Clone, Debug)]
pub enum CacheEvent {
    Created(CreateEvent),
    Deleted(DeleteEvent),
}

/// An original or derivative came into existence (or was rewritten).
#[derive(Clone, Debug, Default)]
pub struct CreateEvent {
    /// Storage path of the original, when the operation touched one.
    pub original: Option<PathBuf>,
    /// Derivative paths created or rewritten by the operation.
    pub derived: Vec<PathBuf>,
    /// Size spec of the derivative, for single-derivative events.
    pub size: Option<SizeSpec>,
    /// The store overwrote an existing original (`force`).
    pub forced: bool,
    /// The derivative was created because a fetch missed the cache.
    pub autogenerated: bool,
    /// The operation was an explicit regeneration (`update`).
    pub update: bool,
}

/// An original and/or derivatives were removed.
#[derive(Clone, Debug, Default)]
pub struct DeleteEvent {
    /// Storage path of the removed original, when one was removed.
    pub original: Option<PathBuf>,
    /// Derivative paths removed by the operation.
    pub derived: Vec<PathBuf>,
}

impl From<CreateEvent> for CacheEvent {
    fn from(e: CreateEvent) -> Self {
        Self::Created(e)
    }
}

impl From<DeleteEvent> for CacheEvent {
    fn from(e: DeleteEvent) -> Self {
        Self::Deleted(e)
    }
}
