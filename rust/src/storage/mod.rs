//! Durable snapshot of the vault.
//!
//! The vault hands the whole store to a [`SnapshotStore`] after every mutation
//! and reads it back once at open. Writes overwrite the previous snapshot in
//! place; a crash mid-write can leave a truncated file behind.
//!
//! - [`file::JsonFileStore`]: pretty-printed JSON object `id -> {script, userId, createdAt}`
//! - [`memory::MemoryStore`]: in-process snapshot for tests

use std::path::PathBuf;

use indexmap::IndexMap;
use thiserror::Error;

use crate::vault::record::{ScriptId, StoredScript};

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Whole-store snapshot in insertion order.
pub type Snapshot = IndexMap<ScriptId, StoredScript>;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot {path} unreadable: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} not writable: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("snapshot decode failed: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Loads and saves whole-store snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Returns `Ok(None)` when no snapshot has been written yet.
    fn load(&self) -> Result<Option<Snapshot>, PersistError>;

    /// Replaces the stored snapshot with `snapshot`.
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        (**self).save(snapshot)
    }
}
