pub mod layout;
pub mod lock;

use std::path::Path;

use kerf_types::error::Result;

use crate::config::KerfConfig;
use crate::storage::{LocalBackend, StorageBackend};

/// An opened store: the backend plus the configuration that governs it.
/// Shared by all operations; the concurrency discipline lives in
/// [`lock`], not here.
pub struct Repository {
    pub storage: Box<dyn StorageBackend>,
    pub config: KerfConfig,
}

impl Repository {
    /// Wrap an already-constructed backend. Used by tests with the
    /// in-memory backend.
    pub fn new(storage: Box<dyn StorageBackend>, config: KerfConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { storage, config })
    }

    /// Open an existing store on the local filesystem.
    pub fn open_local(config: KerfConfig) -> Result<Self> {
        let backend = LocalBackend::open(Path::new(&config.root))?;
        Self::new(Box::new(backend), config)
    }

    /// Create the store root (and shared areas) if needed, then open it.
    pub fn init_local(config: KerfConfig) -> Result<Self> {
        let backend = LocalBackend::create(Path::new(&config.root))?;
        backend.create_dir(layout::DATA_DIR)?;
        backend.create_dir(layout::LOCKS_DIR)?;
        Self::new(Box::new(backend), config)
    }

    /// All target names present in the store, sorted. Shared `_`-prefixed
    /// areas and anything else that is not a valid target name are skipped.
    pub fn list_targets(&self) -> Result<Vec<String>> {
        let mut targets: Vec<String> = self
            .storage
            .list_subdirs("")?
            .into_iter()
            .filter(|name| layout::validate_target_name(name).is_ok())
            .collect();
        targets.sort();
        Ok(targets)
    }

    pub fn target_exists(&self, target: &str) -> Result<bool> {
        layout::validate_target_name(target)?;
        self.storage.dir_exists(target)
    }
}
