pub mod local_backend;

pub use local_backend::LocalBackend;

use kerf_types::error::Result;

/// Key/value + hierarchical-listing view of the store's directory tree.
///
/// Keys are `/`-separated paths relative to the store root. The production
/// implementation is [`LocalBackend`]; tests use an in-memory fake so the
/// dedup, mark/sweep and completeness logic run without filesystem I/O.
pub trait StorageBackend: Send + Sync {
    /// Read a file. `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a file atomically (readers never observe a partial write).
    /// Parent directories are created on demand.
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove a file. Removing an absent file is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Size of a file in bytes. `None` if absent.
    fn size(&self, key: &str) -> Result<Option<u64>>;

    /// All file keys under `prefix`, recursively.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Names of the immediate subdirectories of `prefix`.
    fn list_subdirs(&self, prefix: &str) -> Result<Vec<String>>;

    fn create_dir(&self, key: &str) -> Result<()>;

    fn dir_exists(&self, key: &str) -> Result<bool>;

    /// Remove a directory tree and everything under it.
    fn remove_dir_all(&self, key: &str) -> Result<()>;
}
