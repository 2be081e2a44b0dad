use kerf_types::error::Result;

use crate::repo::lock;
use crate::repo::Repository;

/// Run `f` while holding the store-wide maintenance lock, releasing it on
/// both success and failure.
pub fn with_maintenance_lock<T>(repo: &Repository, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let guard = lock::acquire_maintenance(repo.storage.as_ref())?;
    let result = f();
    let release = lock::release_maintenance(repo.storage.as_ref(), guard);
    match result {
        Ok(value) => {
            release?;
            Ok(value)
        }
        Err(e) => Err(e),
    }
}
