use tracing::{debug, info, warn};

use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::repo::lock::{self, TargetLockGuard};
use crate::repo::{layout, Repository};
use crate::storage::StorageBackend as _;

/// One in-progress instance build, holding the target's build lock from
/// `begin` until `finalize` or abort.
///
/// Dropping a build without finalizing releases the lock but leaves the
/// building instance on disk: a crash before finalize must leave the
/// instance permanently incomplete, never silently promoted. The
/// `abandoned_after` retention knob reclaims such leftovers.
pub struct InstanceBuild<'r> {
    repo: &'r Repository,
    target: String,
    id: InstanceId,
    lock: Option<TargetLockGuard>,
    finalized: bool,
}

impl<'r> InstanceBuild<'r> {
    /// Start a new instance for `target`. Fails with `Locked` while
    /// another build or a maintenance operation is running, and with
    /// `InstanceExists` on a same-second identifier collision (callers
    /// retry after a second or serialize their runs).
    pub fn begin(repo: &'r Repository, target: &str) -> Result<Self> {
        Self::begin_at(repo, target, InstanceId::now())
    }

    /// `begin` with an explicit identifier instead of the current time.
    pub(crate) fn begin_at(repo: &'r Repository, target: &str, id: InstanceId) -> Result<Self> {
        layout::validate_target_name(target)?;

        // Take our build lock first, then probe for maintenance. Both
        // sides check the other after locking, so an interleaved start
        // makes at least one of them back off.
        let guard = lock::acquire_target_lock(repo.storage.as_ref(), target)?;
        if let Some(holder) = lock::maintenance_active(repo.storage.as_ref())? {
            let _ = lock::release_target_lock(repo.storage.as_ref(), guard);
            return Err(KerfError::Locked(holder));
        }

        let prefix = layout::instance_prefix(target, id);
        match repo.storage.dir_exists(&prefix) {
            Ok(false) => {}
            Ok(true) => {
                let _ = lock::release_target_lock(repo.storage.as_ref(), guard);
                return Err(KerfError::InstanceExists {
                    target: target.to_string(),
                    id,
                });
            }
            Err(e) => {
                let _ = lock::release_target_lock(repo.storage.as_ref(), guard);
                return Err(e);
            }
        }
        if let Err(e) = repo.storage.create_dir(&prefix) {
            let _ = lock::release_target_lock(repo.storage.as_ref(), guard);
            return Err(e);
        }

        info!(target = %target, instance = %id, "instance build started");
        Ok(Self {
            repo,
            target: target.to_string(),
            id,
            lock: Some(guard),
            finalized: false,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Record the part-reference for slot `index`. Placement is
    /// index-addressed (bucket = index / bucket_capacity), so appends
    /// arriving out of order from parallel workers still land in the slot
    /// matching stream order.
    pub fn append(&self, index: u64, digest: &PartDigest) -> Result<()> {
        let key = layout::slot_key(
            &self.target,
            self.id,
            index,
            self.repo.config.bucket_capacity,
        )?;
        let content = format!("{}\n", layout::data_key(digest));
        self.repo.storage.put(&key, content.as_bytes())?;
        debug!(target = %self.target, instance = %self.id, slot = index, %digest, "part linked");
        Ok(())
    }

    /// The single atomic commit: writes the whole-stream `hash`, then
    /// `size`. Each file lands via the backend's temp-then-rename write,
    /// and `size` is written last so any observer that sees it sees a
    /// fully committed instance. This is the last write to the instance.
    pub fn finalize(mut self, total_size: u64, stream_digest: &PartDigest) -> Result<InstanceId> {
        let hash_content = format!("{}\n", stream_digest.to_hex());
        self.repo
            .storage
            .put(&layout::hash_key(&self.target, self.id), hash_content.as_bytes())?;
        let size_content = format!("{total_size}\n");
        self.repo
            .storage
            .put(&layout::size_key(&self.target, self.id), size_content.as_bytes())?;

        self.finalized = true;
        if let Some(guard) = self.lock.take() {
            lock::release_target_lock(self.repo.storage.as_ref(), guard)?;
        }
        info!(
            target = %self.target,
            instance = %self.id,
            size = total_size,
            "instance complete"
        );
        Ok(self.id)
    }

    /// Give up on this build, releasing the lock. The building instance
    /// stays on disk for status to report and prune to reclaim.
    pub fn abort(mut self) -> Result<()> {
        if let Some(guard) = self.lock.take() {
            lock::release_target_lock(self.repo.storage.as_ref(), guard)?;
        }
        warn!(target = %self.target, instance = %self.id, "instance build aborted");
        Ok(())
    }
}

impl Drop for InstanceBuild<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.lock.take() {
            if !self.finalized {
                warn!(
                    target = %self.target,
                    instance = %self.id,
                    "instance build dropped before finalize; leaving building instance"
                );
            }
            let _ = lock::release_target_lock(self.repo.storage.as_ref(), guard);
        }
    }
}
