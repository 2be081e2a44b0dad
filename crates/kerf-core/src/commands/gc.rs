use std::collections::HashSet;

use tracing::{debug, info};

use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};

use crate::instance;
use crate::repo::{lock, Repository};
use crate::store::PartStore;

use super::util::with_maintenance_lock;

/// Statistics returned by garbage collection.
#[derive(Debug, Default)]
pub struct GcStats {
    pub entries_total: u64,
    pub entries_live: u64,
    pub entries_deleted: u64,
    pub bytes_freed: u64,
}

/// Global mark/sweep over the content store.
///
/// Mark: every part-reference reachable from every instance of every
/// target, building instances included since their parts are legitimately
/// in use. Sweep: delete every store entry not marked live.
///
/// Refuses to run while any build lock is active, so the mark phase never
/// observes an instance whose parts are stored but not yet linked.
/// Restartable from scratch: the live set is re-derived from the on-disk
/// instances, so re-running after an interruption is always safe, and a
/// second run with no intervening changes deletes nothing.
pub fn run(repo: &Repository, dry_run: bool) -> Result<GcStats> {
    with_maintenance_lock(repo, || {
        let building = lock::active_build_targets(repo.storage.as_ref())?;
        if !building.is_empty() {
            return Err(KerfError::Locked(format!(
                "builds in progress for: {}",
                building.join(", ")
            )));
        }

        // Mark.
        let mut live: HashSet<PartDigest> = HashSet::new();
        for target in repo.list_targets()? {
            for info in instance::list_instances(repo, &target)? {
                for (_, digest) in instance::list_refs(repo, &target, info.id)? {
                    live.insert(digest);
                }
            }
        }
        debug!(live = live.len(), "mark phase finished");

        // Sweep.
        let store = PartStore::new(repo.storage.as_ref());
        let mut stats = GcStats::default();
        for digest in store.list_digests()? {
            stats.entries_total += 1;
            if live.contains(&digest) {
                stats.entries_live += 1;
                continue;
            }
            stats.bytes_freed += store.size(&digest)?.unwrap_or(0);
            stats.entries_deleted += 1;
            if !dry_run {
                store.delete(&digest)?;
                debug!(%digest, "unreferenced entry deleted");
            }
        }

        info!(
            total = stats.entries_total,
            live = stats.entries_live,
            deleted = stats.entries_deleted,
            bytes_freed = stats.bytes_freed,
            dry_run,
            "gc finished"
        );
        Ok(stats)
    })
}
