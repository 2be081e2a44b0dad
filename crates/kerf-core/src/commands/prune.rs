use chrono::Utc;
use tracing::info;

use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::instance::{self, InstanceState};
use crate::repo::{layout, lock, Repository};
use crate::retention::{self, PruneDecision};
use crate::storage::StorageBackend as _;

use super::util::with_maintenance_lock;

pub struct PruneStats {
    pub kept: usize,
    pub pruned: usize,
    pub reclaimed_building: usize,
}

/// Formatted entry for list/dry-run output.
pub struct PruneListEntry {
    pub id: InstanceId,
    pub action: &'static str,
    pub reason: String,
}

/// Remove a target's superseded instances: every complete instance beyond
/// the `keep` newest, plus building instances older than the
/// `abandoned_after` knob (if set). Only the instance reference structures
/// are removed here; unreferenced store entries are reclaimed by a later
/// `gc`. Safe to re-run after any failure.
pub fn run(repo: &Repository, target: &str, dry_run: bool) -> Result<(PruneStats, Vec<PruneListEntry>)> {
    layout::validate_target_name(target)?;
    let abandoned_after = repo.config.retention.abandoned_after_duration()?;

    with_maintenance_lock(repo, || {
        if lock::active_build_targets(repo.storage.as_ref())?
            .iter()
            .any(|t| t == target)
        {
            return Err(KerfError::Locked(format!(
                "target '{target}' has a build in progress"
            )));
        }

        let instances = instance::list_instances(repo, target)?;
        let plan = retention::plan(
            &instances,
            repo.config.retention.keep,
            abandoned_after,
            Utc::now(),
        );

        let mut stats = PruneStats {
            kept: 0,
            pruned: 0,
            reclaimed_building: 0,
        };
        let mut list_entries = Vec::with_capacity(plan.len());
        // Delete oldest first, so an interrupted run leaves the newest
        // excess instances rather than a gap in the middle.
        let mut to_delete: Vec<(InstanceId, InstanceState)> = Vec::new();

        for entry in &plan {
            match &entry.decision {
                PruneDecision::Keep { reason } => {
                    stats.kept += 1;
                    list_entries.push(PruneListEntry {
                        id: entry.id,
                        action: "keep",
                        reason: reason.clone(),
                    });
                }
                PruneDecision::Prune { reason } => {
                    to_delete.push((entry.id, entry.state));
                    list_entries.push(PruneListEntry {
                        id: entry.id,
                        action: "prune",
                        reason: reason.clone(),
                    });
                }
            }
        }

        to_delete.sort_by_key(|&(id, _)| id);
        for (id, state) in to_delete {
            if !dry_run {
                repo.storage
                    .remove_dir_all(&layout::instance_prefix(target, id))?;
            }
            match state {
                InstanceState::Complete => stats.pruned += 1,
                InstanceState::Building => stats.reclaimed_building += 1,
            }
            info!(target = %target, instance = %id, %state, dry_run, "instance pruned");
        }

        Ok((stats, list_entries))
    })
}
