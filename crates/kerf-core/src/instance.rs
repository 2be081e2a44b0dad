use std::fmt;

use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::repo::{layout, Repository};
use crate::storage::StorageBackend as _;

/// Lifecycle state of an instance, derived deterministically from which
/// metadata artifacts exist. This function is the only place that
/// interprets artifact presence: status, prune, gc and recover all go
/// through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Not finalized: in progress, or abandoned by a crashed run. Never
    /// silently promoted, even if every part happens to be present.
    Building,
    /// Finalized: size and hash metadata are committed.
    Complete,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Building => write!(f, "building"),
            InstanceState::Complete => write!(f, "complete"),
        }
    }
}

pub fn derive_state(size_present: bool, hash_present: bool) -> InstanceState {
    if size_present && hash_present {
        InstanceState::Complete
    } else {
        InstanceState::Building
    }
}

/// One instance's identity and declared metadata.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub state: InstanceState,
    /// Present only once finalized.
    pub declared_size: Option<u64>,
    /// Present only once finalized.
    pub declared_digest: Option<PartDigest>,
}

fn read_size_file(repo: &Repository, target: &str, id: InstanceId) -> Result<Option<u64>> {
    let Some(data) = repo.storage.get(&layout::size_key(target, id))? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&data);
    let size = text.trim().parse::<u64>().map_err(|_| {
        KerfError::InvalidFormat(format!(
            "instance '{target}/{id}': malformed size file: {:?}",
            text.trim()
        ))
    })?;
    Ok(Some(size))
}

fn read_hash_file(repo: &Repository, target: &str, id: InstanceId) -> Result<Option<PartDigest>> {
    let Some(data) = repo.storage.get(&layout::hash_key(target, id))? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&data);
    let digest = PartDigest::from_hex(text.trim()).map_err(|e| {
        KerfError::InvalidFormat(format!("instance '{target}/{id}': malformed hash file: {e}"))
    })?;
    Ok(Some(digest))
}

/// Load one instance. Fails with `InstanceNotFound` if its directory does
/// not exist.
pub fn load_instance(repo: &Repository, target: &str, id: InstanceId) -> Result<InstanceInfo> {
    layout::validate_target_name(target)?;
    if !repo.storage.dir_exists(&layout::instance_prefix(target, id))? {
        return Err(KerfError::InstanceNotFound {
            target: target.to_string(),
            id,
        });
    }
    let declared_size = read_size_file(repo, target, id)?;
    let declared_digest = read_hash_file(repo, target, id)?;
    let state = derive_state(declared_size.is_some(), declared_digest.is_some());
    Ok(InstanceInfo {
        id,
        state,
        // Declared metadata is only authoritative for complete instances.
        declared_size: if state == InstanceState::Complete {
            declared_size
        } else {
            None
        },
        declared_digest: if state == InstanceState::Complete {
            declared_digest
        } else {
            None
        },
    })
}

/// All instances of a target, ordered oldest first (identifier order).
/// Directory names that do not parse as instance ids are skipped.
pub fn list_instances(repo: &Repository, target: &str) -> Result<Vec<InstanceInfo>> {
    layout::validate_target_name(target)?;
    if !repo.storage.dir_exists(target)? {
        return Err(KerfError::TargetNotFound(target.to_string()));
    }
    let mut ids: Vec<InstanceId> = repo
        .storage
        .list_subdirs(target)?
        .iter()
        .filter_map(|name| InstanceId::parse(name).ok())
        .collect();
    ids.sort();
    ids.iter()
        .map(|&id| load_instance(repo, target, id))
        .collect()
}

/// The newest complete instance of a target, if any.
pub fn newest_complete(repo: &Repository, target: &str) -> Result<Option<InstanceInfo>> {
    Ok(list_instances(repo, target)?
        .into_iter()
        .rev()
        .find(|info| info.state == InstanceState::Complete))
}

/// All part-references of an instance, ordered by slot index. Each entry
/// is `(slot, digest)`; slot numbering mirrors stream order, which is what
/// recovery relies on.
pub fn list_refs(
    repo: &Repository,
    target: &str,
    id: InstanceId,
) -> Result<Vec<(u64, PartDigest)>> {
    let prefix = layout::instance_prefix(target, id);
    let mut refs = Vec::new();
    for bucket_name in repo.storage.list_subdirs(&prefix)? {
        if layout::parse_bucket_dirname(&bucket_name).is_none() {
            continue;
        }
        let bucket_prefix = format!("{prefix}/{bucket_name}");
        for key in repo.storage.list(&bucket_prefix)? {
            let slot_name = key.rsplit('/').next().unwrap_or("");
            let Some(slot) = layout::parse_slot_filename(slot_name) else {
                continue;
            };
            let Some(data) = repo.storage.get(&key)? else {
                continue;
            };
            let text = String::from_utf8_lossy(&data);
            let digest = layout::parse_data_key(text.trim()).ok_or_else(|| {
                KerfError::InvalidFormat(format!(
                    "instance '{target}/{id}': slot {slot} has malformed reference {:?}",
                    text.trim()
                ))
            })?;
            refs.push((slot, digest));
        }
    }
    refs.sort_by_key(|&(slot, _)| slot);
    Ok(refs)
}
