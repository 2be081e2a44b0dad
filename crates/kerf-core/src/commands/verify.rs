use tracing::{info, warn};

use kerf_types::digest::StreamHasher;
use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::instance::{self, InstanceState};
use crate::repo::Repository;
use crate::store::PartStore;

/// Result of the full-content integrity check.
#[derive(Debug)]
pub struct VerifyReport {
    pub id: InstanceId,
    /// Observed bytes equal the declared size.
    pub size_ok: bool,
    /// Recomputed whole-stream digest equals the declared digest.
    pub hash_ok: bool,
    pub declared_size: u64,
    pub observed_size: u64,
    pub missing_parts: u64,
}

impl VerifyReport {
    pub fn ok(&self) -> bool {
        self.size_ok && self.hash_ok
    }
}

/// Recompute an instance's whole-stream digest by reading every referenced
/// part in slot order. Expensive and thorough; only meaningful for a
/// complete instance (`IncompleteInstance` otherwise). When `id` is
/// omitted, the newest complete instance is verified.
///
/// Mismatches are reported, never repaired; repair is a fresh backup run.
pub fn run(repo: &Repository, target: &str, id: Option<InstanceId>) -> Result<VerifyReport> {
    let info = match id {
        Some(id) => instance::load_instance(repo, target, id)?,
        None => instance::newest_complete(repo, target)?
            .ok_or_else(|| KerfError::NoCompleteInstance(target.to_string()))?,
    };
    if info.state != InstanceState::Complete {
        return Err(KerfError::IncompleteInstance {
            target: target.to_string(),
            id: info.id,
        });
    }
    let declared_size = info.declared_size.expect("complete instance has size");
    let declared_digest = info.declared_digest.expect("complete instance has hash");

    let store = PartStore::new(repo.storage.as_ref());
    let refs = instance::list_refs(repo, target, info.id)?;

    let mut hasher = StreamHasher::new(repo.config.hash_algorithm);
    let mut observed_size = 0u64;
    let mut missing_parts = 0u64;
    for &(slot, digest) in &refs {
        match store.get(&digest) {
            Ok(bytes) => {
                hasher.update(&bytes);
                observed_size += bytes.len() as u64;
            }
            Err(KerfError::PartNotFound(_)) => {
                warn!(target = %target, instance = %info.id, slot, %digest, "referenced part missing");
                missing_parts += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let recomputed = hasher.finish();
    let report = VerifyReport {
        id: info.id,
        size_ok: missing_parts == 0 && observed_size == declared_size,
        hash_ok: missing_parts == 0 && recomputed == declared_digest,
        declared_size,
        observed_size,
        missing_parts,
    };
    info!(
        target = %target,
        instance = %info.id,
        size_ok = report.size_ok,
        hash_ok = report.hash_ok,
        "verify finished"
    );
    Ok(report)
}
