use kerf_types::error::Result;
use kerf_types::instance_id::InstanceId;

use crate::instance::{self, InstanceState};
use crate::repo::Repository;
use crate::store::PartStore;

/// Per-instance completeness report.
#[derive(Debug)]
pub struct InstanceStatus {
    pub id: InstanceId,
    pub state: InstanceState,
    /// Authoritative for complete instances, unknown while building.
    pub declared_size: Option<u64>,
    /// Bytes reachable through the part-references present on disk.
    pub observed_bytes: u64,
    pub parts_linked: u64,
    /// 100 for a complete instance (observed mismatch is verify's
    /// concern, not status's), 0 when there is no size baseline.
    pub completion_pct: u8,
}

/// Report every instance of `target`, oldest first.
pub fn run(repo: &Repository, target: &str) -> Result<Vec<InstanceStatus>> {
    let store = PartStore::new(repo.storage.as_ref());
    let mut statuses = Vec::new();
    for info in instance::list_instances(repo, target)? {
        let refs = instance::list_refs(repo, target, info.id)?;
        let mut observed_bytes = 0u64;
        for (_, digest) in &refs {
            if let Some(size) = store.size(digest)? {
                observed_bytes += size;
            }
        }
        let completion_pct = match info.state {
            InstanceState::Complete => 100,
            InstanceState::Building => 0,
        };
        statuses.push(InstanceStatus {
            id: info.id,
            state: info.state,
            declared_size: info.declared_size,
            observed_bytes,
            parts_linked: refs.len() as u64,
            completion_pct,
        });
    }
    Ok(statuses)
}
