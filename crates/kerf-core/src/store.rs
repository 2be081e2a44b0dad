use tracing::debug;

use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};

use crate::repo::layout;
use crate::storage::StorageBackend;

/// Whether a `put` wrote new bytes or found the entry already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    Deduplicated,
}

/// The shared, deduplicating content store. Entries are write-once files
/// keyed by digest under `_data/<shard>/<rest>`.
pub struct PartStore<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> PartStore<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// Store part bytes under their digest. If an entry already exists the
    /// bytes are not rewritten (dedup hit, and the reason sync tools can
    /// skip unchanged entries). Safe under concurrent calls with the same
    /// digest: the backend write is atomic and both writers produce
    /// identical content, so whichever rename lands last changes nothing.
    pub fn put(&self, digest: &PartDigest, bytes: &[u8]) -> Result<PutOutcome> {
        let key = layout::data_key(digest);
        if self.storage.exists(&key)? {
            debug!(%digest, "part already stored");
            return Ok(PutOutcome::Deduplicated);
        }
        self.storage.put(&key, bytes)?;
        debug!(%digest, size = bytes.len(), "part stored");
        Ok(PutOutcome::Stored)
    }

    pub fn exists(&self, digest: &PartDigest) -> Result<bool> {
        self.storage.exists(&layout::data_key(digest))
    }

    pub fn get(&self, digest: &PartDigest) -> Result<Vec<u8>> {
        self.storage
            .get(&layout::data_key(digest))?
            .ok_or(KerfError::PartNotFound(*digest))
    }

    /// Size of a stored entry in bytes, `None` if absent.
    pub fn size(&self, digest: &PartDigest) -> Result<Option<u64>> {
        self.storage.size(&layout::data_key(digest))
    }

    /// Remove an entry. The caller (gc's sweep phase) is responsible for
    /// having proven that no instance references the digest.
    pub fn delete(&self, digest: &PartDigest) -> Result<()> {
        self.storage.delete(&layout::data_key(digest))
    }

    /// Every digest currently stored. Keys that do not parse as entry
    /// paths (stray files) are ignored.
    pub fn list_digests(&self) -> Result<Vec<PartDigest>> {
        let keys = self.storage.list(layout::DATA_DIR)?;
        let mut digests: Vec<PartDigest> =
            keys.iter().filter_map(|k| layout::parse_data_key(k)).collect();
        digests.sort();
        Ok(digests)
    }
}
