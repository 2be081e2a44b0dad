use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

/// Shared content store area at the store root.
pub const DATA_DIR: &str = "_data";
/// Lock objects live here, out of the way of target names.
pub const LOCKS_DIR: &str = "_locks";

/// Buckets are named `0000`..`9999`; running out means the stream exceeded
/// `10_000 * bucket_capacity` parts.
const MAX_BUCKETS: u64 = 10_000;
/// Slots are named `00000000`..`99999999`.
const MAX_SLOTS: u64 = 100_000_000;

/// Storage key of a content store entry: `_data/<2-hex>/<62-hex>`.
/// Also the exact string written into slot files (root-relative), which is
/// what makes the tree self-contained for file-level sync.
pub fn data_key(digest: &PartDigest) -> String {
    format!("{DATA_DIR}/{}/{}", digest.shard_prefix(), digest.entry_name())
}

/// Parse a content store key back to its digest.
pub fn parse_data_key(key: &str) -> Option<PartDigest> {
    let rest = key.strip_prefix(DATA_DIR)?.strip_prefix('/')?;
    let (shard, entry) = rest.split_once('/')?;
    if shard.len() != 2 || entry.len() != 62 {
        return None;
    }
    PartDigest::from_hex(&format!("{shard}{entry}")).ok()
}

pub fn instance_prefix(target: &str, id: InstanceId) -> String {
    format!("{target}/{}", id.dirname())
}

pub fn size_key(target: &str, id: InstanceId) -> String {
    format!("{}/size", instance_prefix(target, id))
}

pub fn hash_key(target: &str, id: InstanceId) -> String {
    format!("{}/hash", instance_prefix(target, id))
}

/// Bucket index for a slot: `index / bucket_capacity`.
pub fn bucket_for(index: u64, bucket_capacity: u64) -> u64 {
    index / bucket_capacity
}

pub fn bucket_dirname(bucket: u64) -> String {
    format!("{bucket:04}")
}

pub fn slot_filename(index: u64) -> String {
    format!("{index:08}")
}

/// Storage key of the slot file for part `index`.
pub fn slot_key(target: &str, id: InstanceId, index: u64, bucket_capacity: u64) -> Result<String> {
    let bucket = bucket_for(index, bucket_capacity);
    if bucket >= MAX_BUCKETS || index >= MAX_SLOTS {
        return Err(KerfError::InvalidFormat(format!(
            "too many parts: slot {index} exceeds the layout limit"
        )));
    }
    Ok(format!(
        "{}/{}/{}",
        instance_prefix(target, id),
        bucket_dirname(bucket),
        slot_filename(index)
    ))
}

/// Parse a slot filename (`00000042`) back to its index.
pub fn parse_slot_filename(name: &str) -> Option<u64> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

pub fn parse_bucket_dirname(name: &str) -> Option<u64> {
    if name.len() != 4 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Validate a target name. Targets are directories at the store root, so
/// the name must not collide with the shared `_`-prefixed areas, must not
/// be hidden, and must not carry a directory component.
pub fn validate_target_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(KerfError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.contains('/') || name.contains('\\') {
        return reject("must not have a directory component");
    }
    if name.starts_with('.') || name.starts_with('_') {
        return reject("must not start with '.' or '_'");
    }
    Ok(())
}
