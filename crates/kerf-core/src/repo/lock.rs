use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kerf_types::error::{KerfError, Result};

use crate::storage::StorageBackend;

const LOCKS_PREFIX: &str = "_locks/";
const TARGET_LOCKS_PREFIX: &str = "_locks/targets/";

/// Maintenance locks (prune, gc) are short-lived; anything older is a
/// crashed process.
const STALE_MAINTENANCE_SECS: i64 = 6 * 60 * 60;
/// Build locks live for the whole `add` of a stream, which can be long.
const STALE_BUILD_SECS: i64 = 72 * 60 * 60;

/// An advisory lock object stored as JSON.
#[derive(Debug, Serialize, Deserialize)]
struct LockEntry {
    hostname: String,
    pid: u32,
    time: String,
    token: String,
}

impl LockEntry {
    fn new(token: String) -> Self {
        Self {
            hostname: hostname(),
            pid: std::process::id(),
            time: Utc::now().to_rfc3339(),
            token,
        }
    }

    fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        let t = DateTime::parse_from_rfc3339(&self.time).ok()?;
        Some(now.signed_duration_since(t.with_timezone(&Utc)))
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn random_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn serialize_entry(entry: &LockEntry) -> Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(|e| KerfError::Other(format!("lock serialize: {e}")))
}

// ── Maintenance lock ─────────────────────────────────────────────────────

/// Handle to the store-wide maintenance lock held by prune and gc.
#[derive(Debug)]
pub struct MaintenanceGuard {
    key: String,
}

impl MaintenanceGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Maintenance lock object keys: directly under `_locks/`, not in the
/// `targets/` subarea.
fn list_maintenance_keys(storage: &dyn StorageBackend) -> Result<Vec<String>> {
    let mut keys = storage.list(LOCKS_PREFIX.trim_end_matches('/'))?;
    keys.retain(|k| {
        k.strip_prefix(LOCKS_PREFIX)
            .is_some_and(|rest| !rest.contains('/') && rest.ends_with(".json"))
    });
    Ok(keys)
}

/// Acquire the store-wide maintenance lock. Winner is determined
/// deterministically: the oldest lock key wins.
pub fn acquire_maintenance(storage: &dyn StorageBackend) -> Result<MaintenanceGuard> {
    cleanup_stale(storage, &list_maintenance_keys(storage)?, maintenance_stale_age())?;

    let now = Utc::now();
    let entry = LockEntry::new(random_token());
    // Timestamp prefix keeps older lock keys sorted first.
    let ts = now.timestamp_micros();
    let key = format!("{LOCKS_PREFIX}{ts:020}-{}.json", entry.token);
    storage.put(&key, &serialize_entry(&entry)?)?;

    let mut keys = list_maintenance_keys(storage)?;
    keys.sort();
    if keys.first() != Some(&key) {
        // Lost the race; best-effort cleanup of the lock we just wrote.
        let _ = storage.delete(&key);
        let holder = keys.first().cloned().unwrap_or_else(|| "unknown".into());
        return Err(KerfError::Locked(holder));
    }

    debug!(key = %key, "maintenance lock acquired");
    Ok(MaintenanceGuard { key })
}

pub fn release_maintenance(storage: &dyn StorageBackend, guard: MaintenanceGuard) -> Result<()> {
    storage.delete(&guard.key)
}

/// Whether a maintenance operation currently holds the lock. Used by the
/// instance builder to refuse starting a build under a running prune/gc.
pub fn maintenance_active(storage: &dyn StorageBackend) -> Result<Option<String>> {
    cleanup_stale(storage, &list_maintenance_keys(storage)?, maintenance_stale_age())?;
    let mut keys = list_maintenance_keys(storage)?;
    keys.sort();
    Ok(keys.into_iter().next())
}

// ── Per-target build locks ───────────────────────────────────────────────

/// Handle to one target's build lock, held from `begin` to
/// `finalize`/abort.
#[derive(Debug)]
pub struct TargetLockGuard {
    key: String,
    token: String,
}

impl TargetLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

fn target_lock_key(target: &str) -> String {
    format!("{TARGET_LOCKS_PREFIX}{target}.json")
}

/// Acquire the build lock for one target. Two concurrent `add` runs on the
/// same target must not interleave; runs on different targets are
/// independent.
pub fn acquire_target_lock(storage: &dyn StorageBackend, target: &str) -> Result<TargetLockGuard> {
    let key = target_lock_key(target);
    cleanup_stale(storage, std::slice::from_ref(&key), build_stale_age())?;

    if let Some(data) = storage.get(&key)? {
        let holder = serde_json::from_slice::<LockEntry>(&data)
            .map(|e| format!("{}@{}", e.pid, e.hostname))
            .unwrap_or_else(|_| "unknown".into());
        return Err(KerfError::Locked(format!("{key} held by {holder}")));
    }

    let entry = LockEntry::new(random_token());
    let token = entry.token.clone();
    storage.put(&key, &serialize_entry(&entry)?)?;

    // Read back to arbitrate a simultaneous write: the surviving content
    // decides the winner.
    match storage.get(&key)? {
        Some(data) => {
            let written: LockEntry = serde_json::from_slice(&data)
                .map_err(|e| KerfError::Other(format!("lock read-back: {e}")))?;
            if written.token != token {
                return Err(KerfError::Locked(format!(
                    "{key} held by {}@{}",
                    written.pid, written.hostname
                )));
            }
        }
        None => return Err(KerfError::Locked(format!("{key} contended"))),
    }

    debug!(target = %target, "build lock acquired");
    Ok(TargetLockGuard { key, token })
}

/// Release a build lock. Only removes the lock object if it still carries
/// our token.
pub fn release_target_lock(storage: &dyn StorageBackend, guard: TargetLockGuard) -> Result<()> {
    if let Some(data) = storage.get(&guard.key)? {
        match serde_json::from_slice::<LockEntry>(&data) {
            Ok(entry) if entry.token == guard.token => storage.delete(&guard.key)?,
            Ok(_) => warn!(key = %guard.key, "build lock was taken over; not releasing"),
            Err(_) => storage.delete(&guard.key)?,
        }
    }
    Ok(())
}

/// Target names with a live (non-stale) build lock. Maintenance refuses to
/// run while any build is in flight, so the mark phase never observes a
/// half-linked instance.
pub fn active_build_targets(storage: &dyn StorageBackend) -> Result<Vec<String>> {
    let keys = storage.list(TARGET_LOCKS_PREFIX.trim_end_matches('/'))?;
    cleanup_stale(storage, &keys, build_stale_age())?;
    let mut targets = Vec::new();
    for key in storage.list(TARGET_LOCKS_PREFIX.trim_end_matches('/'))? {
        if let Some(name) = key
            .strip_prefix(TARGET_LOCKS_PREFIX)
            .and_then(|s| s.strip_suffix(".json"))
        {
            targets.push(name.to_string());
        }
    }
    targets.sort();
    Ok(targets)
}

/// Forcibly remove all lock objects. Recovery mechanism for locks left by
/// killed processes. Returns the number removed.
pub fn break_locks(storage: &dyn StorageBackend) -> Result<usize> {
    let mut removed = 0;
    for key in list_maintenance_keys(storage)? {
        storage.delete(&key)?;
        removed += 1;
    }
    for key in storage.list(TARGET_LOCKS_PREFIX.trim_end_matches('/'))? {
        storage.delete(&key)?;
        removed += 1;
    }
    Ok(removed)
}

// ── Stale-lock reclamation ───────────────────────────────────────────────

fn maintenance_stale_age() -> Duration {
    Duration::seconds(STALE_MAINTENANCE_SECS)
}

fn build_stale_age() -> Duration {
    Duration::seconds(STALE_BUILD_SECS)
}

fn cleanup_stale(storage: &dyn StorageBackend, keys: &[String], max_age: Duration) -> Result<()> {
    let now = Utc::now();
    for key in keys {
        let Some(data) = storage.get(key)? else {
            continue;
        };
        let Ok(entry) = serde_json::from_slice::<LockEntry>(&data) else {
            // Unparseable lock object; treat as stale.
            warn!(key = %key, "removing unparseable lock object");
            let _ = storage.delete(key);
            continue;
        };
        match entry.age(now) {
            Some(age) if age > max_age => {
                warn!(key = %key, age_hours = age.num_hours(), "removing stale lock");
                let _ = storage.delete(key);
            }
            Some(_) => {}
            None => {
                let _ = storage.delete(key);
            }
        }
    }
    Ok(())
}
