use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kerf_types::digest::HashAlgorithm;
use kerf_types::error::{KerfError, Result};

use crate::retention::parse_duration;

fn default_part_size() -> u64 {
    4 * 1024 * 1024
}

fn default_bucket_capacity() -> u64 {
    1000
}

fn default_keep() -> usize {
    2
}

fn default_workers() -> usize {
    4
}

/// Directory-size design target: no bucket may be configured to hold more
/// entries than this.
const MAX_BUCKET_CAPACITY: u64 = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KerfConfig {
    /// Root directory of the store.
    pub root: String,

    /// Size of one part in bytes. The last part of a stream may be shorter.
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Digest algorithm for part and whole-stream hashes. All instances in
    /// one store must use the same algorithm.
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Slots per bucket directory inside an instance.
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: u64,

    #[serde(default)]
    pub retention: RetentionConfig,

    /// Worker threads storing parts during `add`.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Number of complete instances to keep per target.
    #[serde(default = "default_keep")]
    pub keep: usize,

    /// Age after which an unfinished (building) instance is reclaimed by
    /// prune, e.g. "7d", "48h". Unset means building instances are never
    /// reclaimed automatically.
    #[serde(default)]
    pub abandoned_after: Option<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
            abandoned_after: None,
        }
    }
}

impl RetentionConfig {
    /// Parsed form of `abandoned_after`.
    pub fn abandoned_after_duration(&self) -> Result<Option<chrono::Duration>> {
        self.abandoned_after
            .as_deref()
            .map(parse_duration)
            .transpose()
    }
}

impl KerfConfig {
    /// Configuration with defaults for the given store root. Used by tests
    /// and by CLI flags that bypass the config file.
    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            part_size: default_part_size(),
            hash_algorithm: HashAlgorithm::default(),
            bucket_capacity: default_bucket_capacity(),
            retention: RetentionConfig::default(),
            workers: default_workers(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KerfError::Config(format!("cannot read config file '{}': {e}", path.display()))
        })?;
        let config: KerfConfig = serde_yaml::from_str(&contents).map_err(|e| {
            KerfError::Config(format!("cannot parse config file '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.is_empty() {
            return Err(KerfError::Config("root must not be empty".into()));
        }
        if self.part_size == 0 {
            return Err(KerfError::Config("part_size must be positive".into()));
        }
        if self.bucket_capacity == 0 || self.bucket_capacity > MAX_BUCKET_CAPACITY {
            return Err(KerfError::Config(format!(
                "bucket_capacity must be in 1..={MAX_BUCKET_CAPACITY}, got {}",
                self.bucket_capacity
            )));
        }
        if self.workers == 0 {
            return Err(KerfError::Config("workers must be positive".into()));
        }
        if self.retention.keep == 0 {
            // A keep of zero would let prune remove every complete
            // instance of a target.
            return Err(KerfError::Config("retention.keep must be at least 1".into()));
        }
        // Fail early instead of at the first prune.
        self.retention.abandoned_after_duration()?;
        Ok(())
    }
}

/// Resolve the config file path: explicit flag, then `$KERF_CONFIG`, then
/// `./kerf.yaml`, then the platform user config dir.
pub fn resolve_config_path(flag: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(PathBuf::from(path));
    }
    if let Some(path) = std::env::var_os("KERF_CONFIG").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let project = PathBuf::from("kerf.yaml");
    if project.exists() {
        return Some(project);
    }
    let user = dirs::config_dir().map(|base| base.join("kerf").join("config.yaml"))?;
    if user.exists() {
        return Some(user);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KerfConfig::with_root("/tmp/store");
        config.validate().unwrap();
        assert_eq!(config.part_size, 4 * 1024 * 1024);
        assert_eq!(config.bucket_capacity, 1000);
        assert_eq!(config.retention.keep, 2);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config: KerfConfig = serde_yaml::from_str("root: /srv/backups\n").unwrap();
        config.validate().unwrap();
        assert_eq!(config.root, "/srv/backups");
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake2b256);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = "\
root: /srv/backups
part_size: 1048576
hash_algorithm: sha256
bucket_capacity: 500
workers: 2
retention:
  keep: 4
  abandoned_after: 7d
";
        let config: KerfConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.retention.keep, 4);
        assert_eq!(
            config.retention.abandoned_after_duration().unwrap(),
            Some(chrono::Duration::days(7))
        );
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: std::result::Result<KerfConfig, _> =
            serde_yaml::from_str("root: /x\nblocksize: 4096\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_part_size_rejected() {
        let mut config = KerfConfig::with_root("/x");
        config.part_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_bucket_capacity_rejected() {
        let mut config = KerfConfig::with_root("/x");
        config.bucket_capacity = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_abandoned_after_rejected() {
        let mut config = KerfConfig::with_root("/x");
        config.retention.abandoned_after = Some("5x".into());
        assert!(config.validate().is_err());
    }
}
