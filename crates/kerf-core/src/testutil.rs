use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use kerf_types::error::Result;
use kerf_types::instance_id::InstanceId;

use crate::builder::InstanceBuild;
use crate::chunker::PartChunker;
use crate::config::KerfConfig;
use crate::repo::Repository;
use crate::storage::StorageBackend;
use crate::store::PartStore;

/// In-memory storage backend for testing. Thread-safe via Mutex. Tracks
/// directories explicitly so empty instance directories (a building
/// instance with no parts yet) behave like they do on a real filesystem.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }
}

fn register_parents(dirs: &mut BTreeSet<String>, key: &str) {
    let mut path = String::new();
    for component in key.split('/') {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(component);
        dirs.insert(path.clone());
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock().unwrap();
        Ok(state.files.get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((parent, _)) = key.rsplit_once('/') {
            register_parents(&mut state.dirs, parent);
        }
        state.files.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.files.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.files.contains_key(key))
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        let state = self.state.lock().unwrap();
        Ok(state.files.get(key).map(|d| d.len() as u64))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let prefix = normalized_prefix(prefix);
        Ok(state
            .files
            .keys()
            .filter(|k| prefix.is_empty() || k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn list_subdirs(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let prefix = normalized_prefix(prefix);
        let mut names: BTreeSet<String> = BTreeSet::new();
        for dir in &state.dirs {
            let rest = if prefix.is_empty() {
                dir.as_str()
            } else {
                match dir.strip_prefix(&prefix) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            let first = rest.split('/').next().unwrap_or("");
            if !first.is_empty() {
                names.insert(first.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    fn create_dir(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        register_parents(&mut state.dirs, key.trim_end_matches('/'));
        Ok(())
    }

    fn dir_exists(&self, key: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.dirs.contains(key.trim_end_matches('/')))
    }

    fn remove_dir_all(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let dir = key.trim_end_matches('/').to_string();
        let prefix = format!("{dir}/");
        state.files.retain(|k, _| !k.starts_with(&prefix));
        state.dirs.retain(|d| d != &dir && !d.starts_with(&prefix));
        Ok(())
    }
}

fn normalized_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// A repository backed by [`MemoryBackend`] with small parts so tests can
/// exercise multi-part streams cheaply.
pub fn test_repo() -> Repository {
    let mut config = KerfConfig::with_root("mem");
    config.part_size = 64;
    config.bucket_capacity = 4;
    config.workers = 2;
    Repository::new(Box::new(MemoryBackend::new()), config).expect("test repo")
}

/// Like [`test_repo`] but with the given retention settings.
pub fn test_repo_with_retention(keep: usize, abandoned_after: Option<&str>) -> Repository {
    let mut repo = test_repo();
    repo.config.retention.keep = keep;
    repo.config.retention.abandoned_after = abandoned_after.map(String::from);
    repo
}

fn link_parts(repo: &Repository, build: &InstanceBuild<'_>, data: &[u8]) -> (u64, kerf_types::digest::PartDigest) {
    let store = PartStore::new(repo.storage.as_ref());
    let mut chunker = PartChunker::new(data, repo.config.hash_algorithm, repo.config.part_size);
    for part in chunker.by_ref() {
        let part = part.unwrap();
        store.put(&part.digest, &part.bytes).unwrap();
        build.append(part.index, &part.digest).unwrap();
    }
    let summary = chunker.finish().unwrap();
    (summary.total_size, summary.digest)
}

/// Store `data` as a complete instance with the given identifier.
pub fn build_complete(repo: &Repository, target: &str, id: &str, data: &[u8]) -> InstanceId {
    let id = InstanceId::parse(id).unwrap();
    let build = InstanceBuild::begin_at(repo, target, id).unwrap();
    let (total_size, digest) = link_parts(repo, &build, data);
    build.finalize(total_size, &digest).unwrap()
}

/// Store `data`'s parts and link them, but never finalize; the instance
/// stays in the building state.
pub fn build_building(repo: &Repository, target: &str, id: &str, data: &[u8]) -> InstanceId {
    let id = InstanceId::parse(id).unwrap();
    let build = InstanceBuild::begin_at(repo, target, id).unwrap();
    link_parts(repo, &build, data);
    build.abort().unwrap();
    id
}
