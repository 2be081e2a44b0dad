use std::sync::{Arc, Barrier};

use kerf_types::digest::{HashAlgorithm, PartDigest};
use kerf_types::error::KerfError;

use crate::storage::StorageBackend as _;
use crate::store::{PartStore, PutOutcome};
use crate::testutil::MemoryBackend;

const ALGO: HashAlgorithm = HashAlgorithm::Blake2b256;

#[test]
fn put_then_get_roundtrip() {
    let backend = MemoryBackend::new();
    let store = PartStore::new(&backend);
    let digest = PartDigest::compute(ALGO, b"payload");
    assert_eq!(store.put(&digest, b"payload").unwrap(), PutOutcome::Stored);
    assert!(store.exists(&digest).unwrap());
    assert_eq!(store.get(&digest).unwrap(), b"payload");
    assert_eq!(store.size(&digest).unwrap(), Some(7));
}

#[test]
fn storing_identical_content_twice_yields_one_entry() {
    let backend = MemoryBackend::new();
    let store = PartStore::new(&backend);
    let zeros = vec![0u8; 4096];
    let digest = PartDigest::compute(ALGO, &zeros);
    assert_eq!(store.put(&digest, &zeros).unwrap(), PutOutcome::Stored);
    assert_eq!(store.put(&digest, &zeros).unwrap(), PutOutcome::Deduplicated);
    assert_eq!(store.list_digests().unwrap(), vec![digest]);
}

#[test]
fn get_missing_part_fails_with_part_not_found() {
    let backend = MemoryBackend::new();
    let store = PartStore::new(&backend);
    let digest = PartDigest::compute(ALGO, b"never stored");
    assert!(matches!(
        store.get(&digest),
        Err(KerfError::PartNotFound(d)) if d == digest
    ));
}

#[test]
fn delete_removes_entry() {
    let backend = MemoryBackend::new();
    let store = PartStore::new(&backend);
    let digest = PartDigest::compute(ALGO, b"x");
    store.put(&digest, b"x").unwrap();
    store.delete(&digest).unwrap();
    assert!(!store.exists(&digest).unwrap());
    assert!(store.list_digests().unwrap().is_empty());
}

#[test]
fn concurrent_put_of_same_digest_yields_one_correct_entry() {
    let backend = Arc::new(MemoryBackend::new());
    let payload = vec![0xEEu8; 1024];
    let digest = PartDigest::compute(ALGO, &payload);

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let backend = Arc::clone(&backend);
            let barrier = Arc::clone(&barrier);
            let payload = payload.clone();
            std::thread::spawn(move || {
                barrier.wait();
                PartStore::new(backend.as_ref()).put(&digest, &payload).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let store = PartStore::new(backend.as_ref());
    assert_eq!(store.list_digests().unwrap(), vec![digest]);
    assert_eq!(store.get(&digest).unwrap(), payload);
}

#[test]
fn list_digests_ignores_stray_files() {
    let backend = MemoryBackend::new();
    backend.put("_data/README", b"not an entry").unwrap();
    let store = PartStore::new(&backend);
    let digest = PartDigest::compute(ALGO, b"real");
    store.put(&digest, b"real").unwrap();
    assert_eq!(store.list_digests().unwrap(), vec![digest]);
}
