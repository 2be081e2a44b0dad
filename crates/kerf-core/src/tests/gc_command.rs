use kerf_types::error::KerfError;

use crate::commands::{gc, prune};
use crate::repo::lock;
use crate::storage::StorageBackend as _;
use crate::store::PartStore;
use crate::testutil::{build_building, build_complete, test_repo_with_retention};

#[test]
fn gc_deletes_only_unreferenced_entries() {
    let repo = test_repo_with_retention(1, None);
    // Two instances sharing their first part (same 64-byte block).
    let shared = vec![0x11u8; 64];
    let old = [shared.clone(), vec![0x22u8; 64]].concat();
    let new = [shared.clone(), vec![0x33u8; 64]].concat();
    build_complete(&repo, "foobar", "20260101T000000Z", &old);
    build_complete(&repo, "foobar", "20260102T000000Z", &new);

    let store = PartStore::new(repo.storage.as_ref());
    assert_eq!(store.list_digests().unwrap().len(), 3);

    // Prune the old instance, then collect.
    prune::run(&repo, "foobar", false).unwrap();
    let stats = gc::run(&repo, false).unwrap();
    assert_eq!(stats.entries_total, 3);
    assert_eq!(stats.entries_live, 2);
    assert_eq!(stats.entries_deleted, 1);
    assert_eq!(stats.bytes_freed, 64);
    assert_eq!(store.list_digests().unwrap().len(), 2);
}

#[test]
fn gc_twice_deletes_nothing_the_second_time() {
    let repo = test_repo_with_retention(1, None);
    build_complete(&repo, "foobar", "20260101T000000Z", &vec![1u8; 128]);
    build_complete(&repo, "foobar", "20260102T000000Z", &vec![2u8; 128]);
    prune::run(&repo, "foobar", false).unwrap();

    let first = gc::run(&repo, false).unwrap();
    assert!(first.entries_deleted > 0);

    let second = gc::run(&repo, false).unwrap();
    assert_eq!(second.entries_deleted, 0);
    assert_eq!(second.entries_live, second.entries_total);
}

#[test]
fn gc_keeps_parts_of_building_instances() {
    let repo = test_repo_with_retention(1, None);
    build_building(&repo, "foobar", "20260101T000000Z", &vec![9u8; 64]);

    let stats = gc::run(&repo, false).unwrap();
    assert_eq!(stats.entries_deleted, 0);
    assert_eq!(stats.entries_live, 1);
}

#[test]
fn gc_spans_all_targets() {
    let repo = test_repo_with_retention(1, None);
    let shared = vec![0xAAu8; 64];
    build_complete(&repo, "alpha", "20260101T000000Z", &shared);
    build_complete(&repo, "beta", "20260101T000000Z", &shared);

    // Remove alpha's only instance directly; beta still references the part.
    repo.storage.remove_dir_all("alpha/20260101T000000Z").unwrap();

    let stats = gc::run(&repo, false).unwrap();
    assert_eq!(stats.entries_deleted, 0);
    assert_eq!(stats.entries_live, 1);
}

#[test]
fn gc_dry_run_deletes_nothing() {
    let repo = test_repo_with_retention(1, None);
    build_complete(&repo, "foobar", "20260101T000000Z", &vec![1u8; 64]);
    repo.storage.remove_dir_all("foobar/20260101T000000Z").unwrap();

    let stats = gc::run(&repo, true).unwrap();
    assert_eq!(stats.entries_deleted, 1);
    let store = PartStore::new(repo.storage.as_ref());
    assert_eq!(store.list_digests().unwrap().len(), 1);
}

#[test]
fn gc_refuses_while_any_build_is_active() {
    let repo = test_repo_with_retention(1, None);
    build_complete(&repo, "foobar", "20260101T000000Z", b"data");

    let guard = lock::acquire_target_lock(repo.storage.as_ref(), "other").unwrap();
    assert!(matches!(gc::run(&repo, false), Err(KerfError::Locked(_))));
    lock::release_target_lock(repo.storage.as_ref(), guard).unwrap();

    gc::run(&repo, false).unwrap();
}

#[test]
fn gc_on_empty_store_is_a_no_op() {
    let repo = test_repo_with_retention(1, None);
    let stats = gc::run(&repo, false).unwrap();
    assert_eq!(stats.entries_total, 0);
}
