use std::io::Read;

use crossbeam_channel::bounded;
use tracing::info;

use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::builder::InstanceBuild;
use crate::chunker::{Part, PartChunker, StreamSummary};
use crate::repo::Repository;
use crate::store::{PartStore, PutOutcome};

/// Statistics returned by `add`.
#[derive(Debug, Default)]
pub struct AddStats {
    pub parts_total: u64,
    pub parts_stored: u64,
    pub parts_deduplicated: u64,
    pub bytes_total: u64,
}

struct StoredPart {
    index: u64,
    digest: PartDigest,
    outcome: PutOutcome,
}

/// Split `source` into parts, store them, and commit a new instance for
/// `target`.
///
/// The reading thread chunks the stream and keeps the whole-stream hash
/// (inherently sequential); worker threads store parts concurrently; the
/// calling thread links part-references as results arrive. Slot placement
/// is index-addressed, so link order does not depend on worker completion
/// order. The bounded channel caps in-flight part data to roughly
/// `2 * workers * part_size` bytes.
pub fn run(
    repo: &Repository,
    target: &str,
    source: impl Read + Send,
) -> Result<(InstanceId, AddStats)> {
    let build = InstanceBuild::begin(repo, target)?;
    let chunker = PartChunker::new(source, repo.config.hash_algorithm, repo.config.part_size);
    let workers = repo.config.workers;

    let outcome = pipeline(repo, &build, chunker, workers);

    match outcome {
        Ok((summary, stats)) => {
            if stats.parts_total != summary.parts {
                // A worker result went missing; refuse to commit.
                build.abort()?;
                return Err(KerfError::Other(format!(
                    "linked {} parts but the stream produced {}",
                    stats.parts_total, summary.parts
                )));
            }
            let id = build.finalize(summary.total_size, &summary.digest)?;
            info!(
                target = %target,
                instance = %id,
                parts = stats.parts_total,
                stored = stats.parts_stored,
                deduplicated = stats.parts_deduplicated,
                bytes = stats.bytes_total,
                "add finished"
            );
            Ok((id, stats))
        }
        Err(e) => {
            // Leave the building instance on disk; release the lock.
            build.abort()?;
            Err(e)
        }
    }
}

fn pipeline(
    repo: &Repository,
    build: &InstanceBuild<'_>,
    chunker: PartChunker<impl Read + Send>,
    workers: usize,
) -> Result<(StreamSummary, AddStats)> {
    let (part_tx, part_rx) = bounded::<Part>(workers * 2);
    let (done_tx, done_rx) = bounded::<StoredPart>(workers * 2);

    std::thread::scope(|scope| {
        let reader = scope.spawn(move || -> Result<StreamSummary> {
            let mut chunker = chunker;
            for item in chunker.by_ref() {
                let part = item?;
                if part_tx.send(part).is_err() {
                    return Err(KerfError::Other("store workers stopped early".into()));
                }
            }
            drop(part_tx);
            chunker.finish()
        });

        let mut worker_handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let part_rx = part_rx.clone();
            let done_tx = done_tx.clone();
            worker_handles.push(scope.spawn(move || -> Result<()> {
                let store = PartStore::new(repo.storage.as_ref());
                for part in part_rx {
                    let outcome = store.put(&part.digest, &part.bytes)?;
                    let stored = StoredPart {
                        index: part.index,
                        digest: part.digest,
                        outcome,
                    };
                    if done_tx.send(stored).is_err() {
                        break;
                    }
                }
                Ok(())
            }));
        }
        drop(part_rx);
        drop(done_tx);

        // Commit loop: link each stored part into the instance. Dropping
        // `done_rx` on failure unblocks the workers, which in turn
        // unblocks the reader.
        let mut stats = AddStats::default();
        let mut commit_error: Option<KerfError> = None;
        for stored in done_rx {
            if let Err(e) = build.append(stored.index, &stored.digest) {
                commit_error = Some(e);
                break;
            }
            stats.parts_total += 1;
            match stored.outcome {
                PutOutcome::Stored => stats.parts_stored += 1,
                PutOutcome::Deduplicated => stats.parts_deduplicated += 1,
            }
        }

        let mut worker_error: Option<KerfError> = None;
        for handle in worker_handles {
            if let Err(e) = handle.join().expect("store worker panicked") {
                worker_error.get_or_insert(e);
            }
        }
        let reader_result = reader.join().expect("reader thread panicked");

        if let Some(e) = commit_error {
            return Err(e);
        }
        if let Some(e) = worker_error {
            return Err(e);
        }
        let summary = reader_result?;
        stats.bytes_total = summary.total_size;
        Ok((summary, stats))
    })
}
