use std::collections::VecDeque;
use std::io::{self, Read, Write};

use tracing::info;

use kerf_types::digest::PartDigest;
use kerf_types::error::{KerfError, Result};
use kerf_types::instance_id::InstanceId;

use crate::instance::{self, InstanceState};
use crate::repo::Repository;
use crate::store::PartStore;

/// Streams an instance's parts back in slot order. Lazy: one part is held
/// in memory at a time. Re-invokable by calling [`open`] again, not
/// resumable mid-stream.
pub struct RecoverStream<'r> {
    store: PartStore<'r>,
    pending: VecDeque<PartDigest>,
    current: Vec<u8>,
    current_pos: usize,
    id: InstanceId,
}

/// Open a recovery stream for `target`. When `id` is omitted, the newest
/// complete instance is selected (`NoCompleteInstance` if there is none).
/// An explicitly named instance must be complete; recovery does not
/// silently emit partial data.
pub fn open<'r>(
    repo: &'r Repository,
    target: &str,
    id: Option<InstanceId>,
) -> Result<RecoverStream<'r>> {
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

    let refs = instance::list_refs(repo, target, info.id)?;
    for (expected, (slot, _)) in refs.iter().enumerate() {
        if *slot != expected as u64 {
            return Err(KerfError::Integrity(format!(
                "instance '{target}/{}': slot {expected} is missing",
                info.id
            )));
        }
    }

    Ok(RecoverStream {
        store: PartStore::new(repo.storage.as_ref()),
        pending: refs.into_iter().map(|(_, digest)| digest).collect(),
        current: Vec::new(),
        current_pos: 0,
        id: info.id,
    })
}

impl RecoverStream<'_> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    fn refill(&mut self) -> io::Result<bool> {
        let Some(digest) = self.pending.pop_front() else {
            return Ok(false);
        };
        match self.store.get(&digest) {
            Ok(bytes) => {
                self.current = bytes;
                self.current_pos = 0;
                Ok(true)
            }
            Err(KerfError::PartNotFound(d)) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("part {d} vanished from the store during recovery"),
            )),
            Err(KerfError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

impl Read for RecoverStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let remaining = &self.current[self.current_pos..];
            if !remaining.is_empty() {
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                self.current_pos += n;
                return Ok(n);
            }
            if !self.refill()? {
                return Ok(0);
            }
        }
    }
}

/// Recover an instance into `dest`, returning the number of bytes written.
pub fn run(
    repo: &Repository,
    target: &str,
    id: Option<InstanceId>,
    dest: &mut impl Write,
) -> Result<u64> {
    let mut stream = open(repo, target, id)?;
    let instance_id = stream.id();
    let written = io::copy(&mut stream, dest)?;
    info!(target = %target, instance = %instance_id, bytes = written, "recover finished");
    Ok(written)
}
