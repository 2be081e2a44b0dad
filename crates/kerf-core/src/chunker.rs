use std::io::Read;

use kerf_types::digest::{HashAlgorithm, PartDigest, StreamHasher};
use kerf_types::error::Result;

/// One fixed-size part of the input stream. The last part of a stream may
/// be shorter than the configured part size; an empty stream yields no
/// parts at all.
pub struct Part {
    pub index: u64,
    pub bytes: Vec<u8>,
    pub digest: PartDigest,
}

/// Totals available only once the stream is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct StreamSummary {
    pub total_size: u64,
    pub parts: u64,
    pub digest: PartDigest,
}

/// Splits a byte stream into fixed-size parts, computing each part's
/// digest and, incrementally, the whole-stream digest. Lazy, finite and
/// non-restartable: the source is consumed exactly once.
///
/// After an I/O error the chunker is poisoned: no further parts are
/// yielded and [`finish`](PartChunker::finish) fails, so partial output
/// can never be finalized into an instance.
pub struct PartChunker<R> {
    reader: R,
    algorithm: HashAlgorithm,
    part_size: usize,
    next_index: u64,
    total_size: u64,
    stream_hasher: Option<StreamHasher>,
    exhausted: bool,
    failed: bool,
}

impl<R: Read> PartChunker<R> {
    pub fn new(reader: R, algorithm: HashAlgorithm, part_size: u64) -> Self {
        Self {
            reader,
            algorithm,
            part_size: part_size as usize,
            next_index: 0,
            total_size: 0,
            stream_hasher: Some(StreamHasher::new(algorithm)),
            exhausted: false,
            failed: false,
        }
    }

    /// Fill a buffer with up to `part_size` bytes, tolerating short reads.
    fn read_part(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.part_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Consume the chunker and return the stream totals. Drains any
    /// remaining input first, so calling this early still accounts for the
    /// whole stream.
    pub fn finish(mut self) -> Result<StreamSummary> {
        while !self.exhausted && !self.failed {
            match self.next() {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        if self.failed {
            return Err(kerf_types::error::KerfError::Other(
                "stream failed mid-read; totals are not valid".into(),
            ));
        }
        let hasher = self.stream_hasher.take().expect("hasher consumed once");
        Ok(StreamSummary {
            total_size: self.total_size,
            parts: self.next_index,
            digest: hasher.finish(),
        })
    }
}

impl<R: Read> Iterator for PartChunker<R> {
    type Item = Result<Part>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.failed {
            return None;
        }
        let bytes = match self.read_part() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.failed = true;
                return Some(Err(e.into()));
            }
        };
        if bytes.is_empty() {
            self.exhausted = true;
            return None;
        }
        if let Some(hasher) = self.stream_hasher.as_mut() {
            hasher.update(&bytes);
        }
        self.total_size += bytes.len() as u64;
        let index = self.next_index;
        self.next_index += 1;
        let digest = PartDigest::compute(self.algorithm, &bytes);
        Some(Ok(Part {
            index,
            bytes,
            digest,
        }))
    }
}
