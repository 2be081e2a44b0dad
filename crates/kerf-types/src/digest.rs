use blake2::digest::consts::U32;
use blake2::Blake2b;
use blake2::Digest as _;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Hash function used for part digests and whole-stream digests.
///
/// One store uses one algorithm; mixing algorithms within a store would
/// make identical content address to different entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[serde(rename = "blake2b256")]
    Blake2b256,
    Sha256,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Blake2b256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Blake2b256 => write!(f, "blake2b256"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A 32-byte content digest identifying a part (or a whole stream).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartDigest(pub [u8; 32]);

impl PartDigest {
    /// Compute the digest of a byte slice with the given algorithm.
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = StreamHasher::new(algorithm);
        hasher.update(data);
        hasher.finish()
    }

    /// Hex-encode the full digest for use as a storage key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First byte as a two-char hex string, used for the shard directory.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Remaining 62 hex chars, used as the entry name within a shard.
    pub fn entry_name(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Parse a digest from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, String> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| format!("invalid hex: {e}"))?;
        if bytes.len() != 32 {
            return Err(format!("expected 32 bytes, got {}", bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(PartDigest(arr))
    }
}

impl fmt::Debug for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Incremental hasher producing a [`PartDigest`].
///
/// Used both per part and for the whole-stream digest, which must be
/// computed while the stream is read (the source is not re-readable).
pub struct StreamHasher {
    inner: HasherInner,
}

enum HasherInner {
    Blake2b256(Box<Blake2b256>),
    Sha256(Box<Sha256>),
}

impl StreamHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Blake2b256 => HasherInner::Blake2b256(Box::new(Blake2b256::new())),
            HashAlgorithm::Sha256 => HasherInner::Sha256(Box::new(Sha256::new())),
        };
        Self { inner }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            HasherInner::Blake2b256(h) => h.update(data),
            HasherInner::Sha256(h) => h.update(data),
        }
    }

    pub fn finish(self) -> PartDigest {
        let mut out = [0u8; 32];
        match self.inner {
            HasherInner::Blake2b256(h) => out.copy_from_slice(&h.finalize()),
            HasherInner::Sha256(h) => out.copy_from_slice(&h.finalize()),
        }
        PartDigest(out)
    }
}
