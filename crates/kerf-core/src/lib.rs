pub mod builder;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod instance;
pub mod repo;
pub mod retention;
pub mod storage;
pub mod store;

pub use kerf_types::digest::{HashAlgorithm, PartDigest, StreamHasher};
pub use kerf_types::error::{KerfError, Result};
pub use kerf_types::instance_id::InstanceId;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
