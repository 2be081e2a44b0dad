use thiserror::Error;

use crate::digest::PartDigest;
use crate::instance_id::InstanceId;

pub type Result<T> = std::result::Result<T, KerfError>;

#[derive(Debug, Error)]
pub enum KerfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid target name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid store format: {0}")]
    InvalidFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("target not found: '{0}'")]
    TargetNotFound(String),

    #[error("instance not found: '{target}/{id}'")]
    InstanceNotFound { target: String, id: InstanceId },

    #[error("instance already exists: '{target}/{id}'")]
    InstanceExists { target: String, id: InstanceId },

    #[error("part not found in store: {0}")]
    PartNotFound(PartDigest),

    #[error("instance '{target}/{id}' is not complete")]
    IncompleteInstance { target: String, id: InstanceId },

    #[error("target '{0}' has no complete instance")]
    NoCompleteInstance(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("store is locked by another operation (lock: {0})")]
    Locked(String),

    #[error("{0}")]
    Other(String),
}
