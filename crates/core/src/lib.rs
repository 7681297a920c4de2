//! Core types for the cluster client
//!
//! This crate defines the foundational types used throughout the client:
//! - Value: tagged value model for bins, keys and arguments
//! - Key / UserKey / Digest: record addressing and partition routing
//! - Record / Bins: records handed back to callers
//! - ResultCode / ErrorKind: stable status codes and their families
//! - Error: the single error type every call returns
//! - Limits: name and value limits checked before any I/O

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod limits;
pub mod record;
pub mod result_code;
pub mod value;

pub use error::{Error, Location, Result};
pub use key::{
    compute_digest, partition_id_for, Digest, Key, KeyError, UserKey, DIGEST_SIZE, N_PARTITIONS,
};
pub use limits::{
    check_u32, LimitError, Limits, MAX_BIN_NAME_BYTES, MAX_INDEX_NAME_BYTES, MAX_NAMESPACE_BYTES,
    MAX_SET_BYTES,
};
pub use record::{Bins, Record, RecordKey, RecordMetadata, UserKeyEcho};
pub use result_code::{ErrorKind, ResultCode};
pub use value::{ParticleType, Value};
