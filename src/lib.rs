//! aeroclient - client core for a partitioned key-value database cluster
//!
//! Records live in namespaces and optional sets, are addressed by a
//! 20-byte digest of their key and routed to one of 4096 partitions.
//!
//! # Quick Start
//!
//! ```ignore
//! use aeroclient::{Client, Key, Value};
//!
//! // Client over an in-process cluster
//! let client = Client::in_memory();
//!
//! let key = Key::new("test", "users", "alice")?;
//! client.put(&key, &[("age", Value::Int(31))], None, None)?;
//!
//! let record = client.get(&key, None)?;
//! assert_eq!(record.bin("age"), Some(&Value::Int(31)));
//! ```
//!
//! # Layout
//!
//! - [`aeroclient_core`]: values, keys and digests, records, result codes and errors
//! - [`aeroclient_policy`]: policy families, defaults, configuration and filter expressions
//! - [`aeroclient_operations`]: record, list, map, bit and HyperLogLog operations
//! - the client facade, batches, scans, queries and security administration
//!   are re-exported at the top level

pub use aeroclient_client::*;
pub use aeroclient_core;
pub use aeroclient_core::{
    Bins, Digest, Error, ErrorKind, Key, Record, RecordMetadata, Result, ResultCode, UserKey,
    Value,
};
pub use aeroclient_operations;
pub use aeroclient_operations::Operation;
pub use aeroclient_policy;
pub use aeroclient_policy::{ClientConfig, PolicyDefaults};
