//! Client facade for the cluster
//!
//! This crate is what applications talk to:
//! - [`Client`]: single-record commands, UDF calls, info and index management
//! - batch orchestration with per-record isolation
//! - record assembly from raw cluster results
//! - resumable, paginated [`Scan`]s and [`Query`]s, geo predicates
//! - background jobs and UDF module management
//! - user and role administration
//!
//! Network I/O sits behind the [`Cluster`] trait. [`MemoryCluster`] is a
//! complete in-process implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod assembler;
pub mod batch;
pub mod client;
pub mod geo;
pub mod job;
pub mod memory;
pub mod partition;
pub mod pool;
pub mod query;
pub mod retry;
pub mod scan;
mod settings;
pub mod stream;
pub mod transport;
pub mod udf;

pub use admin::{AdminCommand, AdminResponse, Privilege, PrivilegeCode, RoleInfo, UserInfo};
pub use assembler::{assemble, AssembleMode};
pub use batch::{BatchAction, BatchEntry, BatchRecord, BatchRecordKind, BatchRecords};
pub use client::{Client, IndexDataType};
pub use geo::GeoShape;
pub use job::{JobInfo, JobModule, JobStatus};
pub use memory::{MemoryCluster, UdfFn, UdfRecord, MEMORY_NODE_NAME};
pub use partition::{PartitionFilter, PartitionStatus, PartitionsStatus};
pub use pool::{ConnectionPool, PooledCluster};
pub use query::Query;
pub use retry::with_retry;
pub use scan::Scan;
pub use stream::{StreamState, PARTITION_FILTER_FIELD};
pub use transport::{
    BackgroundAction, BackgroundRequest, BatchRequest, BatchResponse, Cluster, CommandSettings,
    IndexCollection, IndexPredicate, NodeAddress, RawRecord, Request, RequestKind, StreamItem,
    StreamRequest, UdfCall, UDF_RESULT_BIN,
};
pub use udf::{UdfLanguage, UdfModuleInfo};
