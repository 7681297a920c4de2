//! Client integration tests
//!
//! End-to-end tests driving the public client surface against the
//! in-process cluster:
//! - addressing: digests and partition routing
//! - policy: defaults, overrides and configuration files
//! - operate: record, list, map and bit operations
//! - batch: mixed batches and transport faults
//! - scan_pagination: resumable scans and queries
//! - admin: users, roles and privileges
//! - background: background scans and queries and job progress
//! - modules: UDF modules, node info and geo queries

mod common;

mod addressing;
mod admin;
mod background;
mod batch;
mod modules;
mod operate;
mod policy;
mod scan_pagination;
