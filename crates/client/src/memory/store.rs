//! Record storage of the in-process cluster
//!
//! Records live in one ordered map per `(namespace, partition)` so that a
//! partition can be walked in digest order and resumed after any digest.
//! Expired records stay in place until they are overwritten or truncated;
//! every read treats them as absent.

use aeroclient_core::{partition_id_for, Digest, UserKey, Value};
use aeroclient_operations::Expiration;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// One stored record
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredRecord {
    pub(crate) set: String,
    pub(crate) user_key: Option<UserKey>,
    /// Bins in first-write order
    pub(crate) bins: Vec<(String, Value)>,
    pub(crate) generation: u32,
    /// `None` never expires
    pub(crate) void_time: Option<DateTime<Utc>>,
    pub(crate) last_update: DateTime<Utc>,
}

impl StoredRecord {
    pub(crate) fn new(set: &str, now: DateTime<Utc>) -> Self {
        StoredRecord {
            set: set.to_string(),
            user_key: None,
            bins: Vec::new(),
            generation: 0,
            void_time: None,
            last_update: now,
        }
    }

    pub(crate) fn bin(&self, name: &str) -> Option<&Value> {
        self.bins.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub(crate) fn bin_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.bins.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Store a bin; `Nil` deletes it
    pub(crate) fn set_bin(&mut self, name: &str, value: Value) {
        if value.is_nil() {
            self.remove_bin(name);
            return;
        }
        match self.bin_mut(name) {
            Some(slot) => *slot = value,
            None => self.bins.push((name.to_string(), value)),
        }
    }

    pub(crate) fn remove_bin(&mut self, name: &str) -> Option<Value> {
        let pos = self.bins.iter().position(|(n, _)| n == name)?;
        Some(self.bins.remove(pos).1)
    }

    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.void_time.is_some_and(|v| v <= now)
    }

    /// Seconds to expiry rounded up, `u32::MAX` for never
    pub(crate) fn ttl(&self, now: DateTime<Utc>) -> u32 {
        match self.void_time {
            None => u32::MAX,
            Some(v) => {
                let ms = (v - now).num_milliseconds().max(0);
                u32::try_from((ms + 999) / 1000).unwrap_or(u32::MAX - 1)
            }
        }
    }

    /// Apply the TTL carried by a write. The namespace default is "never".
    pub(crate) fn apply_expiration(&mut self, ttl: Expiration, now: DateTime<Utc>) {
        self.void_time = match ttl {
            Expiration::NamespaceDefault | Expiration::Never => None,
            Expiration::DontUpdate => self.void_time,
            Expiration::Seconds(s) => Some(now + Duration::seconds(i64::from(s))),
        };
    }

    /// Approximate storage footprint in bytes
    pub(crate) fn device_size(&self) -> i64 {
        fn size(v: &Value) -> usize {
            match v {
                Value::Nil | Value::Wildcard | Value::Infinity => 1,
                Value::Bool(_) => 2,
                Value::Int(_) | Value::Float(_) => 9,
                Value::String(s) | Value::GeoJson(s) => s.len() + 1,
                Value::Blob(b) | Value::Hll(b) => b.len() + 1,
                Value::List(items) => 5 + items.iter().map(size).sum::<usize>(),
                Value::Map(entries) => {
                    5 + entries.iter().map(|(k, v)| size(k) + size(v)).sum::<usize>()
                }
            }
        }
        let bins: usize = self.bins.iter().map(|(n, v)| n.len() + size(v)).sum();
        (self.set.len() + bins + 16) as i64
    }
}

pub(crate) type PartitionMap = BTreeMap<Digest, StoredRecord>;

/// Partitioned record store
#[derive(Debug, Default)]
pub(crate) struct Store {
    partitions: DashMap<(String, u16), PartitionMap>,
}

impl Store {
    /// Run `f` with exclusive access to the partition holding `digest`
    pub(crate) fn with_partition<R>(
        &self,
        namespace: &str,
        digest: &Digest,
        f: impl FnOnce(&mut PartitionMap) -> R,
    ) -> R {
        let pid = partition_id_for(digest) as u16;
        let mut part = self
            .partitions
            .entry((namespace.to_string(), pid))
            .or_default();
        f(&mut *part)
    }

    /// Live records of a partition after `after`, in digest order
    pub(crate) fn page(
        &self,
        namespace: &str,
        pid: u16,
        after: Option<Digest>,
        now: DateTime<Utc>,
    ) -> Vec<(Digest, StoredRecord)> {
        let Some(part) = self.partitions.get(&(namespace.to_string(), pid)) else {
            return Vec::new();
        };
        part.iter()
            .filter(|(d, _)| after.map_or(true, |a| **d > a))
            .filter(|(_, r)| !r.is_expired(now))
            .map(|(d, r)| (*d, r.clone()))
            .collect()
    }

    /// Namespaces holding at least one partition, sorted
    pub(crate) fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.iter().map(|p| p.key().0.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Drop records of a namespace (or one set of it) last updated before
    /// `before`; returns how many were dropped
    pub(crate) fn truncate(
        &self,
        namespace: &str,
        set: Option<&str>,
        before: DateTime<Utc>,
    ) -> usize {
        let mut dropped = 0;
        for mut part in self.partitions.iter_mut() {
            if part.key().0 != namespace {
                continue;
            }
            let len = part.len();
            part.retain(|_, r| {
                let in_scope = set.map_or(true, |s| r.set == s);
                !(in_scope && r.last_update < before)
            });
            dropped += len - part.len();
        }
        dropped
    }
}
