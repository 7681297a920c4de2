//! Records returned by reads, operate calls, batches and scans
//!
//! A [`Record`] is built fresh for every response and owned by the caller.
//! Bins come in two shapes:
//!
//! - [`Bins::Ordered`]: one `(name, value)` pair per operation result, in
//!   operation order, duplicates allowed
//! - [`Bins::Merged`]: one entry per bin name, last write wins
//!
//! In both shapes a bin holding [`Value::Nil`] and a bin that is missing
//! are the same thing: "not present".

use crate::key::{Digest, Key, UserKey};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// User key as echoed back in a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserKeyEcho {
    /// The user key is known to the client
    Echoed(UserKey),
    /// The record was addressed by digest only; the user key cannot be recovered
    Unknown,
}

impl UserKeyEcho {
    /// The echoed user key, if known
    pub fn as_user_key(&self) -> Option<&UserKey> {
        match self {
            UserKeyEcho::Echoed(k) => Some(k),
            UserKeyEcho::Unknown => None,
        }
    }
}

/// Key component of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    /// Namespace
    pub namespace: String,
    /// Set name
    pub set: String,
    /// User key, or `Unknown` for digest-only keys
    pub user_key: UserKeyEcho,
    /// Record digest
    pub digest: Digest,
}

impl RecordKey {
    /// Echo a request key. `send_key` false means the caller asked for
    /// digest-only addressing and the user key is reported as unknown.
    pub fn echo(key: &Key, send_key: bool) -> Self {
        let user_key = match (send_key, key.user_key()) {
            (true, Some(k)) => UserKeyEcho::Echoed(k.clone()),
            _ => UserKeyEcho::Unknown,
        };
        RecordKey {
            namespace: key.namespace().to_string(),
            set: key.set().to_string(),
            user_key,
            digest: *key.digest(),
        }
    }
}

/// Record metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Write generation
    pub generation: u32,
    /// Seconds until expiry, `u32::MAX` for never
    pub ttl: u32,
}

/// Record bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bins {
    /// One pair per operation result, in operation order
    Ordered(Vec<(String, Value)>),
    /// One value per bin, last write wins
    Merged(BTreeMap<String, Value>),
}

impl Default for Bins {
    fn default() -> Self {
        Bins::Merged(BTreeMap::new())
    }
}

impl Bins {
    /// Value of a bin. In ordered mode this is the last result for the bin.
    ///
    /// Returns `None` both for missing bins and for bins holding `Nil`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let found = match self {
            Bins::Ordered(pairs) => pairs.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v),
            Bins::Merged(map) => map.get(name),
        };
        found.filter(|v| !v.is_nil())
    }

    /// True when the bin is present with a non-nil value
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of entries (ordered: pairs, merged: bins)
    pub fn len(&self) -> usize {
        match self {
            Bins::Ordered(pairs) => pairs.len(),
            Bins::Merged(map) => map.len(),
        }
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered pairs, if this is an ordered result
    pub fn as_ordered(&self) -> Option<&[(String, Value)]> {
        match self {
            Bins::Ordered(pairs) => Some(pairs),
            Bins::Merged(_) => None,
        }
    }

    /// Merged map, if this is a merged result
    pub fn as_merged(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Bins::Merged(map) => Some(map),
            Bins::Ordered(_) => None,
        }
    }
}

/// A record returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Key echo
    pub key: RecordKey,
    /// Generation and TTL
    pub metadata: RecordMetadata,
    /// Bin values
    pub bins: Bins,
}

impl Record {
    /// Shorthand for `self.bins.get(name)`
    pub fn bin(&self, name: &str) -> Option<&Value> {
        self.bins.get(name)
    }

    /// Write generation
    pub fn generation(&self) -> u32 {
        self.metadata.generation
    }
}
