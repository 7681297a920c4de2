//! Shared cluster connections
//!
//! Clients configured with the same hosts and user share one [`Cluster`]
//! handle. The pool counts handles per connection alias; the cluster is
//! dropped from the pool when the last handle is released.

use crate::transport::Cluster;
use aeroclient_core::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::info;

struct PoolEntry {
    cluster: Arc<dyn Cluster>,
    refs: usize,
}

/// Reference-counted registry of cluster connections keyed by alias
#[derive(Default)]
pub struct ConnectionPool {
    entries: DashMap<String, PoolEntry>,
}

impl ConnectionPool {
    /// Empty pool
    pub fn new() -> Arc<Self> {
        Arc::new(ConnectionPool::default())
    }

    /// Acquire the connection for `alias`, calling `connect` only if there
    /// is none yet.
    pub fn acquire(
        self: &Arc<Self>,
        alias: &str,
        connect: impl FnOnce() -> Result<Arc<dyn Cluster>>,
    ) -> Result<PooledCluster> {
        let cluster = match self.entries.entry(alias.to_string()) {
            Entry::Occupied(mut e) => {
                let entry = e.get_mut();
                entry.refs += 1;
                info!(
                    target: "aeroclient::pool",
                    alias,
                    refs = entry.refs,
                    "Reusing shared connection"
                );
                Arc::clone(&entry.cluster)
            }
            Entry::Vacant(v) => {
                let cluster = connect()?;
                v.insert(PoolEntry {
                    cluster: Arc::clone(&cluster),
                    refs: 1,
                });
                info!(target: "aeroclient::pool", alias, "Opened shared connection");
                cluster
            }
        };
        Ok(PooledCluster {
            cluster,
            lease: Some(Lease {
                pool: Arc::clone(self),
                alias: alias.to_string(),
            }),
        })
    }

    /// Release one handle for `alias`; returns the remaining count
    pub fn release(&self, alias: &str) -> usize {
        let remaining = match self.entries.get_mut(alias) {
            Some(mut entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs
            }
            None => return 0,
        };
        if remaining == 0 && self.entries.remove_if(alias, |_, e| e.refs == 0).is_some() {
            info!(target: "aeroclient::pool", alias, "Closed shared connection");
        }
        remaining
    }

    /// Handles currently held for `alias`
    pub fn ref_count(&self, alias: &str) -> usize {
        self.entries.get(alias).map_or(0, |e| e.refs)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no connection is held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.entries.len())
            .finish()
    }
}

struct Lease {
    pool: Arc<ConnectionPool>,
    alias: String,
}

/// A cluster handle; pooled handles are released on drop
pub struct PooledCluster {
    cluster: Arc<dyn Cluster>,
    lease: Option<Lease>,
}

impl PooledCluster {
    /// A handle that is not shared through any pool
    pub fn unpooled(cluster: Arc<dyn Cluster>) -> Self {
        PooledCluster {
            cluster,
            lease: None,
        }
    }

    /// Alias this handle was acquired under
    pub fn alias(&self) -> Option<&str> {
        self.lease.as_ref().map(|l| l.alias.as_str())
    }
}

impl Deref for PooledCluster {
    type Target = dyn Cluster;

    fn deref(&self) -> &Self::Target {
        self.cluster.as_ref()
    }
}

impl Drop for PooledCluster {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.pool.release(&lease.alias);
        }
    }
}

impl fmt::Debug for PooledCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledCluster")
            .field("alias", &self.alias())
            .finish()
    }
}
