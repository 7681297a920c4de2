//! Shared helpers for the client integration tests

#![allow(dead_code)]

use aeroclient::{Client, Key, MemoryCluster, PolicyDefaults, Value};
use std::sync::{Arc, Once};

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output to the test harness
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub const NS: &str = "test";
pub const SET: &str = "demo";

pub fn key(k: impl Into<Value>) -> Key {
    Key::new(NS, SET, k).unwrap()
}

/// Client plus a handle on the cluster behind it
pub fn cluster_client() -> (MemoryCluster, Client) {
    init_tracing();
    let cluster = MemoryCluster::new();
    let client = Client::new(Arc::new(cluster.clone()), PolicyDefaults::default());
    (cluster, client)
}

pub fn client() -> Client {
    cluster_client().1
}

/// Client holding `n` records `{"id": i, "grp": i % 3}` keyed `0..n` in
/// the demo set
pub fn seeded(n: i64) -> Client {
    let c = client();
    for i in 0..n {
        c.put(
            &key(i),
            &[("id", Value::Int(i)), ("grp", Value::Int(i % 3))],
            None,
            None,
        )
        .unwrap();
    }
    c
}

pub fn map(pairs: &[(&str, Value)]) -> Value {
    Value::map_from(pairs.iter().map(|(k, v)| (*k, v.clone())))
}
