//! Default policies, per-call overrides and configuration files

use crate::common::*;
use aeroclient::aeroclient_policy::CONFIG_FILE_NAME;
use aeroclient::{Client, ClientConfig, Cluster, ConnectionPool, MemoryCluster, ResultCode, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn memory_connect(_: &ClientConfig) -> aeroclient::Result<Arc<dyn Cluster>> {
    Ok(Arc::new(MemoryCluster::new()))
}

#[test]
fn config_file_defaults_apply_to_calls() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let mut config = ClientConfig::from_toml_str(
        concat!(
            "hosts = [\"10.0.0.1:3000\"]\nshared_connection = false\n\n",
            "[policies.write]\nexists = \"create\"\n",
        ),
    )
    .unwrap();
    config.write_to_file(&path).unwrap();
    config = ClientConfig::from_file(&path).unwrap();

    let c = Client::connect(&config, &ConnectionPool::new(), memory_connect).unwrap();
    c.put(&key(1), &[("a", Value::Int(1))], None, None).unwrap();
    let err = c.put(&key(1), &[("a", Value::Int(2))], None, None).unwrap_err();
    assert_eq!(err.code(), ResultCode::KeyExists);

    // A per-call override wins over the file
    let upsert = map(&[("exists", Value::from("ignore"))]);
    c.put(&key(1), &[("a", Value::Int(3))], None, Some(&upsert)).unwrap();
    assert_eq!(c.get(&key(1), None).unwrap().bin("a"), Some(&Value::Int(3)));
}

#[test]
fn invalid_config_refuses_to_connect() {
    assert!(ClientConfig::from_toml_str("[policies.read]\nreplica = \"nowhere\"\n").is_err());

    let config = ClientConfig {
        hosts: Vec::new(),
        ..ClientConfig::default()
    };
    let called = AtomicUsize::new(0);
    let result = Client::connect(&config, &ConnectionPool::new(), |c| {
        called.fetch_add(1, Ordering::SeqCst);
        memory_connect(c)
    });
    assert!(result.is_err());
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[test]
fn shared_connection_opens_once() {
    let pool = ConnectionPool::new();
    let opened = AtomicUsize::new(0);
    let connect = |_: &ClientConfig| -> aeroclient::Result<Arc<dyn Cluster>> {
        opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryCluster::new()))
    };
    let config = ClientConfig::default();
    let a = Client::connect(&config, &pool, connect).unwrap();
    let b = Client::connect(&config, &pool, connect).unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(pool.ref_count(&config.connection_alias()), 2);

    // Both clients see the same data
    a.put(&key("shared"), &[("v", Value::Int(1))], None, None).unwrap();
    assert!(b.exists(&key("shared"), None).unwrap().is_some());

    drop(a);
    assert_eq!(pool.ref_count(&config.connection_alias()), 1);
    drop(b);
    assert!(pool.is_empty());
}

#[test]
fn generation_policy_guards_writes() {
    let c = client();
    c.put(&key(2), &[("a", Value::Int(1))], None, None).unwrap();
    c.put(&key(2), &[("a", Value::Int(2))], None, None).unwrap();

    let eq = map(&[("gen", Value::from("eq"))]);
    let stale = map(&[("gen", Value::Int(1))]);
    let err = c
        .put(&key(2), &[("a", Value::Int(9))], Some(&stale), Some(&eq))
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::GenerationError);

    let current = map(&[("gen", Value::Int(2))]);
    c.put(&key(2), &[("a", Value::Int(9))], Some(&current), Some(&eq))
        .unwrap();
    assert_eq!(c.get(&key(2), None).unwrap().generation(), 3);
}

#[test]
fn bad_override_types_are_param_errors() {
    let c = client();
    let bad = map(&[("total_timeout", Value::from("soon"))]);
    assert!(c.get(&key(3), Some(&bad)).unwrap_err().is_param());
    let negative = map(&[("max_retries", Value::Int(-1))]);
    assert!(c.get(&key(3), Some(&negative)).unwrap_err().is_param());
    assert!(c.get(&key(3), Some(&Value::Int(5))).unwrap_err().is_param());
}

#[test]
fn unknown_override_fields_are_ignored() {
    let c = client();
    c.put(&key(4), &[("a", Value::Int(1))], None, None).unwrap();
    let policy = map(&[("shiny_new_field", Value::Bool(true))]);
    assert!(c.get(&key(4), Some(&policy)).is_ok());
}

#[test]
fn filter_expression_applies_to_writes() {
    let c = client();
    c.put(&key(5), &[("age", Value::Int(12))], None, None).unwrap();
    let adults_only = map(&[(
        "expressions",
        Value::List(vec![
            Value::from("ge"),
            Value::List(vec![Value::from("int_bin"), Value::from("age")]),
            Value::Int(18),
        ]),
    )]);
    let err = c
        .put(&key(5), &[("age", Value::Int(13))], None, Some(&adults_only))
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::FilteredOut);
    assert_eq!(c.get(&key(5), None).unwrap().bin("age"), Some(&Value::Int(12)));
}

#[test]
fn ttl_meta_reported_back() {
    let c = client();
    let meta = map(&[("ttl", Value::Int(300))]);
    c.put(&key(6), &[("a", Value::Int(1))], Some(&meta), None).unwrap();
    let ttl = c.exists(&key(6), None).unwrap().unwrap().ttl;
    assert!((299..=300).contains(&ttl));

    c.touch(&key(6), -1, None).unwrap();
    assert_eq!(c.exists(&key(6), None).unwrap().unwrap().ttl, u32::MAX);
}

#[test]
fn apply_ttl_override_reaches_written_records() {
    let (cluster, c) = cluster_client();
    cluster.register_udf("m", "set", |rec, _| {
        rec.set("x", 1);
        Ok(Value::Nil)
    });
    let ttl_100 = map(&[("ttl", Value::Int(100))]);
    c.apply(&key("udf-ttl"), "m", "set", Vec::new(), Some(&ttl_100))
        .unwrap();
    let meta = c.exists(&key("udf-ttl"), None).unwrap().unwrap();
    assert!((99..=100).contains(&meta.ttl), "ttl {}", meta.ttl);

    let keys = vec![key("batch-ttl-0"), key("batch-ttl-1")];
    let udf = aeroclient::UdfCall {
        module: "m".into(),
        function: "set".into(),
        args: Vec::new(),
    };
    let ttl_50 = map(&[("ttl", Value::Int(50))]);
    let out = c.batch_apply(&keys, udf, None, Some(&ttl_50)).unwrap();
    assert_eq!(out.result, ResultCode::Ok);
    for k in &keys {
        let meta = c.exists(k, None).unwrap().unwrap();
        assert!((49..=50).contains(&meta.ttl), "ttl {}", meta.ttl);
    }
}
