//! UDF module management, node-level info and geo queries

use crate::common::*;
use aeroclient::{
    GeoShape, IndexCollection, IndexDataType, IndexPredicate, ResultCode, UdfLanguage, Value,
    MEMORY_NODE_NAME,
};
use std::io::Write;

const SOURCE: &str = concat!(
    "function bump(rec, by)\n",
    "  rec['n'] = (rec['n'] or 0) + by\n",
    "  aerospike:update(rec)\n",
    "end\n",
);

#[test]
fn uploaded_module_is_listed_and_fetched() {
    let c = client();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.lua");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(SOURCE.as_bytes())
        .unwrap();

    c.udf_put(&path, UdfLanguage::Lua, None).unwrap();
    let modules = c.udf_list(None).unwrap();
    let counter = modules.iter().find(|m| m.name == "counter.lua").unwrap();
    assert_eq!(counter.language, UdfLanguage::Lua);
    assert!(!counter.hash.is_empty());
    assert_eq!(c.udf_get("counter.lua", UdfLanguage::Lua, None).unwrap(), SOURCE);

    // Re-uploading changed content changes the hash
    let before = counter.hash.clone();
    c.udf_put_bytes("counter.lua", b"-- v2\n", UdfLanguage::Lua, None)
        .unwrap();
    let after = c.udf_list(None).unwrap();
    assert_ne!(after[0].hash, before);

    let json = serde_json::to_value(&after).unwrap();
    assert_eq!(json[0]["name"], "counter.lua");
}

#[test]
fn missing_or_empty_module_file_rejected() {
    let c = client();
    let dir = tempfile::tempdir().unwrap();
    let err = c
        .udf_put(dir.path().join("absent.lua"), UdfLanguage::Lua, None)
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::LuaFileNotFound);

    let empty = dir.path().join("empty.lua");
    std::fs::File::create(&empty).unwrap();
    let err = c.udf_put(&empty, UdfLanguage::Lua, None).unwrap_err();
    assert_eq!(err.code(), ResultCode::LuaFileNotFound);
    assert!(c.udf_list(None).unwrap().is_empty());
}

#[test]
fn removing_a_module_stops_its_functions() {
    let (cluster, c) = cluster_client();
    cluster.register_udf("counter", "bump", |rec, args| {
        let by = args.first().and_then(Value::as_int).unwrap_or(1);
        let n = rec.get("n").and_then(Value::as_int).unwrap_or(0) + by;
        rec.set("n", n);
        Ok(Value::Int(n))
    });
    assert!(c
        .udf_list(None)
        .unwrap()
        .iter()
        .any(|m| m.name == "counter.lua"));
    assert_eq!(
        c.apply(&key(1), "counter", "bump", vec![Value::Int(3)], None)
            .unwrap(),
        Value::Int(3)
    );

    c.udf_remove("counter.lua", None).unwrap();
    let err = c
        .apply(&key(1), "counter", "bump", vec![Value::Int(3)], None)
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::UdfNotFound);
    let err = c.udf_get("counter.lua", UdfLanguage::Lua, None).unwrap_err();
    assert_eq!(err.code(), ResultCode::LuaFileNotFound);
}

#[test]
fn info_reaches_named_nodes_only() {
    let c = seeded(1);
    let nodes = c.get_nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, MEMORY_NODE_NAME);
    assert_eq!((nodes[0].host.as_str(), nodes[0].port), ("127.0.0.1", 3000));

    assert_eq!(c.info_node("namespaces", MEMORY_NODE_NAME, None).unwrap(), NS);
    let err = c.info_node("namespaces", "BB9FFFFFFFFFFFF", None).unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidNode);

    let all = c.info_all("namespaces", None).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].0.name, MEMORY_NODE_NAME);
    assert_eq!(all[0].1.as_deref().unwrap(), NS);
}

#[test]
fn geo_query_over_list_of_points() {
    let c = client();
    let point = |lng: f64, lat: f64| Value::GeoJson(GeoShape::Point([lng, lat]).to_json());
    c.put(
        &key("route-a"),
        &[("stops", Value::List(vec![point(0.5, 0.5), point(40.0, 40.0)]))],
        None,
        None,
    )
    .unwrap();
    c.put(
        &key("route-b"),
        &[("stops", Value::List(vec![point(40.0, 41.0)]))],
        None,
        None,
    )
    .unwrap();
    c.index_create(
        NS,
        Some(SET),
        "stops",
        "idx_stops",
        IndexCollection::List,
        IndexDataType::Geo2dSphere,
        None,
    )
    .unwrap();

    let region = GeoShape::AeroCircle([0.0, 0.0], 100_000.0).to_json();
    let mut q = c.query(NS, Some(SET)).unwrap();
    q.where_predicate(IndexPredicate::GeoWithin {
        bin: "stops".into(),
        collection: IndexCollection::List,
        region,
    })
    .unwrap();
    let records = q.results(None).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.digest, *key("route-a").digest());

    // Default-collection predicate needs a default-collection index
    let mut q = c.query(NS, Some(SET)).unwrap();
    q.where_predicate(IndexPredicate::geo_within_radius("stops", 0.0, 0.0, 1.0))
        .unwrap();
    assert_eq!(q.results(None).unwrap_err().code(), ResultCode::IndexNotFound);
}
