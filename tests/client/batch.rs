//! Batches across many keys: isolation, UDF entries and transport faults

use crate::common::*;
use aeroclient::{
    BatchEntry, BatchRecordKind, Client, Error, Key, Operation, ResultCode, UdfCall, Value,
    UDF_RESULT_BIN,
};
use std::collections::BTreeSet;
use std::thread;

#[test]
fn large_batch_covers_every_key_once() {
    let c = seeded(500);
    let keys: Vec<Key> = (0..600).map(key).collect();
    let out = c.get_many(&keys, None).unwrap();
    assert_eq!(out.len(), 600);
    assert_eq!(out.result, ResultCode::BatchFailed);

    let indexes: BTreeSet<usize> = out.records.iter().map(|r| r.index).collect();
    assert_eq!(indexes.len(), 600);
    assert_eq!(out.failed().count(), 100);
    assert!(out
        .failed()
        .all(|r| r.index >= 500 && r.result == ResultCode::KeyNotFound));
}

#[test]
fn select_many_projects_bins() {
    let c = seeded(10);
    let keys: Vec<Key> = (0..10).map(key).collect();
    let out = c.select_many(&keys, &["grp"], None).unwrap();
    assert_eq!(out.result, ResultCode::Ok);
    for r in out.into_request_order() {
        let rec = r.record.unwrap();
        assert_eq!(rec.bin("grp"), Some(&Value::Int(r.index as i64 % 3)));
        assert!(rec.bin("id").is_none());
    }
}

#[test]
fn udf_entries_return_function_results() {
    let (cluster, c) = cluster_client();
    cluster.register_udf("stats", "double", |rec, _| {
        let id = rec.get("id").and_then(Value::as_int).unwrap_or(0);
        rec.set("twice", id * 2);
        Ok(Value::Int(id * 2))
    });
    for i in 0..5 {
        c.put(&key(i), &[("id", Value::Int(i))], None, None).unwrap();
    }
    let keys: Vec<Key> = (0..5).map(key).collect();
    let udf = UdfCall {
        module: "stats".into(),
        function: "double".into(),
        args: Vec::new(),
    };
    let out = c.batch_apply(&keys, udf, None, None).unwrap();
    assert_eq!(out.result, ResultCode::Ok);
    for r in out.into_request_order() {
        assert_eq!(r.kind, BatchRecordKind::Apply);
        let rec = r.record.unwrap();
        assert_eq!(rec.bin(UDF_RESULT_BIN), Some(&Value::Int(r.index as i64 * 2)));
    }
    assert_eq!(c.get(&key(3), None).unwrap().bin("twice"), Some(&Value::Int(6)));
}

#[test]
fn missing_udf_fails_only_its_records() {
    let c = seeded(2);
    let entries = vec![
        BatchEntry::read_all(key(0)),
        BatchEntry::apply(
            key(1),
            UdfCall {
                module: "absent".into(),
                function: "f".into(),
                args: Vec::new(),
            },
        ),
    ];
    let out = c.batch_execute(entries, None, None).unwrap().into_request_order();
    assert!(out[0].is_ok());
    assert_eq!(out[1].result, ResultCode::UdfNotFound);
}

#[test]
fn batch_remove_then_exists() {
    let c = seeded(6);
    let doomed: Vec<Key> = (0..3).map(key).collect();
    let out = c.batch_remove(&doomed, None, None).unwrap();
    assert_eq!(out.result, ResultCode::Ok);
    assert!(out.records.iter().all(|r| r.kind == BatchRecordKind::Remove));

    let all: Vec<Key> = (0..6).map(key).collect();
    let out = c.exists_many(&all, None).unwrap().into_request_order();
    for r in &out {
        assert_eq!(r.is_ok(), r.index >= 3, "record {}", r.index);
    }
}

#[test]
fn batch_filter_marks_filtered_records() {
    let c = seeded(6);
    let in_group_zero = map(&[(
        "expressions",
        Value::List(vec![
            Value::from("eq"),
            Value::List(vec![Value::from("int_bin"), Value::from("grp")]),
            Value::Int(0),
        ]),
    )]);
    let keys: Vec<Key> = (0..6).map(key).collect();
    let out = c
        .get_many(&keys, Some(&in_group_zero))
        .unwrap()
        .into_request_order();
    for r in out {
        if r.index % 3 == 0 {
            assert!(r.is_ok());
        } else {
            assert_eq!(r.result, ResultCode::FilteredOut);
        }
    }
}

#[test]
fn batch_write_policy_applies_to_write_entries() {
    let c = seeded(2);
    let create_only = map(&[("exists", Value::from("create"))]);
    let keys = vec![key(0), key(99)];
    let out = c
        .batch_operate(
            &keys,
            vec![Operation::write("new", 1)],
            None,
            None,
            Some(&create_only),
        )
        .unwrap()
        .into_request_order();
    assert_eq!(out[0].result, ResultCode::KeyExists);
    assert!(out[1].is_ok());
    assert!(c.exists(&key(99), None).unwrap().is_some());
}

#[test]
fn interrupted_batch_reports_not_in_doubt_reads() {
    let (cluster, c) = cluster_client();
    for i in 0..8 {
        c.put(&key(i), &[("v", Value::Int(i))], None, None).unwrap();
    }
    cluster.interrupt_batch_after(5, Error::connection("node went away"));
    let keys: Vec<Key> = (0..8).map(key).collect();
    let out = c.get_many(&keys, None).unwrap();
    assert_eq!(out.len(), 8);
    assert_eq!(out.failed().count(), 3);
    assert!(out
        .failed()
        .all(|r| r.result == ResultCode::ConnectionError && !r.in_doubt));

    // The next batch runs normally
    assert_eq!(c.get_many(&keys, None).unwrap().result, ResultCode::Ok);
}

#[test]
fn concurrent_batches_share_a_client() {
    let c = seeded(50);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let c: Client = c.clone();
            thread::spawn(move || {
                let keys: Vec<Key> = (0..50).map(key).collect();
                let ops = vec![Operation::increment("id", 1)];
                let out = c.batch_operate(&keys, ops, None, None, None).unwrap();
                assert_eq!(out.result, ResultCode::Ok, "thread {}", t);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let rec = c.get(&key(10), None).unwrap();
    assert_eq!(rec.bin("id"), Some(&Value::Int(14)));
    assert_eq!(rec.generation(), 5);
}
