//! Background scans and queries: job ids, progress and the records they change

use crate::common::*;
use aeroclient::{
    IndexPredicate, JobModule, JobStatus, Operation, ResultCode, StreamState, Value,
};
use std::time::Duration;

fn id_above(n: i64) -> Value {
    Value::List(vec![
        Value::from("gt"),
        Value::List(vec![Value::from("int_bin"), Value::from("id")]),
        Value::Int(n),
    ])
}

#[test]
fn background_scan_writes_filtered_records_with_ttl() {
    let c = seeded(20);
    let mut scan = c.scan(NS, Some(SET)).unwrap();
    let meta = map(&[("ttl", Value::Int(500))]);
    scan.add_ops(vec![Operation::write("seen", true)], Some(&meta))
        .unwrap();
    let policy = map(&[("expressions", id_above(14))]);
    let job = scan.execute_background(Some(&policy)).unwrap();

    let info = c
        .wait_for_job(job, JobModule::Scan, Some(Duration::from_secs(5)), None)
        .unwrap();
    assert_eq!(info.status, JobStatus::Completed);
    assert_eq!(info.progress_pct, 100);
    assert_eq!(info.records_read, 5);
    assert_eq!(scan.state(), StreamState::NotStarted);

    for i in 0..20 {
        let rec = c.get(&key(i), None).unwrap();
        if i > 14 {
            assert_eq!(rec.bin("seen"), Some(&Value::Bool(true)));
            let ttl = rec.metadata.ttl;
            assert!((499..=500).contains(&ttl), "ttl {}", ttl);
        } else {
            assert!(rec.bin("seen").is_none());
        }
    }
}

#[test]
fn scan_apply_blocks_until_done() {
    let (cluster, c) = cluster_client();
    for i in 0..8 {
        c.put(&key(i), &[("age", Value::Int(i))], None, None).unwrap();
    }
    cluster.register_udf("bin_lua", "mytransform", |rec, args| {
        let bin = args.first().and_then(Value::as_str).unwrap_or("age");
        let by = args.get(1).and_then(Value::as_int).unwrap_or(1);
        if let Some(v) = rec.get(bin).and_then(Value::as_int) {
            rec.set(bin, v + by);
        }
        Ok(Value::Nil)
    });
    let args = vec![Value::from("age"), Value::Int(2)];
    let job = c
        .scan_apply(NS, Some(SET), "bin_lua", "mytransform", args, None, true)
        .unwrap();
    for i in 0..8 {
        assert_eq!(
            c.get(&key(i), None).unwrap().bin("age"),
            Some(&Value::Int(i + 2))
        );
    }
    let info = c.job_info(job, JobModule::Scan, None).unwrap();
    assert_eq!(info.records_read, 8);

    // The same id under the other module is unknown, which reads as done
    let other = c.job_info(job, JobModule::Query, None).unwrap();
    assert_eq!(other.status, JobStatus::Completed);
    assert_eq!(other.records_read, 0);
}

#[test]
fn background_query_limited_to_predicate_matches() {
    let c = seeded(30);
    c.index_integer_create(NS, Some(SET), "grp", "idx_grp", None)
        .unwrap();
    let mut query = c.query(NS, Some(SET)).unwrap();
    query
        .where_predicate(IndexPredicate::equals("grp", 1))
        .unwrap();
    query.add_ops(vec![Operation::increment("id", 1000)], None).unwrap();
    let job = query.execute_background(None).unwrap();
    assert_eq!(
        c.job_info(job, JobModule::Query, None).unwrap().records_read,
        10
    );
    for i in 0..30 {
        let id = c.get(&key(i), None).unwrap().bin("id").cloned();
        let expected = if i % 3 == 1 { i + 1000 } else { i };
        assert_eq!(id, Some(Value::Int(expected)));
    }
}

#[test]
fn background_job_with_unknown_udf_fails_up_front() {
    let c = seeded(3);
    let mut scan = c.scan(NS, Some(SET)).unwrap();
    scan.apply("missing", "fn", vec![]).unwrap();
    let err = scan.execute_background(None).unwrap_err();
    assert_eq!(err.code(), ResultCode::UdfNotFound);
}

#[test]
fn background_query_needs_its_index() {
    let (cluster, c) = cluster_client();
    cluster.register_udf("m", "f", |_, _| Ok(Value::Nil));
    c.put(&key(0), &[("grp", Value::Int(0))], None, None).unwrap();
    let err = c
        .query_apply(
            NS,
            Some(SET),
            Some(IndexPredicate::equals("grp", 0)),
            "m",
            "f",
            vec![],
            None,
            false,
        )
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::IndexNotFound);
}
