//! Scans and queries: paging, resumable cursors and secondary indexes

use crate::common::*;
use aeroclient::{
    Digest, IndexCollection, IndexDataType, IndexPredicate, PartitionFilter, PartitionsStatus,
    ResultCode, StreamState, Value,
};
use std::collections::BTreeSet;

fn page_policy(max_records: i64) -> Value {
    map(&[("max_records", Value::Int(max_records))])
}

#[test]
fn paged_scan_resumes_from_persisted_cursor() {
    let c = seeded(120);
    let policy = page_policy(25);
    let mut seen: BTreeSet<Digest> = BTreeSet::new();

    let mut scan = c.scan(NS, Some(SET)).unwrap();
    scan.paginate();
    for rec in scan.results(Some(&policy)).unwrap() {
        assert!(seen.insert(rec.key.digest));
    }
    assert_eq!(seen.len(), 25);
    assert_eq!(scan.state(), StreamState::InProgress);
    let saved = scan.partition_status().unwrap().to_bytes().unwrap();
    drop(scan);

    // A new scan picks up where the saved cursor left off
    let cursor = PartitionsStatus::from_bytes(&saved).unwrap();
    let mut resumed = c.scan(NS, Some(SET)).unwrap();
    resumed
        .paginate()
        .partition_filter(PartitionFilter::from_status(cursor).unwrap());
    let mut pages = 0;
    while !resumed.is_done() {
        let page = resumed.results(Some(&policy)).unwrap();
        assert!(page.len() <= 25);
        for rec in page {
            assert!(seen.insert(rec.key.digest), "duplicate record");
        }
        pages += 1;
        assert!(pages <= 10, "scan did not converge");
    }
    assert_eq!(seen.len(), 120);

    // A finished cursor yields nothing more
    assert!(resumed.results(Some(&policy)).unwrap().is_empty());
}

#[test]
fn partition_range_scans_partition_the_keyspace() {
    let c = seeded(200);
    let mut total = 0;
    for (begin, count) in [(0, 1024), (1024, 1024), (2048, 2048)] {
        let mut scan = c.scan(NS, Some(SET)).unwrap();
        scan.partition_filter(PartitionFilter::by_range(begin, count).unwrap());
        let records = scan.results(None).unwrap();
        for rec in &records {
            let pid = rec.key.digest.partition_id() as i64;
            assert!((begin..begin + count).contains(&pid));
        }
        total += records.len();
    }
    assert_eq!(total, 200);
}

#[test]
fn bad_partition_ranges_rejected() {
    assert!(PartitionFilter::by_range(-1, 5).unwrap_err().is_param());
    assert!(PartitionFilter::by_range(4000, 200).unwrap_err().is_param());
    assert!(PartitionFilter::by_id(4096).unwrap_err().is_param());
    assert!(PartitionsStatus::from_bytes(b"not a cursor").unwrap_err().is_param());
}

#[test]
fn aborted_scan_does_not_block_new_scans() {
    let c = seeded(30);
    let mut scan = c.scan(NS, Some(SET)).unwrap();
    let mut kept = 0;
    let err = scan
        .foreach(None, |_| {
            kept += 1;
            kept < 10
        })
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::ScanAbort);
    assert_eq!(kept, 10);
    assert_eq!(scan.state(), StreamState::Aborted);
    assert_eq!(scan.results(None).unwrap_err().code(), ResultCode::ScanAbort);

    let mut fresh = c.scan(NS, Some(SET)).unwrap();
    assert_eq!(fresh.results(None).unwrap().len(), 30);
}

#[test]
fn scan_filter_expression_applies_per_record() {
    let c = seeded(30);
    let group_two = map(&[(
        "expressions",
        Value::List(vec![
            Value::from("eq"),
            Value::List(vec![Value::from("int_bin"), Value::from("grp")]),
            Value::Int(2),
        ]),
    )]);
    let records = c.scan(NS, Some(SET)).unwrap().results(Some(&group_two)).unwrap();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.bin("grp") == Some(&Value::Int(2))));
}

#[test]
fn query_by_integer_range() {
    let c = seeded(50);
    c.index_integer_create(NS, Some(SET), "id", "demo_id", None)
        .unwrap();
    let mut q = c.query(NS, Some(SET)).unwrap();
    q.where_predicate(IndexPredicate::between("id", 10, 19)).unwrap();
    q.select(&["id"]).unwrap();
    let mut ids: Vec<i64> = q
        .results(None)
        .unwrap()
        .iter()
        .filter_map(|r| r.bin("id").and_then(Value::as_int))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (10..20).collect::<Vec<_>>());
    assert_eq!(q.state(), StreamState::Done);
}

#[test]
fn query_list_contains() {
    let c = client();
    for i in 0..12i64 {
        let tags = Value::List(vec![Value::from(format!("t{}", i % 4)), Value::from("all")]);
        c.put(&key(i), &[("tags", tags)], None, None).unwrap();
    }
    c.index_create(
        NS,
        Some(SET),
        "tags",
        "demo_tags",
        IndexCollection::List,
        IndexDataType::String,
        None,
    )
    .unwrap();
    let mut q = c.query(NS, Some(SET)).unwrap();
    q.where_predicate(IndexPredicate::contains("tags", IndexCollection::List, "t1"))
        .unwrap();
    assert_eq!(q.results(None).unwrap().len(), 3);
}

#[test]
fn query_without_index_fails_cleanly() {
    let c = seeded(5);
    let mut q = c.query(NS, Some(SET)).unwrap();
    q.where_predicate(IndexPredicate::equals("grp", 1)).unwrap();
    let err = q.results(None).unwrap_err();
    assert_eq!(err.code(), ResultCode::IndexNotFound);
    assert_eq!(q.state(), StreamState::NotStarted);

    c.index_integer_create(NS, Some(SET), "grp", "demo_grp", None)
        .unwrap();
    assert_eq!(q.results(None).unwrap().len(), 2);
}

#[test]
fn index_lifecycle_errors() {
    let c = client();
    c.index_string_create(NS, None, "name", "by_name", None).unwrap();
    let err = c
        .index_string_create(NS, None, "name", "by_name", None)
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::IndexFound);
    assert_eq!(err.subject(), Some("by_name"));
    c.index_remove(NS, "by_name", None).unwrap();
    assert_eq!(
        c.index_remove(NS, "by_name", None).unwrap_err().code(),
        ResultCode::IndexNotFound
    );
    let long_name = "i".repeat(300);
    assert!(c
        .index_string_create(NS, None, "name", &long_name, None)
        .unwrap_err()
        .is_param());
}

#[test]
fn paged_query_covers_matches_once() {
    let c = seeded(90);
    c.index_integer_create(NS, Some(SET), "grp", "paged_grp", None)
        .unwrap();
    let mut q = c.query(NS, Some(SET)).unwrap();
    q.where_predicate(IndexPredicate::equals("grp", 0)).unwrap();
    q.paginate();
    let policy = page_policy(7);
    let mut seen = BTreeSet::new();
    while !q.is_done() {
        for rec in q.results(Some(&policy)).unwrap() {
            assert_eq!(rec.bin("grp"), Some(&Value::Int(0)));
            assert!(seen.insert(rec.key.digest));
        }
        assert!(seen.len() <= 30);
    }
    assert_eq!(seen.len(), 30);
}

#[test]
fn truncate_set_then_scan() {
    let c = seeded(20);
    let other = aeroclient::Key::new(NS, "keep", 1).unwrap();
    c.put(&other, &[("v", Value::Int(1))], None, None).unwrap();
    c.truncate(NS, Some(SET), 0, None).unwrap();
    assert!(c.scan(NS, Some(SET)).unwrap().results(None).unwrap().is_empty());
    assert_eq!(c.scan(NS, None).unwrap().results(None).unwrap().len(), 1);
    assert!(c.truncate(NS, None, -5, None).unwrap_err().is_param());
}
