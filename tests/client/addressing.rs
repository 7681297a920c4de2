//! Key digests and partition routing through the client surface

use crate::common::*;
use aeroclient::aeroclient_core::{compute_digest, partition_id_for, N_PARTITIONS};
use aeroclient::{Key, UserKey, Value};
use proptest::prelude::*;

#[test]
fn key_digest_matches_client_helper() {
    let c = client();
    let k = Key::new(NS, SET, "alice").unwrap();
    let digest = c.get_key_digest(NS, SET, "alice").unwrap();
    assert_eq!(k.digest(), &digest);
    assert_eq!(
        c.get_key_partition_id(NS, SET, "alice").unwrap(),
        k.partition_id()
    );
}

#[test]
fn string_and_integer_keys_address_different_records() {
    let c = client();
    c.put(&key("1"), &[("v", Value::from("s"))], None, None).unwrap();
    c.put(&key(1), &[("v", Value::from("i"))], None, None).unwrap();
    assert_eq!(c.get(&key("1"), None).unwrap().bin("v"), Some(&Value::from("s")));
    assert_eq!(c.get(&key(1), None).unwrap().bin("v"), Some(&Value::from("i")));
}

#[test]
fn set_name_feeds_the_digest() {
    let a = compute_digest(NS, "a", &Value::Int(9)).unwrap();
    let b = compute_digest(NS, "b", &Value::Int(9)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn record_reachable_by_digest_alone() {
    let c = client();
    c.put(&key("bob"), &[("age", Value::Int(40))], None, None).unwrap();
    let by_digest = Key::from_digest(NS, SET, *key("bob").digest()).unwrap();
    let rec = c.get(&by_digest, None).unwrap();
    assert_eq!(rec.bin("age"), Some(&Value::Int(40)));
}

#[test]
fn user_key_echoed_only_when_stored() {
    let c = client();
    c.put(&key(5), &[("v", Value::Int(1))], None, None).unwrap();
    let rec = c.get(&key(5), None).unwrap();
    assert!(rec.key.user_key.as_user_key().is_none());

    let send = map(&[("key", Value::from("send"))]);
    c.put(&key(6), &[("v", Value::Int(1))], None, Some(&send)).unwrap();
    let rec = c.get(&key(6), Some(&send)).unwrap();
    assert_eq!(rec.key.user_key.as_user_key(), Some(&UserKey::Int(6)));
}

#[test]
fn unsupported_key_types_rejected_before_io() {
    let c = client();
    for bad in [Value::Float(1.5), Value::List(vec![]), Value::Bool(false)] {
        assert!(c.get_key_digest(NS, SET, bad).unwrap_err().is_param());
    }
    assert!(c.get_key_digest("", SET, 1).unwrap_err().is_param());
}

proptest! {
    #[test]
    fn partition_id_in_range_and_namespace_independent(k in any::<i64>(), ns in "[a-z]{1,12}") {
        let d = compute_digest(&ns, SET, &Value::Int(k)).unwrap();
        prop_assert!(partition_id_for(&d) < N_PARTITIONS);
        prop_assert_eq!(d, compute_digest(NS, SET, &Value::Int(k)).unwrap());
    }

    #[test]
    fn blob_keys_hash_deterministically(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let a = compute_digest(NS, SET, &Value::Blob(bytes.clone())).unwrap();
        let b = compute_digest(NS, SET, &Value::Blob(bytes)).unwrap();
        prop_assert_eq!(a, b);
    }
}
