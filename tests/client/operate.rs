//! Multi-operation calls: scalar, list, map and bit operations

use crate::common::*;
use aeroclient::aeroclient_operations::{
    decode_operations, BitOp, BitPolicy, BitRange, CdtContext, CtxCreate, CtxStep, ListOp,
    ListPolicy, MapOp, MapOrder, MapPolicy, MapSelector, OverflowAction, ReturnKind, ReturnType,
};
use aeroclient::{Operation, ResultCode, Value};

fn ints(values: &[i64]) -> Value {
    Value::List(values.iter().map(|v| Value::Int(*v)).collect())
}

fn list(bin: &str, op: ListOp) -> Operation {
    Operation::list(bin, op)
}

#[test]
fn scalar_helpers_update_bins() {
    let c = client();
    let k = key("scalars");
    c.put(&k, &[("s", Value::from("mid")), ("n", Value::Int(1))], None, None)
        .unwrap();
    c.append(&k, "s", "-end", None, None).unwrap();
    c.prepend(&k, "s", "start-", None, None).unwrap();
    c.increment(&k, "n", 41, None, None).unwrap();
    let rec = c.get(&k, None).unwrap();
    assert_eq!(rec.bin("s"), Some(&Value::from("start-mid-end")));
    assert_eq!(rec.bin("n"), Some(&Value::Int(42)));
    assert_eq!(rec.generation(), 4);

    c.remove_bin(&k, &["s"], None, None).unwrap();
    let rec = c.select(&k, &["s", "n"], None).unwrap();
    assert!(rec.bin("s").is_none());
    assert_eq!(rec.bin("n"), Some(&Value::Int(42)));

    assert!(c.increment(&k, "n", "x", None, None).unwrap_err().is_param());
}

#[test]
fn ordered_results_keep_one_slot_per_operation() {
    let c = client();
    let k = key("ordered");
    c.put(&k, &[("n", Value::Int(10))], None, None).unwrap();
    let ops = vec![
        Operation::increment("n", 5),
        Operation::read("n"),
        Operation::write("t", "x"),
        Operation::read("t"),
    ];
    let rec = c.operate_ordered(&k, ops, None, None).unwrap();
    let slots = rec.bins.as_ordered().unwrap();
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0], ("n".to_string(), Value::Int(15)));
    assert_eq!(slots[1], ("n".to_string(), Value::Int(15)));
    assert_eq!(slots[2], ("t".to_string(), Value::Nil));
    assert_eq!(slots[3], ("t".to_string(), Value::from("x")));
}

#[test]
fn list_reads_and_removals() {
    let c = client();
    let k = key("list");
    c.put(&k, &[("l", ints(&[5, 3, 9, 1, 7]))], None, None).unwrap();

    let rec = c
        .operate(
            &k,
            vec![list(
                "l",
                ListOp::GetBy {
                    selector: aeroclient::aeroclient_operations::ListSelector::RankRange {
                        rank: 0,
                        count: Some(2),
                    },
                    return_type: ReturnType::new(ReturnKind::Value),
                },
            )],
            None,
            None,
        )
        .unwrap();
    assert_eq!(rec.bin("l"), Some(&ints(&[1, 3])));

    let rec = c
        .operate(
            &k,
            vec![list("l", ListOp::Pop { index: -1 }), list("l", ListOp::Size)],
            None,
            None,
        )
        .unwrap();
    assert_eq!(rec.bin("l"), Some(&Value::Int(4)));
    assert_eq!(c.get(&k, None).unwrap().bin("l"), Some(&ints(&[5, 3, 9, 1])));
}

#[test]
fn list_op_on_non_list_bin_is_type_error() {
    let c = client();
    let k = key("notalist");
    c.put(&k, &[("l", Value::Int(1))], None, None).unwrap();
    let err = c
        .operate(&k, vec![list("l", ListOp::Size)], None, None)
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::BinTypeError);
}

#[test]
fn map_put_and_get_by_key() {
    let c = client();
    let k = key("map");
    let ordered = MapPolicy {
        order: MapOrder::KeyOrdered,
        ..MapPolicy::default()
    };
    let put = |name: &str, v: i64| {
        Operation::map(
            "m",
            MapOp::Put {
                key: Value::from(name),
                value: Value::Int(v),
                policy: ordered,
            },
        )
    };
    let rec = c
        .operate(&k, vec![put("b", 2), put("a", 1), put("c", 3)], None, None)
        .unwrap();
    assert_eq!(rec.bin("m"), Some(&Value::Int(3)));

    let stored = c.get(&k, None).unwrap();
    let Some(Value::Map(entries)) = stored.bin("m") else {
        panic!("expected a map bin");
    };
    let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![Value::from("a"), Value::from("b"), Value::from("c")]);

    let get = Operation::map(
        "m",
        MapOp::GetBy {
            selector: MapSelector::Key(Value::from("b")),
            return_type: ReturnType::new(ReturnKind::Value),
        },
    );
    let rec = c.operate(&k, vec![get], None, None).unwrap();
    assert_eq!(rec.bin("m"), Some(&Value::Int(2)));
}

#[test]
fn nested_context_creates_missing_levels() {
    let c = client();
    let k = key("nested");
    let ctx = CdtContext::new()
        .push_create(CtxStep::MapKey(Value::from("scores")), CtxCreate::Map(MapOrder::Unordered))
        .unwrap();
    let op = Operation::map(
        "doc",
        MapOp::Put {
            key: Value::from("alice"),
            value: Value::Int(10),
            policy: MapPolicy::default(),
        },
    )
    .with_ctx(ctx)
    .unwrap();
    c.put(&k, &[("doc", Value::map_from([("title", Value::from("t"))]))], None, None)
        .unwrap();
    c.operate(&k, vec![op], None, None).unwrap();

    let rec = c.get(&k, None).unwrap();
    let scores = rec.bin("doc").and_then(|d| d.get("scores")).unwrap();
    assert_eq!(scores.get("alice"), Some(&Value::Int(10)));
}

#[test]
fn bit_operations_on_blob() {
    let c = client();
    let k = key("bits");
    c.put(&k, &[("b", Value::Blob(vec![0b1111_0000, 0x00]))], None, None)
        .unwrap();
    let policy = BitPolicy::default();
    let ops = vec![
        Operation::Bit {
            bin: "b".into(),
            op: BitOp::Set {
                range: BitRange::new(8, 4).unwrap(),
                value: vec![0b1010_0000],
                policy,
            },
            ctx: CdtContext::new(),
        },
        Operation::Bit {
            bin: "b".into(),
            op: BitOp::Count {
                range: BitRange::new(0, 16).unwrap(),
            },
            ctx: CdtContext::new(),
        },
    ];
    let rec = c.operate(&k, ops, None, None).unwrap();
    assert_eq!(rec.bin("b"), Some(&Value::Int(6)));
    assert_eq!(
        c.get(&k, None).unwrap().bin("b"),
        Some(&Value::Blob(vec![0b1111_0000, 0b1010_0000]))
    );

    let add = Operation::Bit {
        bin: "b".into(),
        op: BitOp::Add {
            range: BitRange::new(0, 8).unwrap(),
            value: 100,
            signed: false,
            action: OverflowAction::Saturate,
            policy,
        },
        ctx: CdtContext::new(),
    };
    c.operate(&k, vec![add], None, None).unwrap();
    let stored = c.get(&k, None).unwrap();
    assert_eq!(stored.bin("b").and_then(Value::as_blob).unwrap()[0], 0xff);
}

#[test]
fn loose_operations_decode_and_run() {
    let c = client();
    let k = key("loose");
    let ops = decode_operations(&Value::List(vec![
        map(&[
            ("op", Value::from("list_append_items")),
            ("bin", Value::from("l")),
            ("val", ints(&[1, 2, 3])),
        ]),
        map(&[
            ("op", Value::from("list_get_range")),
            ("bin", Value::from("l")),
            ("index", Value::Int(1)),
            ("count", Value::Int(2)),
        ]),
        map(&[
            ("op", Value::from("write")),
            ("bin", Value::from("w")),
            ("val", Value::from("hello")),
        ]),
    ]))
    .unwrap();
    let rec = c.operate(&k, ops, None, None).unwrap();
    assert_eq!(rec.bin("l"), Some(&ints(&[2, 3])));

    let unknown = decode_operations(&Value::List(vec![map(&[("op", Value::from("teleport"))])]));
    assert!(unknown.unwrap_err().is_param());
}

#[test]
fn empty_operation_list_rejected() {
    let c = client();
    assert!(c.operate(&key("none"), vec![], None, None).unwrap_err().is_param());
}

#[test]
fn list_policy_add_unique_rejects_duplicates() {
    let c = client();
    let k = key("unique");
    let unique = ListPolicy {
        flags: aeroclient::aeroclient_operations::ListWriteFlags::ADD_UNIQUE,
        ..ListPolicy::default()
    };
    let append = |v: i64| {
        list(
            "l",
            ListOp::Append {
                value: Value::Int(v),
                policy: unique,
            },
        )
    };
    c.operate(&k, vec![append(1), append(2)], None, None).unwrap();
    let err = c.operate(&k, vec![append(2)], None, None).unwrap_err();
    assert_eq!(err.code(), ResultCode::ElementExists);
}

#[test]
fn merged_result_drops_bin_deleted_later_in_the_call() {
    let c = client();
    let k = key("deleted");
    c.put(&k, &[("a", Value::Int(5)), ("b", Value::Int(1))], None, None)
        .unwrap();
    let every_slot = map(&[("respond_all_ops", Value::Bool(true))]);
    let ops = vec![
        Operation::read("a"),
        Operation::delete_bin("a"),
        Operation::read("a"),
    ];
    let rec = c.operate(&k, ops, None, Some(&every_slot)).unwrap();
    assert!(rec.bin("a").is_none());
    assert!(c.get(&k, None).unwrap().bin("a").is_none());
    assert_eq!(c.get(&k, None).unwrap().bin("b"), Some(&Value::Int(1)));
}
