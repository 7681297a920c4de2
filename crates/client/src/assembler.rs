//! Raw results → caller records

use crate::transport::RawRecord;
use aeroclient_core::{Bins, Key, Record, RecordKey, RecordMetadata};
use std::collections::BTreeMap;

/// How per-operation results are folded into bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssembleMode {
    /// One pair per result slot, in operation order
    Ordered,
    /// One value per bin; the last result wins and a `Nil` result removes
    /// the bin
    #[default]
    Merged,
}

/// Build the caller-facing record.
///
/// With `send_key == false` the key echo reports the user key as unknown,
/// since the server only sees the digest. Merged mode folds the slots in
/// order; a `Nil` slot means the bin is not present at that point, so it
/// drops any earlier value for the bin. Old-style null placeholders and
/// new-style omissions therefore produce the same bins. Ordered mode keeps
/// every slot as the server sent it.
pub fn assemble(raw: RawRecord, mode: AssembleMode, key: &Key, send_key: bool) -> Record {
    let bins = match mode {
        AssembleMode::Ordered => Bins::Ordered(raw.bins),
        AssembleMode::Merged => {
            let mut merged = BTreeMap::new();
            for (name, value) in raw.bins {
                if value.is_nil() {
                    merged.remove(&name);
                } else {
                    merged.insert(name, value);
                }
            }
            Bins::Merged(merged)
        }
    };
    Record {
        key: RecordKey::echo(key, send_key),
        metadata: RecordMetadata {
            generation: raw.generation,
            ttl: raw.ttl,
        },
        bins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroclient_core::{UserKeyEcho, Value};

    fn key() -> Key {
        Key::new("test", "demo", "k").unwrap()
    }

    fn raw(bins: Vec<(&str, Value)>) -> RawRecord {
        RawRecord {
            generation: 3,
            ttl: 100,
            bins: bins.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        }
    }

    #[test]
    fn test_merged_last_write_wins() {
        let rec = assemble(
            raw(vec![("a", Value::Nil), ("a", Value::Int(6)), ("a", Value::Int(7))]),
            AssembleMode::Merged,
            &key(),
            true,
        );
        assert_eq!(rec.bin("a"), Some(&Value::Int(7)));
        assert_eq!(rec.generation(), 3);
    }

    #[test]
    fn test_merged_trailing_nil_removes_bin() {
        let rec = assemble(
            raw(vec![
                ("a", Value::Int(5)),
                ("b", Value::Int(1)),
                ("a", Value::Nil),
                ("a", Value::Nil),
            ]),
            AssembleMode::Merged,
            &key(),
            true,
        );
        assert!(rec.bin("a").is_none());
        assert_eq!(rec.bins.as_merged().map(|m| m.len()), Some(1));
        assert_eq!(rec.bin("b"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_absent_styles_equivalent() {
        let both = raw(vec![("a", Value::Int(1)), ("b", Value::Int(2))]);
        let old_style = raw(vec![("a", Value::Int(1)), ("b", Value::Nil)]);
        let new_style = raw(vec![("a", Value::Int(1))]);

        let old = assemble(old_style, AssembleMode::Merged, &key(), true);
        let new = assemble(new_style, AssembleMode::Merged, &key(), true);
        assert_eq!(old.bins, new.bins);
        assert!(!old.bins.contains("b"));

        let full = assemble(both, AssembleMode::Merged, &key(), true);
        assert_eq!(full.bin("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_ordered_keeps_every_slot() {
        let rec = assemble(
            raw(vec![("a", Value::Nil), ("a", Value::Int(6)), ("a", Value::Int(6))]),
            AssembleMode::Ordered,
            &key(),
            true,
        );
        assert_eq!(rec.bins.as_ordered().map(|p| p.len()), Some(3));
        assert_eq!(rec.bin("a"), Some(&Value::Int(6)));
    }

    #[test]
    fn test_digest_only_reports_unknown_key() {
        let rec = assemble(raw(vec![]), AssembleMode::Merged, &key(), false);
        assert_eq!(rec.key.user_key, UserKeyEcho::Unknown);
        assert_eq!(rec.key.digest, *key().digest());
    }
}
