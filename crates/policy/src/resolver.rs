//! Policy resolution
//!
//! `resolve` layers a sparse per-call override map onto a client-wide
//! default and returns a fresh policy:
//!
//! - no override (or `Nil`): a clone of the default
//! - an override that is not a map: `ParamError`
//! - recognized fields are type-checked and applied in map order
//! - unrecognized fields are ignored so newer callers keep working
//! - `expressions` (filter tree) and `predexp` (legacy predicate list) are
//!   compiled into the policy's filter; giving both is a `ParamError`
//!
//! The default is only ever borrowed. Any failure returns an error and no
//! partially resolved policy.

use crate::expression::CompiledExpression;
use crate::policies::{
    AdminPolicy, ApplyPolicy, BatchApplyPolicy, BatchPolicy, BatchReadPolicy, BatchRemovePolicy,
    BatchWritePolicy, InfoPolicy, OperatePolicy, Policy, QueryPolicy, ReadPolicy, RemovePolicy,
    ScanPolicy, WritePolicy,
};
use crate::predexp::compile_predexp;
use aeroclient_core::{param_error, Result, Value};
use tracing::debug;

/// Override field holding a filter expression tree
pub const EXPRESSIONS_FIELD: &str = "expressions";

/// Override field holding a legacy predicate list
pub const PREDEXP_FIELD: &str = "predexp";

/// Resolve a per-call override onto a default policy.
///
/// # Examples
///
/// ```
/// use aeroclient_core::Value;
/// use aeroclient_policy::{resolve, ReadPolicy};
///
/// let defaults = ReadPolicy::default();
/// let overrides = Value::map_from([("total_timeout", Value::Int(250))]);
/// let effective = resolve(&defaults, Some(&overrides)).unwrap();
/// assert_eq!(effective.base.total_timeout, 250);
/// assert_eq!(defaults, ReadPolicy::default());
/// ```
pub fn resolve<P: Policy>(defaults: &P, overrides: Option<&Value>) -> Result<P> {
    let entries = match overrides {
        None | Some(Value::Nil) => return Ok(defaults.clone()),
        Some(Value::Map(entries)) => entries,
        Some(other) => {
            return Err(param_error!(
                "{} policy must be a map, got {}",
                P::FAMILY,
                other.type_name()
            ))
        }
    };

    let mut policy = defaults.clone();
    let mut expressions = None;
    let mut predexp = None;

    for (k, v) in entries {
        let Some(name) = k.as_str() else {
            debug!(family = %P::FAMILY, key = %k, "ignoring non-string policy key");
            continue;
        };
        match name {
            EXPRESSIONS_FIELD => expressions = Some(v),
            PREDEXP_FIELD => predexp = Some(v),
            _ => {
                if !policy.apply_field(name, v)? {
                    debug!(family = %P::FAMILY, field = name, "ignoring unrecognized policy field");
                }
            }
        }
    }

    let filter = match (expressions, predexp) {
        (Some(_), Some(_)) => {
            return Err(param_error!(
                "{} policy cannot set both {} and {}",
                P::FAMILY,
                EXPRESSIONS_FIELD,
                PREDEXP_FIELD
            ))
        }
        (Some(Value::Nil), None) | (None, Some(Value::Nil)) | (None, None) => None,
        (Some(expr), None) => Some(CompiledExpression::compile(expr)?),
        (None, Some(list)) => Some(compile_predexp(list)?),
    };

    if let Some(filter) = filter {
        match policy.filter_slot() {
            Some(slot) => *slot = Some(filter),
            None => debug!(family = %P::FAMILY, "policy family takes no filter, ignoring"),
        }
    }

    Ok(policy)
}

/// Client-wide default policy for every family
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDefaults {
    /// Single-record reads
    pub read: ReadPolicy,
    /// Single-record writes
    pub write: WritePolicy,
    /// Record UDF calls
    pub apply: ApplyPolicy,
    /// Multi-operation calls
    pub operate: OperatePolicy,
    /// Deletes
    pub remove: RemovePolicy,
    /// Scans
    pub scan: ScanPolicy,
    /// Queries
    pub query: QueryPolicy,
    /// Batch envelope
    pub batch: BatchPolicy,
    /// Batch read entries
    pub batch_read: BatchReadPolicy,
    /// Batch write entries
    pub batch_write: BatchWritePolicy,
    /// Batch UDF entries
    pub batch_apply: BatchApplyPolicy,
    /// Batch delete entries
    pub batch_remove: BatchRemovePolicy,
    /// Info requests
    pub info: InfoPolicy,
    /// Security administration
    pub admin: AdminPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expr;
    use proptest::prelude::*;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::map_from(entries)
    }

    fn s(x: &str) -> Value {
        Value::String(x.into())
    }

    #[test]
    fn test_none_and_nil_return_defaults() {
        let defaults = WritePolicy::default();
        assert_eq!(resolve(&defaults, None).unwrap(), defaults);
        assert_eq!(resolve(&defaults, Some(&Value::Nil)).unwrap(), defaults);
    }

    #[test]
    fn test_non_map_rejected() {
        let err = resolve(&ReadPolicy::default(), Some(&Value::Int(5))).unwrap_err();
        assert!(err.is_param());
        assert!(err.message().contains("read policy must be a map"));
    }

    #[test]
    fn test_overrides_applied_defaults_untouched() {
        let defaults = ReadPolicy::default();
        let o = map(vec![
            ("total_timeout", Value::Int(50)),
            ("max_retries", Value::Int(7)),
            ("replica", Value::Int(0)),
        ]);
        let p = resolve(&defaults, Some(&o)).unwrap();
        assert_eq!(p.base.total_timeout, 50);
        assert_eq!(p.base.max_retries, 7);
        assert_eq!(p.replica, crate::types::Replica::Master);
        assert_eq!(defaults, ReadPolicy::default());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let o = map(vec![("not_a_field", s("x"))]);
        let p = resolve(&ReadPolicy::default(), Some(&o)).unwrap();
        assert_eq!(p, ReadPolicy::default());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let o = map(vec![("socket_timeout", Value::Int(-1))]);
        assert!(resolve(&ReadPolicy::default(), Some(&o)).unwrap_err().is_param());
    }

    #[test]
    fn test_timeout_alias_last_wins() {
        let o = map(vec![
            ("timeout", Value::Int(100)),
            ("total_timeout", Value::Int(200)),
        ]);
        assert_eq!(
            resolve(&ReadPolicy::default(), Some(&o)).unwrap().base.total_timeout,
            200
        );
        let o = map(vec![
            ("total_timeout", Value::Int(200)),
            ("timeout", Value::Int(100)),
        ]);
        assert_eq!(
            resolve(&ReadPolicy::default(), Some(&o)).unwrap().base.total_timeout,
            100
        );
    }

    #[test]
    fn test_expressions_compiled_into_filter() {
        let expr = Value::List(vec![
            s("eq"),
            Value::List(vec![s("int_bin"), s("a")]),
            Value::Int(1),
        ]);
        let o = map(vec![("expressions", expr)]);
        let p = resolve(&WritePolicy::default(), Some(&o)).unwrap();
        let filter = p.filter().unwrap();
        assert_eq!(filter.expr(), &Expr::int_bin("a").equals(Expr::val(1)));
    }

    #[test]
    fn test_predexp_compiled_into_filter() {
        let list = Value::List(vec![
            Value::List(vec![s("integer_bin"), s("a")]),
            Value::List(vec![s("integer_value"), Value::Int(1)]),
            s("integer_equal"),
        ]);
        let o = map(vec![("predexp", list)]);
        let p = resolve(&ScanPolicy::default(), Some(&o)).unwrap();
        assert!(p.filter().is_some());
    }

    #[test]
    fn test_expressions_and_predexp_exclusive() {
        let o = map(vec![
            ("expressions", Value::List(vec![s("key_exists")])),
            ("predexp", Value::List(vec![s("rec_void_time")])),
        ]);
        let err = resolve(&ReadPolicy::default(), Some(&o)).unwrap_err();
        assert!(err.is_param());
    }

    #[test]
    fn test_bad_expression_fails_whole_resolve() {
        let o = map(vec![
            ("total_timeout", Value::Int(5)),
            ("expressions", Value::List(vec![s("bogus")])),
        ]);
        assert!(resolve(&ReadPolicy::default(), Some(&o)).unwrap_err().is_param());
    }

    #[test]
    fn test_batch_sub_policy_filter() {
        let o = map(vec![("expressions", Value::List(vec![s("key_exists")]))]);
        let p = resolve(&BatchWritePolicy::default(), Some(&o)).unwrap();
        assert!(p.filter.is_some());
    }

    proptest! {
        #[test]
        fn prop_resolve_never_mutates_defaults(
            total in 0i64..100_000,
            retries in -5i64..10,
            compress in any::<bool>(),
        ) {
            let defaults = PolicyDefaults::default();
            let snapshot = defaults.clone();
            let o = map(vec![
                ("total_timeout", Value::Int(total)),
                ("max_retries", Value::Int(retries)),
                ("compress", Value::Bool(compress)),
            ]);
            let _ = resolve(&defaults.read, Some(&o));
            let _ = resolve(&defaults.write, Some(&o));
            let _ = resolve(&defaults.batch, Some(&o));
            prop_assert_eq!(&defaults, &snapshot);
            prop_assert_eq!(resolve(&defaults.read, None).unwrap(), snapshot.read);
        }
    }
}
