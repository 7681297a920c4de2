//! Filter expression evaluation against stored records
//!
//! Evaluation is three-valued: `None` stands for "unknown", which is what a
//! missing bin or a bin of the wrong type produces. A filter passes only
//! when it evaluates to `true`.

use super::store::StoredRecord;
use aeroclient_core::{Digest, UserKey, Value};
use aeroclient_policy::{CmpOp, CompiledExpression, ExpType, Expr};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub(crate) struct EvalContext<'a> {
    pub(crate) record: &'a StoredRecord,
    pub(crate) digest: &'a Digest,
    pub(crate) now: DateTime<Utc>,
}

fn has_type(value: &Value, ty: ExpType) -> bool {
    matches!(
        (value, ty),
        (Value::Nil, ExpType::Nil)
            | (Value::Bool(_), ExpType::Bool)
            | (Value::Int(_), ExpType::Int)
            | (Value::Float(_), ExpType::Float)
            | (Value::String(_), ExpType::Str)
            | (Value::Blob(_), ExpType::Blob)
            | (Value::List(_), ExpType::List)
            | (Value::Map(_), ExpType::Map)
            | (Value::GeoJson(_), ExpType::Geo)
            | (Value::Hll(_), ExpType::Hll)
    )
}

fn nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn eval(expr: &Expr, cx: &EvalContext<'_>) -> Option<Value> {
    let rec = cx.record;
    match expr {
        Expr::Val(v) => Some(v.clone()),
        Expr::Bin { name, ty } => rec.bin(name).filter(|v| has_type(v, *ty)).cloned(),
        Expr::BinExists(name) => Some(Value::Bool(rec.bin(name).is_some())),
        Expr::BinType(name) => Some(Value::Int(
            rec.bin(name)
                .and_then(Value::particle_type)
                .map_or(0, |t| t as i64),
        )),
        Expr::Key(ty) => rec
            .user_key
            .as_ref()
            .map(UserKey::to_value)
            .filter(|v| has_type(v, *ty)),
        Expr::KeyExists => Some(Value::Bool(rec.user_key.is_some())),
        Expr::SetName => Some(Value::String(rec.set.clone())),
        Expr::Ttl => Some(Value::Int(match rec.void_time {
            None => -1,
            Some(_) => i64::from(rec.ttl(cx.now)),
        })),
        Expr::VoidTime => Some(Value::Int(rec.void_time.map_or(-1, nanos))),
        Expr::LastUpdate => Some(Value::Int(nanos(rec.last_update))),
        Expr::DeviceSize => Some(Value::Int(rec.device_size())),
        Expr::DigestModulo(m) => {
            let b = cx.digest.as_bytes();
            let tail = u32::from_le_bytes([b[16], b[17], b[18], b[19]]);
            Some(Value::Int(i64::from(tail) % (*m).max(1)))
        }
        Expr::Cmp { op, left, right } => {
            let l = eval(left, cx)?;
            let r = eval(right, cx)?;
            let ord = l.cdt_cmp(&r);
            Some(Value::Bool(match op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Ne => ord != Ordering::Equal,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
            }))
        }
        Expr::And(children) => {
            let mut unknown = false;
            for c in children {
                match eval(c, cx) {
                    Some(Value::Bool(false)) => return Some(Value::Bool(false)),
                    Some(Value::Bool(true)) => {}
                    _ => unknown = true,
                }
            }
            (!unknown).then_some(Value::Bool(true))
        }
        Expr::Or(children) => {
            let mut unknown = false;
            for c in children {
                match eval(c, cx) {
                    Some(Value::Bool(true)) => return Some(Value::Bool(true)),
                    Some(Value::Bool(false)) => {}
                    _ => unknown = true,
                }
            }
            (!unknown).then_some(Value::Bool(false))
        }
        Expr::Not(inner) => match eval(inner, cx)? {
            Value::Bool(b) => Some(Value::Bool(!b)),
            _ => None,
        },
    }
}

/// Whether a record passes a filter
pub(crate) fn passes(filter: &CompiledExpression, cx: &EvalContext<'_>) -> bool {
    matches!(eval(filter.expr(), cx), Some(Value::Bool(true)))
}
