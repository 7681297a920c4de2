//! Single-record command execution
//!
//! Every command works on a copy of the stored record and commits it only
//! when all of its operations succeed, so a failing operation leaves the
//! record untouched.

use super::bits::apply_bit;
use super::cdt::{apply_list, apply_map};
use super::expr::{eval, passes, EvalContext};
use super::store::{PartitionMap, StoredRecord};
use super::udf::module_file;
use super::Inner;
use crate::transport::{CommandSettings, RawRecord, Request, RequestKind, UdfCall, UDF_RESULT_BIN};
use aeroclient_core::{Digest, Error, Key, Result, ResultCode, Value};
use aeroclient_operations::{ExpWriteFlags, Expiration, Operation, OperationBatch};
use aeroclient_policy::{GenerationPolicy, RecordExistsAction};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Signature of a registered UDF: the record, then the call arguments
pub type UdfFn = dyn Fn(&mut UdfRecord, &[Value]) -> Result<Value> + Send + Sync;

/// Record view handed to a registered UDF
#[derive(Debug, Clone, Default)]
pub struct UdfRecord {
    bins: Vec<(String, Value)>,
    exists: bool,
    dirty: bool,
    removed: bool,
}

impl UdfRecord {
    /// Whether the record existed before the call
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Current value of a bin
    pub fn get(&self, bin: &str) -> Option<&Value> {
        self.bins.iter().find(|(n, _)| n == bin).map(|(_, v)| v)
    }

    /// Set a bin; `Nil` deletes it. The record is written back after the call.
    pub fn set(&mut self, bin: &str, value: impl Into<Value>) {
        let value = value.into();
        self.dirty = true;
        match self.bins.iter().position(|(n, _)| n == bin) {
            Some(i) if value.is_nil() => {
                self.bins.remove(i);
            }
            Some(i) => self.bins[i].1 = value,
            None if value.is_nil() => {}
            None => self.bins.push((bin.to_string(), value)),
        }
    }

    /// Delete the record after the call
    pub fn remove(&mut self) {
        self.removed = true;
    }
}

fn not_found() -> Error {
    Error::new(ResultCode::KeyNotFound, "record not found")
}

fn check_generation(policy: GenerationPolicy, expected: Option<u32>, actual: u32) -> Result<()> {
    let ok = match (policy, expected) {
        (GenerationPolicy::Ignore, _) | (_, None) => true,
        (GenerationPolicy::Eq, Some(e)) => e == actual,
        (GenerationPolicy::Gt, Some(e)) => e > actual,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::new(
            ResultCode::GenerationError,
            format!("generation check failed: record is at {}", actual),
        ))
    }
}

fn check_filter(
    settings: &CommandSettings,
    rec: &StoredRecord,
    digest: &Digest,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(filter) = &settings.filter else {
        return Ok(());
    };
    let cx = EvalContext {
        record: rec,
        digest,
        now,
    };
    if passes(filter, &cx) {
        Ok(())
    } else {
        Err(Error::from_code(ResultCode::FilteredOut))
    }
}

/// Stamp and store a written record, or drop it when no bins remain
fn commit(
    part: &mut PartitionMap,
    digest: Digest,
    mut rec: StoredRecord,
    key: &Key,
    send_key: bool,
    ttl: Expiration,
    now: DateTime<Utc>,
) -> (u32, u32) {
    if rec.bins.is_empty() {
        part.remove(&digest);
        return (0, 0);
    }
    rec.generation = rec.generation.wrapping_add(1).max(1);
    rec.last_update = now;
    rec.apply_expiration(ttl, now);
    if send_key {
        rec.user_key = key.user_key().cloned();
    }
    let meta = (rec.generation, rec.ttl(now));
    part.insert(digest, rec);
    meta
}

/// Run one record request against the store
pub(super) fn execute(inner: &Inner, request: &Request) -> Result<RawRecord> {
    let key = &request.key;
    let digest = *key.digest();
    let udf = match &request.kind {
        RequestKind::Apply(call) => Some(inner.udf(call)?),
        _ => None,
    };
    let now = Utc::now();
    inner.store.with_partition(key.namespace(), &digest, |part| {
        let existing = part.get(&digest).filter(|r| !r.is_expired(now)).cloned();
        let settings = &request.settings;
        match &request.kind {
            RequestKind::Exists => {
                let rec = existing.ok_or_else(not_found)?;
                check_filter(settings, &rec, &digest, now)?;
                Ok(RawRecord {
                    generation: rec.generation,
                    ttl: rec.ttl(now),
                    bins: Vec::new(),
                })
            }
            RequestKind::Remove { generation } => {
                let rec = existing.ok_or_else(not_found)?;
                check_generation(settings.gen, *generation, rec.generation)?;
                check_filter(settings, &rec, &digest, now)?;
                part.remove(&digest);
                Ok(RawRecord::default())
            }
            RequestKind::Operate(batch) => {
                operate(part, digest, existing, key, batch, settings, now)
            }
            RequestKind::Apply(call) => match udf {
                Some(f) => apply(part, digest, existing, key, call, &*f, settings, now),
                None => Err(Error::from_code(ResultCode::UdfNotFound)),
            },
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn apply(
    part: &mut PartitionMap,
    digest: Digest,
    existing: Option<StoredRecord>,
    key: &Key,
    call: &UdfCall,
    f: &UdfFn,
    settings: &CommandSettings,
    now: DateTime<Utc>,
) -> Result<RawRecord> {
    if let Some(rec) = &existing {
        check_filter(settings, rec, &digest, now)?;
    }
    let mut view = UdfRecord {
        bins: existing.as_ref().map(|r| r.bins.clone()).unwrap_or_default(),
        exists: existing.is_some(),
        ..UdfRecord::default()
    };
    let result = f(&mut view, &call.args).map_err(|e| {
        Error::new(
            ResultCode::UdfBadResponse,
            format!("{}.{}: {}", call.module, call.function, e.message()),
        )
    })?;
    let (generation, ttl) = if view.removed {
        part.remove(&digest);
        (0, 0)
    } else if view.dirty {
        let mut rec = existing.unwrap_or_else(|| StoredRecord::new(key.set(), now));
        rec.bins = view.bins;
        commit(part, digest, rec, key, settings.send_key, settings.ttl, now)
    } else {
        existing.map_or((0, 0), |r| (r.generation, r.ttl(now)))
    };
    Ok(RawRecord {
        generation,
        ttl,
        bins: vec![(UDF_RESULT_BIN.to_string(), result)],
    })
}

fn type_error(bin: &str, found: &Value) -> Error {
    Error::new(
        ResultCode::BinTypeError,
        format!("bin {} holds a {}", bin, found.type_name()),
    )
}

fn incremented(bin: &str, current: Option<&Value>, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (None, v) => Ok(v.clone()),
        (Some(Value::Int(a)), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (Some(Value::Float(a)), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Some(other), _) => Err(type_error(bin, other)),
    }
}

fn concatenated(bin: &str, current: Option<&Value>, extra: &Value, front: bool) -> Result<Value> {
    match (current, extra) {
        (None, v) => Ok(v.clone()),
        (Some(Value::String(a)), Value::String(b)) => {
            Ok(Value::String(if front { format!("{}{}", b, a) } else { format!("{}{}", a, b) }))
        }
        (Some(Value::Blob(a)), Value::Blob(b)) => {
            let (first, second) = if front { (b, a) } else { (a, b) };
            Ok(Value::Blob([first.as_slice(), second.as_slice()].concat()))
        }
        (Some(other), _) => Err(type_error(bin, other)),
    }
}

fn exp_write(
    rec: &mut StoredRecord,
    bin: &str,
    value: Option<Value>,
    flags: ExpWriteFlags,
) -> Result<()> {
    let exists = rec.bin(bin).is_some();
    if flags.contains(ExpWriteFlags::CREATE_ONLY) && exists {
        if flags.contains(ExpWriteFlags::POLICY_NO_FAIL) {
            return Ok(());
        }
        return Err(Error::new(ResultCode::BinExists, format!("bin {} already exists", bin)));
    }
    if flags.contains(ExpWriteFlags::UPDATE_ONLY) && !exists {
        if flags.contains(ExpWriteFlags::POLICY_NO_FAIL) {
            return Ok(());
        }
        return Err(Error::new(ResultCode::BinNotFound, format!("bin {} not found", bin)));
    }
    match value {
        None if flags.contains(ExpWriteFlags::EVAL_NO_FAIL) => Ok(()),
        None => Err(Error::new(
            ResultCode::OpNotApplicable,
            format!("expression for bin {} could not be evaluated", bin),
        )),
        Some(Value::Nil) if flags.contains(ExpWriteFlags::ALLOW_DELETE) => {
            rec.remove_bin(bin);
            Ok(())
        }
        Some(Value::Nil) if flags.contains(ExpWriteFlags::POLICY_NO_FAIL) => Ok(()),
        Some(Value::Nil) => Err(Error::new(
            ResultCode::OpNotApplicable,
            format!("expression deleting bin {} needs allow_delete", bin),
        )),
        Some(v) => {
            rec.set_bin(bin, v);
            Ok(())
        }
    }
}

fn operate(
    part: &mut PartitionMap,
    digest: Digest,
    existing: Option<StoredRecord>,
    key: &Key,
    batch: &OperationBatch,
    settings: &CommandSettings,
    now: DateTime<Utc>,
) -> Result<RawRecord> {
    let has_write = batch.has_write();
    let existed = existing.is_some();
    let mut rec = match existing {
        Some(r) => r,
        None if has_write => StoredRecord::new(key.set(), now),
        None => return Err(not_found()),
    };
    if existed {
        check_filter(settings, &rec, &digest, now)?;
    }
    if has_write {
        match settings.exists {
            RecordExistsAction::Create if existed => {
                return Err(Error::new(ResultCode::KeyExists, "record already exists"))
            }
            action if action.requires_existing() && !existed => return Err(not_found()),
            _ => {}
        }
        check_generation(settings.gen, batch.generation(), rec.generation)?;
        if existed && settings.exists.replaces_bins() {
            rec.bins.clear();
        }
    }

    let all = settings.respond_all_ops;
    let mut out: Vec<(String, Value)> = Vec::new();
    let mut touched = None;
    for op in batch.ops() {
        match op {
            Operation::Read { bin } => match rec.bin(bin.as_str()) {
                Some(v) => out.push((bin.to_string(), v.clone())),
                None if all => out.push((bin.to_string(), Value::Nil)),
                None => {}
            },
            Operation::ReadAll => out.extend(rec.bins.iter().cloned()),
            Operation::ReadHeader => {}
            Operation::Write { bin, value } => {
                rec.set_bin(bin.as_str(), value.clone());
                if all {
                    out.push((bin.to_string(), Value::Nil));
                }
            }
            Operation::Increment { bin, value } => {
                let next = incremented(bin.as_str(), rec.bin(bin.as_str()), value)?;
                rec.set_bin(bin.as_str(), next.clone());
                if all {
                    out.push((bin.to_string(), next));
                }
            }
            Operation::Append { bin, value } | Operation::Prepend { bin, value } => {
                let front = matches!(op, Operation::Prepend { .. });
                let next = concatenated(bin.as_str(), rec.bin(bin.as_str()), value, front)?;
                rec.set_bin(bin.as_str(), next);
                if all {
                    out.push((bin.to_string(), Value::Nil));
                }
            }
            Operation::Touch { ttl } => {
                if !existed {
                    return Err(not_found());
                }
                touched = Some(*ttl);
            }
            Operation::Delete => rec.bins.clear(),
            Operation::DeleteBin { bin } => {
                rec.remove_bin(bin.as_str());
                if all {
                    out.push((bin.to_string(), Value::Nil));
                }
            }
            Operation::List { bin, op, ctx } => {
                let v = apply_list(&mut rec, bin.as_str(), op, ctx)?;
                out.push((bin.to_string(), v));
            }
            Operation::Map { bin, op, ctx } => {
                let v = apply_map(&mut rec, bin.as_str(), op, ctx)?;
                out.push((bin.to_string(), v));
            }
            Operation::Bit { bin, op, ctx } => {
                if !ctx.is_empty() {
                    return Err(Error::new(
                        ResultCode::UnsupportedFeature,
                        "bit operations on nested blobs are not supported",
                    ));
                }
                let v = apply_bit(&mut rec, bin.as_str(), op)?;
                out.push((bin.to_string(), v));
            }
            Operation::Hll { bin, .. } => {
                return Err(Error::new(
                    ResultCode::UnsupportedFeature,
                    format!("HyperLogLog operations on bin {} are not supported", bin),
                ))
            }
            Operation::ExpRead { name, expr } => {
                let cx = EvalContext {
                    record: &rec,
                    digest: &digest,
                    now,
                };
                let v = eval(expr.expr(), &cx).ok_or_else(|| {
                    Error::new(
                        ResultCode::OpNotApplicable,
                        format!("expression {} could not be evaluated", name),
                    )
                })?;
                out.push((name.to_string(), v));
            }
            Operation::ExpWrite { bin, expr, flags } => {
                let value = {
                    let cx = EvalContext {
                        record: &rec,
                        digest: &digest,
                        now,
                    };
                    eval(expr.expr(), &cx)
                };
                exp_write(&mut rec, bin.as_str(), value, *flags)?;
                if all {
                    out.push((bin.to_string(), Value::Nil));
                }
            }
        }
    }

    let (generation, ttl) = if has_write {
        let ttl = touched.unwrap_or_else(|| batch.ttl());
        commit(part, digest, rec, key, settings.send_key, ttl, now)
    } else {
        (rec.generation, rec.ttl(now))
    };
    Ok(RawRecord {
        generation,
        ttl,
        bins: out,
    })
}

impl Inner {
    /// Bound function of a catalogued module
    pub(super) fn udf(&self, call: &UdfCall) -> Result<Arc<UdfFn>> {
        if !self.modules.read().contains_key(&module_file(&call.module)) {
            return Err(Error::new(
                ResultCode::UdfNotFound,
                format!("udf module {} is not registered", call.module),
            ));
        }
        self.udfs
            .read()
            .get(&(call.module.clone(), call.function.clone()))
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ResultCode::UdfNotFound,
                    format!("udf {}.{} is not registered", call.module, call.function),
                )
            })
    }
}
