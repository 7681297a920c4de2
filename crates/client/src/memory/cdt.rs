//! List and map operations on stored bins
//!
//! Lists and maps are plain [`Value`]s; write policies that ask for an
//! ordered container sort it after the write. Map index selectors address
//! entries in key order, rank selectors in value order.

use super::store::StoredRecord;
use aeroclient_core::{Error, Result, ResultCode, Value};
use aeroclient_operations::{
    CdtContext, CtxCreate, CtxStep, ListOp, ListOrder, ListPolicy, ListSelector, ListWriteFlags,
    MapOp, MapOrder, MapPolicy, MapSelector, MapWriteFlags, ReturnKind, ReturnType,
};
use std::cmp::Ordering;

fn not_applicable(msg: impl Into<String>) -> Error {
    Error::new(ResultCode::OpNotApplicable, msg)
}

fn wrong_type(expected: &str, found: &Value) -> Error {
    Error::new(
        ResultCode::BinTypeError,
        format!("expected a {}, found {}", expected, found.type_name()),
    )
}

/// Resolve a possibly negative index inside `0..len`
fn norm_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { len + index } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// `[start, end)` for an index and optional count, clamped to `0..len`
fn span(index: i64, count: Option<i64>, len: usize) -> (usize, usize) {
    let len_i = len as i64;
    let start = if index < 0 { (len_i + index).max(0) } else { index.min(len_i) };
    let end = count.map_or(len_i, |c| (start + c).min(len_i));
    (start as usize, end.max(start) as usize)
}

/// Positions of `values` in CDT order, ties kept in position order
fn rank_order<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<usize> {
    let values: Vec<&Value> = values.collect();
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].cdt_cmp(values[*b]));
    order
}

/// Value equality with wildcard support
fn matches_value(x: &Value, pattern: &Value) -> bool {
    match (x, pattern) {
        (_, Value::Wildcard) => true,
        (Value::List(a), Value::List(b)) => match b.split_last() {
            Some((Value::Wildcard, prefix)) => {
                a.len() >= prefix.len() && a.iter().zip(prefix).all(|(x, p)| matches_value(x, p))
            }
            _ => a.len() == b.len() && a.iter().zip(b).all(|(x, p)| matches_value(x, p)),
        },
        _ => x == pattern,
    }
}

fn in_range(x: &Value, begin: &Value, end: &Value) -> bool {
    x.cdt_cmp(begin) != Ordering::Less && x.cdt_cmp(end) == Ordering::Less
}

/// Positions `rank..rank+count` relative to the first element `>= anchor`
fn relative(
    order: &[usize],
    values: &[&Value],
    anchor: &Value,
    rank: i64,
    count: Option<i64>,
) -> Vec<usize> {
    let pos = order
        .iter()
        .position(|i| values[*i].cdt_cmp(anchor) != Ordering::Less)
        .unwrap_or(order.len()) as i64;
    let len = order.len() as i64;
    let start = (pos + rank).clamp(0, len);
    let end = count.map_or(len, |c| (start + c).min(len));
    order[start as usize..end.max(start) as usize].to_vec()
}

fn invert(selected: Vec<usize>, len: usize) -> Vec<usize> {
    (0..len).filter(|i| !selected.contains(i)).collect()
}

fn add_numbers(current: &Value, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (Value::Nil, v) => Ok(v.clone()),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(_), other) | (Value::Float(_), other) => {
            Err(wrong_type(current.type_name(), other))
        }
        (other, _) => Err(wrong_type("number", other)),
    }
}

fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(wrong_type("number", other)),
    }
}

fn empty_container(create: CtxCreate) -> Value {
    match create {
        CtxCreate::List { .. } => Value::List(Vec::new()),
        CtxCreate::Map(_) => Value::Map(Vec::new()),
    }
}

fn step_mut<'a>(
    cur: &'a mut Value,
    step: &CtxStep,
    create: Option<CtxCreate>,
) -> Result<Option<&'a mut Value>> {
    match (cur, step) {
        (Value::List(items), CtxStep::ListIndex(i)) => {
            if let Some(idx) = norm_index(*i, items.len()) {
                return Ok(items.get_mut(idx));
            }
            let Some(create) = create else {
                return Ok(None);
            };
            let pad = matches!(create, CtxCreate::List { pad: true, .. });
            let idx = usize::try_from(*i)
                .map_err(|_| not_applicable(format!("ctx list_index {} out of range", i)))?;
            if idx > items.len() && !pad {
                return Err(not_applicable(format!(
                    "ctx list_index {} beyond list end {} without pad",
                    idx,
                    items.len()
                )));
            }
            items.resize(idx, Value::Nil);
            items.push(empty_container(create));
            Ok(items.last_mut())
        }
        (Value::List(items), CtxStep::ListRank(r)) => {
            let order = rank_order(items.iter());
            Ok(norm_index(*r, order.len()).and_then(move |p| items.get_mut(order[p])))
        }
        (Value::List(items), CtxStep::ListValue(v)) => {
            Ok(items.iter_mut().find(|x| matches_value(x, v)))
        }
        (Value::Map(entries), CtxStep::MapIndex(i)) => {
            let order = rank_order(entries.iter().map(|(k, _)| k));
            Ok(norm_index(*i, order.len())
                .and_then(move |p| entries.get_mut(order[p]).map(|(_, v)| v)))
        }
        (Value::Map(entries), CtxStep::MapRank(r)) => {
            let order = rank_order(entries.iter().map(|(_, v)| v));
            Ok(norm_index(*r, order.len())
                .and_then(move |p| entries.get_mut(order[p]).map(|(_, v)| v)))
        }
        (Value::Map(entries), CtxStep::MapKey(k)) => {
            if let Some(pos) = entries.iter().position(|(key, _)| key == k) {
                return Ok(entries.get_mut(pos).map(|(_, v)| v));
            }
            match create {
                Some(create) => {
                    entries.push((k.clone(), empty_container(create)));
                    let sorted = matches!(
                        create,
                        CtxCreate::Map(MapOrder::KeyOrdered | MapOrder::KeyValueOrdered)
                    );
                    if sorted {
                        sort_entries(entries);
                    }
                    Ok(entries.iter_mut().find(|(key, _)| key == k).map(|(_, v)| v))
                }
                None => Ok(None),
            }
        }
        (Value::Map(entries), CtxStep::MapValue(v)) => {
            Ok(entries.iter_mut().find(|(_, x)| matches_value(x, v)).map(|(_, x)| x))
        }
        (other, step) => Err(not_applicable(format!(
            "ctx step {:?} cannot address a {}",
            step,
            other.type_name()
        ))),
    }
}

/// Walk a context path; `None` when a step does not resolve
fn resolve_mut<'a>(
    root: &'a mut Value,
    ctx: &CdtContext,
    allow_create: bool,
) -> Result<Option<&'a mut Value>> {
    let steps = ctx.steps();
    let mut cur = root;
    for (i, step) in steps.iter().enumerate() {
        let create = if allow_create && i + 1 == steps.len() { ctx.create() } else { None };
        cur = match step_mut(cur, step, create)? {
            Some(next) => next,
            None => return Ok(None),
        };
    }
    Ok(Some(cur))
}

fn root_for(ctx: &CdtContext, leaf: Value) -> Value {
    match ctx.steps().first() {
        Some(
            CtxStep::MapIndex(_) | CtxStep::MapRank(_) | CtxStep::MapKey(_) | CtxStep::MapValue(_),
        ) => {
            Value::Map(Vec::new())
        }
        Some(_) => Value::List(Vec::new()),
        None => leaf,
    }
}

/// Run a CDT operation against one bin. Reads of a missing bin or path
/// yield `Nil`; writes create the bin.
fn apply_cdt(
    rec: &mut StoredRecord,
    bin: &str,
    ctx: &CdtContext,
    is_write: bool,
    empty: Value,
    run: impl FnOnce(&mut Value) -> Result<Value>,
) -> Result<Value> {
    if !is_write {
        let Some(stored) = rec.bin(bin) else {
            return Ok(Value::Nil);
        };
        let mut root = stored.clone();
        return match resolve_mut(&mut root, ctx, false)? {
            Some(target) => run(target),
            None => Ok(Value::Nil),
        };
    }
    let mut root = rec.bin(bin).cloned().unwrap_or_else(|| root_for(ctx, empty));
    let result = {
        let target = resolve_mut(&mut root, ctx, true)?.ok_or_else(|| {
            Error::new(ResultCode::ElementNotFound, format!("ctx path not found in bin {}", bin))
        })?;
        run(target)?
    };
    rec.set_bin(bin, root);
    Ok(result)
}

// ---- lists ----

pub(crate) fn apply_list(
    rec: &mut StoredRecord,
    bin: &str,
    op: &ListOp,
    ctx: &CdtContext,
) -> Result<Value> {
    apply_cdt(rec, bin, ctx, op.is_write(), Value::List(Vec::new()), |target| {
        match target {
            Value::List(items) => list_op(items, op),
            other => Err(wrong_type("list", other)),
        }
    })
}

fn sort_list(items: &mut [Value]) {
    items.sort_by(|a, b| a.cdt_cmp(b));
}

fn size(items: &[Value]) -> Value {
    Value::Int(items.len() as i64)
}

fn list_add(items: &mut Vec<Value>, values: &[Value], policy: &ListPolicy) -> Result<Value> {
    let unique = policy.flags.contains(ListWriteFlags::ADD_UNIQUE);
    let no_fail = policy.flags.contains(ListWriteFlags::NO_FAIL);
    let partial = policy.flags.contains(ListWriteFlags::PARTIAL);
    let mut accepted: Vec<Value> = Vec::with_capacity(values.len());
    for v in values {
        if unique && items.iter().chain(accepted.iter()).any(|x| x == v) {
            if !no_fail {
                let msg = format!("list already holds {}", v);
                return Err(Error::new(ResultCode::ElementExists, msg));
            }
            if !partial {
                return Ok(size(items));
            }
            continue;
        }
        accepted.push(v.clone());
    }
    items.extend(accepted);
    if policy.order == ListOrder::Ordered {
        sort_list(items);
    }
    Ok(size(items))
}

fn list_insert(
    items: &mut Vec<Value>,
    index: i64,
    values: &[Value],
    policy: &ListPolicy,
) -> Result<Value> {
    let no_fail = policy.flags.contains(ListWriteFlags::NO_FAIL);
    if policy.order == ListOrder::Ordered {
        return Err(not_applicable("insert is not allowed on an ordered list"));
    }
    let len = items.len() as i64;
    let idx = if index < 0 { len + index } else { index };
    let bounded = policy.flags.contains(ListWriteFlags::INSERT_BOUNDED);
    if idx < 0 || (bounded && idx > len) {
        if no_fail {
            return Ok(size(items));
        }
        return Err(not_applicable(format!("insert index {} out of bounds", index)));
    }
    let mut staged = Vec::new();
    list_add(&mut staged, values, &ListPolicy::default())?;
    if policy.flags.contains(ListWriteFlags::ADD_UNIQUE)
        && staged.iter().any(|v| items.contains(v))
    {
        if no_fail {
            return Ok(size(items));
        }
        return Err(Error::new(ResultCode::ElementExists, "list already holds an inserted value"));
    }
    let idx = idx as usize;
    if idx > items.len() {
        items.resize(idx, Value::Nil);
    }
    items.splice(idx..idx, staged);
    Ok(size(items))
}

fn list_at(items: &[Value], index: i64) -> Result<usize> {
    norm_index(index, items.len())
        .ok_or_else(|| {
            not_applicable(format!(
                "list index {} out of bounds for size {}",
                index,
                items.len()
            ))
        })
}

fn list_op(items: &mut Vec<Value>, op: &ListOp) -> Result<Value> {
    match op {
        ListOp::SetOrder(order) => {
            if *order == ListOrder::Ordered {
                sort_list(items);
            }
            Ok(Value::Nil)
        }
        ListOp::Sort { drop_duplicates } => {
            sort_list(items);
            if *drop_duplicates {
                items.dedup();
            }
            Ok(Value::Nil)
        }
        ListOp::Append { value, policy } => list_add(items, std::slice::from_ref(value), policy),
        ListOp::AppendItems { values, policy } => list_add(items, values, policy),
        ListOp::Insert { index, value, policy } => {
            list_insert(items, *index, std::slice::from_ref(value), policy)
        }
        ListOp::InsertItems { index, values, policy } => list_insert(items, *index, values, policy),
        ListOp::Increment { index, value, policy } => {
            let idx = match norm_index(*index, items.len()) {
                Some(i) => i,
                None if *index >= 0 && !policy.flags.contains(ListWriteFlags::INSERT_BOUNDED) => {
                    items.resize(*index as usize + 1, Value::Nil);
                    *index as usize
                }
                None => return Err(not_applicable(format!("list index {} out of bounds", index))),
            };
            let next = add_numbers(&items[idx], value)?;
            items[idx] = next.clone();
            if policy.order == ListOrder::Ordered {
                sort_list(items);
            }
            Ok(next)
        }
        ListOp::Set { index, value, policy } => {
            if policy.flags.contains(ListWriteFlags::ADD_UNIQUE) && items.contains(value) {
                if policy.flags.contains(ListWriteFlags::NO_FAIL) {
                    return Ok(Value::Nil);
                }
                let msg = format!("list already holds {}", value);
                return Err(Error::new(ResultCode::ElementExists, msg));
            }
            match norm_index(*index, items.len()) {
                Some(i) => items[i] = value.clone(),
                None if *index >= 0 && !policy.flags.contains(ListWriteFlags::INSERT_BOUNDED) => {
                    items.resize(*index as usize, Value::Nil);
                    items.push(value.clone());
                }
                None => return Err(not_applicable(format!("list index {} out of bounds", index))),
            }
            Ok(Value::Nil)
        }
        ListOp::Pop { index } => {
            let i = list_at(items, *index)?;
            Ok(items.remove(i))
        }
        ListOp::PopRange { index, count } => {
            let (s, e) = span(*index, *count, items.len());
            Ok(Value::List(items.drain(s..e).collect()))
        }
        ListOp::Remove { index } => {
            let i = list_at(items, *index)?;
            items.remove(i);
            Ok(Value::Int(1))
        }
        ListOp::RemoveRange { index, count } => {
            let (s, e) = span(*index, *count, items.len());
            items.drain(s..e);
            Ok(Value::Int((e - s) as i64))
        }
        ListOp::Trim { index, count } => {
            let before = items.len();
            let (s, e) = span(*index, Some(*count), before);
            items.truncate(e);
            items.drain(..s);
            Ok(Value::Int((before - items.len()) as i64))
        }
        ListOp::Clear => {
            items.clear();
            Ok(Value::Nil)
        }
        ListOp::Size => Ok(size(items)),
        ListOp::Get { index } => Ok(items[list_at(items, *index)?].clone()),
        ListOp::GetRange { index, count } => {
            let (s, e) = span(*index, *count, items.len());
            Ok(Value::List(items[s..e].to_vec()))
        }
        ListOp::GetBy { selector, return_type } => {
            let selected = select_list(items, selector, return_type.inverted);
            Ok(list_result(items, &selected, *return_type, selector.is_multi()))
        }
        ListOp::RemoveBy { selector, return_type } => {
            let selected = select_list(items, selector, return_type.inverted);
            let result = list_result(items, &selected, *return_type, selector.is_multi());
            let mut doomed = selected;
            doomed.sort_unstable_by(|a, b| b.cmp(a));
            for i in doomed {
                items.remove(i);
            }
            Ok(result)
        }
    }
}

fn select_list(items: &[Value], selector: &ListSelector, inverted: bool) -> Vec<usize> {
    let len = items.len();
    let by_rank = || rank_order(items.iter());
    let selected = match selector {
        ListSelector::Index(i) => norm_index(*i, len).into_iter().collect(),
        ListSelector::IndexRange { index, count } => {
            let (s, e) = span(*index, *count, len);
            (s..e).collect()
        }
        ListSelector::Rank(r) => {
            let order = by_rank();
            norm_index(*r, len).map(|p| order[p]).into_iter().collect()
        }
        ListSelector::RankRange { rank, count } => {
            let order = by_rank();
            let (s, e) = span(*rank, *count, len);
            order[s..e].to_vec()
        }
        ListSelector::Value(v) => (0..len).filter(|i| matches_value(&items[*i], v)).collect(),
        ListSelector::ValueList(vs) => (0..len)
            .filter(|i| vs.iter().any(|v| matches_value(&items[*i], v)))
            .collect(),
        ListSelector::ValueRange { begin, end } => {
            (0..len).filter(|i| in_range(&items[*i], begin, end)).collect()
        }
        ListSelector::ValueRelRankRange { value, rank, count } => {
            let refs: Vec<&Value> = items.iter().collect();
            relative(&by_rank(), &refs, value, *rank, *count)
        }
    };
    if inverted {
        invert(selected, len)
    } else {
        selected
    }
}

fn collect_or_single(mut values: Vec<Value>, multi: bool) -> Value {
    if multi {
        Value::List(values)
    } else if values.is_empty() {
        Value::Nil
    } else {
        values.swap_remove(0)
    }
}

fn list_result(items: &[Value], selected: &[usize], rt: ReturnType, multi: bool) -> Value {
    let multi = multi || rt.inverted;
    let len = items.len();
    let rank_of = || {
        let order = rank_order(items.iter());
        let mut rank = vec![0usize; len];
        for (r, i) in order.iter().enumerate() {
            rank[*i] = r;
        }
        rank
    };
    let ints = |it: Vec<usize>| it.into_iter().map(|i| Value::Int(i as i64)).collect::<Vec<_>>();
    match rt.kind {
        ReturnKind::None | ReturnKind::Key | ReturnKind::KeyValue => Value::Nil,
        ReturnKind::Count => Value::Int(selected.len() as i64),
        ReturnKind::Exists => Value::Bool(!selected.is_empty()),
        ReturnKind::Index => collect_or_single(ints(selected.to_vec()), multi),
        ReturnKind::ReverseIndex => {
            collect_or_single(ints(selected.iter().map(|i| len - 1 - i).collect()), multi)
        }
        ReturnKind::Rank => {
            let rank = rank_of();
            collect_or_single(ints(selected.iter().map(|i| rank[*i]).collect()), multi)
        }
        ReturnKind::ReverseRank => {
            let rank = rank_of();
            collect_or_single(ints(selected.iter().map(|i| len - 1 - rank[*i]).collect()), multi)
        }
        ReturnKind::Value => {
            collect_or_single(selected.iter().map(|i| items[*i].clone()).collect(), multi)
        }
    }
}

// ---- maps ----

pub(crate) fn apply_map(
    rec: &mut StoredRecord,
    bin: &str,
    op: &MapOp,
    ctx: &CdtContext,
) -> Result<Value> {
    apply_cdt(rec, bin, ctx, op.is_write(), Value::Map(Vec::new()), |target| {
        match target {
            Value::Map(entries) => map_op(entries, op),
            other => Err(wrong_type("map", other)),
        }
    })
}

fn sort_entries(entries: &mut [(Value, Value)]) {
    entries.sort_by(|a, b| a.0.cdt_cmp(&b.0));
}

fn keep_order(entries: &mut [(Value, Value)], order: MapOrder) {
    if order != MapOrder::Unordered {
        sort_entries(entries);
    }
}

fn map_size(entries: &[(Value, Value)]) -> Value {
    Value::Int(entries.len() as i64)
}

fn map_put(
    entries: &mut Vec<(Value, Value)>,
    items: &[(Value, Value)],
    policy: &MapPolicy,
) -> Result<Value> {
    let create_only = policy.flags.contains(MapWriteFlags::CREATE_ONLY);
    let update_only = policy.flags.contains(MapWriteFlags::UPDATE_ONLY);
    let no_fail = policy.flags.contains(MapWriteFlags::NO_FAIL);
    let partial = policy.flags.contains(MapWriteFlags::PARTIAL);

    let mut allowed = Vec::with_capacity(items.len());
    for (k, v) in items {
        let exists = entries.iter().any(|(key, _)| key == k);
        let violation = if create_only && exists {
            Some(Error::new(ResultCode::ElementExists, format!("map key {} already exists", k)))
        } else if update_only && !exists {
            Some(Error::new(ResultCode::ElementNotFound, format!("map key {} not found", k)))
        } else {
            None
        };
        match violation {
            Some(e) if !no_fail => return Err(e),
            Some(_) if !partial => return Ok(map_size(entries)),
            Some(_) => continue,
            None => allowed.push((k, v)),
        }
    }
    for (k, v) in allowed {
        match entries.iter_mut().find(|(key, _)| key == k) {
            Some(slot) => slot.1 = v.clone(),
            None => entries.push((k.clone(), v.clone())),
        }
    }
    keep_order(entries, policy.order);
    Ok(map_size(entries))
}

fn map_add(
    entries: &mut Vec<(Value, Value)>,
    key: &Value,
    delta: &Value,
    policy: &MapPolicy,
) -> Result<Value> {
    let next = match entries.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => {
            let next = add_numbers(&slot.1, delta)?;
            slot.1 = next.clone();
            next
        }
        None => {
            if policy.flags.contains(MapWriteFlags::UPDATE_ONLY) {
                let msg = format!("map key {} not found", key);
                return Err(Error::new(ResultCode::ElementNotFound, msg));
            }
            entries.push((key.clone(), delta.clone()));
            delta.clone()
        }
    };
    keep_order(entries, policy.order);
    Ok(next)
}

fn map_op(entries: &mut Vec<(Value, Value)>, op: &MapOp) -> Result<Value> {
    match op {
        MapOp::SetPolicy(policy) => {
            keep_order(entries, policy.order);
            Ok(Value::Nil)
        }
        MapOp::Put { key, value, policy } => {
            map_put(entries, &[(key.clone(), value.clone())], policy)
        }
        MapOp::PutItems { items, policy } => map_put(entries, items, policy),
        MapOp::Increment { key, value, policy } => map_add(entries, key, value, policy),
        MapOp::Decrement { key, value, policy } => map_add(entries, key, &negate(value)?, policy),
        MapOp::Clear => {
            entries.clear();
            Ok(Value::Nil)
        }
        MapOp::Size => Ok(map_size(entries)),
        MapOp::GetBy { selector, return_type } => {
            let selected = select_map(entries, selector, return_type.inverted);
            Ok(map_result(entries, &selected, *return_type, selector.is_multi()))
        }
        MapOp::RemoveBy { selector, return_type } => {
            let selected = select_map(entries, selector, return_type.inverted);
            let result = map_result(entries, &selected, *return_type, selector.is_multi());
            let mut doomed = selected;
            doomed.sort_unstable_by(|a, b| b.cmp(a));
            for i in doomed {
                entries.remove(i);
            }
            Ok(result)
        }
    }
}

fn select_map(entries: &[(Value, Value)], selector: &MapSelector, inverted: bool) -> Vec<usize> {
    let len = entries.len();
    let keys: Vec<&Value> = entries.iter().map(|(k, _)| k).collect();
    let values: Vec<&Value> = entries.iter().map(|(_, v)| v).collect();
    let key_order = || rank_order(keys.iter().copied());
    let value_order = || rank_order(values.iter().copied());
    let filter_keys = |f: &dyn Fn(&Value) -> bool| -> Vec<usize> {
        key_order().into_iter().filter(|i| f(keys[*i])).collect()
    };
    let filter_values = |f: &dyn Fn(&Value) -> bool| -> Vec<usize> {
        key_order().into_iter().filter(|i| f(values[*i])).collect()
    };
    let selected = match selector {
        MapSelector::Key(k) => keys.iter().position(|x| *x == k).into_iter().collect(),
        MapSelector::KeyList(ks) => ks
            .iter()
            .filter_map(|k| keys.iter().position(|x| *x == k))
            .collect(),
        MapSelector::KeyRange { begin, end } => filter_keys(&|k| in_range(k, begin, end)),
        MapSelector::KeyRelIndexRange { key, index, count } => {
            relative(&key_order(), &keys, key, *index, *count)
        }
        MapSelector::Value(v) => filter_values(&|x| matches_value(x, v)),
        MapSelector::ValueList(vs) => filter_values(&|x| vs.iter().any(|v| matches_value(x, v))),
        MapSelector::ValueRange { begin, end } => filter_values(&|x| in_range(x, begin, end)),
        MapSelector::ValueRelRankRange { value, rank, count } => {
            relative(&value_order(), &values, value, *rank, *count)
        }
        MapSelector::Index(i) => {
            let order = key_order();
            norm_index(*i, len).map(|p| order[p]).into_iter().collect()
        }
        MapSelector::IndexRange { index, count } => {
            let (s, e) = span(*index, *count, len);
            key_order()[s..e].to_vec()
        }
        MapSelector::Rank(r) => {
            let order = value_order();
            norm_index(*r, len).map(|p| order[p]).into_iter().collect()
        }
        MapSelector::RankRange { rank, count } => {
            let (s, e) = span(*rank, *count, len);
            value_order()[s..e].to_vec()
        }
    };
    if inverted {
        invert(selected, len)
    } else {
        selected
    }
}

fn positions(order: Vec<usize>) -> Vec<usize> {
    let mut pos = vec![0usize; order.len()];
    for (p, i) in order.iter().enumerate() {
        pos[*i] = p;
    }
    pos
}

fn map_result(
    entries: &[(Value, Value)],
    selected: &[usize],
    rt: ReturnType,
    multi: bool,
) -> Value {
    let multi = multi || rt.inverted;
    let len = entries.len();
    let ints = |it: Vec<usize>| it.into_iter().map(|i| Value::Int(i as i64)).collect::<Vec<_>>();
    let key_pos = || positions(rank_order(entries.iter().map(|(k, _)| k)));
    let value_pos = || positions(rank_order(entries.iter().map(|(_, v)| v)));
    match rt.kind {
        ReturnKind::None => Value::Nil,
        ReturnKind::Count => Value::Int(selected.len() as i64),
        ReturnKind::Exists => Value::Bool(!selected.is_empty()),
        ReturnKind::Index => {
            let pos = key_pos();
            collect_or_single(ints(selected.iter().map(|i| pos[*i]).collect()), multi)
        }
        ReturnKind::ReverseIndex => {
            let pos = key_pos();
            collect_or_single(ints(selected.iter().map(|i| len - 1 - pos[*i]).collect()), multi)
        }
        ReturnKind::Rank => {
            let pos = value_pos();
            collect_or_single(ints(selected.iter().map(|i| pos[*i]).collect()), multi)
        }
        ReturnKind::ReverseRank => {
            let pos = value_pos();
            collect_or_single(ints(selected.iter().map(|i| len - 1 - pos[*i]).collect()), multi)
        }
        ReturnKind::Key => {
            collect_or_single(selected.iter().map(|i| entries[*i].0.clone()).collect(), multi)
        }
        ReturnKind::Value => {
            collect_or_single(selected.iter().map(|i| entries[*i].1.clone()).collect(), multi)
        }
        ReturnKind::KeyValue => Value::Map(selected.iter().map(|i| entries[*i].clone()).collect()),
    }
}
