//! Bit operations on blob bins
//!
//! Bits are numbered from the most significant bit of the first byte.
//! Negative offsets count back from the end of the blob.

use super::store::StoredRecord;
use aeroclient_core::{Error, Result, ResultCode, Value};
use aeroclient_operations::{BitOp, BitPolicy, BitRange, OverflowAction, ResizeFlags};

fn not_applicable(msg: impl Into<String>) -> Error {
    Error::new(ResultCode::OpNotApplicable, msg)
}

fn get_bit(buf: &[u8], i: usize) -> bool {
    buf[i / 8] >> (7 - i % 8) & 1 == 1
}

fn set_bit(buf: &mut [u8], i: usize, on: bool) {
    let mask = 1u8 << (7 - i % 8);
    if on {
        buf[i / 8] |= mask;
    } else {
        buf[i / 8] &= !mask;
    }
}

/// Absolute first bit of `range`, checked against the blob size
fn locate(buf: &[u8], range: BitRange) -> Result<usize> {
    let total = buf.len() as i64 * 8;
    let offset = i64::from(range.offset);
    let start = if offset < 0 { total + offset } else { offset };
    if start < 0 || start + i64::from(range.size) > total {
        return Err(not_applicable(format!(
            "bit range {}+{} outside a {}-bit blob",
            range.offset, range.size, total
        )));
    }
    Ok(start as usize)
}

fn locate_byte(buf: &[u8], offset: i32) -> Result<usize> {
    let len = buf.len() as i64;
    let off = i64::from(offset);
    let at = if off < 0 { len + off } else { off };
    usize::try_from(at)
        .map_err(|_| not_applicable(format!("byte offset {} before blob start", offset)))
}

fn read_uint(buf: &[u8], start: usize, size: u32) -> u64 {
    (0..size as usize).fold(0u64, |acc, i| (acc << 1) | u64::from(get_bit(buf, start + i)))
}

fn write_uint(buf: &mut [u8], start: usize, size: u32, value: u64) {
    for i in 0..size {
        set_bit(buf, start + i as usize, value >> (size - 1 - i) & 1 == 1);
    }
}

fn sign_extend(raw: u64, size: u32) -> i128 {
    if size < 64 && raw >> (size - 1) & 1 == 1 {
        i128::from(raw) - (1i128 << size)
    } else if size == 64 {
        i128::from(raw as i64)
    } else {
        i128::from(raw)
    }
}

fn combine(
    buf: &mut [u8],
    range: BitRange,
    value: &[u8],
    f: impl Fn(bool, bool) -> bool,
) -> Result<()> {
    let start = locate(buf, range)?;
    if (value.len() * 8) < range.size as usize {
        return Err(Error::param(format!(
            "value of {} bytes is shorter than {} bits",
            value.len(),
            range.size
        )));
    }
    for i in 0..range.size as usize {
        let next = f(get_bit(buf, start + i), get_bit(value, i));
        set_bit(buf, start + i, next);
    }
    Ok(())
}

fn shift(buf: &mut [u8], range: BitRange, by: u32, left: bool) -> Result<()> {
    let start = locate(buf, range)?;
    let size = range.size as usize;
    let by = (by as usize).min(size);
    let bits: Vec<bool> = (0..size).map(|i| get_bit(buf, start + i)).collect();
    for i in 0..size {
        let from = if left { i.checked_add(by) } else { i.checked_sub(by) };
        let on = from.filter(|f| *f < size).is_some_and(|f| bits[f]);
        set_bit(buf, start + i, on);
    }
    Ok(())
}

fn add(
    buf: &mut [u8],
    range: BitRange,
    delta: i128,
    signed: bool,
    action: OverflowAction,
) -> Result<()> {
    let start = locate(buf, range)?;
    let size = range.size;
    let raw = read_uint(buf, start, size);
    let current = if signed { sign_extend(raw, size) } else { i128::from(raw) };
    let (min, max) = if signed {
        (-(1i128 << (size - 1)), (1i128 << (size - 1)) - 1)
    } else {
        (0, (1i128 << size) - 1)
    };
    let mut next = current + delta;
    if next < min || next > max {
        next = match action {
            OverflowAction::Fail => {
                return Err(not_applicable(format!(
                    "bit add overflows a {}-bit {} integer",
                    size,
                    if signed { "signed" } else { "unsigned" }
                )))
            }
            OverflowAction::Saturate => next.clamp(min, max),
            OverflowAction::Wrap => next.rem_euclid(1i128 << size),
        };
    }
    write_uint(buf, start, size, next as u64);
    Ok(())
}

fn resize(buf: &mut Vec<u8>, byte_size: u32, flags: ResizeFlags) -> Result<()> {
    let target = byte_size as usize;
    let len = buf.len();
    if flags.contains(ResizeFlags::GROW_ONLY) && target < len {
        return Err(not_applicable(format!("grow-only resize from {} to {} bytes", len, target)));
    }
    if flags.contains(ResizeFlags::SHRINK_ONLY) && target > len {
        return Err(not_applicable(format!("shrink-only resize from {} to {} bytes", len, target)));
    }
    if flags.contains(ResizeFlags::FROM_FRONT) {
        if target > len {
            buf.splice(0..0, std::iter::repeat(0u8).take(target - len));
        } else {
            buf.drain(..len - target);
        }
    } else {
        buf.resize(target, 0);
    }
    Ok(())
}

fn write(buf: &mut Vec<u8>, op: &BitOp) -> Result<()> {
    match op {
        BitOp::Resize { byte_size, flags, .. } => resize(buf, *byte_size, *flags),
        BitOp::Insert { byte_offset, value, .. } => {
            let at = locate_byte(buf, *byte_offset)?;
            if at > buf.len() {
                buf.resize(at, 0);
            }
            buf.splice(at..at, value.iter().copied());
            Ok(())
        }
        BitOp::Remove { byte_offset, byte_size, .. } => {
            let at = locate_byte(buf, *byte_offset)?;
            let end = at + *byte_size as usize;
            if end > buf.len() {
                return Err(not_applicable(format!(
                    "remove of {} bytes at {} past blob end {}",
                    byte_size,
                    at,
                    buf.len()
                )));
            }
            buf.drain(at..end);
            Ok(())
        }
        BitOp::Set { range, value, .. } => combine(buf, *range, value, |_, v| v),
        BitOp::Or { range, value, .. } => combine(buf, *range, value, |a, b| a | b),
        BitOp::Xor { range, value, .. } => combine(buf, *range, value, |a, b| a ^ b),
        BitOp::And { range, value, .. } => combine(buf, *range, value, |a, b| a & b),
        BitOp::Not { range, .. } => {
            let start = locate(buf, *range)?;
            for i in start..start + range.size as usize {
                let on = get_bit(buf, i);
                set_bit(buf, i, !on);
            }
            Ok(())
        }
        BitOp::LShift { range, shift: by, .. } => shift(buf, *range, *by, true),
        BitOp::RShift { range, shift: by, .. } => shift(buf, *range, *by, false),
        BitOp::Add { range, value, signed, action, .. } => {
            add(buf, *range, i128::from(*value), *signed, *action)
        }
        BitOp::Subtract { range, value, signed, action, .. } => {
            add(buf, *range, -i128::from(*value), *signed, *action)
        }
        BitOp::SetInt { range, value, .. } => {
            let start = locate(buf, *range)?;
            write_uint(buf, start, range.size, *value as u64);
            Ok(())
        }
        BitOp::Get { .. }
        | BitOp::Count { .. }
        | BitOp::LScan { .. }
        | BitOp::RScan { .. }
        | BitOp::GetInt { .. } => Ok(()),
    }
}

fn read(buf: &[u8], op: &BitOp) -> Result<Value> {
    match op {
        BitOp::Get { range } => {
            let start = locate(buf, *range)?;
            let mut out = vec![0u8; (range.size as usize + 7) / 8];
            for i in 0..range.size as usize {
                set_bit(&mut out, i, get_bit(buf, start + i));
            }
            Ok(Value::Blob(out))
        }
        BitOp::Count { range } => {
            let start = locate(buf, *range)?;
            let n = (start..start + range.size as usize).filter(|i| get_bit(buf, *i)).count();
            Ok(Value::Int(n as i64))
        }
        BitOp::LScan { range, value } => {
            let start = locate(buf, *range)?;
            let hit = (0..range.size as usize).find(|i| get_bit(buf, start + i) == *value);
            Ok(Value::Int(hit.map_or(-1, |i| i as i64)))
        }
        BitOp::RScan { range, value } => {
            let start = locate(buf, *range)?;
            let hit = (0..range.size as usize).rev().find(|i| get_bit(buf, start + i) == *value);
            Ok(Value::Int(hit.map_or(-1, |i| i as i64)))
        }
        BitOp::GetInt { range, signed } => {
            let start = locate(buf, *range)?;
            let raw = read_uint(buf, start, range.size);
            let v = if *signed { sign_extend(raw, range.size) as i64 } else { raw as i64 };
            Ok(Value::Int(v))
        }
        _ => Ok(Value::Nil),
    }
}

fn policy_of(op: &BitOp) -> BitPolicy {
    match op {
        BitOp::Resize { policy, .. }
        | BitOp::Insert { policy, .. }
        | BitOp::Remove { policy, .. }
        | BitOp::Set { policy, .. }
        | BitOp::Or { policy, .. }
        | BitOp::Xor { policy, .. }
        | BitOp::And { policy, .. }
        | BitOp::Not { policy, .. }
        | BitOp::LShift { policy, .. }
        | BitOp::RShift { policy, .. }
        | BitOp::Add { policy, .. }
        | BitOp::Subtract { policy, .. }
        | BitOp::SetInt { policy, .. } => *policy,
        _ => BitPolicy::default(),
    }
}

/// Run a bit operation against one bin
pub(crate) fn apply_bit(rec: &mut StoredRecord, bin: &str, op: &BitOp) -> Result<Value> {
    let current = match rec.bin(bin) {
        None => None,
        Some(Value::Blob(b)) => Some(b.clone()),
        Some(other) => {
            return Err(Error::new(
                ResultCode::BinTypeError,
                format!("bit operation on a {} bin", other.type_name()),
            ))
        }
    };
    if !op.is_write() {
        return match current {
            Some(buf) => read(&buf, op),
            None => Ok(Value::Nil),
        };
    }

    let policy = policy_of(op);
    let no_fail = policy.contains(BitPolicy::NO_FAIL);
    let creates = matches!(op, BitOp::Resize { .. } | BitOp::Insert { .. });
    let mut buf = match current {
        Some(_) if policy.contains(BitPolicy::CREATE_ONLY) => {
            if no_fail {
                return Ok(Value::Nil);
            }
            return Err(Error::new(ResultCode::BinExists, format!("bin {} already exists", bin)));
        }
        Some(buf) => buf,
        None if creates && !policy.contains(BitPolicy::UPDATE_ONLY) => Vec::new(),
        None => {
            if no_fail {
                return Ok(Value::Nil);
            }
            return Err(Error::new(ResultCode::BinNotFound, format!("bin {} not found", bin)));
        }
    };
    match write(&mut buf, op) {
        Ok(()) => {
            rec.set_bin(bin, Value::Blob(buf));
            Ok(Value::Nil)
        }
        Err(_) if no_fail => Ok(Value::Nil),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(bytes: &[u8]) -> StoredRecord {
        let mut r = StoredRecord::new("demo", Utc::now());
        r.set_bin("b", Value::Blob(bytes.to_vec()));
        r
    }

    fn range(offset: i32, size: u32) -> BitRange {
        BitRange { offset, size }
    }

    fn blob(r: &StoredRecord) -> Vec<u8> {
        r.bin("b").and_then(Value::as_blob).map(<[u8]>::to_vec).unwrap_or_default()
    }

    #[test]
    fn test_set_and_get() {
        let mut r = rec(&[0, 0]);
        let op = BitOp::Set {
            range: range(4, 8),
            value: vec![0xff],
            policy: BitPolicy::default(),
        };
        apply_bit(&mut r, "b", &op).unwrap();
        assert_eq!(blob(&r), vec![0x0f, 0xf0]);
        let got = apply_bit(&mut r, "b", &BitOp::Get { range: range(4, 4) }).unwrap();
        assert_eq!(got, Value::Blob(vec![0xf0]));
        let count = apply_bit(&mut r, "b", &BitOp::Count { range: range(0, 16) }).unwrap();
        assert_eq!(count, Value::Int(8));
    }

    #[test]
    fn test_scans() {
        let mut r = rec(&[0b0010_0100]);
        let l = apply_bit(&mut r, "b", &BitOp::LScan { range: range(0, 8), value: true }).unwrap();
        let rr = apply_bit(&mut r, "b", &BitOp::RScan { range: range(0, 8), value: true }).unwrap();
        assert_eq!((l, rr), (Value::Int(2), Value::Int(5)));
        let lscan = BitOp::LScan {
            range: range(0, 2),
            value: true,
        };
        let none = apply_bit(&mut r, "b", &lscan).unwrap();
        assert_eq!(none, Value::Int(-1));
    }

    #[test]
    fn test_add_overflow_actions() {
        let mut r = rec(&[0xfe]);
        let add = |action| BitOp::Add {
            range: range(0, 8),
            value: 3,
            signed: false,
            action,
            policy: BitPolicy::default(),
        };
        let err = apply_bit(&mut r, "b", &add(OverflowAction::Fail)).unwrap_err();
        assert_eq!(err.code(), ResultCode::OpNotApplicable);
        apply_bit(&mut r, "b", &add(OverflowAction::Saturate)).unwrap();
        assert_eq!(blob(&r), vec![0xff]);
        apply_bit(&mut r, "b", &add(OverflowAction::Wrap)).unwrap();
        assert_eq!(blob(&r), vec![0x02]);

        let get = BitOp::GetInt {
            range: range(0, 4),
            signed: true,
        };
        let signed = apply_bit(&mut r, "b", &get).unwrap();
        assert_eq!(signed, Value::Int(0));
        let mut r = rec(&[0xf0]);
        let get = BitOp::GetInt {
            range: range(0, 4),
            signed: true,
        };
        let signed = apply_bit(&mut r, "b", &get).unwrap();
        assert_eq!(signed, Value::Int(-1));
    }

    #[test]
    fn test_resize_and_shift() {
        let mut r = StoredRecord::new("demo", Utc::now());
        let grow = BitOp::Resize {
            byte_size: 2,
            flags: ResizeFlags::default(),
            policy: BitPolicy::default(),
        };
        apply_bit(&mut r, "b", &grow).unwrap();
        assert_eq!(blob(&r), vec![0, 0]);
        apply_bit(
            &mut r,
            "b",
            &BitOp::SetInt { range: range(-8, 8), value: 0x81, policy: BitPolicy::default() },
        )
        .unwrap();
        apply_bit(
            &mut r,
            "b",
            &BitOp::LShift { range: range(8, 8), shift: 1, policy: BitPolicy::default() },
        )
        .unwrap();
        assert_eq!(blob(&r), vec![0x00, 0x02]);
    }

    #[test]
    fn test_out_of_range_and_no_fail() {
        let mut r = rec(&[0]);
        let op = |policy| BitOp::Not { range: range(4, 8), policy };
        let err = apply_bit(&mut r, "b", &op(BitPolicy::default())).unwrap_err();
        assert_eq!(err.code(), ResultCode::OpNotApplicable);
        assert_eq!(apply_bit(&mut r, "b", &op(BitPolicy::NO_FAIL)).unwrap(), Value::Nil);
        assert_eq!(blob(&r), vec![0]);
    }
}
