//! Typed decoding of individual override fields
//!
//! Each helper takes the field name so the resulting `ParamError` can name
//! the offending field.

use crate::types::PolicyEnum;
use aeroclient_core::{param_error, Result, Value};

/// Unsigned 32-bit field (timeouts, retries, TTLs, generations)
pub fn u32_field(name: &str, value: &Value) -> Result<u32> {
    match value {
        Value::Int(i) => u32::try_from(*i).map_err(|_| {
            param_error!("{} must be a non-negative integer fitting in 32 bits, got {}", name, i)
        }),
        other => Err(param_error!(
            "{} must be an integer, got {}",
            name,
            other.type_name()
        )),
    }
}

/// Unsigned 64-bit field (record counts)
pub fn u64_field(name: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Int(i) => u64::try_from(*i)
            .map_err(|_| param_error!("{} must be a non-negative integer, got {}", name, i)),
        other => Err(param_error!(
            "{} must be an integer, got {}",
            name,
            other.type_name()
        )),
    }
}

/// Boolean field; integers 0 and 1 are accepted as false and true
pub fn bool_field(name: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(0) => Ok(false),
        Value::Int(1) => Ok(true),
        other => Err(param_error!("{} must be a boolean, got {}", name, other)),
    }
}

/// Enumerated field given as a protocol code or a name
pub fn enum_field<T: PolicyEnum>(name: &str, value: &Value) -> Result<T> {
    let decoded = match value {
        Value::Int(code) => T::from_code(*code),
        Value::String(label) => T::from_name(label),
        other => {
            return Err(param_error!(
                "{} must be an integer code or a name, got {}",
                name,
                other.type_name()
            ))
        }
    };
    decoded.ok_or_else(|| param_error!("invalid value {} for {}", value, name))
}

/// String field
pub fn string_field(name: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| param_error!("{} must be a string, got {}", name, value.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Replica;

    #[test]
    fn test_u32_bounds() {
        assert_eq!(u32_field("total_timeout", &Value::Int(0)).unwrap(), 0);
        assert_eq!(
            u32_field("total_timeout", &Value::Int(u32::MAX as i64)).unwrap(),
            u32::MAX
        );
        let err = u32_field("total_timeout", &Value::Int(-1)).unwrap_err();
        assert!(err.is_param());
        assert!(err.message().contains("total_timeout"));
        assert!(u32_field("ttl", &Value::Int(1 << 32)).is_err());
        assert!(u32_field("ttl", &Value::String("5".into())).is_err());
    }

    #[test]
    fn test_bool_accepts_zero_one() {
        assert!(bool_field("compress", &Value::Int(1)).unwrap());
        assert!(!bool_field("compress", &Value::Bool(false)).unwrap());
        assert!(bool_field("compress", &Value::Int(2)).is_err());
    }

    #[test]
    fn test_enum_by_code_and_name() {
        let r: Replica = enum_field("replica", &Value::Int(0)).unwrap();
        assert_eq!(r, Replica::Master);
        let r: Replica = enum_field("replica", &Value::String("prefer_rack".into())).unwrap();
        assert_eq!(r, Replica::PreferRack);
        let err = enum_field::<Replica>("replica", &Value::Int(9)).unwrap_err();
        assert!(err.message().contains("replica"));
    }
}
