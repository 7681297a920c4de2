//! Size limits for names, values and numeric fields
//!
//! The server enforces these limits too; checking them client-side turns a
//! round trip into an immediate `ParamError`.
//!
//! ## Contract
//!
//! The name limits are fixed by the server protocol:
//! - namespace: 31 bytes
//! - set name: 63 bytes
//! - bin name: 15 bytes

use crate::value::Value;
use thiserror::Error;

/// Maximum namespace length in bytes
pub const MAX_NAMESPACE_BYTES: usize = 31;

/// Maximum set name length in bytes
pub const MAX_SET_BYTES: usize = 63;

/// Maximum bin name length in bytes
pub const MAX_BIN_NAME_BYTES: usize = 15;

/// Maximum secondary index name length in bytes
pub const MAX_INDEX_NAME_BYTES: usize = 255;

/// Configurable limits for argument validation
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum bin name length in bytes (default: 15)
    pub max_bin_name_bytes: usize,

    /// Maximum nesting depth of list/map values (default: 64)
    pub max_nesting_depth: usize,

    /// Maximum number of operations in one operate call (default: 1024)
    pub max_operations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_bin_name_bytes: MAX_BIN_NAME_BYTES,
            max_nesting_depth: 64,
            max_operations: 1024,
        }
    }
}

impl Limits {
    /// Small limits for unit tests
    pub fn with_small_limits() -> Self {
        Limits {
            max_bin_name_bytes: MAX_BIN_NAME_BYTES,
            max_nesting_depth: 4,
            max_operations: 8,
        }
    }

    /// Validate a bin name
    pub fn validate_bin_name(&self, name: &str) -> Result<(), LimitError> {
        if name.len() > self.max_bin_name_bytes {
            return Err(LimitError::BinNameTooLong {
                name: name.to_string(),
                actual: name.len(),
                max: self.max_bin_name_bytes,
            });
        }
        Ok(())
    }

    /// Validate the nesting depth of a value
    pub fn validate_value(&self, value: &Value) -> Result<(), LimitError> {
        self.validate_value_impl(value, 0)
    }

    fn validate_value_impl(&self, value: &Value, depth: usize) -> Result<(), LimitError> {
        if depth > self.max_nesting_depth {
            return Err(LimitError::NestingTooDeep {
                actual: depth,
                max: self.max_nesting_depth,
            });
        }
        match value {
            Value::List(items) => {
                for v in items {
                    self.validate_value_impl(v, depth + 1)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                for (k, v) in entries {
                    self.validate_value_impl(k, depth + 1)?;
                    self.validate_value_impl(v, depth + 1)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Validate the number of operations in one request
    pub fn validate_operation_count(&self, count: usize) -> Result<(), LimitError> {
        if count > self.max_operations {
            return Err(LimitError::TooManyOperations {
                actual: count,
                max: self.max_operations,
            });
        }
        Ok(())
    }
}

/// Check that an integer fits in an unsigned 32-bit field
///
/// `field` names the offending field in the error.
pub fn check_u32(field: &str, value: i64) -> Result<u32, LimitError> {
    u32::try_from(value).map_err(|_| LimitError::OutOfRange {
        field: field.to_string(),
        value,
    })
}

/// Limit validation errors
///
/// All of these surface to callers as `ParamError`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError {
    /// Bin name exceeds maximum length
    #[error("bin name {name:?} too long: {actual} bytes exceeds maximum {max}")]
    BinNameTooLong {
        /// Offending name
        name: String,
        /// Actual length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Value nesting exceeds maximum depth
    #[error("nesting too deep: {actual} levels exceeds maximum {max}")]
    NestingTooDeep {
        /// Actual nesting depth
        actual: usize,
        /// Maximum allowed depth
        max: usize,
    },

    /// Too many operations in one request
    #[error("too many operations: {actual} exceeds maximum {max}")]
    TooManyOperations {
        /// Actual count
        actual: usize,
        /// Maximum allowed count
        max: usize,
    },

    /// Integer does not fit its field
    #[error("{field} value {value} is out of range for an unsigned 32-bit field")]
    OutOfRange {
        /// Field name
        field: String,
        /// Offending value
        value: i64,
    },
}

impl From<LimitError> for crate::Error {
    fn from(e: LimitError) -> Self {
        crate::Error::param(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_name_at_max_length() {
        let limits = Limits::default();
        assert!(limits.validate_bin_name(&"b".repeat(15)).is_ok());
    }

    #[test]
    fn test_bin_name_exceeds_max_length() {
        let limits = Limits::default();
        let result = limits.validate_bin_name(&"b".repeat(16));
        assert!(matches!(
            result,
            Err(LimitError::BinNameTooLong { actual: 16, max: 15, .. })
        ));
    }

    fn nested_list(depth: usize) -> Value {
        let mut value = Value::Nil;
        for _ in 0..depth {
            value = Value::List(vec![value]);
        }
        value
    }

    #[test]
    fn test_nesting_at_max_depth() {
        let limits = Limits::with_small_limits();
        assert!(limits.validate_value(&nested_list(4)).is_ok());
    }

    #[test]
    fn test_nesting_exceeds_max_depth() {
        let limits = Limits::with_small_limits();
        let result = limits.validate_value(&nested_list(5));
        assert!(matches!(result, Err(LimitError::NestingTooDeep { .. })));
    }

    #[test]
    fn test_operation_count() {
        let limits = Limits::with_small_limits();
        assert!(limits.validate_operation_count(8).is_ok());
        assert!(limits.validate_operation_count(9).is_err());
    }

    #[test]
    fn test_check_u32_bounds() {
        assert_eq!(check_u32("ttl", 0), Ok(0));
        assert_eq!(check_u32("ttl", u32::MAX as i64), Ok(u32::MAX));
        assert!(check_u32("ttl", -1).is_err());
        let err = check_u32("read_quota", 1 << 40).unwrap_err();
        assert!(err.to_string().contains("read_quota"));
    }

    #[test]
    fn test_limit_error_is_param_error() {
        let err: crate::Error = check_u32("x", -5).unwrap_err().into();
        assert!(err.is_param());
    }
}
