//! The operation sum type

use crate::bin::BinName;
use crate::bit::BitOp;
use crate::cdt::CdtContext;
use crate::expiration::Expiration;
use crate::hll::HllOp;
use crate::list::ListOp;
use crate::map::MapOp;
use aeroclient_core::{param_error, Limits, Result, Value};
use aeroclient_policy::CompiledExpression;

/// Flags for expression writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExpWriteFlags(u8);

impl ExpWriteFlags {
    /// Fail if the bin exists
    pub const CREATE_ONLY: ExpWriteFlags = ExpWriteFlags(1);
    /// Fail if the bin does not exist
    pub const UPDATE_ONLY: ExpWriteFlags = ExpWriteFlags(2);
    /// A nil result deletes the bin
    pub const ALLOW_DELETE: ExpWriteFlags = ExpWriteFlags(4);
    /// Ignore flag violations
    pub const POLICY_NO_FAIL: ExpWriteFlags = ExpWriteFlags(8);
    /// Ignore evaluation failures
    pub const EVAL_NO_FAIL: ExpWriteFlags = ExpWriteFlags(16);

    /// Decode protocol bits
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..32).contains(&bits) || bits & 3 == 3 {
            return Err(param_error!("invalid expression_write_flags {}", bits));
        }
        Ok(ExpWriteFlags(bits as u8))
    }

    /// Whether `other` is set
    pub fn contains(self, other: ExpWriteFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One sub-operation of an operate request
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Read one bin
    Read {
        /// Bin
        bin: BinName,
    },
    /// Read every bin
    ReadAll,
    /// Read generation and TTL only
    ReadHeader,
    /// Overwrite a bin; `Nil` deletes it
    Write {
        /// Bin
        bin: BinName,
        /// Value
        value: Value,
    },
    /// Add to an integer or float bin
    Increment {
        /// Bin
        bin: BinName,
        /// Amount
        value: Value,
    },
    /// Append to a string or blob bin
    Append {
        /// Bin
        bin: BinName,
        /// Suffix
        value: Value,
    },
    /// Prepend to a string or blob bin
    Prepend {
        /// Bin
        bin: BinName,
        /// Prefix
        value: Value,
    },
    /// Reset the record's TTL
    Touch {
        /// New TTL
        ttl: Expiration,
    },
    /// Delete the whole record
    Delete,
    /// Delete one bin
    DeleteBin {
        /// Bin
        bin: BinName,
    },
    /// List operation on a bin or a nested list
    List {
        /// Bin
        bin: BinName,
        /// Operation
        op: ListOp,
        /// Path to the nested list
        ctx: CdtContext,
    },
    /// Map operation on a bin or a nested map
    Map {
        /// Bin
        bin: BinName,
        /// Operation
        op: MapOp,
        /// Path to the nested map
        ctx: CdtContext,
    },
    /// Bit operation on a blob bin
    Bit {
        /// Bin
        bin: BinName,
        /// Operation
        op: BitOp,
        /// Path to a nested blob
        ctx: CdtContext,
    },
    /// HLL operation
    Hll {
        /// Bin
        bin: BinName,
        /// Operation
        op: HllOp,
    },
    /// Evaluate an expression and return it under `name`
    ExpRead {
        /// Result name
        name: BinName,
        /// Expression
        expr: CompiledExpression,
    },
    /// Evaluate an expression and store it in `bin`
    ExpWrite {
        /// Bin
        bin: BinName,
        /// Expression
        expr: CompiledExpression,
        /// Write flags
        flags: ExpWriteFlags,
    },
}

impl Operation {
    /// Read one bin
    pub fn read(bin: impl Into<BinName>) -> Self {
        Operation::Read { bin: bin.into() }
    }

    /// Overwrite one bin
    pub fn write(bin: impl Into<BinName>, value: impl Into<Value>) -> Self {
        Operation::Write {
            bin: bin.into(),
            value: value.into(),
        }
    }

    /// Add to a numeric bin
    pub fn increment(bin: impl Into<BinName>, value: impl Into<Value>) -> Self {
        Operation::Increment {
            bin: bin.into(),
            value: value.into(),
        }
    }

    /// Append to a string or blob bin
    pub fn append(bin: impl Into<BinName>, value: impl Into<Value>) -> Self {
        Operation::Append {
            bin: bin.into(),
            value: value.into(),
        }
    }

    /// Prepend to a string or blob bin
    pub fn prepend(bin: impl Into<BinName>, value: impl Into<Value>) -> Self {
        Operation::Prepend {
            bin: bin.into(),
            value: value.into(),
        }
    }

    /// Reset the TTL
    pub fn touch(ttl: Expiration) -> Self {
        Operation::Touch { ttl }
    }

    /// Delete one bin
    pub fn delete_bin(bin: impl Into<BinName>) -> Self {
        Operation::DeleteBin { bin: bin.into() }
    }

    /// Top-level list operation
    pub fn list(bin: impl Into<BinName>, op: ListOp) -> Self {
        Operation::List {
            bin: bin.into(),
            op,
            ctx: CdtContext::new(),
        }
    }

    /// Top-level map operation
    pub fn map(bin: impl Into<BinName>, op: MapOp) -> Self {
        Operation::Map {
            bin: bin.into(),
            op,
            ctx: CdtContext::new(),
        }
    }

    /// Attach a CDT context to a list, map or bit operation
    pub fn with_ctx(self, ctx: CdtContext) -> Result<Self> {
        match self {
            Operation::List { bin, op, .. } => Ok(Operation::List { bin, op, ctx }),
            Operation::Map { bin, op, .. } => Ok(Operation::Map { bin, op, ctx }),
            Operation::Bit { bin, op, .. } => Ok(Operation::Bit { bin, op, ctx }),
            other => Err(param_error!("{} does not accept a ctx", other.name())),
        }
    }

    /// Short name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Read { .. } => "read",
            Operation::ReadAll => "read_all",
            Operation::ReadHeader => "read_header",
            Operation::Write { .. } => "write",
            Operation::Increment { .. } => "increment",
            Operation::Append { .. } => "append",
            Operation::Prepend { .. } => "prepend",
            Operation::Touch { .. } => "touch",
            Operation::Delete => "delete",
            Operation::DeleteBin { .. } => "delete_bin",
            Operation::List { .. } => "list",
            Operation::Map { .. } => "map",
            Operation::Bit { .. } => "bit",
            Operation::Hll { .. } => "hll",
            Operation::ExpRead { .. } => "expression_read",
            Operation::ExpWrite { .. } => "expression_write",
        }
    }

    /// Target bin; `None` for whole-record operations
    pub fn bin(&self) -> Option<&BinName> {
        match self {
            Operation::Read { bin }
            | Operation::Write { bin, .. }
            | Operation::Increment { bin, .. }
            | Operation::Append { bin, .. }
            | Operation::Prepend { bin, .. }
            | Operation::DeleteBin { bin }
            | Operation::List { bin, .. }
            | Operation::Map { bin, .. }
            | Operation::Bit { bin, .. }
            | Operation::Hll { bin, .. }
            | Operation::ExpWrite { bin, .. } => Some(bin),
            Operation::ExpRead { name, .. } => Some(name),
            Operation::ReadAll
            | Operation::ReadHeader
            | Operation::Touch { .. }
            | Operation::Delete => None,
        }
    }

    /// Whether the operation modifies the record
    pub fn is_write(&self) -> bool {
        match self {
            Operation::Read { .. }
            | Operation::ReadAll
            | Operation::ReadHeader
            | Operation::ExpRead { .. } => false,
            Operation::List { op, .. } => op.is_write(),
            Operation::Map { op, .. } => op.is_write(),
            Operation::Bit { op, .. } => op.is_write(),
            Operation::Hll { op, .. } => op.is_write(),
            _ => true,
        }
    }

    /// Whether the operation produces a result slot
    pub fn returns_value(&self) -> bool {
        !matches!(self, Operation::ReadHeader | Operation::Touch { .. } | Operation::Delete)
    }

    /// Validate names, values and sub-operation arguments
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        if let Some(bin) = self.bin() {
            bin.validate(limits)?;
        }
        match self {
            Operation::Write { value, .. } => limits.validate_value(value)?,
            Operation::Increment { value, .. } => {
                if !matches!(value, Value::Int(_) | Value::Float(_)) {
                    return Err(param_error!(
                        "increment needs an integer or float, got {}",
                        value.type_name()
                    ));
                }
            }
            Operation::Append { value, .. } | Operation::Prepend { value, .. } => {
                if !matches!(value, Value::String(_) | Value::Blob(_)) {
                    return Err(param_error!(
                        "{} needs a string or bytes, got {}",
                        self.name(),
                        value.type_name()
                    ));
                }
            }
            Operation::List { op, .. } => op.validate()?,
            Operation::Map { op, .. } => op.validate()?,
            Operation::Bit { op, .. } => op.validate()?,
            Operation::Hll { op, .. } => op.validate()?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::ListSelector;
    use crate::return_type::{ReturnKind, ReturnType};

    #[test]
    fn test_read_write_classification() {
        assert!(!Operation::read("a").is_write());
        assert!(Operation::write("a", 1).is_write());
        assert!(Operation::touch(Expiration::Never).is_write());
        let get = Operation::list(
            "l",
            ListOp::GetBy {
                selector: ListSelector::Rank(0),
                return_type: ReturnType::new(ReturnKind::Value),
            },
        );
        assert!(!get.is_write());
        assert_eq!(get.bin().map(BinName::as_str), Some("l"));
    }

    #[test]
    fn test_increment_type_checked() {
        let limits = Limits::default();
        assert!(Operation::increment("a", 1).validate(&limits).is_ok());
        assert!(Operation::increment("a", 1.5).validate(&limits).is_ok());
        assert!(Operation::increment("a", "x").validate(&limits).is_err());
        assert!(Operation::append("a", 1).validate(&limits).is_err());
    }

    #[test]
    fn test_bin_name_too_long() {
        let err = Operation::read("a_very_long_bin_name")
            .validate(&Limits::default())
            .unwrap_err();
        assert!(err.is_param());
    }

    #[test]
    fn test_ctx_only_on_cdt_ops() {
        assert!(Operation::read("a").with_ctx(CdtContext::new()).is_err());
        assert!(Operation::list("a", ListOp::Size)
            .with_ctx(CdtContext::new())
            .is_ok());
    }

    #[test]
    fn test_expression_write_flags() {
        assert!(ExpWriteFlags::from_bits(3).is_err());
        assert!(ExpWriteFlags::from_bits(4)
            .unwrap()
            .contains(ExpWriteFlags::ALLOW_DELETE));
    }
}
