//! Loose-form operation decoding
//!
//! Callers that build operations dynamically describe each one as a map:
//!
//! ```text
//! {"op": "list_get_by_value", "bin": "scores", "val": 10,
//!  "return_type": 7, "inverted": true, "ctx": [...]}
//! ```
//!
//! [`decode_operation`] turns that map into a typed [`Operation`]. A missing
//! required field fails with a `ParamError` naming the field and the
//! operation.

use crate::bin::BinName;
use crate::bit::BitOp;
use crate::cdt::CdtContext;
use crate::expiration::Expiration;
use crate::hll::HllOp;
use crate::list::ListOp;
use crate::map::MapOp;
use crate::operation::{ExpWriteFlags, Operation};
use crate::return_type::{ReturnKind, ReturnType};
use aeroclient_core::{param_error, Result, Value};
use aeroclient_policy::CompiledExpression;

/// Field accessor over one loose-form map
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    op: &'a str,
    entries: &'a [(Value, Value)],
}

impl<'a> Fields<'a> {
    /// Wrap a map value; `op` names the operation in errors
    pub fn new(op: &'a str, value: &'a Value) -> Result<Self> {
        let entries = value
            .as_map()
            .ok_or_else(|| param_error!("{} must be a map, got {}", op, value.type_name()))?;
        Ok(Fields { op, entries })
    }

    fn named(self, op: &'a str) -> Self {
        Fields { op, ..self }
    }

    /// Operation name used in errors
    pub fn op(&self) -> &str {
        self.op
    }

    /// Field value; `Nil` counts as absent
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
            .filter(|v| !v.is_nil())
    }

    /// Required field
    pub fn require(&self, name: &str) -> Result<&'a Value> {
        self.get(name)
            .ok_or_else(|| param_error!("missing required field '{}' for {}", name, self.op))
    }

    /// Required integer field
    pub fn int(&self, name: &str) -> Result<i64> {
        let v = self.require(name)?;
        v.as_int().ok_or_else(|| {
            param_error!("{} field '{}' must be an integer, got {}", self.op, name, v.type_name())
        })
    }

    /// Optional integer field
    pub fn opt_int(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(_) => self.int(name).map(Some),
        }
    }

    /// Integer field with a default
    pub fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        Ok(self.opt_int(name)?.unwrap_or(default))
    }

    /// Required string field
    pub fn string(&self, name: &str) -> Result<String> {
        let v = self.require(name)?;
        v.as_str().map(str::to_string).ok_or_else(|| {
            param_error!("{} field '{}' must be a string, got {}", self.op, name, v.type_name())
        })
    }

    /// Boolean field with a default
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(param_error!(
                "{} field '{}' must be a boolean, got {}",
                self.op,
                name,
                other.type_name()
            )),
        }
    }

    /// Required list field
    pub fn list(&self, name: &str) -> Result<&'a [Value]> {
        let v = self.require(name)?;
        v.as_list().ok_or_else(|| {
            param_error!("{} field '{}' must be a list, got {}", self.op, name, v.type_name())
        })
    }

    /// Required blob field
    pub fn blob(&self, name: &str) -> Result<Vec<u8>> {
        let v = self.require(name)?;
        v.as_blob().map(<[u8]>::to_vec).ok_or_else(|| {
            param_error!("{} field '{}' must be bytes, got {}", self.op, name, v.type_name())
        })
    }

    /// The `bin` field
    pub fn bin(&self) -> Result<BinName> {
        self.string("bin").map(BinName::from)
    }

    /// The optional `ctx` field
    pub fn ctx(&self) -> Result<CdtContext> {
        match self.get("ctx") {
            None => Ok(CdtContext::new()),
            Some(v) => CdtContext::decode(v),
        }
    }

    /// The required `return_type` field with its optional `inverted` flag
    pub fn return_type(&self) -> Result<ReturnType> {
        ReturnType::decode(self.require("return_type")?, self.get("inverted"))
    }

    /// `return_type` defaulting to none
    pub fn return_type_or_none(&self) -> Result<ReturnType> {
        match self.get("return_type") {
            None => ReturnType::decode(&Value::Int(ReturnKind::None.code()), self.get("inverted")),
            Some(v) => ReturnType::decode(v, self.get("inverted")),
        }
    }
}

/// Decode one loose-form operation.
///
/// # Examples
///
/// ```
/// use aeroclient_core::Value;
/// use aeroclient_operations::{decode_operation, Operation};
///
/// let op = decode_operation(&Value::map_from([
///     ("op", Value::from("increment")),
///     ("bin", Value::from("hits")),
///     ("val", Value::Int(1)),
/// ]))
/// .unwrap();
/// assert!(matches!(op, Operation::Increment { .. }));
/// ```
pub fn decode_operation(value: &Value) -> Result<Operation> {
    let fields = Fields::new("operation", value)?;
    let op_value = fields.require("op")?;
    let name = op_value
        .as_str()
        .ok_or_else(|| param_error!("operation 'op' must be a name, got {}", op_value))?;
    let f = fields.named(name);

    let op = match name {
        "read" => Operation::Read { bin: f.bin()? },
        "read_all" => Operation::ReadAll,
        "read_header" => Operation::ReadHeader,
        "write" => Operation::Write {
            bin: f.bin()?,
            value: f.require("val")?.clone(),
        },
        "increment" => Operation::Increment {
            bin: f.bin()?,
            value: f.require("val")?.clone(),
        },
        "append" => Operation::Append {
            bin: f.bin()?,
            value: f.require("val")?.clone(),
        },
        "prepend" => Operation::Prepend {
            bin: f.bin()?,
            value: f.require("val")?.clone(),
        },
        "touch" => Operation::Touch {
            ttl: Expiration::from_i64(f.int_or("val", 0)?)?,
        },
        "delete" => Operation::Delete,
        "delete_bin" => Operation::DeleteBin { bin: f.bin()? },
        "expression_read" => Operation::ExpRead {
            name: f.bin()?,
            expr: CompiledExpression::compile_any(f.require("expressions")?)?,
        },
        "expression_write" => Operation::ExpWrite {
            bin: f.bin()?,
            expr: CompiledExpression::compile_any(f.require("expressions")?)?,
            flags: ExpWriteFlags::from_bits(f.int_or("expression_write_flags", 0)?)?,
        },
        _ => {
            if let Some(sub) = name.strip_prefix("list_") {
                Operation::List {
                    bin: f.bin()?,
                    op: ListOp::decode(sub, &f)?,
                    ctx: f.ctx()?,
                }
            } else if let Some(sub) = name.strip_prefix("map_") {
                Operation::Map {
                    bin: f.bin()?,
                    op: MapOp::decode(sub, &f)?,
                    ctx: f.ctx()?,
                }
            } else if let Some(sub) = name.strip_prefix("bit_") {
                Operation::Bit {
                    bin: f.bin()?,
                    op: BitOp::decode(sub, &f)?,
                    ctx: f.ctx()?,
                }
            } else if let Some(sub) = name.strip_prefix("hll_") {
                Operation::Hll {
                    bin: f.bin()?,
                    op: HllOp::decode(sub, &f)?,
                }
            } else {
                return Err(param_error!("unknown operation {:?}", name));
            }
        }
    };
    Ok(op)
}

/// Decode a list of loose-form operations, preserving order
pub fn decode_operations(value: &Value) -> Result<Vec<Operation>> {
    value
        .as_list()
        .ok_or_else(|| param_error!("operations must be a list, got {}", value.type_name()))?
        .iter()
        .map(decode_operation)
        .collect()
}
