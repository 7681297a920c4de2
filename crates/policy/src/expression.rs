//! Filter expressions
//!
//! A filter expression is a boolean predicate evaluated server-side against
//! each record a command touches. A record the filter rejects fails with
//! `FilteredOut` (or is skipped, for scans and queries).
//!
//! Callers hand expressions over as nested lists, head first:
//!
//! ```text
//! ["and",
//!     ["gt", ["int_bin", "age"], 21],
//!     ["eq", ["str_bin", "country"], "NZ"]]
//! ```
//!
//! Scalars in operand position are literals; a list literal is written
//! `["val", [1, 2, 3]]`. Compilation decodes the tree, type-checks it, and
//! packs it with MessagePack into a [`CompiledExpression`].

use aeroclient_core::{Error, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpType {
    /// Nil
    Nil,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// String
    Str,
    /// List
    List,
    /// Map
    Map,
    /// Blob
    Blob,
    /// Float
    Float,
    /// GeoJSON
    Geo,
    /// HyperLogLog
    Hll,
}

impl ExpType {
    fn of(value: &Value) -> Option<ExpType> {
        Some(match value {
            Value::Nil => ExpType::Nil,
            Value::Bool(_) => ExpType::Bool,
            Value::Int(_) => ExpType::Int,
            Value::Float(_) => ExpType::Float,
            Value::String(_) => ExpType::Str,
            Value::Blob(_) => ExpType::Blob,
            Value::List(_) => ExpType::List,
            Value::Map(_) => ExpType::Map,
            Value::GeoJson(_) => ExpType::Geo,
            Value::Hll(_) => ExpType::Hll,
            Value::Wildcard | Value::Infinity => return None,
        })
    }

    fn orderable(self) -> bool {
        matches!(
            self,
            ExpType::Int | ExpType::Float | ExpType::Str | ExpType::Blob | ExpType::List
        )
    }
}

impl fmt::Display for ExpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CmpOp {
    fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
        }
    }

    fn from_name(name: &str) -> Option<CmpOp> {
        Some(match name {
            "eq" => CmpOp::Eq,
            "ne" => CmpOp::Ne,
            "gt" => CmpOp::Gt,
            "ge" => CmpOp::Ge,
            "lt" => CmpOp::Lt,
            "le" => CmpOp::Le,
            _ => return None,
        })
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal value
    Val(Value),
    /// Bin value read as the given type
    Bin {
        /// Bin name
        name: String,
        /// Expected type
        ty: ExpType,
    },
    /// Whether a bin exists
    BinExists(String),
    /// Particle type code of a bin
    BinType(String),
    /// Stored user key read as the given type
    Key(ExpType),
    /// Whether the user key is stored
    KeyExists,
    /// Set name of the record
    SetName,
    /// Seconds until expiry
    Ttl,
    /// Expiry timestamp
    VoidTime,
    /// Last update timestamp
    LastUpdate,
    /// Storage size of the record
    DeviceSize,
    /// Digest modulo the given divisor
    DigestModulo(i64),
    /// Binary comparison
    Cmp {
        /// Operator
        op: CmpOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Logical and
    And(Vec<Expr>),
    /// Logical or
    Or(Vec<Expr>),
    /// Logical not
    Not(Box<Expr>),
}

impl Expr {
    /// Literal
    pub fn val(v: impl Into<Value>) -> Expr {
        Expr::Val(v.into())
    }

    /// Integer bin
    pub fn int_bin(name: impl Into<String>) -> Expr {
        Expr::Bin {
            name: name.into(),
            ty: ExpType::Int,
        }
    }

    /// String bin
    pub fn str_bin(name: impl Into<String>) -> Expr {
        Expr::Bin {
            name: name.into(),
            ty: ExpType::Str,
        }
    }

    fn cmp(op: CmpOp, left: Expr, right: Expr) -> Expr {
        Expr::Cmp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `self == other`
    pub fn equals(self, other: Expr) -> Expr {
        Expr::cmp(CmpOp::Eq, self, other)
    }

    /// `self > other`
    pub fn greater_than(self, other: Expr) -> Expr {
        Expr::cmp(CmpOp::Gt, self, other)
    }

    /// `self < other`
    pub fn less_than(self, other: Expr) -> Expr {
        Expr::cmp(CmpOp::Lt, self, other)
    }

    /// Decode the list form.
    pub fn from_value(value: &Value) -> Result<Expr, ExpressionError> {
        let items = match value {
            Value::List(items) => match items.first() {
                Some(Value::String(_)) => items,
                _ => return Ok(Expr::Val(value.clone())),
            },
            Value::Nil => return Err(ExpressionError::Empty),
            Value::Wildcard | Value::Infinity => {
                return Err(ExpressionError::BadArgument {
                    op: "val".into(),
                    reason: "range sentinels are not expression values".into(),
                })
            }
            other => return Ok(Expr::Val(other.clone())),
        };
        let op = items[0].as_str().unwrap_or_default();
        let args = &items[1..];

        if let Some(cmp) = CmpOp::from_name(op) {
            arity(op, args, 2)?;
            return Ok(Expr::cmp(
                cmp,
                Expr::from_value(&args[0])?,
                Expr::from_value(&args[1])?,
            ));
        }

        let bin_type = |ty| -> Result<Expr, ExpressionError> {
            arity(op, args, 1)?;
            Ok(Expr::Bin {
                name: str_arg(op, &args[0])?,
                ty,
            })
        };

        match op {
            "val" => {
                arity(op, args, 1)?;
                Ok(Expr::Val(args[0].clone()))
            }
            "int_bin" => bin_type(ExpType::Int),
            "str_bin" => bin_type(ExpType::Str),
            "float_bin" => bin_type(ExpType::Float),
            "blob_bin" => bin_type(ExpType::Blob),
            "bool_bin" => bin_type(ExpType::Bool),
            "list_bin" => bin_type(ExpType::List),
            "map_bin" => bin_type(ExpType::Map),
            "geo_bin" => bin_type(ExpType::Geo),
            "hll_bin" => bin_type(ExpType::Hll),
            "bin_exists" => {
                arity(op, args, 1)?;
                Ok(Expr::BinExists(str_arg(op, &args[0])?))
            }
            "bin_type" => {
                arity(op, args, 1)?;
                Ok(Expr::BinType(str_arg(op, &args[0])?))
            }
            "key" => {
                arity(op, args, 1)?;
                let ty = match args[0].as_str() {
                    Some("int") => ExpType::Int,
                    Some("str") => ExpType::Str,
                    Some("blob") => ExpType::Blob,
                    _ => {
                        return Err(ExpressionError::BadArgument {
                            op: op.into(),
                            reason: "key type must be \"int\", \"str\" or \"blob\"".into(),
                        })
                    }
                };
                Ok(Expr::Key(ty))
            }
            "key_exists" => nullary(op, args, Expr::KeyExists),
            "set_name" => nullary(op, args, Expr::SetName),
            "ttl" => nullary(op, args, Expr::Ttl),
            "void_time" => nullary(op, args, Expr::VoidTime),
            "last_update" => nullary(op, args, Expr::LastUpdate),
            "device_size" => nullary(op, args, Expr::DeviceSize),
            "digest_modulo" => {
                arity(op, args, 1)?;
                let m = args[0].as_int().ok_or_else(|| ExpressionError::BadArgument {
                    op: op.into(),
                    reason: "divisor must be an integer".into(),
                })?;
                Ok(Expr::DigestModulo(m))
            }
            "and" | "or" => {
                let children = args
                    .iter()
                    .map(Expr::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if op == "and" {
                    Expr::And(children)
                } else {
                    Expr::Or(children)
                })
            }
            "not" => {
                arity(op, args, 1)?;
                Ok(Expr::Not(Box::new(Expr::from_value(&args[0])?)))
            }
            other => Err(ExpressionError::UnknownOp(other.to_string())),
        }
    }

    /// Type-check the tree and return its result type.
    pub fn result_type(&self) -> Result<ExpType, ExpressionError> {
        match self {
            Expr::Val(v) => ExpType::of(v).ok_or_else(|| ExpressionError::BadArgument {
                op: "val".into(),
                reason: format!("{} is not an expression value", v.type_name()),
            }),
            Expr::Bin { name, ty } => {
                if name.is_empty() {
                    return Err(ExpressionError::BadArgument {
                        op: "bin".into(),
                        reason: "bin name cannot be empty".into(),
                    });
                }
                Ok(*ty)
            }
            Expr::BinExists(_) | Expr::KeyExists => Ok(ExpType::Bool),
            Expr::BinType(_) => Ok(ExpType::Int),
            Expr::Key(ty) => Ok(*ty),
            Expr::SetName => Ok(ExpType::Str),
            Expr::Ttl | Expr::VoidTime | Expr::LastUpdate | Expr::DeviceSize => Ok(ExpType::Int),
            Expr::DigestModulo(m) => {
                if *m <= 0 {
                    return Err(ExpressionError::BadArgument {
                        op: "digest_modulo".into(),
                        reason: format!("divisor must be positive, got {}", m),
                    });
                }
                Ok(ExpType::Int)
            }
            Expr::Cmp { op, left, right } => {
                let l = left.result_type()?;
                let r = right.result_type()?;
                if l != r {
                    return Err(ExpressionError::TypeMismatch {
                        op: op.name(),
                        left: l,
                        right: r,
                    });
                }
                if !matches!(op, CmpOp::Eq | CmpOp::Ne) && !l.orderable() {
                    return Err(ExpressionError::BadArgument {
                        op: op.name().into(),
                        reason: format!("{} values cannot be ordered", l),
                    });
                }
                Ok(ExpType::Bool)
            }
            Expr::And(children) | Expr::Or(children) => {
                let op = if matches!(self, Expr::And(_)) { "and" } else { "or" };
                if children.is_empty() {
                    return Err(ExpressionError::Arity {
                        op: op.into(),
                        expected: "at least 1".into(),
                        actual: 0,
                    });
                }
                for c in children {
                    expect_bool(op, c)?;
                }
                Ok(ExpType::Bool)
            }
            Expr::Not(inner) => {
                expect_bool("not", inner)?;
                Ok(ExpType::Bool)
            }
        }
    }
}

fn expect_bool(op: &str, e: &Expr) -> Result<(), ExpressionError> {
    match e.result_type()? {
        ExpType::Bool => Ok(()),
        other => Err(ExpressionError::BadArgument {
            op: op.into(),
            reason: format!("operand must be boolean, got {}", other),
        }),
    }
}

fn arity(op: &str, args: &[Value], n: usize) -> Result<(), ExpressionError> {
    if args.len() != n {
        return Err(ExpressionError::Arity {
            op: op.into(),
            expected: n.to_string(),
            actual: args.len(),
        });
    }
    Ok(())
}

fn nullary(op: &str, args: &[Value], e: Expr) -> Result<Expr, ExpressionError> {
    arity(op, args, 0)?;
    Ok(e)
}

fn str_arg(op: &str, v: &Value) -> Result<String, ExpressionError> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| ExpressionError::BadArgument {
            op: op.into(),
            reason: format!("expected a string, got {}", v.type_name()),
        })
}

/// Expression compilation errors
#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    /// Nothing to compile
    #[error("expression is empty")]
    Empty,
    /// Operator name not recognized
    #[error("unknown expression operator {0:?}")]
    UnknownOp(String),
    /// Wrong number of operands
    #[error("{op} expects {expected} operand(s), got {actual}")]
    Arity {
        /// Operator
        op: String,
        /// Expected count
        expected: String,
        /// Actual count
        actual: usize,
    },
    /// Operand types differ
    #[error("{op}: operand types differ ({left} vs {right})")]
    TypeMismatch {
        /// Operator
        op: &'static str,
        /// Left type
        left: ExpType,
        /// Right type
        right: ExpType,
    },
    /// Top-level expression is not a predicate
    #[error("filter expression must be boolean, got {0}")]
    NotBoolean(ExpType),
    /// Operand is malformed
    #[error("{op}: {reason}")]
    BadArgument {
        /// Operator
        op: String,
        /// What is wrong
        reason: String,
    },
    /// Packing failed
    #[error("failed to pack expression: {0}")]
    Pack(String),
}

impl From<ExpressionError> for Error {
    fn from(e: ExpressionError) -> Self {
        Error::param(format!("invalid filter expression: {}", e))
    }
}

/// Type-checked, packed filter expression ready to travel with a policy
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    expr: Expr,
    packed: Vec<u8>,
}

impl CompiledExpression {
    /// Compile the list form of an expression
    pub fn compile(value: &Value) -> Result<Self, ExpressionError> {
        Self::from_expr(Expr::from_value(value)?)
    }

    /// Type-check and pack an expression tree
    pub fn from_expr(expr: Expr) -> Result<Self, ExpressionError> {
        match expr.result_type()? {
            ExpType::Bool => {}
            other => return Err(ExpressionError::NotBoolean(other)),
        }
        Self::pack(expr)
    }

    /// Compile an expression of any result type, for expression reads and writes
    pub fn compile_any(value: &Value) -> Result<Self, ExpressionError> {
        let expr = Expr::from_value(value)?;
        expr.result_type()?;
        Self::pack(expr)
    }

    fn pack(expr: Expr) -> Result<Self, ExpressionError> {
        let packed = rmp_serde::to_vec(&expr).map_err(|e| ExpressionError::Pack(e.to_string()))?;
        Ok(CompiledExpression { expr, packed })
    }

    /// Expression tree
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Packed MessagePack form
    pub fn packed(&self) -> &[u8] {
        &self.packed
    }
}
