//! Legacy predicate lists
//!
//! Older callers filter with a postfix list of predicate entries instead of
//! an expression tree. Each entry is either a bare name or a list of the name
//! followed by its arguments:
//!
//! ```text
//! [["integer_bin", "age"], ["integer_value", 21], "integer_greater"]
//! ```
//!
//! Entries are evaluated on a stack and the single boolean left at the end
//! becomes an [`Expr`], so both filter styles travel the same way.

use crate::expression::{CmpOp, CompiledExpression, ExpType, Expr, ExpressionError};
use aeroclient_core::Value;

/// Compile a legacy predicate list into a filter expression.
pub fn compile_predexp(value: &Value) -> Result<CompiledExpression, ExpressionError> {
    let entries = value.as_list().ok_or_else(|| ExpressionError::BadArgument {
        op: "predexp".into(),
        reason: format!("must be a list, got {}", value.type_name()),
    })?;
    if entries.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut stack: Vec<Expr> = Vec::with_capacity(entries.len());
    for entry in entries {
        let (name, args) = split_entry(entry)?;
        match name {
            "integer_bin" => stack.push(bin(name, args, ExpType::Int)?),
            "string_bin" => stack.push(bin(name, args, ExpType::Str)?),
            "geojson_bin" => stack.push(bin(name, args, ExpType::Geo)?),
            "list_bin" => stack.push(bin(name, args, ExpType::List)?),
            "map_bin" => stack.push(bin(name, args, ExpType::Map)?),
            "integer_value" => stack.push(Expr::Val(Value::Int(int_arg(name, args)?))),
            "string_value" => stack.push(Expr::Val(Value::String(str_arg(name, args)?))),
            "geojson_value" => stack.push(Expr::Val(Value::GeoJson(str_arg(name, args)?))),
            "rec_void_time" => stack.push(Expr::VoidTime),
            "rec_last_update" => stack.push(Expr::LastUpdate),
            "rec_device_size" => stack.push(Expr::DeviceSize),
            "rec_digest_modulo" => stack.push(Expr::DigestModulo(int_arg(name, args)?)),
            "predexp_and" | "predexp_or" => {
                let n = int_arg(name, args)?;
                let n = usize::try_from(n).map_err(|_| bad(name, "count must be positive"))?;
                if n == 0 || n > stack.len() {
                    return Err(bad(name, "count exceeds available predicates"));
                }
                let children = stack.split_off(stack.len() - n);
                stack.push(if name == "predexp_and" {
                    Expr::And(children)
                } else {
                    Expr::Or(children)
                });
            }
            "predexp_not" => {
                let inner = pop(&mut stack, name)?;
                stack.push(Expr::Not(Box::new(inner)));
            }
            other => {
                let op = comparison(other).ok_or_else(|| ExpressionError::UnknownOp(other.into()))?;
                let right = pop(&mut stack, other)?;
                let left = pop(&mut stack, other)?;
                stack.push(Expr::Cmp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
        }
    }

    if stack.len() != 1 {
        return Err(bad(
            "predexp",
            &format!("list must reduce to one predicate, {} left", stack.len()),
        ));
    }
    let root = stack.pop().ok_or(ExpressionError::Empty)?;
    CompiledExpression::from_expr(root)
}

fn comparison(name: &str) -> Option<CmpOp> {
    Some(match name {
        "integer_equal" | "string_equal" => CmpOp::Eq,
        "integer_unequal" | "string_unequal" => CmpOp::Ne,
        "integer_greater" => CmpOp::Gt,
        "integer_greatereq" => CmpOp::Ge,
        "integer_less" => CmpOp::Lt,
        "integer_lesseq" => CmpOp::Le,
        _ => return None,
    })
}

fn split_entry(entry: &Value) -> Result<(&str, &[Value]), ExpressionError> {
    match entry {
        Value::String(name) => {
            let no_args: &[Value] = &[];
            Ok((name.as_str(), no_args))
        }
        Value::List(items) => match items.split_first() {
            Some((Value::String(name), rest)) => Ok((name.as_str(), rest)),
            _ => Err(bad("predexp", "entry must start with a predicate name")),
        },
        other => Err(bad(
            "predexp",
            &format!("entry must be a name or a list, got {}", other.type_name()),
        )),
    }
}

fn pop(stack: &mut Vec<Expr>, op: &str) -> Result<Expr, ExpressionError> {
    stack
        .pop()
        .ok_or_else(|| bad(op, "not enough operands on the predicate stack"))
}

fn bin(op: &str, args: &[Value], ty: ExpType) -> Result<Expr, ExpressionError> {
    Ok(Expr::Bin {
        name: str_arg(op, args)?,
        ty,
    })
}

fn int_arg(op: &str, args: &[Value]) -> Result<i64, ExpressionError> {
    match args {
        [Value::Int(i)] => Ok(*i),
        _ => Err(bad(op, "expects one integer argument")),
    }
}

fn str_arg(op: &str, args: &[Value]) -> Result<String, ExpressionError> {
    match args {
        [Value::String(s)] => Ok(s.clone()),
        _ => Err(bad(op, "expects one string argument")),
    }
}

fn bad(op: &str, reason: &str) -> ExpressionError {
    ExpressionError::BadArgument {
        op: op.into(),
        reason: reason.into(),
    }
}
