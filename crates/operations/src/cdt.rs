//! CDT context: addressing a value nested inside lists and maps
//!
//! A context is an ordered path of steps applied from the bin's top-level
//! value inward. Only the terminal step may ask the server to create the
//! missing container.

use crate::decode::Fields;
use aeroclient_core::{param_error, Result, Value};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// List ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListOrder {
    /// Insertion order
    #[default]
    Unordered,
    /// Sorted by value
    Ordered,
}

impl ListOrder {
    /// Decode a protocol code
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ListOrder::Unordered),
            1 => Ok(ListOrder::Ordered),
            other => Err(param_error!("invalid list_order {}", other)),
        }
    }
}

/// Map ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapOrder {
    /// Insertion order
    #[default]
    Unordered,
    /// Sorted by key
    KeyOrdered,
    /// Sorted by key, indexed by value
    KeyValueOrdered,
}

impl MapOrder {
    /// Decode a protocol code
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(MapOrder::Unordered),
            1 => Ok(MapOrder::KeyOrdered),
            3 => Ok(MapOrder::KeyValueOrdered),
            other => Err(param_error!("invalid map_order {}", other)),
        }
    }
}

/// Container to create when the terminal step is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CtxCreate {
    /// Create a list, padding with nils up to the index when `pad` is set
    List {
        /// Order of the created list
        order: ListOrder,
        /// Pad with nils up to the index
        pad: bool,
    },
    /// Create a map
    Map(MapOrder),
}

/// One navigation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CtxStep {
    /// List element at index (negative counts from the end)
    ListIndex(i64),
    /// List element at rank
    ListRank(i64),
    /// First list element equal to the value
    ListValue(Value),
    /// Map entry at index in key order
    MapIndex(i64),
    /// Map entry at value rank
    MapRank(i64),
    /// Map entry with the key
    MapKey(Value),
    /// First map entry with the value
    MapValue(Value),
}

impl CtxStep {
    fn name(&self) -> &'static str {
        match self {
            CtxStep::ListIndex(_) => "list_index",
            CtxStep::ListRank(_) => "list_rank",
            CtxStep::ListValue(_) => "list_value",
            CtxStep::MapIndex(_) => "map_index",
            CtxStep::MapRank(_) => "map_rank",
            CtxStep::MapKey(_) => "map_key",
            CtxStep::MapValue(_) => "map_value",
        }
    }
}

/// Path from the bin value to a nested container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CdtContext {
    steps: SmallVec<[CtxStep; 4]>,
    create: Option<CtxCreate>,
}

impl CdtContext {
    /// Empty context: operate on the bin's top-level value
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn push(mut self, step: CtxStep) -> Result<Self> {
        if self.create.is_some() {
            return Err(param_error!(
                "context step {} follows a create step; create is only allowed on the last step",
                step.name()
            ));
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Append the terminal step with create-on-missing
    pub fn push_create(self, step: CtxStep, create: CtxCreate) -> Result<Self> {
        match (&step, create) {
            (CtxStep::ListIndex(_), CtxCreate::List { .. })
            | (CtxStep::MapKey(_), CtxCreate::Map(_)) => {}
            _ => {
                return Err(param_error!(
                    "create is only supported on list_index and map_key steps, not {}",
                    step.name()
                ))
            }
        }
        let mut ctx = self.push(step)?;
        ctx.create = Some(create);
        Ok(ctx)
    }

    /// Steps in order
    pub fn steps(&self) -> &[CtxStep] {
        &self.steps
    }

    /// Create request on the terminal step
    pub fn create(&self) -> Option<CtxCreate> {
        self.create
    }

    /// True when the operation targets the bin's top-level value
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Decode the loose form: a list of maps
    /// `{"type": "list_index", "value": 1, "create": ..., "order": ..., "pad": ...}`
    pub fn decode(value: &Value) -> Result<Self> {
        let items = value
            .as_list()
            .ok_or_else(|| param_error!("ctx must be a list, got {}", value.type_name()))?;
        let mut ctx = CdtContext::new();
        for item in items {
            let fields = Fields::new("ctx", item)?;
            let kind = fields.string("type")?;
            let step = match kind.as_str() {
                "list_index" => CtxStep::ListIndex(fields.int("value")?),
                "list_rank" => CtxStep::ListRank(fields.int("value")?),
                "list_value" => CtxStep::ListValue(fields.require("value")?.clone()),
                "map_index" => CtxStep::MapIndex(fields.int("value")?),
                "map_rank" => CtxStep::MapRank(fields.int("value")?),
                "map_key" => CtxStep::MapKey(fields.require("value")?.clone()),
                "map_value" => CtxStep::MapValue(fields.require("value")?.clone()),
                other => return Err(param_error!("unknown ctx step type {:?}", other)),
            };
            if fields.bool_or("create", false)? {
                let create = match step {
                    CtxStep::MapKey(_) => {
                        CtxCreate::Map(MapOrder::from_code(fields.int_or("order", 0)?)?)
                    }
                    _ => CtxCreate::List {
                        order: ListOrder::from_code(fields.int_or("order", 0)?)?,
                        pad: fields.bool_or("pad", false)?,
                    },
                };
                ctx = ctx.push_create(step, create)?;
            } else {
                ctx = ctx.push(step)?;
            }
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(kind: &str, value: Value, create: bool) -> Value {
        Value::map_from([
            ("type", Value::String(kind.into())),
            ("value", value),
            ("create", Value::Bool(create)),
        ])
    }

    #[test]
    fn test_build_path() {
        let ctx = CdtContext::new()
            .push(CtxStep::MapKey(Value::String("a".into())))
            .unwrap()
            .push(CtxStep::ListIndex(-1))
            .unwrap();
        assert_eq!(ctx.steps().len(), 2);
        assert!(ctx.create().is_none());
    }

    #[test]
    fn test_create_only_on_terminal_step() {
        let ctx = CdtContext::new()
            .push_create(
                CtxStep::ListIndex(3),
                CtxCreate::List {
                    order: ListOrder::Unordered,
                    pad: true,
                },
            )
            .unwrap();
        assert!(ctx.push(CtxStep::ListIndex(0)).is_err());
    }

    #[test]
    fn test_create_rejected_on_rank_step() {
        let err = CdtContext::new()
            .push_create(CtxStep::ListRank(0), CtxCreate::Map(MapOrder::KeyOrdered))
            .unwrap_err();
        assert!(err.is_param());
    }

    #[test]
    fn test_decode_loose_form() {
        let v = Value::List(vec![
            step("map_key", Value::String("scores".into()), false),
            step("list_index", Value::Int(0), true),
        ]);
        let ctx = CdtContext::decode(&v).unwrap();
        assert_eq!(ctx.steps()[1], CtxStep::ListIndex(0));
        assert!(matches!(ctx.create(), Some(CtxCreate::List { .. })));
    }

    #[test]
    fn test_decode_create_not_last() {
        let v = Value::List(vec![
            step("map_key", Value::String("a".into()), true),
            step("list_index", Value::Int(0), false),
        ]);
        assert!(CdtContext::decode(&v).unwrap_err().is_param());
    }

    #[test]
    fn test_decode_missing_value() {
        let v = Value::List(vec![Value::map_from([("type", Value::String("list_index".into()))])]);
        let err = CdtContext::decode(&v).unwrap_err();
        assert!(err.message().contains("value"));
    }
}
