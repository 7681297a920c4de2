//! List operations

use crate::cdt::ListOrder;
use crate::decode::Fields;
use crate::return_type::{ReturnKind, ReturnType};
use aeroclient_core::{param_error, Result, Value};
use serde::{Deserialize, Serialize};

/// List write flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListWriteFlags(u8);

impl ListWriteFlags {
    /// Reject values already present
    pub const ADD_UNIQUE: ListWriteFlags = ListWriteFlags(1);
    /// Reject inserts outside the current bounds
    pub const INSERT_BOUNDED: ListWriteFlags = ListWriteFlags(2);
    /// Skip items that violate a flag instead of failing
    pub const NO_FAIL: ListWriteFlags = ListWriteFlags(4);
    /// With `NO_FAIL`, keep the items that succeeded
    pub const PARTIAL: ListWriteFlags = ListWriteFlags(8);

    /// Decode protocol bits
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..16).contains(&bits) {
            return Err(param_error!("invalid list write_flags {}", bits));
        }
        Ok(ListWriteFlags(bits as u8))
    }

    /// Whether `other` is set
    pub fn contains(self, other: ListWriteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Protocol bits
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for ListWriteFlags {
    type Output = ListWriteFlags;

    fn bitor(self, rhs: Self) -> Self {
        ListWriteFlags(self.0 | rhs.0)
    }
}

/// Ordering and write flags for list writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListPolicy {
    /// Order applied when the list is created
    pub order: ListOrder,
    /// Write flags
    pub flags: ListWriteFlags,
}

impl ListPolicy {
    /// Decode `{"list_order": .., "write_flags": ..}`
    pub fn decode(value: &Value) -> Result<Self> {
        let f = Fields::new("list_policy", value)?;
        Ok(ListPolicy {
            order: ListOrder::from_code(f.int_or("list_order", 0)?)?,
            flags: ListWriteFlags::from_bits(f.int_or("write_flags", 0)?)?,
        })
    }
}

/// Which list items a selection operation targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListSelector {
    /// Item at index
    Index(i64),
    /// `count` items from index, or all to the end
    IndexRange {
        /// Start index
        index: i64,
        /// Item count; `None` means to the end
        count: Option<i64>,
    },
    /// Item at rank
    Rank(i64),
    /// `count` items from rank, or all to the largest
    RankRange {
        /// Start rank
        rank: i64,
        /// Item count; `None` means to the largest
        count: Option<i64>,
    },
    /// Items equal to the value
    Value(Value),
    /// Items equal to any of the values
    ValueList(Vec<Value>),
    /// Items in `[begin, end)`
    ValueRange {
        /// Inclusive lower bound; `Nil` is unbounded
        begin: Value,
        /// Exclusive upper bound; `Infinity` is unbounded
        end: Value,
    },
    /// Items by rank relative to a value
    ValueRelRankRange {
        /// Anchor value
        value: Value,
        /// Rank offset from the anchor
        rank: i64,
        /// Item count; `None` means to the largest
        count: Option<i64>,
    },
}

impl ListSelector {
    /// Single-item selectors cannot be inverted
    pub fn is_multi(&self) -> bool {
        !matches!(self, ListSelector::Index(_) | ListSelector::Rank(_))
    }

    fn validate(&self) -> Result<()> {
        let count = match self {
            ListSelector::IndexRange { count, .. }
            | ListSelector::RankRange { count, .. }
            | ListSelector::ValueRelRankRange { count, .. } => *count,
            ListSelector::ValueList(values) if values.is_empty() => {
                return Err(param_error!("value_list cannot be empty"))
            }
            _ => None,
        };
        if let Some(c) = count {
            if c < 0 {
                return Err(param_error!("count must be non-negative, got {}", c));
            }
        }
        Ok(())
    }

    fn decode(kind: &str, f: &Fields<'_>) -> Result<Self> {
        Ok(match kind {
            "index" => ListSelector::Index(f.int("index")?),
            "index_range" => ListSelector::IndexRange {
                index: f.int("index")?,
                count: f.opt_int("count")?,
            },
            "rank" => ListSelector::Rank(f.int("rank")?),
            "rank_range" => ListSelector::RankRange {
                rank: f.int("rank")?,
                count: f.opt_int("count")?,
            },
            "value" => ListSelector::Value(f.require("val")?.clone()),
            "value_list" => ListSelector::ValueList(f.list("value_list")?.to_vec()),
            "value_range" => ListSelector::ValueRange {
                begin: f.get("value_begin").cloned().unwrap_or(Value::Nil),
                end: f.get("value_end").cloned().unwrap_or(Value::Infinity),
            },
            "value_rank_range_relative" => ListSelector::ValueRelRankRange {
                value: f.require("val")?.clone(),
                rank: f.int("rank")?,
                count: f.opt_int("count")?,
            },
            other => return Err(param_error!("unknown list selector {:?}", other)),
        })
    }
}

/// One list operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListOp {
    /// Change the list's order
    SetOrder(ListOrder),
    /// Sort in place
    Sort {
        /// Remove duplicate values while sorting
        drop_duplicates: bool,
    },
    /// Append one value
    Append {
        /// Value
        value: Value,
        /// Write policy
        policy: ListPolicy,
    },
    /// Append several values
    AppendItems {
        /// Values
        values: Vec<Value>,
        /// Write policy
        policy: ListPolicy,
    },
    /// Insert one value at index
    Insert {
        /// Index
        index: i64,
        /// Value
        value: Value,
        /// Write policy
        policy: ListPolicy,
    },
    /// Insert several values at index
    InsertItems {
        /// Index
        index: i64,
        /// Values
        values: Vec<Value>,
        /// Write policy
        policy: ListPolicy,
    },
    /// Add to the number at index
    Increment {
        /// Index
        index: i64,
        /// Amount
        value: Value,
        /// Write policy
        policy: ListPolicy,
    },
    /// Overwrite the item at index
    Set {
        /// Index
        index: i64,
        /// Value
        value: Value,
        /// Write policy
        policy: ListPolicy,
    },
    /// Remove and return the item at index
    Pop {
        /// Index
        index: i64,
    },
    /// Remove and return `count` items from index
    PopRange {
        /// Index
        index: i64,
        /// Count; `None` means to the end
        count: Option<i64>,
    },
    /// Remove the item at index
    Remove {
        /// Index
        index: i64,
    },
    /// Remove `count` items from index
    RemoveRange {
        /// Index
        index: i64,
        /// Count; `None` means to the end
        count: Option<i64>,
    },
    /// Keep only `count` items from index
    Trim {
        /// Index
        index: i64,
        /// Count
        count: i64,
    },
    /// Remove every item
    Clear,
    /// Number of items
    Size,
    /// Item at index
    Get {
        /// Index
        index: i64,
    },
    /// `count` items from index
    GetRange {
        /// Index
        index: i64,
        /// Count; `None` means to the end
        count: Option<i64>,
    },
    /// Select items
    GetBy {
        /// Selection
        selector: ListSelector,
        /// Result shape
        return_type: ReturnType,
    },
    /// Remove selected items
    RemoveBy {
        /// Selection
        selector: ListSelector,
        /// Result shape
        return_type: ReturnType,
    },
}

impl ListOp {
    /// Whether the operation modifies the record
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            ListOp::Size | ListOp::Get { .. } | ListOp::GetRange { .. } | ListOp::GetBy { .. }
        )
    }

    /// Check arguments that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        match self {
            ListOp::AppendItems { values, .. } | ListOp::InsertItems { values, .. } => {
                if values.is_empty() {
                    return Err(param_error!("list items cannot be empty"));
                }
            }
            ListOp::PopRange { count: Some(c), .. }
            | ListOp::RemoveRange { count: Some(c), .. }
            | ListOp::GetRange { count: Some(c), .. }
            | ListOp::Trim { count: c, .. } => {
                if *c < 0 {
                    return Err(param_error!("count must be non-negative, got {}", c));
                }
            }
            ListOp::GetBy {
                selector,
                return_type,
            }
            | ListOp::RemoveBy {
                selector,
                return_type,
            } => {
                selector.validate()?;
                if return_type.inverted && !selector.is_multi() {
                    return Err(param_error!(
                        "inverted is only allowed on range, value or list selectors"
                    ));
                }
                if matches!(return_type.kind, ReturnKind::Key | ReturnKind::KeyValue) {
                    return Err(param_error!(
                        "return type {:?} is not valid for list operations",
                        return_type.kind
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Decode the loose form; `sub` is the operation name without `list_`
    pub fn decode(sub: &str, f: &Fields<'_>) -> Result<Self> {
        let policy = || -> Result<ListPolicy> {
            f.get("list_policy")
                .map(ListPolicy::decode)
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let op = match sub {
            "set_order" => ListOp::SetOrder(ListOrder::from_code(f.int("list_order")?)?),
            "sort" => ListOp::Sort {
                drop_duplicates: f.int_or("sort_flags", 0)? & 2 != 0,
            },
            "append" => ListOp::Append {
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "append_items" => ListOp::AppendItems {
                values: f.list("val")?.to_vec(),
                policy: policy()?,
            },
            "insert" => ListOp::Insert {
                index: f.int("index")?,
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "insert_items" => ListOp::InsertItems {
                index: f.int("index")?,
                values: f.list("val")?.to_vec(),
                policy: policy()?,
            },
            "increment" => ListOp::Increment {
                index: f.int("index")?,
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "set" => ListOp::Set {
                index: f.int("index")?,
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "pop" => ListOp::Pop {
                index: f.int("index")?,
            },
            "pop_range" => ListOp::PopRange {
                index: f.int("index")?,
                count: f.opt_int("count")?,
            },
            "remove" => ListOp::Remove {
                index: f.int("index")?,
            },
            "remove_range" => ListOp::RemoveRange {
                index: f.int("index")?,
                count: f.opt_int("count")?,
            },
            "trim" => ListOp::Trim {
                index: f.int("index")?,
                count: f.int("count")?,
            },
            "clear" => ListOp::Clear,
            "size" => ListOp::Size,
            "get" => ListOp::Get {
                index: f.int("index")?,
            },
            "get_range" => ListOp::GetRange {
                index: f.int("index")?,
                count: f.opt_int("count")?,
            },
            _ => {
                if let Some(kind) = sub.strip_prefix("get_by_") {
                    ListOp::GetBy {
                        selector: ListSelector::decode(kind, f)?,
                        return_type: f.return_type()?,
                    }
                } else if let Some(kind) = sub.strip_prefix("remove_by_") {
                    ListOp::RemoveBy {
                        selector: ListSelector::decode(kind, f)?,
                        return_type: f.return_type_or_none()?,
                    }
                } else {
                    return Err(param_error!("unknown list operation {:?}", sub));
                }
            }
        };
        op.validate()?;
        Ok(op)
    }
}
