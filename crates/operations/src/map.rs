//! Map operations

use crate::cdt::MapOrder;
use crate::decode::Fields;
use crate::return_type::ReturnType;
use aeroclient_core::{param_error, Result, Value};
use serde::{Deserialize, Serialize};

/// Map write flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapWriteFlags(u8);

impl MapWriteFlags {
    /// Fail if the key already exists
    pub const CREATE_ONLY: MapWriteFlags = MapWriteFlags(1);
    /// Fail if the key does not exist
    pub const UPDATE_ONLY: MapWriteFlags = MapWriteFlags(2);
    /// Skip entries that violate a flag instead of failing
    pub const NO_FAIL: MapWriteFlags = MapWriteFlags(4);
    /// With `NO_FAIL`, keep the entries that succeeded
    pub const PARTIAL: MapWriteFlags = MapWriteFlags(8);

    /// Decode protocol bits
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..16).contains(&bits) || bits & 3 == 3 {
            return Err(param_error!("invalid map write_flags {}", bits));
        }
        Ok(MapWriteFlags(bits as u8))
    }

    /// Whether `other` is set
    pub fn contains(self, other: MapWriteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Protocol bits
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Ordering and write flags for map writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapPolicy {
    /// Order applied when the map is created
    pub order: MapOrder,
    /// Write flags
    pub flags: MapWriteFlags,
}

impl MapPolicy {
    /// Decode `{"map_order": .., "map_write_flags": ..}`
    pub fn decode(value: &Value) -> Result<Self> {
        let f = Fields::new("map_policy", value)?;
        Ok(MapPolicy {
            order: MapOrder::from_code(f.int_or("map_order", 0)?)?,
            flags: MapWriteFlags::from_bits(f.int_or("map_write_flags", 0)?)?,
        })
    }
}

/// Which map entries a selection operation targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapSelector {
    /// Entry with the key
    Key(Value),
    /// Entries with any of the keys
    KeyList(Vec<Value>),
    /// Entries with keys in `[begin, end)`
    KeyRange {
        /// Inclusive lower bound; `Nil` is unbounded
        begin: Value,
        /// Exclusive upper bound; `Infinity` is unbounded
        end: Value,
    },
    /// Entries by key index relative to a key
    KeyRelIndexRange {
        /// Anchor key
        key: Value,
        /// Index offset
        index: i64,
        /// Entry count; `None` means to the end
        count: Option<i64>,
    },
    /// Entries with the value
    Value(Value),
    /// Entries with any of the values
    ValueList(Vec<Value>),
    /// Entries with values in `[begin, end)`
    ValueRange {
        /// Inclusive lower bound; `Nil` is unbounded
        begin: Value,
        /// Exclusive upper bound; `Infinity` is unbounded
        end: Value,
    },
    /// Entries by value rank relative to a value
    ValueRelRankRange {
        /// Anchor value
        value: Value,
        /// Rank offset
        rank: i64,
        /// Entry count; `None` means to the largest
        count: Option<i64>,
    },
    /// Entry at key index
    Index(i64),
    /// Entries from key index
    IndexRange {
        /// Start index
        index: i64,
        /// Entry count; `None` means to the end
        count: Option<i64>,
    },
    /// Entry at value rank
    Rank(i64),
    /// Entries from value rank
    RankRange {
        /// Start rank
        rank: i64,
        /// Entry count; `None` means to the largest
        count: Option<i64>,
    },
}

impl MapSelector {
    /// Single-entry selectors cannot be inverted
    pub fn is_multi(&self) -> bool {
        !matches!(
            self,
            MapSelector::Key(_) | MapSelector::Index(_) | MapSelector::Rank(_)
        )
    }

    fn validate(&self) -> Result<()> {
        match self {
            MapSelector::KeyList(v) | MapSelector::ValueList(v) if v.is_empty() => {
                Err(param_error!("selector list cannot be empty"))
            }
            MapSelector::KeyRelIndexRange { count: Some(c), .. }
            | MapSelector::ValueRelRankRange { count: Some(c), .. }
            | MapSelector::IndexRange { count: Some(c), .. }
            | MapSelector::RankRange { count: Some(c), .. }
                if *c < 0 =>
            {
                Err(param_error!("count must be non-negative, got {}", c))
            }
            _ => Ok(()),
        }
    }

    fn decode(kind: &str, f: &Fields<'_>) -> Result<Self> {
        Ok(match kind {
            "key" => MapSelector::Key(f.require("key")?.clone()),
            "key_list" => MapSelector::KeyList(f.list("key_list")?.to_vec()),
            "key_range" => MapSelector::KeyRange {
                begin: f.get("key_begin").cloned().unwrap_or(Value::Nil),
                end: f.get("key_end").cloned().unwrap_or(Value::Infinity),
            },
            "key_index_range_relative" => MapSelector::KeyRelIndexRange {
                key: f.require("key")?.clone(),
                index: f.int("index")?,
                count: f.opt_int("count")?,
            },
            "value" => MapSelector::Value(f.require("val")?.clone()),
            "value_list" => MapSelector::ValueList(f.list("value_list")?.to_vec()),
            "value_range" => MapSelector::ValueRange {
                begin: f.get("value_begin").cloned().unwrap_or(Value::Nil),
                end: f.get("value_end").cloned().unwrap_or(Value::Infinity),
            },
            "value_rank_range_relative" => MapSelector::ValueRelRankRange {
                value: f.require("val")?.clone(),
                rank: f.int("rank")?,
                count: f.opt_int("count")?,
            },
            "index" => MapSelector::Index(f.int("index")?),
            "index_range" => MapSelector::IndexRange {
                index: f.int("index")?,
                count: f.opt_int("count")?,
            },
            "rank" => MapSelector::Rank(f.int("rank")?),
            "rank_range" => MapSelector::RankRange {
                rank: f.int("rank")?,
                count: f.opt_int("count")?,
            },
            other => return Err(param_error!("unknown map selector {:?}", other)),
        })
    }
}

/// One map operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapOp {
    /// Change the map's order
    SetPolicy(MapPolicy),
    /// Write one entry
    Put {
        /// Key
        key: Value,
        /// Value
        value: Value,
        /// Write policy
        policy: MapPolicy,
    },
    /// Write several entries
    PutItems {
        /// Entries in caller order
        items: Vec<(Value, Value)>,
        /// Write policy
        policy: MapPolicy,
    },
    /// Add to the number at key
    Increment {
        /// Key
        key: Value,
        /// Amount
        value: Value,
        /// Write policy
        policy: MapPolicy,
    },
    /// Subtract from the number at key
    Decrement {
        /// Key
        key: Value,
        /// Amount
        value: Value,
        /// Write policy
        policy: MapPolicy,
    },
    /// Remove every entry
    Clear,
    /// Number of entries
    Size,
    /// Select entries
    GetBy {
        /// Selection
        selector: MapSelector,
        /// Result shape
        return_type: ReturnType,
    },
    /// Remove selected entries
    RemoveBy {
        /// Selection
        selector: MapSelector,
        /// Result shape
        return_type: ReturnType,
    },
}

impl MapOp {
    /// Whether the operation modifies the record
    pub fn is_write(&self) -> bool {
        !matches!(self, MapOp::Size | MapOp::GetBy { .. })
    }

    /// Check arguments that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        match self {
            MapOp::PutItems { items, .. } if items.is_empty() => {
                Err(param_error!("map items cannot be empty"))
            }
            MapOp::GetBy {
                selector,
                return_type,
            }
            | MapOp::RemoveBy {
                selector,
                return_type,
            } => {
                selector.validate()?;
                if return_type.inverted && !selector.is_multi() {
                    return Err(param_error!(
                        "inverted is only allowed on range, value or list selectors"
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Decode the loose form; `sub` is the operation name without `map_`
    pub fn decode(sub: &str, f: &Fields<'_>) -> Result<Self> {
        let policy = || -> Result<MapPolicy> {
            f.get("map_policy")
                .map(MapPolicy::decode)
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let op = match sub {
            "set_policy" => MapOp::SetPolicy(MapPolicy::decode(f.require("map_policy")?)?),
            "put" => MapOp::Put {
                key: f.require("key")?.clone(),
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "put_items" => {
                let v = f.require("val")?;
                let items = v.as_map().ok_or_else(|| {
                    param_error!("{} field 'val' must be a map, got {}", f.op(), v.type_name())
                })?;
                MapOp::PutItems {
                    items: items.to_vec(),
                    policy: policy()?,
                }
            }
            "increment" => MapOp::Increment {
                key: f.require("key")?.clone(),
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "decrement" => MapOp::Decrement {
                key: f.require("key")?.clone(),
                value: f.require("val")?.clone(),
                policy: policy()?,
            },
            "clear" => MapOp::Clear,
            "size" => MapOp::Size,
            _ => {
                if let Some(kind) = sub.strip_prefix("get_by_") {
                    MapOp::GetBy {
                        selector: MapSelector::decode(kind, f)?,
                        return_type: f.return_type()?,
                    }
                } else if let Some(kind) = sub.strip_prefix("remove_by_") {
                    MapOp::RemoveBy {
                        selector: MapSelector::decode(kind, f)?,
                        return_type: f.return_type_or_none()?,
                    }
                } else {
                    return Err(param_error!("unknown map operation {:?}", sub));
                }
            }
        };
        op.validate()?;
        Ok(op)
    }
}
