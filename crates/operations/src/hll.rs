//! HyperLogLog operations

use crate::decode::Fields;
use aeroclient_core::{param_error, Result, Value};
use serde::{Deserialize, Serialize};

/// Smallest index bit count
pub const MIN_INDEX_BITS: u8 = 4;
/// Largest index bit count
pub const MAX_INDEX_BITS: u8 = 16;
/// Smallest non-zero minhash bit count
pub const MIN_MINHASH_BITS: u8 = 4;
/// Largest minhash bit count
pub const MAX_MINHASH_BITS: u8 = 51;

/// HLL write flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HllPolicy(u8);

impl HllPolicy {
    /// Fail if the bin exists
    pub const CREATE_ONLY: HllPolicy = HllPolicy(1);
    /// Fail if the bin does not exist
    pub const UPDATE_ONLY: HllPolicy = HllPolicy(2);
    /// Do not fail on a flag violation
    pub const NO_FAIL: HllPolicy = HllPolicy(4);
    /// Allow unions to fold to the smallest index bit count
    pub const ALLOW_FOLD: HllPolicy = HllPolicy(8);

    /// Decode protocol bits
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..16).contains(&bits) || bits & 3 == 3 {
            return Err(param_error!("invalid hll write_flags {}", bits));
        }
        Ok(HllPolicy(bits as u8))
    }

    /// Whether `other` is set
    pub fn contains(self, other: HllPolicy) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Index and minhash bit counts of an HLL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HllBits {
    /// Index bits, 4 through 16
    pub index_bits: u8,
    /// Minhash bits, 0 or 4 through 51
    pub minhash_bits: u8,
}

impl HllBits {
    /// Validate a bit-count pair
    pub fn new(index_bits: i64, minhash_bits: i64) -> Result<Self> {
        let index_bits = u8::try_from(index_bits)
            .ok()
            .filter(|b| (MIN_INDEX_BITS..=MAX_INDEX_BITS).contains(b))
            .ok_or_else(|| {
                param_error!(
                    "index_bit_count {} must be between {} and {}",
                    index_bits,
                    MIN_INDEX_BITS,
                    MAX_INDEX_BITS
                )
            })?;
        let minhash_bits = u8::try_from(minhash_bits)
            .ok()
            .filter(|b| *b == 0 || (MIN_MINHASH_BITS..=MAX_MINHASH_BITS).contains(b))
            .ok_or_else(|| {
                param_error!(
                    "mh_bit_count {} must be 0 or between {} and {}",
                    minhash_bits,
                    MIN_MINHASH_BITS,
                    MAX_MINHASH_BITS
                )
            })?;
        if index_bits + minhash_bits > 64 {
            return Err(param_error!(
                "index_bit_count + mh_bit_count must not exceed 64, got {}",
                index_bits + minhash_bits
            ));
        }
        Ok(HllBits {
            index_bits,
            minhash_bits,
        })
    }
}

/// One HLL operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HllOp {
    /// Create or reset the HLL
    Init {
        /// Bit counts
        bits: HllBits,
        /// Write policy
        policy: HllPolicy,
    },
    /// Add values, creating the HLL with `bits` when missing
    Add {
        /// Values to add
        values: Vec<Value>,
        /// Bit counts used on create
        bits: Option<HllBits>,
        /// Write policy
        policy: HllPolicy,
    },
    /// Union other HLLs into the bin
    SetUnion {
        /// Other HLLs
        hlls: Vec<Vec<u8>>,
        /// Write policy
        policy: HllPolicy,
    },
    /// Recompute the cached count
    RefreshCount,
    /// Reduce the index bit count
    Fold {
        /// New index bit count
        index_bits: u8,
    },
    /// Estimated cardinality
    GetCount,
    /// Union with other HLLs
    GetUnion {
        /// Other HLLs
        hlls: Vec<Vec<u8>>,
    },
    /// Estimated cardinality of the union
    GetUnionCount {
        /// Other HLLs
        hlls: Vec<Vec<u8>>,
    },
    /// Estimated cardinality of the intersection
    GetIntersectCount {
        /// Other HLLs
        hlls: Vec<Vec<u8>>,
    },
    /// Estimated similarity
    GetSimilarity {
        /// Other HLLs
        hlls: Vec<Vec<u8>>,
    },
    /// Index and minhash bit counts
    Describe,
}

impl HllOp {
    /// Whether the operation modifies the record
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            HllOp::Init { .. }
                | HllOp::Add { .. }
                | HllOp::SetUnion { .. }
                | HllOp::RefreshCount
                | HllOp::Fold { .. }
        )
    }

    /// Check arguments that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        match self {
            HllOp::Add { values, .. } if values.is_empty() => {
                Err(param_error!("hll_add needs at least one value"))
            }
            HllOp::SetUnion { hlls, .. }
            | HllOp::GetUnion { hlls }
            | HllOp::GetUnionCount { hlls }
            | HllOp::GetIntersectCount { hlls }
            | HllOp::GetSimilarity { hlls }
                if hlls.is_empty() =>
            {
                Err(param_error!("hll list cannot be empty"))
            }
            HllOp::Fold { index_bits }
                if !(MIN_INDEX_BITS..=MAX_INDEX_BITS).contains(index_bits) =>
            {
                Err(param_error!("fold index_bit_count {} out of range", index_bits))
            }
            _ => Ok(()),
        }
    }

    /// Decode the loose form; `sub` is the operation name without `hll_`
    pub fn decode(sub: &str, f: &Fields<'_>) -> Result<Self> {
        let policy = || -> Result<HllPolicy> {
            match f.get("policy") {
                None => Ok(HllPolicy::default()),
                Some(p) => {
                    let pf = Fields::new("hll_policy", p)?;
                    HllPolicy::from_bits(pf.int_or("flags", 0)?)
                }
            }
        };
        let hlls = || -> Result<Vec<Vec<u8>>> {
            f.list("val")?
                .iter()
                .map(|v| match v {
                    Value::Hll(b) | Value::Blob(b) => Ok(b.clone()),
                    other => Err(param_error!(
                        "{} expects HLL values, got {}",
                        f.op(),
                        other.type_name()
                    )),
                })
                .collect()
        };

        let op = match sub {
            "init" => HllOp::Init {
                bits: HllBits::new(f.int("index_bit_count")?, f.int_or("mh_bit_count", 0)?)?,
                policy: policy()?,
            },
            "add" => HllOp::Add {
                values: f.list("val")?.to_vec(),
                bits: match f.opt_int("index_bit_count")? {
                    None => None,
                    Some(ib) => Some(HllBits::new(ib, f.int_or("mh_bit_count", 0)?)?),
                },
                policy: policy()?,
            },
            "set_union" => HllOp::SetUnion {
                hlls: hlls()?,
                policy: policy()?,
            },
            "refresh_count" => HllOp::RefreshCount,
            "fold" => {
                let ib = f.int("index_bit_count")?;
                HllOp::Fold {
                    index_bits: u8::try_from(ib)
                        .map_err(|_| param_error!("index_bit_count {} out of range", ib))?,
                }
            }
            "get_count" => HllOp::GetCount,
            "get_union" => HllOp::GetUnion { hlls: hlls()? },
            "get_union_count" => HllOp::GetUnionCount { hlls: hlls()? },
            "get_intersect_count" => HllOp::GetIntersectCount { hlls: hlls()? },
            "get_similarity" => HllOp::GetSimilarity { hlls: hlls()? },
            "describe" => HllOp::Describe,
            other => return Err(param_error!("unknown hll operation {:?}", other)),
        };
        op.validate()?;
        Ok(op)
    }
}
