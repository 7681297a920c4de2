//! Bitwise operations on blob bins
//!
//! Offsets are signed (negative counts from the end) and must fit in 32
//! bits. Sizes are unsigned 32-bit. Integer operations address at most 64
//! bits.

use crate::decode::Fields;
use aeroclient_core::{check_u32, param_error, Result};
use serde::{Deserialize, Serialize};

/// Bit write flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitPolicy(u8);

impl BitPolicy {
    /// Fail if the bin exists
    pub const CREATE_ONLY: BitPolicy = BitPolicy(1);
    /// Fail if the bin does not exist
    pub const UPDATE_ONLY: BitPolicy = BitPolicy(2);
    /// Do not fail on a flag violation
    pub const NO_FAIL: BitPolicy = BitPolicy(4);
    /// Allow partial writes past the end of the blob
    pub const PARTIAL: BitPolicy = BitPolicy(8);

    /// Decode protocol bits
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..16).contains(&bits) || bits & 3 == 3 {
            return Err(param_error!("invalid bit_write_flags {}", bits));
        }
        Ok(BitPolicy(bits as u8))
    }

    /// Whether `other` is set
    pub fn contains(self, other: BitPolicy) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Resize behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResizeFlags(u8);

impl ResizeFlags {
    /// Add or remove bytes at the front
    pub const FROM_FRONT: ResizeFlags = ResizeFlags(1);
    /// Only grow
    pub const GROW_ONLY: ResizeFlags = ResizeFlags(2);
    /// Only shrink
    pub const SHRINK_ONLY: ResizeFlags = ResizeFlags(4);

    /// Decode protocol bits
    pub fn from_bits(bits: i64) -> Result<Self> {
        if !(0..8).contains(&bits) || bits & 6 == 6 {
            return Err(param_error!("invalid resize_flags {}", bits));
        }
        Ok(ResizeFlags(bits as u8))
    }

    /// Whether `other` is set
    pub fn contains(self, other: ResizeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// What add/subtract do on overflow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverflowAction {
    /// Fail the operation
    #[default]
    Fail,
    /// Clamp to the min/max
    Saturate,
    /// Wrap around
    Wrap,
}

impl OverflowAction {
    /// Decode a protocol code
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(OverflowAction::Fail),
            2 => Ok(OverflowAction::Saturate),
            4 => Ok(OverflowAction::Wrap),
            other => Err(param_error!("invalid overflow action {}", other)),
        }
    }
}

/// A span of bits inside the blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitRange {
    /// First bit; negative counts from the end
    pub offset: i32,
    /// Number of bits
    pub size: u32,
}

impl BitRange {
    /// Range from caller integers, checking field widths
    pub fn new(offset: i64, size: i64) -> Result<Self> {
        let offset = i32::try_from(offset).map_err(|_| {
            param_error!("bit_offset {} does not fit in a signed 32-bit field", offset)
        })?;
        let size = check_u32("bit_size", size)?;
        if size == 0 {
            return Err(param_error!("bit_size must be positive"));
        }
        Ok(BitRange { offset, size })
    }

    fn decode(f: &Fields<'_>) -> Result<Self> {
        BitRange::new(f.int("bit_offset")?, f.int("bit_size")?)
    }
}

/// One bit operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BitOp {
    /// Resize the blob to `byte_size` bytes
    Resize {
        /// New size in bytes
        byte_size: u32,
        /// Resize behavior
        flags: ResizeFlags,
        /// Write policy
        policy: BitPolicy,
    },
    /// Insert bytes at a byte offset
    Insert {
        /// Byte offset
        byte_offset: i32,
        /// Bytes to insert
        value: Vec<u8>,
        /// Write policy
        policy: BitPolicy,
    },
    /// Remove bytes at a byte offset
    Remove {
        /// Byte offset
        byte_offset: i32,
        /// Number of bytes
        byte_size: u32,
        /// Write policy
        policy: BitPolicy,
    },
    /// Overwrite bits
    Set {
        /// Target bits
        range: BitRange,
        /// Source bits, left-aligned
        value: Vec<u8>,
        /// Write policy
        policy: BitPolicy,
    },
    /// Bitwise or
    Or {
        /// Target bits
        range: BitRange,
        /// Operand
        value: Vec<u8>,
        /// Write policy
        policy: BitPolicy,
    },
    /// Bitwise xor
    Xor {
        /// Target bits
        range: BitRange,
        /// Operand
        value: Vec<u8>,
        /// Write policy
        policy: BitPolicy,
    },
    /// Bitwise and
    And {
        /// Target bits
        range: BitRange,
        /// Operand
        value: Vec<u8>,
        /// Write policy
        policy: BitPolicy,
    },
    /// Bitwise not
    Not {
        /// Target bits
        range: BitRange,
        /// Write policy
        policy: BitPolicy,
    },
    /// Shift left within the range
    LShift {
        /// Target bits
        range: BitRange,
        /// Shift amount
        shift: u32,
        /// Write policy
        policy: BitPolicy,
    },
    /// Shift right within the range
    RShift {
        /// Target bits
        range: BitRange,
        /// Shift amount
        shift: u32,
        /// Write policy
        policy: BitPolicy,
    },
    /// Add to the integer stored in the range
    Add {
        /// Target bits, at most 64
        range: BitRange,
        /// Amount
        value: i64,
        /// Treat the range as signed
        signed: bool,
        /// Overflow behavior
        action: OverflowAction,
        /// Write policy
        policy: BitPolicy,
    },
    /// Subtract from the integer stored in the range
    Subtract {
        /// Target bits, at most 64
        range: BitRange,
        /// Amount
        value: i64,
        /// Treat the range as signed
        signed: bool,
        /// Overflow behavior
        action: OverflowAction,
        /// Write policy
        policy: BitPolicy,
    },
    /// Store an integer in the range
    SetInt {
        /// Target bits, at most 64
        range: BitRange,
        /// Value
        value: i64,
        /// Write policy
        policy: BitPolicy,
    },
    /// Read bits
    Get {
        /// Source bits
        range: BitRange,
    },
    /// Count set bits
    Count {
        /// Source bits
        range: BitRange,
    },
    /// Offset of the first bit equal to `value` from the left
    LScan {
        /// Source bits
        range: BitRange,
        /// Bit value to find
        value: bool,
    },
    /// Offset of the first bit equal to `value` from the right
    RScan {
        /// Source bits
        range: BitRange,
        /// Bit value to find
        value: bool,
    },
    /// Read the range as an integer
    GetInt {
        /// Source bits, at most 64
        range: BitRange,
        /// Treat the range as signed
        signed: bool,
    },
}

impl BitOp {
    /// Whether the operation modifies the record
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            BitOp::Get { .. }
                | BitOp::Count { .. }
                | BitOp::LScan { .. }
                | BitOp::RScan { .. }
                | BitOp::GetInt { .. }
        )
    }

    /// Check arguments that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        match self {
            BitOp::Add { range, .. }
            | BitOp::Subtract { range, .. }
            | BitOp::SetInt { range, .. }
            | BitOp::GetInt { range, .. }
                if range.size > 64 =>
            {
                Err(param_error!(
                    "integer bit operations address at most 64 bits, got {}",
                    range.size
                ))
            }
            BitOp::Insert { value, .. } if value.is_empty() => {
                Err(param_error!("bit insert value cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Decode the loose form; `sub` is the operation name without `bit_`
    pub fn decode(sub: &str, f: &Fields<'_>) -> Result<Self> {
        let policy = || -> Result<BitPolicy> {
            match f.get("policy") {
                None => Ok(BitPolicy::default()),
                Some(p) => {
                    let pf = Fields::new("bit_policy", p)?;
                    BitPolicy::from_bits(pf.int_or("bit_write_flags", 0)?)
                }
            }
        };
        let byte_offset = || -> Result<i32> {
            let v = f.int("byte_offset")?;
            i32::try_from(v).map_err(|_| {
                param_error!("byte_offset {} does not fit in a signed 32-bit field", v)
            })
        };
        let action = || OverflowAction::from_code(f.int_or("action", 0)?);

        let op = match sub {
            "resize" => BitOp::Resize {
                byte_size: check_u32("byte_size", f.int("byte_size")?)?,
                flags: ResizeFlags::from_bits(f.int_or("resize_flags", 0)?)?,
                policy: policy()?,
            },
            "insert" => BitOp::Insert {
                byte_offset: byte_offset()?,
                value: f.blob("val")?,
                policy: policy()?,
            },
            "remove" => BitOp::Remove {
                byte_offset: byte_offset()?,
                byte_size: check_u32("byte_size", f.int("byte_size")?)?,
                policy: policy()?,
            },
            "set" => BitOp::Set {
                range: BitRange::decode(f)?,
                value: f.blob("val")?,
                policy: policy()?,
            },
            "or" => BitOp::Or {
                range: BitRange::decode(f)?,
                value: f.blob("val")?,
                policy: policy()?,
            },
            "xor" => BitOp::Xor {
                range: BitRange::decode(f)?,
                value: f.blob("val")?,
                policy: policy()?,
            },
            "and" => BitOp::And {
                range: BitRange::decode(f)?,
                value: f.blob("val")?,
                policy: policy()?,
            },
            "not" => BitOp::Not {
                range: BitRange::decode(f)?,
                policy: policy()?,
            },
            "lshift" => BitOp::LShift {
                range: BitRange::decode(f)?,
                shift: check_u32("shift", f.int("shift")?)?,
                policy: policy()?,
            },
            "rshift" => BitOp::RShift {
                range: BitRange::decode(f)?,
                shift: check_u32("shift", f.int("shift")?)?,
                policy: policy()?,
            },
            "add" => BitOp::Add {
                range: BitRange::decode(f)?,
                value: f.int("val")?,
                signed: f.bool_or("sign", false)?,
                action: action()?,
                policy: policy()?,
            },
            "subtract" => BitOp::Subtract {
                range: BitRange::decode(f)?,
                value: f.int("val")?,
                signed: f.bool_or("sign", false)?,
                action: action()?,
                policy: policy()?,
            },
            "set_int" => BitOp::SetInt {
                range: BitRange::decode(f)?,
                value: f.int("val")?,
                policy: policy()?,
            },
            "get" => BitOp::Get {
                range: BitRange::decode(f)?,
            },
            "count" => BitOp::Count {
                range: BitRange::decode(f)?,
            },
            "lscan" => BitOp::LScan {
                range: BitRange::decode(f)?,
                value: f.bool_or("val", true)?,
            },
            "rscan" => BitOp::RScan {
                range: BitRange::decode(f)?,
                value: f.bool_or("val", true)?,
            },
            "get_int" => BitOp::GetInt {
                range: BitRange::decode(f)?,
                signed: f.bool_or("sign", false)?,
            },
            other => return Err(param_error!("unknown bit operation {:?}", other)),
        };
        op.validate()?;
        Ok(op)
    }
}
