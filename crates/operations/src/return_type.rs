//! Result shape of list and map selection operations

use aeroclient_core::{param_error, Result, Value};
use serde::{Deserialize, Serialize};

/// Wire flag set on the return type code when selection is inverted
pub const INVERTED_FLAG: i64 = 0x10000;

/// What a selection operation returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnKind {
    /// Nothing
    None,
    /// Index of each selected item
    Index,
    /// Index counted from the end
    ReverseIndex,
    /// Rank of each selected item
    Rank,
    /// Rank counted from the largest
    ReverseRank,
    /// Number of selected items
    Count,
    /// Map keys of selected entries
    Key,
    /// Values of selected items
    Value,
    /// Key/value pairs of selected entries
    KeyValue,
    /// Whether anything was selected
    Exists,
}

impl ReturnKind {
    /// Protocol code
    pub fn code(self) -> i64 {
        match self {
            ReturnKind::None => 0,
            ReturnKind::Index => 1,
            ReturnKind::ReverseIndex => 2,
            ReturnKind::Rank => 3,
            ReturnKind::ReverseRank => 4,
            ReturnKind::Count => 5,
            ReturnKind::Key => 6,
            ReturnKind::Value => 7,
            ReturnKind::KeyValue => 8,
            ReturnKind::Exists => 13,
        }
    }

    /// Decode a protocol code
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ReturnKind::None,
            1 => ReturnKind::Index,
            2 => ReturnKind::ReverseIndex,
            3 => ReturnKind::Rank,
            4 => ReturnKind::ReverseRank,
            5 => ReturnKind::Count,
            6 => ReturnKind::Key,
            7 => ReturnKind::Value,
            8 => ReturnKind::KeyValue,
            13 => ReturnKind::Exists,
            _ => return None,
        })
    }
}

/// Requested return type: a kind plus the inverted-selection flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnType {
    /// What to return
    pub kind: ReturnKind,
    /// Select everything *except* the matched items
    pub inverted: bool,
}

impl ReturnType {
    /// Non-inverted return type
    pub fn new(kind: ReturnKind) -> Self {
        ReturnType {
            kind,
            inverted: false,
        }
    }

    /// Inverted return type
    pub fn inverted(kind: ReturnKind) -> Self {
        ReturnType {
            kind,
            inverted: true,
        }
    }

    /// Decode from a kind code and a separate `inverted` flag.
    ///
    /// A kind code that already carries [`INVERTED_FLAG`] is accepted.
    /// `inverted` must be a boolean when present.
    pub fn decode(kind: &Value, inverted: Option<&Value>) -> Result<Self> {
        let code = kind
            .as_int()
            .ok_or_else(|| {
                param_error!("return_type must be an integer, got {}", kind.type_name())
            })?;
        let flagged = code & INVERTED_FLAG != 0;
        let kind = ReturnKind::from_code(code & !INVERTED_FLAG)
            .ok_or_else(|| param_error!("invalid return_type {}", code))?;
        let inverted = match inverted {
            None | Some(Value::Nil) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(param_error!(
                    "inverted must be a boolean, got {}",
                    other.type_name()
                ))
            }
        };
        Ok(ReturnType {
            kind,
            inverted: inverted || flagged,
        })
    }

    /// Wire code with the inverted flag folded in
    pub fn flags(self) -> i64 {
        if self.inverted {
            self.kind.code() | INVERTED_FLAG
        } else {
            self.kind.code()
        }
    }
}

impl Default for ReturnType {
    fn default() -> Self {
        ReturnType::new(ReturnKind::None)
    }
}
