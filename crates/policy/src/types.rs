//! Enumerated policy settings
//!
//! Each setting can be given as its numeric protocol code or, in
//! configuration files, by name (case-insensitive).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated policy setting decodable from a code or a name
pub trait PolicyEnum: Sized + Copy + fmt::Debug {
    /// Decode from the numeric protocol code
    fn from_code(code: i64) -> Option<Self>;
    /// Decode from the lower-case name
    fn from_name(name: &str) -> Option<Self>;
    /// Numeric protocol code
    fn code(self) -> i64;
}

macro_rules! policy_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal ),+ $(,)?
        }
        default $default:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl PolicyEnum for $name {
            fn from_code(code: i64) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                $( if name.eq_ignore_ascii_case($label) { return Some($name::$variant); } )+
                None
            }

            fn code(self) -> i64 {
                match self {
                    $( $name::$variant => $code, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( $name::$variant => f.write_str($label), )+
                }
            }
        }
    };
}

policy_enum! {
    /// Whether the user key is sent to the server alongside the digest
    KeyPolicy {
        /// Send the digest only; the server never stores the user key
        Digest = 0 => "digest",
        /// Send the user key too; it is stored and echoed back
        Send = 1 => "send",
    }
    default Digest
}

policy_enum! {
    /// Replica selection for reads
    Replica {
        /// Always read from the master
        Master = 0 => "master",
        /// Distribute reads across master and replicas
        Any = 1 => "any",
        /// Try master first, then replicas in order
        Sequence = 2 => "sequence",
        /// Prefer nodes in the client's rack
        PreferRack = 3 => "prefer_rack",
    }
    default Sequence
}

policy_enum! {
    /// Read consistency for AP namespaces
    ReadModeAp {
        /// Read from one replica
        One = 0 => "one",
        /// Read from all replicas and return the latest
        All = 1 => "all",
    }
    default One
}

policy_enum! {
    /// Read consistency for strong-consistency namespaces
    ReadModeSc {
        /// Monotonic reads within the session
        Session = 0 => "session",
        /// Linearizable reads
        Linearize = 1 => "linearize",
        /// Allow reads from replicas
        AllowReplica = 2 => "allow_replica",
        /// Allow reads from unavailable partitions
        AllowUnavailable = 3 => "allow_unavailable",
    }
    default Session
}

policy_enum! {
    /// Write commit level
    CommitLevel {
        /// Commit on master and all replicas
        All = 0 => "all",
        /// Commit on master only
        Master = 1 => "master",
    }
    default All
}

policy_enum! {
    /// Generation check applied to writes
    GenerationPolicy {
        /// Do not check the generation
        Ignore = 0 => "ignore",
        /// Write only if the generation equals the expected one
        Eq = 1 => "eq",
        /// Write only if the expected generation is greater
        Gt = 2 => "gt",
    }
    default Ignore
}

policy_enum! {
    /// How a write treats an existing record
    RecordExistsAction {
        /// Create or update
        Ignore = 0 => "ignore",
        /// Fail if the record exists
        Create = 1 => "create",
        /// Fail if the record does not exist; merge bins
        Update = 2 => "update",
        /// Fail if the record does not exist; replace all bins
        Replace = 3 => "replace",
        /// Create or replace all bins
        CreateOrReplace = 4 => "create_or_replace",
    }
    default Ignore
}

impl RecordExistsAction {
    /// Whether this action requires the record to already exist
    pub fn requires_existing(self) -> bool {
        matches!(self, RecordExistsAction::Update | RecordExistsAction::Replace)
    }

    /// Whether this action drops bins not named by the write
    pub fn replaces_bins(self) -> bool {
        matches!(
            self,
            RecordExistsAction::Replace | RecordExistsAction::CreateOrReplace
        )
    }
}
