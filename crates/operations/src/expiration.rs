//! Record expiration (TTL)

use aeroclient_core::{param_error, Result};
use serde::{Deserialize, Serialize};

/// TTL requested for a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expiration {
    /// Use the namespace default (`0`)
    #[default]
    NamespaceDefault,
    /// Never expire (`-1`)
    Never,
    /// Keep the record's current TTL (`-2`)
    DontUpdate,
    /// Expire after this many seconds
    Seconds(u32),
}

impl Expiration {
    /// Decode the caller's integer TTL.
    ///
    /// Anything other than the three sentinels must fit in an unsigned
    /// 32-bit field.
    pub fn from_i64(ttl: i64) -> Result<Self> {
        match ttl {
            0 => Ok(Expiration::NamespaceDefault),
            -1 => Ok(Expiration::Never),
            -2 => Ok(Expiration::DontUpdate),
            n => u32::try_from(n)
                .map(Expiration::Seconds)
                .map_err(|_| param_error!("ttl {} does not fit in an unsigned 32-bit field", n)),
        }
    }

    /// Decode a TTL already in wire form, as stored in a policy
    pub fn from_wire(ttl: u32) -> Self {
        match ttl {
            0 => Expiration::NamespaceDefault,
            u32::MAX => Expiration::Never,
            t if t == u32::MAX - 1 => Expiration::DontUpdate,
            s => Expiration::Seconds(s),
        }
    }

    /// Wire value
    pub fn to_wire(self) -> u32 {
        match self {
            Expiration::NamespaceDefault => 0,
            Expiration::Never => u32::MAX,
            Expiration::DontUpdate => u32::MAX - 1,
            Expiration::Seconds(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(Expiration::from_i64(0).unwrap(), Expiration::NamespaceDefault);
        assert_eq!(Expiration::from_i64(-1).unwrap().to_wire(), u32::MAX);
        assert_eq!(Expiration::from_i64(-2).unwrap(), Expiration::DontUpdate);
    }

    #[test]
    fn test_wire_form_inverts() {
        for ttl in [0, -1, -2, 1, 86_400] {
            let e = Expiration::from_i64(ttl).unwrap();
            assert_eq!(Expiration::from_wire(e.to_wire()), e);
        }
    }

    #[test]
    fn test_range() {
        assert_eq!(
            Expiration::from_i64(u32::MAX as i64).unwrap(),
            Expiration::Seconds(u32::MAX)
        );
        assert!(Expiration::from_i64(u32::MAX as i64 + 1).unwrap_err().is_param());
        assert!(Expiration::from_i64(-3).is_err());
    }
}
