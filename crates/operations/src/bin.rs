//! Bin names

use aeroclient_core::{Limits, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Owned bin name.
///
/// Anything string-like converts into a `BinName`, so operations never
/// borrow from a caller's temporaries. Length is checked when the operation
/// list is built, against [`Limits::max_bin_name_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BinName(String);

impl BinName {
    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the name against bin-name limits
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        limits.validate_bin_name(&self.0)?;
        Ok(())
    }
}

impl From<&str> for BinName {
    fn from(s: &str) -> Self {
        BinName(s.to_string())
    }
}

impl From<String> for BinName {
    fn from(s: String) -> Self {
        BinName(s)
    }
}

impl From<&String> for BinName {
    fn from(s: &String) -> Self {
        BinName(s.clone())
    }
}

impl AsRef<str> for BinName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for BinName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BinName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for BinName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_own_the_name() {
        let name = {
            let temp = String::from("score");
            BinName::from(&temp)
        };
        assert_eq!(name, "score");
        assert_eq!(BinName::from("a"), BinName::from(String::from("a")));
    }

    #[test]
    fn test_validate_length() {
        let limits = Limits::default();
        assert!(BinName::from("fifteen_chars__").validate(&limits).is_ok());
        let err = BinName::from("sixteen_chars___").validate(&limits).unwrap_err();
        assert!(err.is_param());
    }
}
