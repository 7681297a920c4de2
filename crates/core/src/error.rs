//! Error types for the client core
//!
//! Every failure surfaced by the client is an [`Error`]: a stable
//! [`ResultCode`] plus a message. Record-scoped failures also carry the
//! offending key, admin and UDF failures carry the offending role, user,
//! module or function name, and writes carry an `in_doubt` flag telling the
//! caller whether the write may have been applied despite the failure.
//!
//! We use `thiserror` for the `Display` and `Error` implementations.

use crate::key::Key;
use crate::result_code::{ErrorKind, ResultCode};
use std::fmt;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Source location an error was raised at (informational only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Source file
    pub file: &'static str,
    /// Line number
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Client error
#[derive(Debug, Clone, Error)]
#[error("{} [{}]: {message}", .code.kind(), .code.code())]
pub struct Error {
    code: ResultCode,
    message: String,
    in_doubt: bool,
    location: Option<Location>,
    key: Option<Box<Key>>,
    subject: Option<String>,
}

impl Error {
    /// Create an error with the given code and message
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: message.into(),
            in_doubt: false,
            location: None,
            key: None,
            subject: None,
        }
    }

    /// Error for a status code using the code's own description
    pub fn from_code(code: ResultCode) -> Self {
        Error::new(code, code.description())
    }

    /// Invalid caller input, detected before any network call
    pub fn param(message: impl Into<String>) -> Self {
        Error::new(ResultCode::ParamError, message)
    }

    /// Generic client-side failure
    pub fn client(message: impl Into<String>) -> Self {
        Error::new(ResultCode::ClientError, message)
    }

    /// Timeout (per attempt or total budget)
    pub fn timeout(message: impl Into<String>) -> Self {
        Error::new(ResultCode::Timeout, message)
    }

    /// Connection failure
    pub fn connection(message: impl Into<String>) -> Self {
        Error::new(ResultCode::ConnectionError, message)
    }

    /// Attach the record key this error refers to
    pub fn with_key(mut self, key: &Key) -> Self {
        self.key = Some(Box::new(key.clone()));
        self
    }

    /// Attach the offending role, user, module or function name
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Mark whether a write may have completed despite this error
    pub fn with_in_doubt(mut self, in_doubt: bool) -> Self {
        self.in_doubt = in_doubt;
        self
    }

    /// Record the source location the error was raised at
    pub fn at(mut self, file: &'static str, line: u32) -> Self {
        self.location = Some(Location { file, line });
        self
    }

    /// Status code
    pub fn code(&self) -> ResultCode {
        self.code
    }

    /// Error family
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a write may have been applied server-side
    pub fn in_doubt(&self) -> bool {
        self.in_doubt
    }

    /// Where the error was raised, if recorded
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Key of the record this error refers to
    pub fn key(&self) -> Option<&Key> {
        self.key.as_deref()
    }

    /// Offending role, user, module or function name
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// True when the error is a caller input error
    pub fn is_param(&self) -> bool {
        self.kind() == ErrorKind::Param
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message && self.in_doubt == other.in_doubt
    }
}

impl From<crate::key::KeyError> for Error {
    fn from(e: crate::key::KeyError) -> Self {
        Error::param(e.to_string())
    }
}

/// Build a `ParamError` stamped with the current source location.
///
/// ```
/// use aeroclient_core::param_error;
/// let err = param_error!("ttl {} out of range", 7);
/// assert!(err.is_param());
/// assert!(err.location().is_some());
/// ```
#[macro_export]
macro_rules! param_error {
    ($($arg:tt)*) => {
        $crate::error::Error::param(format!($($arg)*)).at(file!(), line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_param() {
        let err = Error::param("policy must be a map");
        let msg = err.to_string();
        assert!(msg.contains("ParamError"));
        assert!(msg.contains("-2"));
        assert!(msg.contains("policy must be a map"));
    }

    #[test]
    fn test_error_display_record() {
        let err = Error::from_code(ResultCode::KeyNotFound);
        let msg = err.to_string();
        assert!(msg.contains("RecordError"));
        assert!(msg.contains("record not found"));
    }

    #[test]
    fn test_error_attachments() {
        let key = Key::new("test", "demo", 1).unwrap();
        let err = Error::from_code(ResultCode::GenerationError)
            .with_key(&key)
            .with_in_doubt(true);
        assert_eq!(err.key(), Some(&key));
        assert!(err.in_doubt());
        assert_eq!(err.kind(), ErrorKind::Record);
    }

    #[test]
    fn test_error_subject() {
        let err = Error::from_code(ResultCode::InvalidRole).with_subject("ops");
        assert_eq!(err.subject(), Some("ops"));
        assert_eq!(err.kind(), ErrorKind::Admin);
    }

    #[test]
    fn test_param_error_macro_records_location() {
        let err = param_error!("bad {}", "value");
        assert_eq!(err.code(), ResultCode::ParamError);
        assert_eq!(err.message(), "bad value");
        let loc = err.location().unwrap();
        assert!(loc.file.ends_with("error.rs"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_error() -> Result<i32> {
            Err(Error::client("test"))
        }
        assert!(returns_error().is_err());
    }
}
