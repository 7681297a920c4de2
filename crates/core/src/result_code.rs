//! Cluster status codes
//!
//! Every response from the cluster, and every failure raised locally by the
//! client, carries one of these codes. The numeric values are stable: they
//! match what the server reports on the wire, and the negative range is
//! reserved for client-side conditions.
//!
//! Codes are grouped into an [`ErrorKind`] family so that callers can match
//! on "any record error" or "any admin error" without enumerating codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error family a [`ResultCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed caller input detected before any network call
    Param,
    /// Generic client-side failure
    Client,
    /// Cluster-level failure (partition unavailable, cluster change, ...)
    Cluster,
    /// Connection-level failure
    Connection,
    /// Per-attempt or total timeout
    Timeout,
    /// Record-scoped outcome (not found, generation, too big, busy, bin errors)
    Record,
    /// Secondary-index failures
    Index,
    /// UDF failures
    Udf,
    /// Security / administration failures
    Admin,
    /// Scan stopped before completion
    ScanAborted,
    /// Query stopped before completion
    QueryAborted,
    /// Batch-specific failures
    Batch,
    /// Any other server-reported failure
    Server,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Param => "ParamError",
            ErrorKind::Client => "ClientError",
            ErrorKind::Cluster => "ClusterError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Record => "RecordError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Udf => "UDFError",
            ErrorKind::Admin => "AdminError",
            ErrorKind::ScanAborted => "ScanAbortedError",
            ErrorKind::QueryAborted => "QueryAbortedError",
            ErrorKind::Batch => "BatchError",
            ErrorKind::Server => "ServerError",
        };
        f.write_str(name)
    }
}

macro_rules! result_codes {
    ($( $(#[$doc:meta])* $name:ident = $code:literal => $kind:ident, $msg:literal; )*) => {
        /// Status code reported by the cluster or raised by the client.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ResultCode {
            $( $(#[$doc])* $name, )*
            /// A code this client does not know about
            Unknown(i32),
        }

        impl ResultCode {
            /// Stable numeric value of the code.
            pub fn code(self) -> i32 {
                match self {
                    $( ResultCode::$name => $code, )*
                    ResultCode::Unknown(c) => c,
                }
            }

            /// Map a numeric code back to a `ResultCode`.
            pub fn from_code(code: i32) -> Self {
                match code {
                    $( $code => ResultCode::$name, )*
                    other => ResultCode::Unknown(other),
                }
            }

            /// Error family of this code.
            pub fn kind(self) -> ErrorKind {
                match self {
                    $( ResultCode::$name => ErrorKind::$kind, )*
                    ResultCode::Unknown(c) if c < 0 => ErrorKind::Client,
                    ResultCode::Unknown(_) => ErrorKind::Server,
                }
            }

            /// Short human-readable description.
            pub fn description(self) -> &'static str {
                match self {
                    $( ResultCode::$name => $msg, )*
                    ResultCode::Unknown(_) => "unknown result code",
                }
            }
        }
    };
}

result_codes! {
    // ---- client side (negative) ----
    /// One or more records in a batch failed
    BatchFailed = -16 => Batch, "one or more batch records failed";
    /// No response was received for a batch record
    NoResponse = -15 => Batch, "no response received";
    /// Cluster error rate limit reached
    MaxErrorRate = -12 => Connection, "max error rate exceeded";
    /// Connection to a node failed
    ConnectionError = -10 => Connection, "connection error";
    /// TLS failure
    TlsError = -9 => Connection, "TLS error";
    /// Requested node is not part of the cluster
    InvalidNode = -8 => Cluster, "invalid node";
    /// Connection pool exhausted
    NoMoreConnections = -7 => Connection, "no more connections";
    /// Async connection failure
    AsyncConnection = -6 => Connection, "async connection error";
    /// Caller aborted a streaming call
    ClientAbort = -5 => Client, "client abort";
    /// Host address could not be used
    InvalidHost = -4 => Client, "invalid host";
    /// End of a record stream
    NoMoreRecords = -3 => Client, "no more records";
    /// Invalid caller input
    ParamError = -2 => Param, "invalid parameter";
    /// Generic client failure
    ClientError = -1 => Client, "client error";

    // ---- success ----
    /// Success
    Ok = 0 => Server, "ok";

    // ---- server side ----
    /// Unclassified server failure
    ServerError = 1 => Server, "server error";
    /// Record does not exist
    KeyNotFound = 2 => Record, "record not found";
    /// Generation check failed
    GenerationError = 3 => Record, "generation mismatch";
    /// Server rejected a request parameter
    ParameterError = 4 => Server, "server parameter error";
    /// Record already exists
    KeyExists = 5 => Record, "record already exists";
    /// Bin already exists
    BinExists = 6 => Record, "bin already exists";
    /// Cluster key changed during a request
    ClusterKeyMismatch = 7 => Cluster, "cluster key mismatch";
    /// Server out of memory
    ServerMemError = 8 => Server, "server memory error";
    /// Server-side timeout
    Timeout = 9 => Timeout, "timeout";
    /// Operation not allowed in current configuration
    AlwaysForbidden = 10 => Server, "operation forbidden";
    /// Partition not available
    PartitionUnavailable = 11 => Cluster, "partition unavailable";
    /// Bin type does not support the operation
    BinTypeError = 12 => Record, "incompatible bin type";
    /// Record exceeds write block size
    RecordTooBig = 13 => Record, "record too big";
    /// Too many concurrent operations on the record
    KeyBusy = 14 => Record, "record busy";
    /// Scan aborted by the server or the caller
    ScanAbort = 15 => ScanAborted, "scan aborted";
    /// Feature not supported by this server
    UnsupportedFeature = 16 => Server, "unsupported feature";
    /// Bin does not exist
    BinNotFound = 17 => Record, "bin not found";
    /// Storage device overloaded
    DeviceOverload = 18 => Server, "device overload";
    /// Key type mismatch with stored key
    KeyMismatch = 19 => Record, "key mismatch";
    /// Namespace does not exist
    InvalidNamespace = 20 => Server, "invalid namespace";
    /// Bin name exceeds 15 bytes
    BinNameTooLong = 21 => Record, "bin name too long";
    /// Operation forbidden by namespace configuration
    FailForbidden = 22 => Server, "operation forbidden";
    /// CDT element not found
    ElementNotFound = 23 => Record, "element not found";
    /// CDT element already exists
    ElementExists = 24 => Record, "element exists";
    /// Enterprise-only feature
    EnterpriseOnly = 25 => Server, "enterprise only";
    /// Operation cannot be applied to the current bin value
    OpNotApplicable = 26 => Record, "operation not applicable";
    /// Filter expression evaluated to false
    FilteredOut = 27 => Record, "filtered out";
    /// Write lost a conflict resolution
    LostConflict = 28 => Record, "lost conflict";

    // ---- security ----
    /// Security not supported
    SecurityNotSupported = 51 => Admin, "security not supported";
    /// Security not enabled
    SecurityNotEnabled = 52 => Admin, "security not enabled";
    /// Security scheme not supported
    SecuritySchemeNotSupported = 53 => Admin, "security scheme not supported";
    /// Unknown admin command
    InvalidCommand = 54 => Admin, "invalid command";
    /// Invalid admin field
    InvalidField = 55 => Admin, "invalid field";
    /// Security state invalid
    IllegalState = 56 => Admin, "illegal state";
    /// User does not exist or name invalid
    InvalidUser = 60 => Admin, "invalid user";
    /// User already exists
    UserAlreadyExists = 61 => Admin, "user already exists";
    /// Password invalid
    InvalidPassword = 62 => Admin, "invalid password";
    /// Password expired
    ExpiredPassword = 63 => Admin, "expired password";
    /// Password forbidden
    ForbiddenPassword = 64 => Admin, "forbidden password";
    /// Credential invalid
    InvalidCredential = 65 => Admin, "invalid credential";
    /// Session expired
    ExpiredSession = 66 => Admin, "expired session";
    /// Role does not exist or name invalid
    InvalidRole = 70 => Admin, "invalid role";
    /// Role already exists
    RoleAlreadyExists = 71 => Admin, "role already exists";
    /// Privilege invalid
    InvalidPrivilege = 72 => Admin, "invalid privilege";
    /// Whitelist invalid
    InvalidWhitelist = 73 => Admin, "invalid whitelist";
    /// Quotas not enabled on the server
    QuotasNotEnabled = 74 => Admin, "quotas not enabled";
    /// Quota value invalid
    InvalidQuota = 75 => Admin, "invalid quota";
    /// Not authenticated
    NotAuthenticated = 80 => Admin, "not authenticated";
    /// Role lacks the privilege for this operation
    RoleViolation = 81 => Admin, "role violation";
    /// Client address not whitelisted
    NotWhitelisted = 82 => Admin, "not whitelisted";
    /// Quota exceeded
    QuotaExceeded = 83 => Admin, "quota exceeded";

    // ---- udf ----
    /// UDF execution failure
    UdfBadResponse = 100 => Udf, "UDF error";

    // ---- batch ----
    /// Batch disabled on the server
    BatchDisabled = 150 => Batch, "batch disabled";
    /// Too many batch requests
    BatchMaxRequestsExceeded = 151 => Batch, "batch max requests exceeded";
    /// Batch queues full
    BatchQueuesFull = 152 => Batch, "batch queues full";

    // ---- geo ----
    /// Invalid GeoJSON value
    GeoInvalidGeoJson = 160 => Server, "invalid GeoJSON";

    // ---- secondary index ----
    /// Index already exists
    IndexFound = 200 => Index, "index already exists";
    /// Index does not exist
    IndexNotFound = 201 => Index, "index not found";
    /// Index out of memory
    IndexOom = 202 => Index, "index out of memory";
    /// Index not readable
    IndexNotReadable = 203 => Index, "index not readable";
    /// Generic index failure
    IndexGeneric = 204 => Index, "index error";
    /// Index name too long
    IndexNameMaxLen = 205 => Index, "index name too long";
    /// Too many indexes
    IndexMaxCount = 206 => Index, "index max count reached";

    // ---- query ----
    /// Query aborted
    QueryAborted = 210 => QueryAborted, "query aborted";
    /// Query queue full
    QueryQueueFull = 211 => Server, "query queue full";
    /// Query timed out
    QueryTimeout = 212 => Timeout, "query timeout";
    /// Generic query failure
    QueryGeneric = 213 => Server, "query error";

    // ---- udf registry ----
    /// UDF function not found
    UdfNotFound = 1301 => Udf, "UDF not found";
    /// UDF module not found
    LuaFileNotFound = 1302 => Udf, "UDF module not found";
}

impl ResultCode {
    /// True for [`ResultCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_known() {
        for code in [-16, -2, 0, 2, 3, 9, 27, 61, 83, 100, 201, 210, 1301] {
            assert_eq!(ResultCode::from_code(code).code(), code);
            assert!(!matches!(ResultCode::from_code(code), ResultCode::Unknown(_)));
        }
    }

    #[test]
    fn test_unknown_code_keeps_value() {
        let rc = ResultCode::from_code(4242);
        assert_eq!(rc, ResultCode::Unknown(4242));
        assert_eq!(rc.code(), 4242);
        assert_eq!(rc.kind(), ErrorKind::Server);
        assert_eq!(ResultCode::from_code(-99).kind(), ErrorKind::Client);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ResultCode::ParamError.kind(), ErrorKind::Param);
        assert_eq!(ResultCode::KeyNotFound.kind(), ErrorKind::Record);
        assert_eq!(ResultCode::GenerationError.kind(), ErrorKind::Record);
        assert_eq!(ResultCode::InvalidRole.kind(), ErrorKind::Admin);
        assert_eq!(ResultCode::IndexNotFound.kind(), ErrorKind::Index);
        assert_eq!(ResultCode::UdfNotFound.kind(), ErrorKind::Udf);
        assert_eq!(ResultCode::ScanAbort.kind(), ErrorKind::ScanAborted);
        assert_eq!(ResultCode::QueryAborted.kind(), ErrorKind::QueryAborted);
        assert_eq!(ResultCode::Timeout.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_display_includes_code() {
        let s = ResultCode::KeyNotFound.to_string();
        assert!(s.contains("record not found"));
        assert!(s.contains('2'));
    }
}
