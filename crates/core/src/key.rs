//! Record addressing
//!
//! A record is addressed by `(namespace, set, user key)`. The client turns
//! that triple into a 20-byte [`Digest`] and the digest into a partition id.
//!
//! ## Contract
//!
//! These rules are wire-compatible with the server and must not change:
//! - digest = RIPEMD-160 over `set ‖ particle-type ‖ key-bytes`; integers are
//!   encoded as 8 big-endian bytes
//! - the namespace is not part of the digest
//! - partition id = first two digest bytes, little-endian, masked to
//!   [`N_PARTITIONS`]
//! - only integer, string and blob user keys are addressable

use crate::limits::{MAX_NAMESPACE_BYTES, MAX_SET_BYTES};
use crate::value::{ParticleType, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ripemd::{Digest as _, Ripemd160};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of partitions in a cluster
pub const N_PARTITIONS: u32 = 4096;

/// Digest length in bytes
pub const DIGEST_SIZE: usize = 20;

/// Content-addressed record identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_SIZE]);

impl Digest {
    /// Digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Build a digest from a byte slice, which must be exactly 20 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != DIGEST_SIZE {
            return Err(KeyError::BadDigestLength(bytes.len()));
        }
        let mut d = [0u8; DIGEST_SIZE];
        d.copy_from_slice(bytes);
        Ok(Digest(d))
    }

    /// Partition this digest routes to
    pub fn partition_id(&self) -> u32 {
        partition_id_for(self)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Addressable user key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserKey {
    /// Integer key
    Int(i64),
    /// String key
    String(String),
    /// Raw byte key
    Bytes(Vec<u8>),
}

impl UserKey {
    /// Convert a value into a user key, rejecting non-addressable types
    pub fn from_value(value: &Value) -> Result<Self, KeyError> {
        match value {
            Value::Int(i) => Ok(UserKey::Int(*i)),
            Value::String(s) => Ok(UserKey::String(s.clone())),
            Value::Blob(b) => Ok(UserKey::Bytes(b.clone())),
            other => Err(KeyError::UnsupportedType(other.type_name())),
        }
    }

    /// Back to the value model
    pub fn to_value(&self) -> Value {
        match self {
            UserKey::Int(i) => Value::Int(*i),
            UserKey::String(s) => Value::String(s.clone()),
            UserKey::Bytes(b) => Value::Blob(b.clone()),
        }
    }

    fn particle_type(&self) -> ParticleType {
        match self {
            UserKey::Int(_) => ParticleType::Integer,
            UserKey::String(_) => ParticleType::String,
            UserKey::Bytes(_) => ParticleType::Blob,
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKey::Int(i) => write!(f, "{}", i),
            UserKey::String(s) => write!(f, "{:?}", s),
            UserKey::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Record key: namespace, set, optional user key and its digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    namespace: String,
    set: String,
    user_key: Option<UserKey>,
    digest: Digest,
}

impl Key {
    /// Create a key from a user key, computing its digest.
    ///
    /// # Errors
    ///
    /// Fails with a parameter error when the namespace or set is invalid
    /// or the user key type is not addressable.
    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        user_key: impl Into<Value>,
    ) -> crate::Result<Self> {
        let namespace = namespace.into();
        let set = set.into();
        let value = user_key.into();
        let digest = compute_digest(&namespace, &set, &value)?;
        Ok(Key {
            namespace,
            set,
            user_key: Some(UserKey::from_value(&value)?),
            digest,
        })
    }

    /// Create a key addressed by digest only; the user key is unknown.
    pub fn from_digest(
        namespace: impl Into<String>,
        set: impl Into<String>,
        digest: Digest,
    ) -> crate::Result<Self> {
        let namespace = namespace.into();
        let set = set.into();
        validate_namespace(&namespace)?;
        validate_set(&set)?;
        Ok(Key {
            namespace,
            set,
            user_key: None,
            digest,
        })
    }

    /// Namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Set name (may be empty)
    pub fn set(&self) -> &str {
        &self.set
    }

    /// User key, if the key was built from one
    pub fn user_key(&self) -> Option<&UserKey> {
        self.user_key.as_ref()
    }

    /// Record digest
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Partition this key routes to
    pub fn partition_id(&self) -> u32 {
        partition_id_for(&self.digest)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_key {
            Some(k) => write!(f, "{}:{}:{}", self.namespace, self.set, k),
            None => write!(f, "{}:{}:{}", self.namespace, self.set, self.digest),
        }
    }
}

/// Compute the digest for `(namespace, set, user key)`.
///
/// # Examples
///
/// ```
/// use aeroclient_core::{compute_digest, Value};
///
/// let a = compute_digest("test", "demo", &Value::Int(1)).unwrap();
/// let b = compute_digest("test", "demo", &Value::Int(1)).unwrap();
/// assert_eq!(a, b);
/// assert!(compute_digest("test", "demo", &Value::Float(1.5)).is_err());
/// ```
pub fn compute_digest(namespace: &str, set: &str, user_key: &Value) -> Result<Digest, KeyError> {
    validate_namespace(namespace)?;
    validate_set(set)?;
    let key = UserKey::from_value(user_key)?;
    Ok(digest_for(set, &key))
}

fn digest_for(set: &str, key: &UserKey) -> Digest {
    let mut hasher = Ripemd160::new();
    hasher.update(set.as_bytes());
    hasher.update([key.particle_type() as u8]);
    match key {
        UserKey::Int(i) => {
            let mut buf = [0u8; 8];
            BigEndian::write_i64(&mut buf, *i);
            hasher.update(buf);
        }
        UserKey::String(s) => hasher.update(s.as_bytes()),
        UserKey::Bytes(b) => hasher.update(b),
    }
    let out = hasher.finalize();
    let mut d = [0u8; DIGEST_SIZE];
    d.copy_from_slice(&out);
    Digest(d)
}

/// Partition id in `[0, N_PARTITIONS)` for a digest
pub fn partition_id_for(digest: &Digest) -> u32 {
    LittleEndian::read_u16(&digest.0[0..2]) as u32 & (N_PARTITIONS - 1)
}

fn validate_namespace(namespace: &str) -> Result<(), KeyError> {
    if namespace.is_empty() {
        return Err(KeyError::EmptyNamespace);
    }
    if namespace.len() > MAX_NAMESPACE_BYTES {
        return Err(KeyError::NamespaceTooLong {
            actual: namespace.len(),
            max: MAX_NAMESPACE_BYTES,
        });
    }
    Ok(())
}

fn validate_set(set: &str) -> Result<(), KeyError> {
    if set.len() > MAX_SET_BYTES {
        return Err(KeyError::SetTooLong {
            actual: set.len(),
            max: MAX_SET_BYTES,
        });
    }
    Ok(())
}

/// Key validation errors
///
/// All of these surface to callers as `ParamError`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Namespace is empty
    #[error("namespace cannot be empty")]
    EmptyNamespace,

    /// Namespace exceeds maximum length
    #[error("namespace too long: {actual} bytes exceeds maximum {max}")]
    NamespaceTooLong {
        /// Actual length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Set name exceeds maximum length
    #[error("set name too long: {actual} bytes exceeds maximum {max}")]
    SetTooLong {
        /// Actual length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// User key type cannot be addressed
    #[error("key is invalid: {0} user keys are not supported")]
    UnsupportedType(&'static str),

    /// Digest is not 20 bytes
    #[error("digest must be 20 bytes, got {0}")]
    BadDigestLength(usize),
}
