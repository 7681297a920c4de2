//! Policy families
//!
//! One struct per command family. Every family that talks to a record embeds
//! a [`BasePolicy`] carrying the timeout and retry budget; batch sub-policies
//! only carry the per-record knobs because the batch itself owns the budget.
//!
//! Policies are plain values. The resolver clones the client-wide default
//! and applies overrides to the clone, so a default is never mutated.

use crate::expression::CompiledExpression;
use crate::fields::{bool_field, enum_field, u32_field, u64_field};
use crate::types::{
    CommitLevel, GenerationPolicy, KeyPolicy, ReadModeAp, ReadModeSc, RecordExistsAction, Replica,
};
use aeroclient_core::{Result, Value};
use std::fmt;

/// Command family a policy belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyFamily {
    /// Single-record reads
    Read,
    /// Single-record writes
    Write,
    /// Record UDF calls
    Apply,
    /// Multi-operation calls
    Operate,
    /// Deletes
    Remove,
    /// Scans
    Scan,
    /// Secondary-index queries
    Query,
    /// Batch envelope
    Batch,
    /// Batch read entries
    BatchRead,
    /// Batch write entries
    BatchWrite,
    /// Batch UDF entries
    BatchApply,
    /// Batch delete entries
    BatchRemove,
    /// Info requests
    Info,
    /// Security administration
    Admin,
}

impl fmt::Display for PolicyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyFamily::Read => "read",
            PolicyFamily::Write => "write",
            PolicyFamily::Apply => "apply",
            PolicyFamily::Operate => "operate",
            PolicyFamily::Remove => "remove",
            PolicyFamily::Scan => "scan",
            PolicyFamily::Query => "query",
            PolicyFamily::Batch => "batch",
            PolicyFamily::BatchRead => "batch_read",
            PolicyFamily::BatchWrite => "batch_write",
            PolicyFamily::BatchApply => "batch_apply",
            PolicyFamily::BatchRemove => "batch_remove",
            PolicyFamily::Info => "info",
            PolicyFamily::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// A resolvable policy
pub trait Policy: Clone + fmt::Debug + Send + Sync {
    /// Family this policy belongs to
    const FAMILY: PolicyFamily;

    /// Apply one override field.
    ///
    /// Returns `Ok(false)` for a field this family does not recognize, and a
    /// `ParamError` when a recognized field has the wrong type or range.
    fn apply_field(&mut self, name: &str, value: &Value) -> Result<bool>;

    /// Slot for the compiled filter, `None` for families without one
    fn filter_slot(&mut self) -> Option<&mut Option<CompiledExpression>>;

    /// Attached filter, if any
    fn filter(&self) -> Option<&CompiledExpression>;
}

/// Timeout and retry budget shared by record-level families
#[derive(Debug, Clone, PartialEq)]
pub struct BasePolicy {
    /// Whole-call budget in milliseconds, retries included; 0 means no limit
    pub total_timeout: u32,
    /// Per-attempt budget in milliseconds; 0 means no limit
    pub socket_timeout: u32,
    /// Attempts allowed after the first
    pub max_retries: u32,
    /// Back-off between attempts in milliseconds
    pub sleep_between_retries: u32,
    /// Compress request and response payloads
    pub compress: bool,
    /// Filter evaluated against each record
    pub filter: Option<CompiledExpression>,
}

impl BasePolicy {
    /// Defaults for reads: retried twice
    pub fn read_default() -> Self {
        BasePolicy {
            total_timeout: 1000,
            socket_timeout: 30_000,
            max_retries: 2,
            sleep_between_retries: 0,
            compress: false,
            filter: None,
        }
    }

    /// Defaults for writes: never retried
    pub fn write_default() -> Self {
        BasePolicy {
            max_retries: 0,
            ..BasePolicy::read_default()
        }
    }

    /// Defaults for scans and queries: no total limit
    pub fn stream_default() -> Self {
        BasePolicy {
            total_timeout: 0,
            max_retries: 5,
            ..BasePolicy::read_default()
        }
    }

    /// Apply a base field. `timeout` is accepted as a legacy alias of
    /// `total_timeout`; whichever comes last in the override wins.
    pub fn apply_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "total_timeout" | "timeout" => self.total_timeout = u32_field(name, value)?,
            "socket_timeout" => self.socket_timeout = u32_field(name, value)?,
            "max_retries" => self.max_retries = u32_field(name, value)?,
            "sleep_between_retries" => self.sleep_between_retries = u32_field(name, value)?,
            "compress" => self.compress = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Default for BasePolicy {
    fn default() -> Self {
        BasePolicy::read_default()
    }
}

macro_rules! base_policy_impl {
    ($ty:ty, $family:ident) => {
        impl Policy for $ty {
            const FAMILY: PolicyFamily = PolicyFamily::$family;

            fn apply_field(&mut self, name: &str, value: &Value) -> Result<bool> {
                if self.base.apply_field(name, value)? {
                    return Ok(true);
                }
                self.apply_family_field(name, value)
            }

            fn filter_slot(&mut self) -> Option<&mut Option<CompiledExpression>> {
                Some(&mut self.base.filter)
            }

            fn filter(&self) -> Option<&CompiledExpression> {
                self.base.filter.as_ref()
            }
        }
    };
}

macro_rules! sub_policy_impl {
    ($ty:ty, $family:ident) => {
        impl Policy for $ty {
            const FAMILY: PolicyFamily = PolicyFamily::$family;

            fn apply_field(&mut self, name: &str, value: &Value) -> Result<bool> {
                self.apply_family_field(name, value)
            }

            fn filter_slot(&mut self) -> Option<&mut Option<CompiledExpression>> {
                Some(&mut self.filter)
            }

            fn filter(&self) -> Option<&CompiledExpression> {
                self.filter.as_ref()
            }
        }
    };
}

// =============================================================================
// Single-record families
// =============================================================================

/// Policy for single-record reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadPolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Key send mode
    pub key: KeyPolicy,
    /// Replica selection
    pub replica: Replica,
    /// AP read consistency
    pub read_mode_ap: ReadModeAp,
    /// SC read consistency
    pub read_mode_sc: ReadModeSc,
}

impl ReadPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "read_mode_ap" => self.read_mode_ap = enum_field(name, value)?,
            "read_mode_sc" => self.read_mode_sc = enum_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(ReadPolicy, Read);

/// Policy for single-record writes
#[derive(Debug, Clone, PartialEq)]
pub struct WritePolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Key send mode
    pub key: KeyPolicy,
    /// Replica selection
    pub replica: Replica,
    /// Commit level
    pub commit_level: CommitLevel,
    /// Generation check
    pub gen: GenerationPolicy,
    /// Existing-record handling
    pub exists: RecordExistsAction,
    /// Leave a tombstone on delete
    pub durable_delete: bool,
}

impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy {
            base: BasePolicy::write_default(),
            key: KeyPolicy::default(),
            replica: Replica::default(),
            commit_level: CommitLevel::default(),
            gen: GenerationPolicy::default(),
            exists: RecordExistsAction::default(),
            durable_delete: false,
        }
    }
}

impl WritePolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "gen" => self.gen = enum_field(name, value)?,
            "exists" => self.exists = enum_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(WritePolicy, Write);

/// Policy for record UDF calls
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyPolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Key send mode
    pub key: KeyPolicy,
    /// Replica selection
    pub replica: Replica,
    /// Commit level
    pub commit_level: CommitLevel,
    /// TTL applied to records the UDF writes; 0 means namespace default
    pub ttl: u32,
    /// Leave a tombstone on delete
    pub durable_delete: bool,
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        ApplyPolicy {
            base: BasePolicy::write_default(),
            key: KeyPolicy::default(),
            replica: Replica::default(),
            commit_level: CommitLevel::default(),
            ttl: 0,
            durable_delete: false,
        }
    }
}

impl ApplyPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "ttl" => self.ttl = u32_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(ApplyPolicy, Apply);

/// Policy for multi-operation calls
#[derive(Debug, Clone, PartialEq)]
pub struct OperatePolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Key send mode
    pub key: KeyPolicy,
    /// Replica selection
    pub replica: Replica,
    /// Commit level
    pub commit_level: CommitLevel,
    /// Generation check
    pub gen: GenerationPolicy,
    /// Existing-record handling
    pub exists: RecordExistsAction,
    /// AP read consistency
    pub read_mode_ap: ReadModeAp,
    /// SC read consistency
    pub read_mode_sc: ReadModeSc,
    /// Leave a tombstone on delete
    pub durable_delete: bool,
    /// Return a result for every operation, write acks included
    pub respond_all_ops: bool,
}

impl Default for OperatePolicy {
    fn default() -> Self {
        OperatePolicy {
            base: BasePolicy::write_default(),
            key: KeyPolicy::default(),
            replica: Replica::default(),
            commit_level: CommitLevel::default(),
            gen: GenerationPolicy::default(),
            exists: RecordExistsAction::default(),
            read_mode_ap: ReadModeAp::default(),
            read_mode_sc: ReadModeSc::default(),
            durable_delete: false,
            respond_all_ops: false,
        }
    }
}

impl OperatePolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "gen" => self.gen = enum_field(name, value)?,
            "exists" => self.exists = enum_field(name, value)?,
            "read_mode_ap" => self.read_mode_ap = enum_field(name, value)?,
            "read_mode_sc" => self.read_mode_sc = enum_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            "respond_all_ops" => self.respond_all_ops = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(OperatePolicy, Operate);

/// Policy for deletes
#[derive(Debug, Clone, PartialEq)]
pub struct RemovePolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Key send mode
    pub key: KeyPolicy,
    /// Replica selection
    pub replica: Replica,
    /// Commit level
    pub commit_level: CommitLevel,
    /// Generation check
    pub gen: GenerationPolicy,
    /// Expected generation when `gen` is not `Ignore`
    pub generation: u32,
    /// Leave a tombstone
    pub durable_delete: bool,
}

impl Default for RemovePolicy {
    fn default() -> Self {
        RemovePolicy {
            base: BasePolicy::write_default(),
            key: KeyPolicy::default(),
            replica: Replica::default(),
            commit_level: CommitLevel::default(),
            gen: GenerationPolicy::default(),
            generation: 0,
            durable_delete: false,
        }
    }
}

impl RemovePolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "gen" => self.gen = enum_field(name, value)?,
            "generation" => self.generation = u32_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(RemovePolicy, Remove);

// =============================================================================
// Streaming families
// =============================================================================

/// Policy for scans
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Page size when paginating, record cap otherwise; 0 means unlimited
    pub max_records: u64,
    /// Server-side throttle; 0 means unthrottled
    pub records_per_second: u32,
    /// Replica selection
    pub replica: Replica,
    /// Leave tombstones for background deletes
    pub durable_delete: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        ScanPolicy {
            base: BasePolicy::stream_default(),
            max_records: 0,
            records_per_second: 0,
            replica: Replica::default(),
            durable_delete: false,
        }
    }
}

impl ScanPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "max_records" => self.max_records = u64_field(name, value)?,
            "records_per_second" => self.records_per_second = u32_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(ScanPolicy, Scan);

/// Policy for secondary-index queries
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Page size when paginating, record cap otherwise; 0 means unlimited
    pub max_records: u64,
    /// Server-side throttle; 0 means unthrottled
    pub records_per_second: u32,
    /// Replica selection
    pub replica: Replica,
    /// Abort when the cluster changes mid-query
    pub fail_on_cluster_change: bool,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        QueryPolicy {
            base: BasePolicy::stream_default(),
            max_records: 0,
            records_per_second: 0,
            replica: Replica::default(),
            fail_on_cluster_change: false,
        }
    }
}

impl QueryPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "max_records" => self.max_records = u64_field(name, value)?,
            "records_per_second" => self.records_per_second = u32_field(name, value)?,
            "replica" => self.replica = enum_field(name, value)?,
            "fail_on_cluster_change" => self.fail_on_cluster_change = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(QueryPolicy, Query);

// =============================================================================
// Batch families
// =============================================================================

/// Policy for the batch envelope
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPolicy {
    /// Timeout and retry budget
    pub base: BasePolicy,
    /// Replica selection
    pub replica: Replica,
    /// AP read consistency
    pub read_mode_ap: ReadModeAp,
    /// SC read consistency
    pub read_mode_sc: ReadModeSc,
    /// Dispatch node requests in parallel
    pub concurrent: bool,
    /// Let the server process in-memory namespaces inline
    pub allow_inline: bool,
    /// Keep going after a record fails
    pub respond_all_keys: bool,
    /// Send set names with each key
    pub send_set_name: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy {
            base: BasePolicy::read_default(),
            replica: Replica::default(),
            read_mode_ap: ReadModeAp::default(),
            read_mode_sc: ReadModeSc::default(),
            concurrent: false,
            allow_inline: true,
            respond_all_keys: true,
            send_set_name: false,
        }
    }
}

impl BatchPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "replica" => self.replica = enum_field(name, value)?,
            "read_mode_ap" => self.read_mode_ap = enum_field(name, value)?,
            "read_mode_sc" => self.read_mode_sc = enum_field(name, value)?,
            "concurrent" => self.concurrent = bool_field(name, value)?,
            "allow_inline" => self.allow_inline = bool_field(name, value)?,
            "respond_all_keys" => self.respond_all_keys = bool_field(name, value)?,
            "send_set_name" => self.send_set_name = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

base_policy_impl!(BatchPolicy, Batch);

/// Per-entry policy for batch reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReadPolicy {
    /// Filter evaluated against the record
    pub filter: Option<CompiledExpression>,
    /// AP read consistency
    pub read_mode_ap: ReadModeAp,
    /// SC read consistency
    pub read_mode_sc: ReadModeSc,
}

impl BatchReadPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "read_mode_ap" => self.read_mode_ap = enum_field(name, value)?,
            "read_mode_sc" => self.read_mode_sc = enum_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

sub_policy_impl!(BatchReadPolicy, BatchRead);

/// Per-entry policy for batch writes.
///
/// There is no TTL here: the batch write protocol carries TTL with the
/// operation list, so it travels on the operation batch instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWritePolicy {
    /// Filter evaluated against the record
    pub filter: Option<CompiledExpression>,
    /// Key send mode
    pub key: KeyPolicy,
    /// Commit level
    pub commit_level: CommitLevel,
    /// Generation check
    pub gen: GenerationPolicy,
    /// Existing-record handling
    pub exists: RecordExistsAction,
    /// Leave a tombstone on delete
    pub durable_delete: bool,
}

impl BatchWritePolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "gen" => self.gen = enum_field(name, value)?,
            "exists" => self.exists = enum_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

sub_policy_impl!(BatchWritePolicy, BatchWrite);

/// Per-entry policy for batch UDF calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchApplyPolicy {
    /// Filter evaluated against the record
    pub filter: Option<CompiledExpression>,
    /// Key send mode
    pub key: KeyPolicy,
    /// Commit level
    pub commit_level: CommitLevel,
    /// TTL applied to written records; 0 means namespace default
    pub ttl: u32,
    /// Leave a tombstone on delete
    pub durable_delete: bool,
}

impl BatchApplyPolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "ttl" => self.ttl = u32_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

sub_policy_impl!(BatchApplyPolicy, BatchApply);

/// Per-entry policy for batch deletes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRemovePolicy {
    /// Filter evaluated against the record
    pub filter: Option<CompiledExpression>,
    /// Key send mode
    pub key: KeyPolicy,
    /// Commit level
    pub commit_level: CommitLevel,
    /// Generation check
    pub gen: GenerationPolicy,
    /// Expected generation when `gen` is not `Ignore`
    pub generation: u32,
    /// Leave a tombstone
    pub durable_delete: bool,
}

impl BatchRemovePolicy {
    fn apply_family_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "key" => self.key = enum_field(name, value)?,
            "commit_level" => self.commit_level = enum_field(name, value)?,
            "gen" => self.gen = enum_field(name, value)?,
            "generation" => self.generation = u32_field(name, value)?,
            "durable_delete" => self.durable_delete = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

sub_policy_impl!(BatchRemovePolicy, BatchRemove);

// =============================================================================
// Info and admin
// =============================================================================

/// Policy for info requests
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPolicy {
    /// Request timeout in milliseconds
    pub timeout: u32,
    /// Send the request string unmodified
    pub send_as_is: bool,
    /// Verify the response fits the buffer
    pub check_bounds: bool,
}

impl Default for InfoPolicy {
    fn default() -> Self {
        InfoPolicy {
            timeout: 1000,
            send_as_is: true,
            check_bounds: true,
        }
    }
}

impl Policy for InfoPolicy {
    const FAMILY: PolicyFamily = PolicyFamily::Info;

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "timeout" | "total_timeout" => self.timeout = u32_field(name, value)?,
            "send_as_is" => self.send_as_is = bool_field(name, value)?,
            "check_bounds" => self.check_bounds = bool_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn filter_slot(&mut self) -> Option<&mut Option<CompiledExpression>> {
        None
    }

    fn filter(&self) -> Option<&CompiledExpression> {
        None
    }
}

/// Policy for security administration
#[derive(Debug, Clone, PartialEq)]
pub struct AdminPolicy {
    /// Request timeout in milliseconds
    pub timeout: u32,
}

impl Default for AdminPolicy {
    fn default() -> Self {
        AdminPolicy { timeout: 1000 }
    }
}

impl Policy for AdminPolicy {
    const FAMILY: PolicyFamily = PolicyFamily::Admin;

    fn apply_field(&mut self, name: &str, value: &Value) -> Result<bool> {
        match name {
            "timeout" | "total_timeout" => self.timeout = u32_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn filter_slot(&mut self) -> Option<&mut Option<CompiledExpression>> {
        None
    }

    fn filter(&self) -> Option<&CompiledExpression> {
        None
    }
}
