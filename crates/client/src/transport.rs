//! The boundary between the client core and the cluster
//!
//! A [`Cluster`] owns node selection, connections and wire encoding. The
//! client core hands it fully validated requests and consumes raw results;
//! it never opens a socket itself. All methods block until the cluster has
//! answered or failed.

use crate::admin::{AdminCommand, AdminResponse};
use crate::geo::GeoShape;
use crate::job::JobModule;
use crate::partition::PartitionsStatus;
use aeroclient_core::{Error, Key, Result, ResultCode, Value};
use aeroclient_operations::{BinName, Expiration, OperationBatch};
use aeroclient_policy::{
    AdminPolicy, CommitLevel, CompiledExpression, GenerationPolicy, InfoPolicy, KeyPolicy,
    ReadModeAp, ReadModeSc, RecordExistsAction, Replica,
};
use serde::Serialize;

/// Per-record settings resolved from whichever policy family issued the
/// request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSettings {
    /// Store the user key alongside the record
    pub send_key: bool,
    /// Record filter
    pub filter: Option<CompiledExpression>,
    /// Replica selection
    pub replica: Replica,
    /// AP read consistency
    pub read_mode_ap: ReadModeAp,
    /// SC read consistency
    pub read_mode_sc: ReadModeSc,
    /// Write commit level
    pub commit_level: CommitLevel,
    /// Generation check
    pub gen: GenerationPolicy,
    /// Existence check
    pub exists: RecordExistsAction,
    /// Leave a tombstone on delete
    pub durable_delete: bool,
    /// Return a result slot for every operation, writes included
    pub respond_all_ops: bool,
    /// Expiration of records written by a UDF; operate requests carry theirs
    /// on the operation batch instead
    pub ttl: Expiration,
    /// Per-attempt timeout in milliseconds
    pub socket_timeout: u32,
}

impl CommandSettings {
    pub(crate) fn key_policy(mut self, key: KeyPolicy) -> Self {
        self.send_key = key == KeyPolicy::Send;
        self
    }
}

/// Bin under which a UDF call returns its result
pub const UDF_RESULT_BIN: &str = "SUCCESS";

/// A user-defined function call
#[derive(Debug, Clone, PartialEq)]
pub struct UdfCall {
    /// Registered module
    pub module: String,
    /// Function in the module
    pub function: String,
    /// Arguments after the record
    pub args: Vec<Value>,
}

/// What to do with the record
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    /// Run operations atomically; reads and writes alike go through here
    Operate(OperationBatch),
    /// Check existence, returning metadata only
    Exists,
    /// Run a UDF against the record
    Apply(UdfCall),
    /// Delete the record, optionally only at a generation
    Remove {
        /// Expected generation
        generation: Option<u32>,
    },
}

impl RequestKind {
    /// Whether the request may change the record
    pub fn is_write(&self) -> bool {
        match self {
            RequestKind::Operate(batch) => batch.has_write(),
            RequestKind::Exists => false,
            RequestKind::Apply(_) | RequestKind::Remove { .. } => true,
        }
    }
}

/// One single-record request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Record address
    pub key: Key,
    /// Action
    pub kind: RequestKind,
    /// Resolved settings
    pub settings: CommandSettings,
}

/// Raw result of a record request.
///
/// `bins` holds one `(name, value)` pair per result slot in the order the
/// server produced them. Older servers send a `Nil` placeholder for a
/// requested bin that does not exist; newer servers omit it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// Write generation
    pub generation: u32,
    /// Seconds to expiry
    pub ttl: u32,
    /// Result slots
    pub bins: Vec<(String, Value)>,
}

/// One request inside a batch, tagged with its position in the caller's list
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Index in the caller's entry list
    pub index: usize,
    /// The request
    pub request: Request,
}

/// One batch result as delivered by the cluster
#[derive(Debug, Clone)]
pub struct BatchResponse {
    /// Index of the originating request
    pub index: usize,
    /// Digest of the record the result belongs to
    pub digest: aeroclient_core::Digest,
    /// Outcome
    pub result: Result<RawRecord>,
}

/// Secondary-index predicate of a query
#[derive(Debug, Clone, PartialEq)]
pub enum IndexPredicate {
    /// Bin equals the value (integer or string index)
    Equals {
        /// Indexed bin
        bin: BinName,
        /// Value
        value: Value,
    },
    /// Integer bin in `[begin, end]`
    Between {
        /// Indexed bin
        bin: BinName,
        /// Inclusive lower bound
        begin: i64,
        /// Inclusive upper bound
        end: i64,
    },
    /// List or map bin contains the value
    Contains {
        /// Indexed bin
        bin: BinName,
        /// Collection element indexed
        collection: IndexCollection,
        /// Value
        value: Value,
    },
    /// GeoJSON point bin lies inside a region (polygon or circle)
    GeoWithin {
        /// Indexed bin
        bin: BinName,
        /// Collection element indexed
        collection: IndexCollection,
        /// GeoJSON region
        region: String,
    },
    /// GeoJSON region bin contains a point
    GeoContains {
        /// Indexed bin
        bin: BinName,
        /// Collection element indexed
        collection: IndexCollection,
        /// GeoJSON point
        point: String,
    },
}

impl IndexPredicate {
    /// `bin == value`
    pub fn equals(bin: impl Into<BinName>, value: impl Into<Value>) -> Self {
        IndexPredicate::Equals {
            bin: bin.into(),
            value: value.into(),
        }
    }

    /// `begin <= bin <= end`
    pub fn between(bin: impl Into<BinName>, begin: i64, end: i64) -> Self {
        IndexPredicate::Between {
            bin: bin.into(),
            begin,
            end,
        }
    }

    /// A list or map bin holds `value` in the indexed position
    pub fn contains(
        bin: impl Into<BinName>,
        collection: IndexCollection,
        value: impl Into<Value>,
    ) -> Self {
        IndexPredicate::Contains {
            bin: bin.into(),
            collection,
            value: value.into(),
        }
    }

    /// Points of `bin` inside a GeoJSON polygon or `AeroCircle`
    pub fn geo_within_region(bin: impl Into<BinName>, region: impl Into<String>) -> Self {
        IndexPredicate::GeoWithin {
            bin: bin.into(),
            collection: IndexCollection::Default,
            region: region.into(),
        }
    }

    /// Points of `bin` within `radius_m` meters of `[lng, lat]`
    pub fn geo_within_radius(bin: impl Into<BinName>, lng: f64, lat: f64, radius_m: f64) -> Self {
        Self::geo_within_region(bin, GeoShape::AeroCircle([lng, lat], radius_m).to_json())
    }

    /// Regions of `bin` containing a GeoJSON point
    pub fn geo_contains_geojson_point(
        bin: impl Into<BinName>,
        point: impl Into<String>,
    ) -> Self {
        IndexPredicate::GeoContains {
            bin: bin.into(),
            collection: IndexCollection::Default,
            point: point.into(),
        }
    }

    /// Regions of `bin` containing `[lng, lat]`
    pub fn geo_contains_point(bin: impl Into<BinName>, lng: f64, lat: f64) -> Self {
        Self::geo_contains_geojson_point(bin, GeoShape::Point([lng, lat]).to_json())
    }

    /// Indexed bin
    pub fn bin(&self) -> &BinName {
        match self {
            IndexPredicate::Equals { bin, .. }
            | IndexPredicate::Between { bin, .. }
            | IndexPredicate::Contains { bin, .. }
            | IndexPredicate::GeoWithin { bin, .. }
            | IndexPredicate::GeoContains { bin, .. } => bin,
        }
    }

    /// Collection element the predicate needs an index on
    pub fn collection(&self) -> IndexCollection {
        match self {
            IndexPredicate::Equals { .. } | IndexPredicate::Between { .. } => {
                IndexCollection::Default
            }
            IndexPredicate::Contains { collection, .. }
            | IndexPredicate::GeoWithin { collection, .. }
            | IndexPredicate::GeoContains { collection, .. } => *collection,
        }
    }

    /// Parsed GeoJSON operand of a geo predicate.
    ///
    /// `GeoWithin` needs a region and `GeoContains` a point; anything else
    /// fails with `GeoInvalidGeoJson`.
    pub fn geo_shape(&self) -> Result<Option<GeoShape>> {
        let (json, want_region) = match self {
            IndexPredicate::GeoWithin { region, .. } => (region, true),
            IndexPredicate::GeoContains { point, .. } => (point, false),
            _ => return Ok(None),
        };
        let shape = GeoShape::parse(json)?;
        if shape.is_region() != want_region {
            let want = if want_region { "a region" } else { "a point" };
            return Err(Error::new(
                ResultCode::GeoInvalidGeoJson,
                format!("geo predicate on {} needs {}", self.bin(), want),
            ));
        }
        Ok(Some(shape))
    }
}

/// Which part of a collection bin an index covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexCollection {
    /// Scalar bin
    Default,
    /// List elements
    List,
    /// Map keys
    MapKeys,
    /// Map values
    MapValues,
}

/// Scan or query request
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Namespace
    pub namespace: String,
    /// Set; `None` scans the whole namespace
    pub set: Option<String>,
    /// Bin projection; `None` returns all bins
    pub bins: Option<Vec<BinName>>,
    /// Secondary-index predicate (queries only)
    pub predicate: Option<IndexPredicate>,
    /// Record filter
    pub filter: Option<CompiledExpression>,
    /// Stop after this many records; 0 means no limit
    pub max_records: u64,
    /// Throttle; 0 means unthrottled
    pub records_per_second: u32,
}

/// One streamed record
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    /// Record address; carries the user key when it was stored
    pub key: Key,
    /// Record content
    pub record: RawRecord,
}

/// What a background job does to each matching record
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundAction {
    /// Run a UDF against the record
    Udf(UdfCall),
    /// Apply write operations to the record
    Operations(OperationBatch),
}

/// A scan or query that changes records on the cluster instead of
/// streaming them back
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundRequest {
    /// Records to visit
    pub stream: StreamRequest,
    /// Change applied to each record
    pub action: BackgroundAction,
    /// Settings of the per-record writes
    pub settings: CommandSettings,
    /// Kind of stream that started the job
    pub module: JobModule,
}

/// A cluster node as seen by the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NodeAddress {
    /// Node name
    pub name: String,
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
}

/// Transport to a cluster
pub trait Cluster: Send + Sync {
    /// Run one record request
    fn dispatch_single(&self, request: &Request) -> Result<RawRecord>;

    /// Run a batch.
    ///
    /// `on_result` may be called from several threads at once and in any
    /// order. An `Err` return means the batch as a whole failed; results
    /// already delivered stay valid.
    fn dispatch_batch(
        &self,
        requests: &[BatchRequest],
        on_result: &(dyn Fn(BatchResponse) + Sync),
    ) -> Result<()>;

    /// Stream records partition by partition, advancing `partitions`.
    ///
    /// Stops early when `on_item` returns `false` or `max_records` records
    /// have been delivered.
    fn dispatch_scan(
        &self,
        request: &StreamRequest,
        partitions: &mut PartitionsStatus,
        on_item: &mut dyn FnMut(StreamItem) -> bool,
    ) -> Result<()>;

    /// Start a background job and return its id without waiting for it
    fn dispatch_background(&self, request: &BackgroundRequest) -> Result<u64>;

    /// Run a security command
    fn admin(&self, command: &AdminCommand, policy: &AdminPolicy) -> Result<AdminResponse>;

    /// Run an info command on a node
    fn info(&self, command: &str, policy: &InfoPolicy) -> Result<String>;

    /// Nodes currently in the cluster
    fn nodes(&self) -> Vec<NodeAddress>;

    /// Run an info command on the named node; an unknown name fails with
    /// `InvalidNode`
    fn info_node(&self, node: &str, command: &str, policy: &InfoPolicy) -> Result<String>;
}
