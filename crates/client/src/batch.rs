//! Batch orchestration
//!
//! A batch turns a list of [`BatchEntry`] into one [`BatchRequest`] per
//! entry, tagged with the entry's position. The cluster runs them on its own
//! worker threads and reports each result through a callback that may fire
//! concurrently and in any order; results are appended to a mutex-guarded
//! accumulator as they arrive.
//!
//! [`BatchRecords::records`] is in arrival order. Every [`BatchRecord`]
//! carries its request index, and [`BatchRecords::into_request_order`]
//! restores the caller's order. A failing record never fails the batch: it
//! keeps its own code and the aggregate becomes
//! [`ResultCode::BatchFailed`].

use crate::assembler::{assemble, AssembleMode};
use crate::client::Client;
use crate::settings;
use crate::transport::{BatchRequest, BatchResponse, Request, RequestKind, UdfCall};
use aeroclient_core::{param_error, Digest, Error, Key, Record, Result, ResultCode, Value};
use aeroclient_operations::{Operation, OperationBuilder, ValidationContext};
use aeroclient_policy::{
    resolve, BatchApplyPolicy, BatchPolicy, BatchReadPolicy, BatchRemovePolicy, BatchWritePolicy,
    GenerationPolicy,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::thread;
use tracing::{debug, warn};

/// What to do with one key
#[derive(Debug, Clone, PartialEq)]
pub enum BatchAction {
    /// Read operations; an empty list reads every bin
    Read {
        /// Read operations
        ops: Vec<Operation>,
    },
    /// Read and write operations; `meta` may carry `{"ttl", "gen"}`
    Write {
        /// Operations
        ops: Vec<Operation>,
        /// Record metadata
        meta: Option<Value>,
    },
    /// UDF call
    Apply(UdfCall),
    /// Delete the record
    Remove,
}

/// Kind of a batch entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchRecordKind {
    /// Read entry
    Read,
    /// Write entry
    Write,
    /// UDF entry
    Apply,
    /// Delete entry
    Remove,
}

/// One key of a batch with its action and optional policy overrides
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Record address
    pub key: Key,
    /// Action
    pub action: BatchAction,
    /// Overrides on top of the action's batch sub-policy
    pub policy: Option<Value>,
}

impl BatchEntry {
    /// Read every bin
    pub fn read_all(key: Key) -> Self {
        Self::read(key, Vec::new())
    }

    /// Run read operations
    pub fn read(key: Key, ops: Vec<Operation>) -> Self {
        BatchEntry {
            key,
            action: BatchAction::Read { ops },
            policy: None,
        }
    }

    /// Run write (and read) operations
    pub fn write(key: Key, ops: Vec<Operation>, meta: Option<Value>) -> Self {
        BatchEntry {
            key,
            action: BatchAction::Write { ops, meta },
            policy: None,
        }
    }

    /// Run a UDF
    pub fn apply(key: Key, udf: UdfCall) -> Self {
        BatchEntry {
            key,
            action: BatchAction::Apply(udf),
            policy: None,
        }
    }

    /// Delete the record
    pub fn remove(key: Key) -> Self {
        BatchEntry {
            key,
            action: BatchAction::Remove,
            policy: None,
        }
    }

    /// Attach per-entry policy overrides
    pub fn with_policy(mut self, policy: Value) -> Self {
        self.policy = Some(policy);
        self
    }

    fn kind(&self) -> BatchRecordKind {
        match self.action {
            BatchAction::Read { .. } => BatchRecordKind::Read,
            BatchAction::Write { .. } => BatchRecordKind::Write,
            BatchAction::Apply(_) => BatchRecordKind::Apply,
            BatchAction::Remove => BatchRecordKind::Remove,
        }
    }
}

/// Outcome for one key
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    /// Position of the entry in the caller's list
    pub index: usize,
    /// Record address
    pub key: Key,
    /// Entry kind
    pub kind: BatchRecordKind,
    /// Per-record result code
    pub result: ResultCode,
    /// Record content on success
    pub record: Option<Record>,
    /// A write may have been applied despite the failure
    pub in_doubt: bool,
}

impl BatchRecord {
    /// Whether this record succeeded
    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }
}

/// All outcomes of a batch plus the aggregate status
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecords {
    /// Outcomes in arrival order
    pub records: Vec<BatchRecord>,
    /// `Ok` when every record succeeded, `BatchFailed` otherwise
    pub result: ResultCode,
}

impl BatchRecords {
    /// Outcomes sorted by request index
    pub fn into_request_order(mut self) -> Vec<BatchRecord> {
        self.records.sort_by_key(|r| r.index);
        self.records
    }

    /// Number of outcomes
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True for an empty batch
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that did not succeed
    pub fn failed(&self) -> impl Iterator<Item = &BatchRecord> {
        self.records.iter().filter(|r| !r.is_ok())
    }
}

struct Pending {
    key: Key,
    digest: Digest,
    kind: BatchRecordKind,
    is_write: bool,
    send_key: bool,
}

#[derive(Default)]
struct Accumulator {
    records: Vec<BatchRecord>,
    delivered: FxHashSet<usize>,
}

impl Accumulator {
    fn accept(&mut self, pending: &FxHashMap<usize, Pending>, response: BatchResponse) {
        let Some(p) = pending.get(&response.index) else {
            warn!(
                target: "aeroclient::batch",
                index = response.index,
                "Dropping result for unknown request index"
            );
            return;
        };
        if !self.delivered.insert(response.index) {
            warn!(
                target: "aeroclient::batch",
                index = response.index,
                "Dropping duplicate result"
            );
            return;
        }
        let outcome = if response.digest != p.digest {
            Err(Error::client(format!(
                "batch result digest {} does not match request digest {}",
                response.digest, p.digest
            )))
        } else {
            response.result
        };
        let record = match outcome {
            Ok(raw) => BatchRecord {
                index: response.index,
                key: p.key.clone(),
                kind: p.kind,
                result: ResultCode::Ok,
                record: Some(assemble(raw, AssembleMode::Merged, &p.key, p.send_key)),
                in_doubt: false,
            },
            Err(e) => {
                warn!(
                    target: "aeroclient::batch",
                    index = response.index,
                    key = %p.key,
                    error = %e,
                    "Batch record failed"
                );
                BatchRecord {
                    index: response.index,
                    key: p.key.clone(),
                    kind: p.kind,
                    result: e.code(),
                    record: None,
                    in_doubt: p.is_write && e.in_doubt(),
                }
            }
        };
        self.records.push(record);
    }
}

impl Client {
    fn batch_request(
        &self,
        index: usize,
        entry: BatchEntry,
        parent: &BatchPolicy,
        writes: &BatchWritePolicy,
    ) -> Result<BatchRequest> {
        let limits = self.limits().clone();
        let overrides = entry.policy.as_ref();
        let (kind, settings) = match entry.action {
            BatchAction::Read { ops } => {
                let p: BatchReadPolicy = resolve(&self.defaults().batch_read, overrides)?;
                let ops = if ops.is_empty() {
                    vec![Operation::ReadAll]
                } else {
                    ops
                };
                let batch = OperationBuilder::new(ops)
                    .build(&ValidationContext::batch_read().with_limits(limits))?;
                (RequestKind::Operate(batch), settings::batch_read(parent, &p))
            }
            BatchAction::Write { ops, meta } => {
                let p: BatchWritePolicy = resolve(writes, overrides)?;
                let batch = OperationBuilder::new(ops)
                    .meta(meta.as_ref())?
                    .build(&ValidationContext::batch_write().with_limits(limits))?;
                (RequestKind::Operate(batch), settings::batch_write(parent, &p))
            }
            BatchAction::Apply(udf) => {
                if udf.module.is_empty() || udf.function.is_empty() {
                    return Err(param_error!(
                        "udf module and function names cannot be empty"
                    ));
                }
                let p: BatchApplyPolicy = resolve(&self.defaults().batch_apply, overrides)?;
                (RequestKind::Apply(udf), settings::batch_apply(parent, &p))
            }
            BatchAction::Remove => {
                let p: BatchRemovePolicy = resolve(&self.defaults().batch_remove, overrides)?;
                let generation = (p.gen != GenerationPolicy::Ignore).then_some(p.generation);
                (RequestKind::Remove { generation }, settings::batch_remove(parent, &p))
            }
        };
        Ok(BatchRequest {
            index,
            request: Request {
                key: entry.key,
                kind,
                settings,
            },
        })
    }

    /// Run a mixed batch.
    ///
    /// `batch_policy` overrides the batch family; `write_policy` overrides
    /// the batch-write defaults that write entries start from. The call
    /// itself fails only on invalid input or when the cluster could not
    /// start the batch; per-record failures are reported on the records.
    pub fn batch_execute(
        &self,
        entries: Vec<BatchEntry>,
        batch_policy: Option<&Value>,
        write_policy: Option<&Value>,
    ) -> Result<BatchRecords> {
        if entries.is_empty() {
            return Err(param_error!("batch keys cannot be empty"));
        }
        let parent: BatchPolicy = resolve(&self.defaults().batch, batch_policy)?;
        let writes: BatchWritePolicy = resolve(&self.defaults().batch_write, write_policy)?;

        let mut pending = FxHashMap::default();
        let mut requests = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let kind = entry.kind();
            let key = entry.key.clone();
            let request = self.batch_request(index, entry, &parent, &writes)?;
            pending.insert(
                index,
                Pending {
                    digest: *key.digest(),
                    key,
                    kind,
                    is_write: request.request.kind.is_write(),
                    send_key: request.request.settings.send_key,
                },
            );
            requests.push(request);
        }

        debug!(
            target: "aeroclient::batch",
            keys = requests.len(),
            concurrent = parent.concurrent,
            "Dispatching batch"
        );

        let acc = Mutex::new(Accumulator::default());
        let on_result = |response: BatchResponse| acc.lock().accept(&pending, response);
        let cluster = self.cluster();
        let dispatched = thread::scope(|s| {
            s.spawn(|| cluster.dispatch_batch(&requests, &on_result))
                .join()
                .unwrap_or_else(|_| Err(Error::client("batch dispatch thread panicked")))
        });

        let mut acc = acc.into_inner();
        if let Err(e) = dispatched {
            if acc.records.is_empty() && !e.in_doubt() {
                return Err(e);
            }
            warn!(
                target: "aeroclient::batch",
                delivered = acc.records.len(),
                total = requests.len(),
                error = %e,
                "Batch interrupted"
            );
            fill_undelivered(&mut acc, &pending, e.code(), e.in_doubt());
        } else {
            fill_undelivered(&mut acc, &pending, ResultCode::NoResponse, false);
        }

        let result = if acc.records.iter().all(BatchRecord::is_ok) {
            ResultCode::Ok
        } else {
            ResultCode::BatchFailed
        };
        Ok(BatchRecords {
            records: acc.records,
            result,
        })
    }

    /// Read many records. `bins` of `None` reads every bin; an empty slice
    /// reads metadata only.
    pub fn batch_read(
        &self,
        keys: &[Key],
        bins: Option<&[&str]>,
        policy: Option<&Value>,
    ) -> Result<BatchRecords> {
        let ops: Vec<Operation> = match bins {
            None => Vec::new(),
            Some([]) => vec![Operation::ReadHeader],
            Some(names) => names.iter().map(|b| Operation::read(*b)).collect(),
        };
        let entries = keys
            .iter()
            .map(|k| BatchEntry::read(k.clone(), ops.clone()))
            .collect();
        self.batch_execute(entries, policy, None)
    }

    /// Read every bin of many records
    pub fn get_many(&self, keys: &[Key], policy: Option<&Value>) -> Result<BatchRecords> {
        self.batch_read(keys, None, policy)
    }

    /// Read the named bins of many records
    pub fn select_many(
        &self,
        keys: &[Key],
        bins: &[&str],
        policy: Option<&Value>,
    ) -> Result<BatchRecords> {
        if bins.is_empty() {
            return Err(param_error!("bins to select cannot be empty"));
        }
        self.batch_read(keys, Some(bins), policy)
    }

    /// Metadata of many records
    pub fn exists_many(&self, keys: &[Key], policy: Option<&Value>) -> Result<BatchRecords> {
        self.batch_read(keys, Some(&[][..]), policy)
    }

    /// Run the same operations on many records
    pub fn batch_operate(
        &self,
        keys: &[Key],
        ops: Vec<Operation>,
        meta: Option<&Value>,
        batch_policy: Option<&Value>,
        write_policy: Option<&Value>,
    ) -> Result<BatchRecords> {
        if ops.is_empty() {
            return Err(param_error!("batch operations cannot be empty"));
        }
        let entries = keys
            .iter()
            .map(|k| BatchEntry::write(k.clone(), ops.clone(), meta.cloned()))
            .collect();
        self.batch_execute(entries, batch_policy, write_policy)
    }

    /// Run a UDF on many records
    pub fn batch_apply(
        &self,
        keys: &[Key],
        udf: UdfCall,
        batch_policy: Option<&Value>,
        apply_policy: Option<&Value>,
    ) -> Result<BatchRecords> {
        let entries = keys
            .iter()
            .map(|k| {
                let entry = BatchEntry::apply(k.clone(), udf.clone());
                match apply_policy {
                    Some(p) => entry.with_policy(p.clone()),
                    None => entry,
                }
            })
            .collect();
        self.batch_execute(entries, batch_policy, None)
    }

    /// Delete many records
    pub fn batch_remove(
        &self,
        keys: &[Key],
        batch_policy: Option<&Value>,
        remove_policy: Option<&Value>,
    ) -> Result<BatchRecords> {
        let entries = keys
            .iter()
            .map(|k| {
                let entry = BatchEntry::remove(k.clone());
                match remove_policy {
                    Some(p) => entry.with_policy(p.clone()),
                    None => entry,
                }
            })
            .collect();
        self.batch_execute(entries, batch_policy, None)
    }
}

fn fill_undelivered(
    acc: &mut Accumulator,
    pending: &FxHashMap<usize, Pending>,
    code: ResultCode,
    in_doubt: bool,
) {
    let mut missing: Vec<_> = pending
        .iter()
        .filter(|(index, _)| !acc.delivered.contains(*index))
        .collect();
    missing.sort_by_key(|(index, _)| **index);
    for (index, p) in missing {
        acc.records.push(BatchRecord {
            index: *index,
            key: p.key.clone(),
            kind: p.kind,
            result: code,
            record: None,
            in_doubt: p.is_write && in_doubt,
        });
    }
}
