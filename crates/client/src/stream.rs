//! Shared state machine behind scans and queries
//!
//! ```text
//! NotStarted ──run──▶ InProgress ──all partitions done──▶ Done
//!                        │  ▲
//!                        │  └── next page (paginated)
//!                        └── callback stop / stream failure ──▶ Aborted
//! ```
//!
//! In paginated mode the partition cursor survives between calls and each
//! call delivers at most `max_records` records. Without pagination every
//! call streams the whole partition range again. `Aborted` is terminal.
//!
//! A stream given a UDF or write operations can instead run as a background
//! job on the cluster; that leaves the state machine untouched.

use crate::assembler::{assemble, AssembleMode};
use crate::client::Shared;
use crate::job::JobModule;
use crate::partition::{PartitionFilter, PartitionsStatus};
use crate::transport::{
    BackgroundAction, BackgroundRequest, CommandSettings, StreamRequest, UdfCall,
};
use aeroclient_core::{param_error, Error, ErrorKind, Record, Result, ResultCode, Value};
use aeroclient_operations::{BinName, Operation, OperationBuilder, ValidationContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Field of a scan or query policy holding a partition filter
pub const PARTITION_FILTER_FIELD: &str = "partition_filter";

/// Progress of a scan or query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Nothing streamed yet
    NotStarted,
    /// At least one page streamed, more partitions remain
    InProgress,
    /// Every partition has been streamed
    Done,
    /// Stopped by the callback or a failure
    Aborted,
}

pub(crate) struct Stream {
    shared: Arc<Shared>,
    namespace: String,
    set: Option<String>,
    bins: Option<Vec<BinName>>,
    paginate: bool,
    state: StreamState,
    cursor: Option<PartitionsStatus>,
    filter: Option<PartitionFilter>,
    partial: Vec<Record>,
    action: Option<BackgroundAction>,
    abort_code: ResultCode,
    label: &'static str,
}

impl Stream {
    pub(crate) fn new(
        shared: Arc<Shared>,
        namespace: &str,
        set: Option<&str>,
        abort_code: ResultCode,
        label: &'static str,
    ) -> Result<Self> {
        if namespace.is_empty() {
            return Err(param_error!("{} namespace cannot be empty", label));
        }
        Ok(Stream {
            shared,
            namespace: namespace.to_string(),
            set: set.filter(|s| !s.is_empty()).map(str::to_string),
            bins: None,
            paginate: false,
            state: StreamState::NotStarted,
            cursor: None,
            filter: None,
            partial: Vec::new(),
            action: None,
            abort_code,
            label,
        })
    }

    pub(crate) fn select(&mut self, bins: &[&str]) -> Result<()> {
        let mut names = Vec::with_capacity(bins.len());
        for bin in bins {
            let name = BinName::from(*bin);
            name.validate(&self.shared.limits)?;
            names.push(name);
        }
        self.bins = Some(names);
        Ok(())
    }

    pub(crate) fn set_udf(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        if module.is_empty() || function.is_empty() {
            return Err(param_error!("udf module and function names cannot be empty"));
        }
        self.action = Some(BackgroundAction::Udf(UdfCall {
            module: module.to_string(),
            function: function.to_string(),
            args,
        }));
        Ok(())
    }

    /// Background operations may only write; `meta` may carry a ttl
    pub(crate) fn set_operations(
        &mut self,
        ops: Vec<Operation>,
        meta: Option<&Value>,
    ) -> Result<()> {
        let ctx = ValidationContext::batch_write().with_limits(self.shared.limits.clone());
        let batch = OperationBuilder::new(ops).meta(meta)?.build(&ctx)?;
        if batch.has_read() {
            return Err(param_error!(
                "{} background operations must all be writes",
                self.label
            ));
        }
        self.action = Some(BackgroundAction::Operations(batch));
        Ok(())
    }

    pub(crate) fn background(
        &self,
        request: StreamRequest,
        settings: CommandSettings,
        module: JobModule,
    ) -> Result<u64> {
        let Some(action) = self.action.clone() else {
            return Err(param_error!(
                "{} has no udf or operations to run in the background",
                self.label
            ));
        };
        let request = BackgroundRequest {
            stream: request,
            action,
            settings,
            module,
        };
        let job_id = self.shared.cluster.dispatch_background(&request)?;
        info!(
            target: "aeroclient::stream",
            kind = self.label,
            namespace = %self.namespace,
            job_id,
            "Background job started"
        );
        Ok(job_id)
    }

    pub(crate) fn paginate(&mut self) {
        self.paginate = true;
    }

    pub(crate) fn set_partition_filter(&mut self, filter: PartitionFilter) {
        self.filter = Some(filter);
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state == StreamState::Done
    }

    pub(crate) fn partition_status(&self) -> Option<&PartitionsStatus> {
        self.cursor.as_ref()
    }

    pub(crate) fn take_partial(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.partial)
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub(crate) fn request(&self) -> StreamRequest {
        StreamRequest {
            namespace: self.namespace.clone(),
            set: self.set.clone(),
            bins: self.bins.clone(),
            predicate: None,
            filter: None,
            max_records: 0,
            records_per_second: 0,
        }
    }

    /// Pick the partition cursor for the next run. An explicit filter, in
    /// the policy or set on the stream, restarts from that filter.
    fn start_status(&mut self, policy: Option<&Value>) -> Result<PartitionsStatus> {
        let from_policy = match policy.and_then(|p| p.get(PARTITION_FILTER_FIELD)) {
            None | Some(Value::Nil) => None,
            Some(v) => Some(PartitionFilter::decode(v)?),
        };
        if let Some(filter) = from_policy.or_else(|| self.filter.take()) {
            return Ok(filter.into_status());
        }
        match self.cursor.take() {
            Some(cursor) if self.paginate => Ok(cursor),
            _ => Ok(PartitionFilter::all().into_status()),
        }
    }

    /// Stream one page (or everything without pagination) into `on_record`
    pub(crate) fn run(
        &mut self,
        request: StreamRequest,
        policy: Option<&Value>,
        on_record: &mut dyn FnMut(Record) -> bool,
    ) -> Result<()> {
        if self.state == StreamState::Aborted {
            return Err(Error::new(
                self.abort_code,
                format!("{} was aborted; start a new one", self.label),
            ));
        }
        let previous = self.state;
        let mut status = self.start_status(policy)?;
        if self.paginate && status.done {
            self.state = StreamState::Done;
            self.cursor = Some(status);
            return Ok(());
        }

        debug!(
            target: "aeroclient::stream",
            kind = self.label,
            namespace = %self.namespace,
            begin = status.begin,
            count = status.count,
            max_records = request.max_records,
            "Streaming partitions"
        );
        self.state = StreamState::InProgress;
        let mut stopped = false;
        let mut delivered = 0u64;
        let outcome = {
            let mut on_item = |item: crate::transport::StreamItem| {
                let send_key = item.key.user_key().is_some();
                let record = assemble(item.record, AssembleMode::Merged, &item.key, send_key);
                delivered += 1;
                if on_record(record) {
                    true
                } else {
                    stopped = true;
                    false
                }
            };
            self.shared
                .cluster
                .dispatch_scan(&request, &mut status, &mut on_item)
        };
        status.refresh();

        if let Err(e) = outcome {
            if delivered == 0 && matches!(e.kind(), ErrorKind::Param | ErrorKind::Index) {
                self.state = previous;
                self.cursor = Some(status);
                return Err(e);
            }
            warn!(
                target: "aeroclient::stream",
                kind = self.label,
                delivered,
                error = %e,
                "Stream failed"
            );
            self.state = StreamState::Aborted;
            self.cursor = Some(status);
            if e.code() == self.abort_code {
                return Err(e);
            }
            return Err(Error::new(
                self.abort_code,
                format!("{} aborted: {}", self.label, e.message()),
            )
            .with_in_doubt(e.in_doubt()));
        }
        if stopped {
            self.state = StreamState::Aborted;
            self.cursor = Some(status);
            return Err(Error::new(
                self.abort_code,
                format!("{} stopped by callback after {} record(s)", self.label, delivered),
            ));
        }
        self.state = if !self.paginate || status.done {
            StreamState::Done
        } else {
            StreamState::InProgress
        };
        self.cursor = Some(status);
        Ok(())
    }

    /// Collect one page into a vector; on failure the records streamed so
    /// far stay available through `take_partial`
    pub(crate) fn collect(
        &mut self,
        request: StreamRequest,
        policy: Option<&Value>,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let result = self.run(request, policy, &mut |r| {
            records.push(r);
            true
        });
        match result {
            Ok(()) => Ok(records),
            Err(e) => {
                self.partial = records;
                Err(e)
            }
        }
    }
}
