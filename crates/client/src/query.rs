//! Secondary-index queries

use crate::client::Client;
use crate::job::JobModule;
use crate::partition::{PartitionFilter, PartitionsStatus};
use crate::settings;
use crate::stream::{Stream, StreamState};
use crate::transport::{IndexPredicate, StreamRequest};
use aeroclient_core::{param_error, Record, Result, ResultCode, Value};
use aeroclient_operations::Operation;
use aeroclient_policy::{resolve, QueryPolicy};
use std::sync::Arc;

/// A query over a namespace or set.
///
/// Without a predicate a query streams every record, like a scan. With one,
/// the cluster needs a secondary index on the predicate's bin.
pub struct Query {
    stream: Stream,
    predicate: Option<IndexPredicate>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Prepare a query; `set` of `None` queries the whole namespace
    pub fn query(&self, namespace: &str, set: Option<&str>) -> Result<Query> {
        let stream = Stream::new(
            Arc::clone(self.shared()),
            namespace,
            set,
            ResultCode::QueryAborted,
            "query",
        )?;
        Ok(Query {
            stream,
            predicate: None,
        })
    }

    /// Run `module.function(args)` against every record matching
    /// `predicate` in a background job and return the job id. With `wait`
    /// set, block until the job completes.
    #[allow(clippy::too_many_arguments)]
    pub fn query_apply(
        &self,
        namespace: &str,
        set: Option<&str>,
        predicate: Option<IndexPredicate>,
        module: &str,
        function: &str,
        args: Vec<Value>,
        policy: Option<&Value>,
        wait: bool,
    ) -> Result<u64> {
        let mut query = self.query(namespace, set)?;
        if let Some(predicate) = predicate {
            query.where_predicate(predicate)?;
        }
        query.apply(module, function, args)?;
        let job_id = query.execute_background(policy)?;
        if wait {
            self.wait_for_job(job_id, JobModule::Query, None, None)?;
        }
        Ok(job_id)
    }
}

impl Query {
    /// Return only these bins
    pub fn select(&mut self, bins: &[&str]) -> Result<&mut Self> {
        self.stream.select(bins)?;
        Ok(self)
    }

    /// Restrict results with a secondary-index predicate. Only one predicate
    /// is supported.
    pub fn where_predicate(&mut self, predicate: IndexPredicate) -> Result<&mut Self> {
        if self.predicate.is_some() {
            return Err(param_error!("query already has a predicate"));
        }
        predicate.bin().validate(&self.stream.shared().limits)?;
        predicate.geo_shape()?;
        if let IndexPredicate::Between { begin, end, .. } = &predicate {
            if begin > end {
                return Err(param_error!(
                    "between range is empty: {} > {}",
                    begin,
                    end
                ));
            }
        }
        self.predicate = Some(predicate);
        Ok(self)
    }

    /// Deliver at most `max_records` records per call
    pub fn paginate(&mut self) -> &mut Self {
        self.stream.paginate();
        self
    }

    /// Restrict the next run to a partition range or resume from a cursor
    pub fn partition_filter(&mut self, filter: PartitionFilter) -> &mut Self {
        self.stream.set_partition_filter(filter);
        self
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.stream.state()
    }

    /// Whether every partition has been streamed
    pub fn is_done(&self) -> bool {
        self.stream.is_done()
    }

    /// Cursor after the last run
    pub fn partition_status(&self) -> Option<&PartitionsStatus> {
        self.stream.partition_status()
    }

    /// Records streamed by a failed [`Query::results`] call
    pub fn take_partial(&mut self) -> Vec<Record> {
        self.stream.take_partial()
    }

    fn request(&self, policy: Option<&Value>) -> Result<(QueryPolicy, StreamRequest)> {
        let p: QueryPolicy = resolve(&self.stream.shared().defaults.query, policy)?;
        let request = StreamRequest {
            predicate: self.predicate.clone(),
            filter: p.base.filter.clone(),
            max_records: p.max_records,
            records_per_second: p.records_per_second,
            ..self.stream.request()
        };
        Ok((p, request))
    }

    /// Collect the records of one run
    pub fn results(&mut self, policy: Option<&Value>) -> Result<Vec<Record>> {
        let (_, request) = self.request(policy)?;
        self.stream.collect(request, policy)
    }

    /// Hand each record to `callback`; returning `false` stops the query,
    /// which then fails with `QueryAborted`
    pub fn foreach(
        &mut self,
        policy: Option<&Value>,
        mut callback: impl FnMut(Record) -> bool,
    ) -> Result<()> {
        let (_, request) = self.request(policy)?;
        self.stream.run(request, policy, &mut callback)
    }

    /// Run a registered UDF against each matching record when the query
    /// executes in the background
    pub fn apply(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<&mut Self> {
        self.stream.set_udf(module, function, args)?;
        Ok(self)
    }

    /// Apply write operations to each matching record when the query
    /// executes in the background
    pub fn add_ops(&mut self, ops: Vec<Operation>, meta: Option<&Value>) -> Result<&mut Self> {
        self.stream.set_operations(ops, meta)?;
        Ok(self)
    }

    /// Start the query as a background job and return its id
    pub fn execute_background(&mut self, policy: Option<&Value>) -> Result<u64> {
        let (p, request) = self.request(policy)?;
        let settings = settings::background(&p.base, p.replica, false);
        self.stream.background(request, settings, JobModule::Query)
    }
}
