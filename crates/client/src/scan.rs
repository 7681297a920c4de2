//! Namespace and set scans

use crate::client::Client;
use crate::job::JobModule;
use crate::partition::{PartitionFilter, PartitionsStatus};
use crate::settings;
use crate::stream::{Stream, StreamState};
use crate::transport::StreamRequest;
use aeroclient_core::{Record, Result, ResultCode, Value};
use aeroclient_operations::Operation;
use aeroclient_policy::{resolve, ScanPolicy};
use std::sync::Arc;

/// A scan over every record of a namespace or set.
///
/// The policy passed to [`Scan::results`] or [`Scan::foreach`] may carry a
/// `partition_filter` entry restricting the partitions streamed.
pub struct Scan {
    stream: Stream,
}

impl std::fmt::Debug for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan").finish_non_exhaustive()
    }
}

impl Client {
    /// Prepare a scan; `set` of `None` scans the whole namespace
    pub fn scan(&self, namespace: &str, set: Option<&str>) -> Result<Scan> {
        let stream = Stream::new(
            Arc::clone(self.shared()),
            namespace,
            set,
            ResultCode::ScanAbort,
            "scan",
        )?;
        Ok(Scan { stream })
    }

    /// Run `module.function(args)` against every record of a namespace or
    /// set in a background job and return the job id. With `wait` set, block
    /// until the job completes.
    #[allow(clippy::too_many_arguments)]
    pub fn scan_apply(
        &self,
        namespace: &str,
        set: Option<&str>,
        module: &str,
        function: &str,
        args: Vec<Value>,
        policy: Option<&Value>,
        wait: bool,
    ) -> Result<u64> {
        let mut scan = self.scan(namespace, set)?;
        scan.apply(module, function, args)?;
        let job_id = scan.execute_background(policy)?;
        if wait {
            self.wait_for_job(job_id, JobModule::Scan, None, None)?;
        }
        Ok(job_id)
    }
}

impl Scan {
    /// Return only these bins
    pub fn select(&mut self, bins: &[&str]) -> Result<&mut Self> {
        self.stream.select(bins)?;
        Ok(self)
    }

    /// Deliver at most `max_records` records per call and resume from the
    /// partition cursor on the next call
    pub fn paginate(&mut self) -> &mut Self {
        self.stream.paginate();
        self
    }

    /// Restrict the next run to a partition range or resume from a saved
    /// cursor
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

    /// Records streamed by a failed [`Scan::results`] call
    pub fn take_partial(&mut self) -> Vec<Record> {
        self.stream.take_partial()
    }

    fn request(&self, policy: Option<&Value>) -> Result<(ScanPolicy, StreamRequest)> {
        let p: ScanPolicy = resolve(&self.stream.shared().defaults.scan, policy)?;
        let request = StreamRequest {
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

    /// Hand each record to `callback`; returning `false` stops the scan,
    /// which then fails with `ScanAbort`
    pub fn foreach(
        &mut self,
        policy: Option<&Value>,
        mut callback: impl FnMut(Record) -> bool,
    ) -> Result<()> {
        let (_, request) = self.request(policy)?;
        self.stream.run(request, policy, &mut callback)
    }

    /// Run a registered UDF against each record when the scan executes in
    /// the background
    pub fn apply(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<&mut Self> {
        self.stream.set_udf(module, function, args)?;
        Ok(self)
    }

    /// Apply write operations to each record when the scan executes in the
    /// background. `meta` may carry a `ttl`.
    pub fn add_ops(&mut self, ops: Vec<Operation>, meta: Option<&Value>) -> Result<&mut Self> {
        self.stream.set_operations(ops, meta)?;
        Ok(self)
    }

    /// Start the scan as a background job and return its id; see
    /// [`Client::job_info`] for its progress
    pub fn execute_background(&mut self, policy: Option<&Value>) -> Result<u64> {
        let (p, request) = self.request(policy)?;
        let settings = settings::background(&p.base, p.replica, p.durable_delete);
        self.stream.background(request, settings, JobModule::Scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroclient_core::{ErrorKind, Key};

    fn seeded(n: i64) -> Client {
        let c = Client::in_memory();
        for i in 0..n {
            let key = Key::new("test", "demo", i).unwrap();
            c.put(&key, &[("v", Value::Int(i)), ("w", Value::Int(-i))], None, None)
                .unwrap();
        }
        let other = Key::new("test", "other", 0).unwrap();
        c.put(&other, &[("v", Value::Int(0))], None, None).unwrap();
        c
    }

    #[test]
    fn test_scan_set_and_namespace() {
        let c = seeded(20);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        assert_eq!(scan.state(), StreamState::NotStarted);
        assert_eq!(scan.results(None).unwrap().len(), 20);
        assert!(scan.is_done());
        let mut all = c.scan("test", None).unwrap();
        assert_eq!(all.results(None).unwrap().len(), 21);
    }

    #[test]
    fn test_select_projects_bins() {
        let c = seeded(3);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        scan.select(&["v"]).unwrap();
        for rec in scan.results(None).unwrap() {
            assert!(rec.bins.contains("v"));
            assert!(!rec.bins.contains("w"));
        }
    }

    #[test]
    fn test_pagination_resumes_without_duplicates() {
        let c = seeded(25);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        scan.paginate();
        let policy = Value::map_from([("max_records", Value::Int(10))]);
        let mut seen = std::collections::BTreeSet::new();
        let mut pages = 0;
        while !scan.is_done() {
            let page = scan.results(Some(&policy)).unwrap();
            assert!(page.len() <= 10);
            for rec in page {
                assert!(seen.insert(rec.key.digest));
            }
            pages += 1;
            assert!(pages < 10);
        }
        assert_eq!(seen.len(), 25);
        assert!(scan.partition_status().unwrap().done);
    }

    #[test]
    fn test_callback_stop_aborts() {
        let c = seeded(10);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        let mut got = 0;
        let err = scan
            .foreach(None, |_| {
                got += 1;
                got < 3
            })
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::ScanAbort);
        assert_eq!(err.kind(), ErrorKind::ScanAborted);
        assert_eq!(got, 3);
        assert_eq!(scan.state(), StreamState::Aborted);
        assert!(scan.results(None).is_err());
    }

    #[test]
    fn test_partition_filter_in_policy() {
        let c = seeded(30);
        let key = Key::new("test", "demo", 7).unwrap();
        let pid = key.partition_id() as i64;
        let policy = Value::map_from([(
            "partition_filter",
            Value::map_from([("begin", Value::Int(pid)), ("count", Value::Int(1))]),
        )]);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        let records = scan.results(Some(&policy)).unwrap();
        assert!(records.iter().any(|r| r.key.digest == *key.digest()));
        assert!(records
            .iter()
            .all(|r| r.key.digest.partition_id() as i64 == pid));

        let bad = Value::map_from([(
            "partition_filter",
            Value::map_from([("begin", Value::Int(4096))]),
        )]);
        assert!(scan.results(Some(&bad)).unwrap_err().is_param());
    }

    #[test]
    fn test_background_ops_touch_every_record() {
        let c = seeded(12);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        scan.add_ops(vec![Operation::write("flag", 1)], None).unwrap();
        let job = scan.execute_background(None).unwrap();
        let info = c.job_info(job, JobModule::Scan, None).unwrap();
        assert_eq!(info.status, crate::job::JobStatus::Completed);
        assert_eq!(info.records_read, 12);
        assert_eq!(scan.state(), StreamState::NotStarted);

        let other = Key::new("test", "other", 0).unwrap();
        assert!(c.get(&other, None).unwrap().bin("flag").is_none());
        for i in 0..12 {
            let key = Key::new("test", "demo", i).unwrap();
            assert_eq!(c.get(&key, None).unwrap().bin("flag"), Some(&Value::Int(1)));
        }
    }

    #[test]
    fn test_background_needs_write_action() {
        let c = seeded(2);
        let mut scan = c.scan("test", Some("demo")).unwrap();
        assert!(scan.execute_background(None).unwrap_err().is_param());
        assert!(scan
            .add_ops(vec![Operation::read("v")], None)
            .unwrap_err()
            .is_param());
        assert!(scan.apply("", "f", vec![]).unwrap_err().is_param());
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let c = Client::in_memory();
        assert!(c.scan("", None).unwrap_err().is_param());
    }
}
