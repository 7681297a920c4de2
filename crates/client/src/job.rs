//! Background jobs started by scans and queries
//!
//! A background scan or query changes records on the cluster instead of
//! streaming them back. The cluster answers with a job id; progress is read
//! back with a `jobs` info command.

use crate::client::Client;
use aeroclient_core::{param_error, Error, Result, ResultCode, Value};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Delay between two progress checks while waiting for a job
pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Kind of stream that started a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobModule {
    /// Started by a scan
    Scan,
    /// Started by a query
    Query,
}

impl JobModule {
    /// Module name used in info commands
    pub fn as_str(self) -> &'static str {
        match self {
            JobModule::Scan => "scan",
            JobModule::Query => "query",
        }
    }
}

impl fmt::Display for JobModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobModule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scan" => Ok(JobModule::Scan),
            "query" => Ok(JobModule::Query),
            other => Err(param_error!(
                "job module must be scan or query, got {:?}",
                other
            )),
        }
    }
}

/// Status of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// The cluster reported a status this client does not know
    Undefined,
    /// Still running
    InProgress,
    /// Finished, or no longer known to the cluster
    Completed,
}

/// Progress of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobInfo {
    /// Percent of partitions processed
    pub progress_pct: u32,
    /// Records the job has visited
    pub records_read: u64,
    /// Status
    pub status: JobStatus,
}

impl JobInfo {
    fn completed() -> Self {
        JobInfo {
            progress_pct: 100,
            records_read: 0,
            status: JobStatus::Completed,
        }
    }

    /// Parse a `key=value:key=value` job reply
    pub fn parse(reply: &str) -> Result<Self> {
        let mut info = JobInfo {
            progress_pct: 0,
            records_read: 0,
            status: JobStatus::Undefined,
        };
        for (name, value) in reply
            .trim()
            .split(':')
            .filter_map(|field| field.split_once('='))
        {
            match name {
                "status" => {
                    info.status = if value.starts_with("done") {
                        JobStatus::Completed
                    } else if value.starts_with("active") || value.starts_with("in-progress") {
                        JobStatus::InProgress
                    } else {
                        JobStatus::Undefined
                    };
                }
                "job-progress" => info.progress_pct = parse_field(name, value)?,
                "recs-read" => info.records_read = parse_field(name, value)?,
                _ => {}
            }
        }
        Ok(info)
    }
}

fn parse_field<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::new(
            ResultCode::ServerError,
            format!("malformed job field {}={}", name, value),
        )
    })
}

impl Client {
    /// Progress of a background job.
    ///
    /// A job id the cluster no longer knows reports as completed.
    pub fn job_info(
        &self,
        job_id: u64,
        module: JobModule,
        policy: Option<&Value>,
    ) -> Result<JobInfo> {
        let command = format!("jobs:module={};cmd=get-job;trid={}", module, job_id);
        match self.info(&command, policy) {
            Ok(reply) => JobInfo::parse(&reply),
            Err(e) if e.code() == ResultCode::KeyNotFound => Ok(JobInfo::completed()),
            Err(e) => Err(e),
        }
    }

    /// Block until a background job completes.
    ///
    /// Polls every [`JOB_POLL_INTERVAL`]. With `max_wait` set, gives up with
    /// a timeout error once that much time has passed.
    pub fn wait_for_job(
        &self,
        job_id: u64,
        module: JobModule,
        max_wait: Option<Duration>,
        policy: Option<&Value>,
    ) -> Result<JobInfo> {
        let started = Instant::now();
        loop {
            let info = self.job_info(job_id, module, policy)?;
            if info.status == JobStatus::Completed {
                debug!(
                    target: "aeroclient::job",
                    job_id,
                    module = module.as_str(),
                    records_read = info.records_read,
                    "Background job completed"
                );
                return Ok(info);
            }
            if max_wait.is_some_and(|limit| started.elapsed() >= limit) {
                return Err(Error::timeout(format!(
                    "{} job {} still running after {:?}",
                    module,
                    job_id,
                    started.elapsed()
                )));
            }
            std::thread::sleep(JOB_POLL_INTERVAL);
        }
    }
}
