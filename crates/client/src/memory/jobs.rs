//! Background jobs of the in-process cluster
//!
//! Jobs run to completion before their id is handed back. The registry
//! keeps what `jobs:...;cmd=get-job` reports afterwards.

use super::exec;
use super::scan::walk;
use super::Inner;
use crate::job::JobModule;
use crate::partition::PartitionFilter;
use crate::transport::{BackgroundAction, BackgroundRequest, Request, RequestKind};
use aeroclient_core::{Key, Result};
use std::sync::atomic::Ordering;
use tracing::debug;

/// A finished job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct JobRecord {
    pub(super) module: JobModule,
    pub(super) records_read: u64,
}

/// Visit every record the stream selects and apply the job's action
pub(super) fn run(inner: &Inner, request: &BackgroundRequest) -> Result<u64> {
    if let BackgroundAction::Udf(call) = &request.action {
        inner.udf(call)?;
    }
    let mut keys: Vec<Key> = Vec::new();
    let mut partitions = PartitionFilter::all().into_status();
    walk(inner, &request.stream, &mut partitions, &mut |item| {
        keys.push(item.key);
        true
    })?;

    let kind = match &request.action {
        BackgroundAction::Udf(call) => RequestKind::Apply(call.clone()),
        BackgroundAction::Operations(batch) => RequestKind::Operate(batch.clone()),
    };
    let mut failed = 0usize;
    for key in &keys {
        let record = Request {
            key: key.clone(),
            kind: kind.clone(),
            settings: request.settings.clone(),
        };
        if let Err(e) = exec::execute(inner, &record) {
            failed += 1;
            debug!(
                target: "aeroclient::memory",
                key = %key,
                error = %e,
                "Background write failed"
            );
        }
    }

    let job_id = inner.next_job.fetch_add(1, Ordering::Relaxed) + 1;
    inner.jobs.lock().insert(
        job_id,
        JobRecord {
            module: request.module,
            records_read: keys.len() as u64,
        },
    );
    debug!(
        target: "aeroclient::memory",
        job_id,
        module = request.module.as_str(),
        records = keys.len(),
        failed,
        "Background job finished"
    );
    Ok(job_id)
}

/// Job reply in the `key=value:key=value` form of a server node
pub(super) fn describe(job_id: u64, job: &JobRecord) -> String {
    format!(
        "trid={}:module={}:status=done(ok):job-progress=100:recs-read={}",
        job_id, job.module, job.records_read
    )
}
