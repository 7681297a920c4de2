//! Retry loop for single-record commands
//!
//! `max_retries` attempts are allowed after the first, spaced by
//! `sleep_between_retries` and bounded by `total_timeout`. Only transport
//! failures are retried, and a write is retried only while the failure is
//! known not to have reached the server (`in_doubt == false`).

use aeroclient_core::{Error, ErrorKind, Result};
use aeroclient_policy::BasePolicy;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

fn retriable(err: &Error, idempotent: bool) -> bool {
    let transport = matches!(err.kind(), ErrorKind::Timeout | ErrorKind::Connection);
    transport && (idempotent || !err.in_doubt())
}

/// Run `attempt` under the policy's retry budget.
///
/// `attempt` receives the zero-based attempt number.
pub fn with_retry<T>(
    policy: &BasePolicy,
    idempotent: bool,
    what: &str,
    mut attempt: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let started = Instant::now();
    let budget =
        (policy.total_timeout > 0).then(|| Duration::from_millis(policy.total_timeout as u64));
    let backoff = Duration::from_millis(policy.sleep_between_retries as u64);
    let mut n = 0u32;
    loop {
        let err = match attempt(n) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if !retriable(&err, idempotent) {
            return Err(err);
        }
        let out_of_time = budget.is_some_and(|b| started.elapsed() + backoff >= b);
        if n >= policy.max_retries || out_of_time {
            if err.kind() == ErrorKind::Timeout {
                let in_doubt = err.in_doubt();
                return Err(Error::timeout(format!(
                    "{} timed out after {} attempt(s): {}",
                    what,
                    n + 1,
                    err.message()
                ))
                .with_in_doubt(in_doubt));
            }
            return Err(err);
        }
        warn!(
            target: "aeroclient::retry",
            command = what,
            attempt = n + 1,
            error = %err,
            "Retrying command"
        );
        if !backoff.is_zero() {
            thread::sleep(backoff);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroclient_core::ResultCode;
    use std::cell::Cell;

    fn policy(max_retries: u32) -> BasePolicy {
        BasePolicy {
            max_retries,
            total_timeout: 0,
            ..BasePolicy::read_default()
        }
    }

    #[test]
    fn test_retries_transport_errors_then_succeeds() {
        let calls = Cell::new(0);
        let out = with_retry(&policy(2), true, "get", |_| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Error::connection("reset"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausted_timeouts_surface_as_timeout() {
        let err = with_retry(&policy(1), true, "get", |_| -> Result<()> {
            Err(Error::timeout("socket"))
        })
        .unwrap_err();
        assert_eq!(err.code(), ResultCode::Timeout);
        assert!(err.message().contains("2 attempt"));
    }

    #[test]
    fn test_record_errors_not_retried() {
        let calls = Cell::new(0);
        let err = with_retry(&policy(5), true, "get", |_| -> Result<()> {
            calls.set(calls.get() + 1);
            Err(Error::from_code(ResultCode::KeyNotFound))
        })
        .unwrap_err();
        assert_eq!(err.code(), ResultCode::KeyNotFound);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_in_doubt_write_not_retried() {
        let calls = Cell::new(0);
        let err = with_retry(&policy(5), false, "put", |_| -> Result<()> {
            calls.set(calls.get() + 1);
            Err(Error::timeout("socket").with_in_doubt(true))
        })
        .unwrap_err();
        assert!(err.in_doubt());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_write_retried_when_not_sent() {
        let calls = Cell::new(0);
        let out = with_retry(&policy(1), false, "put", |n| {
            calls.set(calls.get() + 1);
            if n == 0 {
                Err(Error::connection("refused"))
            } else {
                Ok(())
            }
        });
        assert!(out.is_ok());
        assert_eq!(calls.get(), 2);
    }
}
