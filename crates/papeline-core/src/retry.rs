//! Retry with exponential backoff for shard and database operations

use std::time::Duration;

use indicatif::ProgressBar;

use crate::error::ShardError;

/// Default maximum retry attempts for connectivity errors (§7 of the design: 5 attempts).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Base delay for exponential backoff: 2s, 4s, 8s, 16s, ...
const BASE_DELAY: Duration = Duration::from_secs(2);

/// Exponential backoff starting at `BASE_DELAY`, doubling per attempt.
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(BASE_DELAY.as_secs() * (1 << attempt.saturating_sub(1)))
}

/// Retry a fallible shard operation with exponential backoff, reporting progress on a bar.
///
/// Returns `Ok(T)` on first success, or the final `Err` on exhaustion / non-retryable error.
pub fn retry_with_backoff<T>(
    shard_label: &str,
    pb: &ProgressBar,
    max_retries: u32,
    mut attempt_fn: impl FnMut() -> Result<T, ShardError>,
) -> Result<T, ShardError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                pb.set_message(format!("retry {attempt}/{max_retries}..."));
                log::debug!(
                    "{shard_label}: attempt {attempt}/{max_retries} failed: {e}, retrying..."
                );
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => {
                log::error!("{shard_label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

/// Retry a plain fallible closure (no progress bar), for non-shard contexts like
/// establishing a database connection or running a batch query.
pub fn retry_quiet<T, E>(
    label: &str,
    max_retries: u32,
    is_retryable: impl Fn(&E) -> bool,
    mut attempt_fn: impl FnMut() -> Result<T, E>,
) -> Result<T, E>
where
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && is_retryable(&e) => {
                attempt += 1;
                log::warn!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_exponential() {
        assert_eq!(backoff_duration(1), Duration::from_secs(2));
        assert_eq!(backoff_duration(2), Duration::from_secs(4));
        assert_eq!(backoff_duration(3), Duration::from_secs(8));
    }

    #[test]
    fn retry_quiet_succeeds_after_failures() {
        let mut calls = 0;
        let result: Result<i32, &str> = retry_quiet(
            "test",
            3,
            |_| true,
            || {
                calls += 1;
                if calls < 3 { Err("transient") } else { Ok(42) }
            },
        );
        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_quiet_exhausts() {
        let mut calls = 0;
        let result: Result<i32, &str> = retry_quiet(
            "test",
            2,
            |_| true,
            || {
                calls += 1;
                Err("always fails")
            },
        );
        assert!(result.is_err());
        assert_eq!(calls, 3); // initial + 2 retries
    }

    #[test]
    fn retry_quiet_stops_on_non_retryable() {
        let mut calls = 0;
        let result: Result<i32, &str> = retry_quiet(
            "test",
            5,
            |_| false,
            || {
                calls += 1;
                Err("fatal")
            },
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
