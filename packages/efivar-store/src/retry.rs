//! Bounded retries for operations that can lose a race.

use crate::error::Result;

/// Retries used by [`Efivars`](crate::Efivars) unless configured otherwise.
pub const DEFAULT_RETRIES: usize = 4;

/// Run `operation`, repeating it up to `retries` more times while it fails
/// with [`Error::RetryNeeded`](crate::Error::RetryNeeded).
///
/// Any other outcome is returned immediately. Once the budget is spent the
/// last result is returned as is, so a caller can still see `RetryNeeded`.
pub fn with_retry<T>(retries: usize, mut operation: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Err(err) if err.is_retryable() && attempt <= retries => {
                tracing::debug!(attempt, retries, "operation raced, retrying");
            }
            result => return result,
        }
    }
}
