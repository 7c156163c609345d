//! Client-layer error taxonomy (spec §7): each variant carries the
//! information a caller needs to decide retry vs. report, and is retriable
//! or not per [`ClientError::is_retriable`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure below the HTTP layer (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Final HTTP status ≥ 400 after retries were exhausted or a fail-fast
    /// status was seen.
    #[error("api error: status={status} request_id={request_id:?}")]
    Api {
        status: u16,
        body: String,
        request_id: Option<String>,
    },

    /// HTTP 429; caller should sleep `retry_after_secs` and retry.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    /// 5xx or a transient transport condition eligible for backoff retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Body did not parse as expected JSON/JSONL shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// A bulk operation submit hit "already in progress".
    #[error("bulk operation blocked (already in progress)")]
    BulkBlocked,

    /// A bulk operation submit hit "Throttled".
    #[error("bulk operation throttled")]
    BulkThrottled,

    /// A bulk operation reached CANCELED/CANCELING/EXPIRED/FAILED, or its
    /// submit returned a non-blocked/throttled userError.
    #[error("bulk operation failed: {0}")]
    BulkFailed(String),

    /// Polling exceeded `MAX_POLL_ATTEMPTS` or `MAX_POLL_ERRORS`.
    #[error("bulk operation poll timed out or errored too many times")]
    PollTimeout,
}

impl ClientError {
    /// Transport and transient/5xx errors are retriable by
    /// [`crate::rate_limit::retry_with_backoff`]; everything else is not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Transient(_) | ClientError::RateLimit { .. }
        )
    }
}
