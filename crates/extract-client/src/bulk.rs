//! Bulk operation driver (spec §4.6): `BulkBase`'s submit → poll → download →
//! parse state machine for a single `bulkOperationRunQuery`.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::ClientError;
use crate::http::ShopifyClient;

pub const MAX_RETRIES: u32 = 256;
pub const MAX_BLOCKED_RETRIES: u32 = 30;
pub const MAX_THROTTLED_RETRIES: u32 = 30;
pub const MAX_POLL_ATTEMPTS: u32 = 2000;
pub const MAX_POLL_ERRORS: u32 = 8;
pub const WAIT_SECONDS: u64 = 10;
pub const MAX_LINE_LENGTH: usize = 65_535 * 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperationState {
    Created,
    Running,
    Completed,
    Canceling,
    Canceled,
    Expired,
    Failed,
}

impl BulkOperationState {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "CREATED" => Self::Created,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "CANCELING" => Self::Canceling,
            "CANCELED" => Self::Canceled,
            "EXPIRED" => Self::Expired,
            "FAILED" => Self::Failed,
            _ => return None,
        })
    }

    fn is_dead(self) -> bool {
        matches!(
            self,
            Self::Canceling | Self::Canceled | Self::Expired | Self::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct BulkOperation {
    pub id: String,
    pub status: BulkOperationState,
    pub error_code: Option<String>,
    pub object_count: u64,
    pub url: Option<String>,
}

/// Drives one bulk operation's submit/poll/download cycle against a shared
/// [`ShopifyClient`].
pub struct BulkDriver<'a> {
    client: &'a ShopifyClient,
}

impl<'a> BulkDriver<'a> {
    #[must_use]
    pub fn new(client: &'a ShopifyClient) -> Self {
        Self { client }
    }

    /// Submits `inner_query` as a `bulkOperationRunQuery` mutation, retrying
    /// on "already in progress" (blocked) and "Throttled" responses.
    ///
    /// # Errors
    ///
    /// [`ClientError::BulkBlocked`]/[`ClientError::BulkThrottled`] once their
    /// retry budgets are exhausted, [`ClientError::BulkFailed`] on any other
    /// `userErrors` entry, or a transport/api error from the underlying
    /// request.
    pub async fn submit(&self, inner_query: &str) -> Result<String, ClientError> {
        let mutation = format!(
            r#"mutation {{ bulkOperationRunQuery(query: """{inner_query}""") {{ bulkOperation {{ id status }} userErrors {{ field message }} }} }}"#
        );

        let mut blocked_attempts = 0u32;
        let mut throttled_attempts = 0u32;

        loop {
            let body = self.client.graphql_request(&mutation).await?;
            let data = body
                .get("data")
                .and_then(|d| d.get("bulkOperationRunQuery"))
                .ok_or_else(|| ClientError::Parse("missing bulkOperationRunQuery in response".into()))?;

            let errors = data
                .get("userErrors")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if let Some(first) = errors.first() {
                let message = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();

                if message.contains("already in progress") {
                    blocked_attempts += 1;
                    if blocked_attempts > MAX_BLOCKED_RETRIES {
                        return Err(ClientError::BulkBlocked);
                    }
                    tokio::time::sleep(Duration::from_secs(WAIT_SECONDS + 10)).await;
                    continue;
                }

                if message.contains("Throttled") {
                    throttled_attempts += 1;
                    if throttled_attempts > MAX_THROTTLED_RETRIES {
                        return Err(ClientError::BulkThrottled);
                    }
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }

                return Err(ClientError::BulkFailed(message.to_string()));
            }

            let id = data
                .get("bulkOperation")
                .and_then(|b| b.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::Parse("missing bulkOperation.id".into()))?;

            return Ok(id.to_string());
        }
    }

    /// Polls the bulk operation identified by `gid` once.
    ///
    /// # Errors
    ///
    /// [`ClientError::Parse`] if the `node` query response is malformed.
    pub async fn poll_once(&self, gid: &str) -> Result<BulkOperation, ClientError> {
        let query = format!(
            r#"query {{ node(id: "{gid}") {{ ... on BulkOperation {{ id status errorCode createdAt completedAt objectCount rootObjectCount fileSize url partialDataUrl }} }} }}"#
        );
        let body = self.client.graphql_request(&query).await?;
        let node = body
            .get("data")
            .and_then(|d| d.get("node"))
            .ok_or_else(|| ClientError::Parse("missing node in poll response".into()))?;

        let status_raw = node
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Parse("missing status in poll response".into()))?;
        let status = BulkOperationState::parse(status_raw)
            .ok_or_else(|| ClientError::Parse(format!("unrecognized bulk status: {status_raw}")))?;

        Ok(BulkOperation {
            id: node.get("id").and_then(Value::as_str).unwrap_or(gid).to_string(),
            status,
            error_code: node
                .get("errorCode")
                .and_then(Value::as_str)
                .map(str::to_string),
            object_count: node
                .get("objectCount")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            url: node.get("url").and_then(Value::as_str).map(str::to_string),
        })
    }

    /// Polls until the operation completes, fails, or times out.
    ///
    /// # Errors
    ///
    /// [`ClientError::BulkFailed`] on a dead terminal state,
    /// [`ClientError::PollTimeout`] after `MAX_POLL_ATTEMPTS` polls or
    /// `MAX_POLL_ERRORS` consecutive malformed responses.
    pub async fn poll_until_done(&self, gid: &str) -> Result<BulkOperation, ClientError> {
        let poll_interval = Duration::from_secs(5 + WAIT_SECONDS);
        let mut error_count = 0u32;

        for _ in 0..MAX_POLL_ATTEMPTS {
            match self.poll_once(gid).await {
                Ok(op) => {
                    error_count = 0;
                    match op.status {
                        BulkOperationState::Completed => return Ok(op),
                        BulkOperationState::Created | BulkOperationState::Running => {}
                        _ if op.status.is_dead() => {
                            return Err(ClientError::BulkFailed(format!(
                                "bulk operation ended in {:?} (errorCode={:?})",
                                op.status, op.error_code
                            )));
                        }
                        _ => {}
                    }
                }
                Err(_) => {
                    error_count += 1;
                    if error_count > MAX_POLL_ERRORS {
                        return Err(ClientError::PollTimeout);
                    }
                }
            }
            tokio::time::sleep(poll_interval).await;
        }

        Err(ClientError::PollTimeout)
    }

    /// Downloads a completed operation's result URL into a fresh temp file,
    /// returning its path. The caller parses it as JSONL with
    /// [`checked_read_line`].
    ///
    /// # Errors
    ///
    /// [`ClientError::Transient`] on download failure.
    pub async fn download_to_tempfile(&self, url: &str) -> Result<PathBuf, ClientError> {
        let response = reqwest::get(url)
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;

        let file = tempfile::NamedTempFile::new()
            .map_err(|e| ClientError::Transient(e.to_string()))?;
        std::fs::write(file.path(), &bytes).map_err(|e| ClientError::Transient(e.to_string()))?;
        let (_, path) = file.keep().map_err(|e| ClientError::Transient(e.to_string()))?;
        Ok(path)
    }

    /// Full submit → poll → download cycle for one bulk query, returning the
    /// path to the downloaded JSONL (or `None` if the operation produced no
    /// rows).
    ///
    /// # Errors
    ///
    /// Propagates any error from submit, poll, or download.
    pub async fn run(&self, inner_query: &str) -> Result<Option<PathBuf>, ClientError> {
        let gid = self.submit(inner_query).await?;
        let op = self.poll_until_done(&gid).await?;
        match op.url {
            Some(url) if op.object_count > 0 => Ok(Some(self.download_to_tempfile(&url).await?)),
            _ => Ok(None),
        }
    }
}

/// Reads one line from `reader` into `buf`, enforcing [`MAX_LINE_LENGTH`].
///
/// Returns `Ok(Some(line))` for a normal line, `Ok(None)` at EOF. An
/// over-long line is discarded to end-of-line via a bounded skip loop and
/// reported as [`ClientError::Parse`] — the caller should fail the bulk
/// operation, not silently resync.
///
/// # Errors
///
/// [`ClientError::Parse`] if a line exceeds `MAX_LINE_LENGTH`, or an
/// underlying IO error wrapped as [`ClientError::Transient`].
pub fn checked_read_line<R: BufRead>(
    reader: &mut R,
    buf: &mut String,
) -> Result<Option<String>, ClientError> {
    buf.clear();
    let mut total = 0usize;
    loop {
        let n = reader
            .read_line(buf)
            .map_err(|e| ClientError::Transient(e.to_string()))?;
        if n == 0 {
            return if buf.is_empty() { Ok(None) } else { Ok(Some(std::mem::take(buf))) };
        }
        total += n;
        if buf.ends_with('\n') {
            let line = buf.trim_end_matches(['\n', '\r']).to_string();
            return Ok(Some(line));
        }
        if total > MAX_LINE_LENGTH {
            // Bounded skip loop: discard to end-of-line without unbounded memory growth.
            let mut skip = String::new();
            const MAX_SKIP_ITERATIONS: usize = 1024;
            for _ in 0..MAX_SKIP_ITERATIONS {
                skip.clear();
                let n = reader
                    .read_line(&mut skip)
                    .map_err(|e| ClientError::Transient(e.to_string()))?;
                if n == 0 || skip.ends_with('\n') {
                    break;
                }
            }
            return Err(ClientError::Parse(format!(
                "line exceeded MAX_LINE_LENGTH ({MAX_LINE_LENGTH} bytes)"
            )));
        }
    }
}

/// Opens `path` for buffered line-at-a-time reading.
///
/// # Errors
///
/// [`ClientError::Transient`] if the file cannot be opened.
pub fn open_jsonl(path: &Path) -> Result<BufReader<std::fs::File>, ClientError> {
    std::fs::File::open(path)
        .map(BufReader::new)
        .map_err(|e| ClientError::Transient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn checked_read_line_reads_normal_lines() {
        let mut cursor = Cursor::new(b"one\ntwo\n".to_vec());
        let mut buf = String::new();
        assert_eq!(checked_read_line(&mut cursor, &mut buf).unwrap(), Some("one".to_string()));
        assert_eq!(checked_read_line(&mut cursor, &mut buf).unwrap(), Some("two".to_string()));
        assert_eq!(checked_read_line(&mut cursor, &mut buf).unwrap(), None);
    }

    #[test]
    fn checked_read_line_rejects_overlong_line() {
        let huge = "a".repeat(MAX_LINE_LENGTH + 10);
        let mut data = huge.into_bytes();
        data.push(b'\n');
        data.extend_from_slice(b"next\n");
        let mut cursor = Cursor::new(data);
        let mut buf = String::new();
        assert!(checked_read_line(&mut cursor, &mut buf).is_err());
    }

    #[test]
    fn bulk_operation_state_recognizes_dead_states() {
        assert!(BulkOperationState::Canceled.is_dead());
        assert!(BulkOperationState::Failed.is_dead());
        assert!(!BulkOperationState::Running.is_dead());
        assert!(!BulkOperationState::Completed.is_dead());
    }
}
