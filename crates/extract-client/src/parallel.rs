//! Parallel executor (spec §4.5), reinterpreted for this port: the original
//! isolated each worker in its own OS process to avoid TLS-state leakage
//! across HTTP client instances. Here workers are independent tokio tasks,
//! each holding its own [`crate::http::ShopifyClient`] instance (no shared
//! `reqwest::Client` state is smuggled across the boundary), and
//! cross-task communication is the same byte-serialized-message shape the
//! original used over pipes — a `Vec<u8>` per completed job.

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::ClientError;
use crate::rate_limit::RateLimiter;

/// Cap on one child's total output (spec §4.5); excess bytes are discarded,
/// not an error in themselves.
pub const MAX_CHILD_OUTPUT_BYTES: usize = 100 * 1024 * 1024;

/// Runs `job_fn` as an isolated task and awaits its single result.
///
/// # Panics
///
/// Panics if the spawned task itself panics (mirrors an isolated child
/// crashing — there is no partial result to recover).
pub async fn do_sync<F, Fut, T>(job_fn: F) -> T
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(job_fn())
        .await
        .expect("isolated task panicked")
}

/// A handle to a task started with [`do_async`]; the caller reaps it later.
pub struct AsyncHandle<T> {
    handle: tokio::task::JoinHandle<T>,
}

impl<T> AsyncHandle<T> {
    /// Awaits the task's completion.
    ///
    /// # Panics
    ///
    /// Panics if the task panicked.
    pub async fn reap(self) -> T {
        self.handle.await.expect("async task panicked")
    }
}

/// Fires `job_fn` in the background, returning a handle the caller reaps
/// later.
pub fn do_async<F, Fut, T>(job_fn: F) -> AsyncHandle<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    AsyncHandle {
        handle: tokio::spawn(job_fn()),
    }
}

/// Runs `jobs` through `child_fn` with at most `max_workers` concurrently
/// in flight, invoking `parent_fn` with each job's result as it completes.
///
/// An error from any child sets a sticky flag (returned): subsequent
/// children's errors are still passed to `parent_fn` but no further new
/// children are spawned once it trips — matching the original's
/// cascade-suppression behavior under `do_parallel`.
///
/// Returns `true` if any child errored.
pub async fn do_parallel<J, C, Fut, P>(
    jobs: Vec<J>,
    max_workers: usize,
    mut limiter: Option<&mut RateLimiter>,
    child_fn: C,
    mut parent_fn: P,
) -> bool
where
    J: Clone + Send + 'static,
    C: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Vec<u8>, ClientError>> + Send + 'static,
    P: FnMut(Result<Vec<u8>, ClientError>, &J),
{
    let max_workers = max_workers.max(1);
    let mut sticky_error = false;
    let mut in_flight = FuturesUnordered::new();
    let mut jobs_iter = jobs.into_iter();

    let spawn_one = |job: J, in_flight: &mut FuturesUnordered<_>| {
        let job_clone = job.clone();
        let fut = child_fn(job);
        in_flight.push(async move { (job_clone, fut.await) });
    };

    for _ in 0..max_workers {
        let Some(job) = jobs_iter.next() else { break };
        if let Some(lim) = limiter.as_deref_mut() {
            lim.wait_until_available(1.0).await;
        }
        spawn_one(job, &mut in_flight);
    }

    while let Some((job, result)) = in_flight.next().await {
        let capped = result.map(|mut bytes| {
            bytes.truncate(MAX_CHILD_OUTPUT_BYTES);
            bytes
        });

        if capped.is_err() {
            sticky_error = true;
        }
        parent_fn(capped, &job);

        if sticky_error {
            continue;
        }

        if let Some(job) = jobs_iter.next() {
            if let Some(lim) = limiter.as_deref_mut() {
                lim.wait_until_available(1.0).await;
            }
            spawn_one(job, &mut in_flight);
        }
    }

    sticky_error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn do_sync_returns_child_result() {
        let result = do_sync(|| async { 42 }).await;
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn do_async_reaps_result() {
        let handle = do_async(|| async { "done".to_string() });
        assert_eq!(handle.reap().await, "done");
    }

    #[tokio::test]
    async fn do_parallel_runs_all_jobs_and_reports_each_result() {
        let jobs = vec![1u32, 2, 3, 4];
        let mut collected = Vec::new();

        let had_error = do_parallel(
            jobs,
            2,
            None,
            |job: u32| async move { Ok(vec![job as u8]) },
            |result, job| {
                collected.push((*job, result.unwrap()));
            },
        )
        .await;

        assert!(!had_error);
        collected.sort_by_key(|(j, _)| *j);
        assert_eq!(collected.len(), 4);
    }

    #[tokio::test]
    async fn do_parallel_sets_sticky_error_and_stops_spawning() {
        let jobs = vec![1u32, 2, 3, 4, 5];
        let mut seen = Vec::new();

        let had_error = do_parallel(
            jobs,
            1,
            None,
            |job: u32| async move {
                if job == 2 {
                    Err(ClientError::Parse("boom".into()))
                } else {
                    Ok(vec![job as u8])
                }
            },
            |result, job| {
                seen.push((*job, result.is_ok()));
            },
        )
        .await;

        assert!(had_error);
        // Job 1 succeeds, job 2 fails and trips the sticky flag; job 1 was
        // spawned as the sole initial worker (max_workers=1) so no more than
        // 2 jobs should ever have completed.
        assert!(seen.len() <= 2);
    }
}
