//! Rate limiting and retry utilities (spec §4.1, §4.4).
//!
//! [`RateLimiter`] is a token bucket; each worker owns its own instance —
//! there is no cross-process coordination, matching the original's
//! per-process limiter. [`retry_with_backoff`] wraps a fallible async
//! operation with exponential backoff, honoring `Retry-After` on 429s.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::ClientError;

/// Token-bucket rate limiter (spec §4.1).
///
/// `rate` tokens are added per `per_seconds` seconds, capped at `rate`
/// tokens banked. `wait_until_available` blocks (async sleep) until `n`
/// tokens can be spent.
pub struct RateLimiter {
    rate: f64,
    per_seconds: f64,
    allowance: f64,
    last_check: Instant,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rate: f64, per_seconds: f64) -> Self {
        Self {
            rate,
            per_seconds,
            allowance: rate,
            last_check: Instant::now(),
        }
    }

    /// Returns the number of microseconds the caller must sleep before `n`
    /// tokens are available, or `0` if they're available now (and already
    /// debited from the bucket).
    pub fn get_sleep_micros(&mut self, n: f64) -> u64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_check).as_secs_f64();
        self.last_check = now;

        self.allowance += elapsed * (self.rate / self.per_seconds);
        if self.allowance > self.rate {
            self.allowance = self.rate;
        }

        if self.allowance >= n {
            self.allowance -= n;
            0
        } else {
            let deficit = n - self.allowance;
            ((deficit) * self.per_seconds / self.rate * 1_000_000.0) as u64
        }
    }

    /// Blocks until `n` tokens (default 1) are available.
    pub async fn wait_until_available(&mut self, n: f64) {
        loop {
            let sleep_micros = self.get_sleep_micros(n);
            if sleep_micros == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_micros(sleep_micros)).await;
        }
    }
}

/// Executes `operation` with exponential backoff + jitter, honoring
/// `Retry-After` on [`ClientError::RateLimit`]. Up to `max_attempts` tries;
/// the backoff window doubles each attempt, capped at `cap_secs`.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_secs: u64,
    cap_secs: u64,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt + 1 >= max_attempts {
                    return Err(err);
                }

                let delay_secs = match &err {
                    ClientError::RateLimit { retry_after_secs } => *retry_after_secs,
                    _ => {
                        let window = base_secs.saturating_mul(1u64 << attempt.min(20));
                        let window = window.min(cap_secs);
                        let jitter = jitter_fraction(attempt);
                        ((window as f64) * jitter) as u64
                    }
                };

                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_secs,
                    error = %err,
                    "transient client error — retrying after backoff"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                attempt += 1;
            }
        }
    }
}

/// Deterministic pseudo-jitter in `[0.5, 1.0)`, keyed by attempt number —
/// avoids pulling in a PRNG dependency just to avoid thundering-herd retries.
fn jitter_fraction(attempt: u32) -> f64 {
    let x = f64::from(attempt.wrapping_mul(2_654_435_761) % 1000) / 1000.0;
    0.5 + x * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn rate_limiter_allows_immediate_spend_within_allowance() {
        let mut limiter = RateLimiter::new(10.0, 1.0);
        assert_eq!(limiter.get_sleep_micros(5.0), 0);
    }

    #[test]
    fn rate_limiter_requires_sleep_once_allowance_exhausted() {
        let mut limiter = RateLimiter::new(2.0, 1.0);
        assert_eq!(limiter.get_sleep_micros(2.0), 0);
        assert!(limiter.get_sleep_micros(2.0) > 0);
    }

    #[tokio::test]
    async fn retry_succeeds_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let result = retry_with_backoff(3, 0, 1, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ClientError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_on_non_retriable_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let result: Result<u32, ClientError> = retry_with_backoff(3, 0, 1, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Parse("bad body".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_exhausts_attempts_on_transient_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let result: Result<u32, ClientError> = retry_with_backoff(3, 0, 1, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Transient("boom".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
