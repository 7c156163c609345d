//! REST pagination engine with tiered page-size backoff (spec §4.9).

use reqwest::Method;
use serde_json::Value;

use crate::error::ClientError;
use crate::http::ShopifyClient;
use crate::pagination::extract_next_cursor;

/// Page-size tiers tried in order as transient errors are hit; the paginator
/// starts at tier 0 and only ever moves up.
pub const PRODUCT_PAGE_SIZE_TIERS: &[u32] = &[250, 150, 125, 100, 75, 50, 25, 10];

fn is_catchable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503)
}

/// Drives one paginated REST listing, yielding decoded pages via `on_page`.
pub struct RestPaginator<'a> {
    client: &'a ShopifyClient,
    tiers: &'a [u32],
    current_tier: usize,
}

impl<'a> RestPaginator<'a> {
    #[must_use]
    pub fn new(client: &'a ShopifyClient, tiers: &'a [u32]) -> Self {
        Self {
            client,
            tiers,
            current_tier: 0,
        }
    }

    fn limit(&self) -> u32 {
        self.tiers[self.current_tier.min(self.tiers.len() - 1)]
    }

    fn bump_tier(&mut self) {
        if self.current_tier + 1 < self.tiers.len() {
            self.current_tier += 1;
        }
    }

    /// Pages through `path` starting from `query_params`, invoking `on_page`
    /// with each decoded body. Stops once the `Link` header yields no next
    /// cursor.
    ///
    /// # Errors
    ///
    /// Propagates any non-catchable [`ClientError`]; catchable transient
    /// statuses (500/502/503) bump the page-size tier and retry the same
    /// page rather than propagating.
    pub async fn paginate<F>(
        &mut self,
        path: &str,
        query_params: &[(String, String)],
        mut on_page: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(Value),
    {
        let mut cursor: Option<String> = None;

        loop {
            let mut attempt_params = query_params.to_vec();
            attempt_params.push(("limit".to_string(), self.limit().to_string()));
            if let Some(c) = &cursor {
                attempt_params.push(("page_info".to_string(), c.clone()));
            }

            let payload = serde_json::to_value(
                attempt_params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                    .collect::<serde_json::Map<_, _>>(),
            )
            .unwrap();

            match self
                .client
                .request(Method::GET, path, Some(&payload), &[])
                .await
            {
                Ok(body) => {
                    let next = extract_next_cursor(self.client.last_link_header().as_deref());
                    on_page(body);
                    match next {
                        Some(next_cursor) => cursor = Some(next_cursor),
                        None => return Ok(()),
                    }
                }
                Err(ClientError::Api { status, .. }) if is_catchable_status(status) => {
                    self.bump_tier();
                    continue;
                }
                Err(ClientError::Transient(_)) => {
                    self.bump_tier();
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

/// Worker concurrency for a REST pull (spec §4.9): `min(rate_limit,
/// date_range_count, 50)`.
#[must_use]
pub fn worker_thread_count(rate_limit: usize, date_range_count: usize) -> usize {
    rate_limit.min(date_range_count).min(50)
}

/// Per-second token rate derived from the shop's Api-Call-Limit burst size
/// and a concurrency modifier (§4.9: burst `40` → rate `2`, `80` → rate `4`;
/// modifier `3` normally, `4` for shops with >50k products).
#[must_use]
pub fn derived_rate_limit(burst: u32, product_count: u64) -> f64 {
    let base_rate = f64::from(burst) / 20.0;
    let modifier = if product_count > 50_000 { 4.0 } else { 3.0 };
    base_rate * modifier
}

/// Pre-call admission check (§4.9): if `used >= total - 3*rate*modifier`,
/// the caller should wait for one token before proceeding; otherwise it may
/// ride the bucket (consume zero).
#[must_use]
pub fn should_wait_before_call(used: u32, total: u32, rate: f64, modifier: f64) -> bool {
    f64::from(used) >= f64::from(total) - 3.0 * rate * modifier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_rate_scales_with_burst_and_product_count() {
        assert!((derived_rate_limit(40, 100) - 6.0).abs() < 1e-9);
        assert!((derived_rate_limit(80, 100) - 12.0).abs() < 1e-9);
        assert!((derived_rate_limit(40, 60_000) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn worker_thread_count_caps_at_50() {
        assert_eq!(worker_thread_count(100, 100), 50);
        assert_eq!(worker_thread_count(4, 100), 4);
        assert_eq!(worker_thread_count(100, 3), 3);
    }

    #[test]
    fn should_wait_near_exhaustion() {
        assert!(should_wait_before_call(38, 40, 2.0, 3.0));
        assert!(!should_wait_before_call(2, 40, 2.0, 3.0));
    }
}
