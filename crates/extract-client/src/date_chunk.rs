//! Date-range chunker (spec §4.11): splits an activity window into ranges
//! sized by a `products/count` probe, used by both REST workers and bulk
//! slices (`force_bulk_pieces`).

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Initial chunk step, scaled down for larger catalogs (§4.11).
#[must_use]
pub fn initial_step(product_count: u64) -> Duration {
    if product_count > 100_000 {
        Duration::days(2)
    } else if product_count > 50_000 {
        Duration::weeks(1)
    } else {
        Duration::days(365)
    }
}

const COUNT_THRESHOLD: u64 = 20_000;
const MIN_STEP: Duration = Duration::days(1);

/// Builds the ordered list of `[start, end]` ranges covering
/// `[window_start, window_end]`.
///
/// `probe_count` is called with a candidate `[start, end]` and returns the
/// `products/count` for that range; a range is committed once the probe is
/// `<= COUNT_THRESHOLD` or the step has already been halved to one day.
pub async fn build_date_ranges<F, Fut>(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    product_count: u64,
    mut probe_count: F,
) -> Vec<DateRange>
where
    F: FnMut(DateRange) -> Fut,
    Fut: std::future::Future<Output = u64>,
{
    let mut ranges = Vec::new();
    let mut cursor = window_start;

    while cursor < window_end {
        let mut step = initial_step(product_count);

        loop {
            let candidate_end = (cursor + step).min(window_end);
            let candidate = DateRange {
                start: cursor,
                end: candidate_end,
            };
            let count = probe_count(candidate).await;

            if count <= COUNT_THRESHOLD || step <= MIN_STEP {
                ranges.push(candidate);
                cursor = candidate_end;
                break;
            }

            step = (step / 2).max(MIN_STEP);
        }
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_step_scales_down_for_large_catalogs() {
        assert_eq!(initial_step(10), Duration::days(365));
        assert_eq!(initial_step(60_000), Duration::weeks(1));
        assert_eq!(initial_step(150_000), Duration::days(2));
    }

    #[tokio::test]
    async fn commits_whole_window_when_probe_is_small() {
        let start = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2021-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ranges = build_date_ranges(start, end, 10, |_| async { 5 }).await;
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start, start);
        assert_eq!(ranges[0].end, end);
    }

    #[tokio::test]
    async fn halves_step_until_count_under_threshold() {
        let start = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2020-01-03T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let ranges = build_date_ranges(start, end, 10, |range| {
            let span = range.end - range.start;
            async move {
                if span > Duration::days(1) {
                    100_000
                } else {
                    5
                }
            }
        })
        .await;

        assert!(ranges.len() >= 2);
        for r in &ranges {
            assert!(r.end - r.start <= Duration::days(1));
        }
    }
}
