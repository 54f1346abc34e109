//! KPI queries for the triage dashboard.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::models::metric::NewDeliveryMetric;
use crate::store::{Store, StoreError};

pub const DEFAULT_INTERVAL_MINUTES: i64 = 60;
pub const MAX_INTERVAL_MINUTES: i64 = 1440;

/// Look-back window selectable from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    Hour,
    SixHours,
    #[default]
    Day,
    Week,
    Month,
}

impl Window {
    /// Parse a window token. Unknown or missing tokens select the default.
    pub fn parse(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some("1h") => Window::Hour,
            Some("6h") => Window::SixHours,
            Some("24h") => Window::Day,
            Some("7d") => Window::Week,
            Some("30d") => Window::Month,
            _ => Window::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Window::Hour => "1h",
            Window::SixHours => "6h",
            Window::Day => "24h",
            Window::Week => "7d",
            Window::Month => "30d",
        }
    }

    pub fn duration(self) -> TimeDelta {
        match self {
            Window::Hour => TimeDelta::hours(1),
            Window::SixHours => TimeDelta::hours(6),
            Window::Day => TimeDelta::hours(24),
            Window::Week => TimeDelta::days(7),
            Window::Month => TimeDelta::days(30),
        }
    }

    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

/// Bucket width in minutes: defaults to 60, clamped to one day.
pub fn clamp_interval(minutes: Option<i64>) -> i64 {
    minutes
        .unwrap_or(DEFAULT_INTERVAL_MINUTES)
        .clamp(1, MAX_INTERVAL_MINUTES)
}

/// Activity and delivery health over a window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Overview {
    pub events: i64,
    pub alerts: i64,
    pub failures: i64,
    /// Percentage of deliveries handled successfully.
    pub success_rate: f64,
    pub p95_latency_ms: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub events: i64,
    pub alerts: i64,
    pub failures: i64,
}

pub fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * successes as f64 / total as f64
}

/// Nearest-rank p95 without interpolation: the element at
/// `floor(0.95 * (n - 1))` of the sorted samples.
pub fn p95(mut samples: Vec<i64>) -> i64 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let idx = (0.95 * (samples.len() - 1) as f64).floor() as usize;
    samples[idx]
}

/// Align `ts` down to the start of its `interval_minutes` slot, counted from
/// the unix epoch.
pub fn truncate(ts: DateTime<Utc>, interval_minutes: i64) -> DateTime<Utc> {
    let width = interval_minutes.max(1) * 60;
    let secs = ts.timestamp();
    let aligned = secs - secs.rem_euclid(width);
    DateTime::from_timestamp(aligned, 0).unwrap_or(ts)
}

/// Slot starts from `truncate(since)` up to the slot containing `now`. A slot
/// that would start exactly at `now` is not included. Always at least one.
fn bucket_starts(since: DateTime<Utc>, now: DateTime<Utc>, interval_minutes: i64) -> Vec<DateTime<Utc>> {
    let step = TimeDelta::minutes(interval_minutes.max(1));
    let mut starts = vec![truncate(since, interval_minutes)];
    loop {
        let next = starts[starts.len() - 1] + step;
        if next >= now {
            break;
        }
        starts.push(next);
    }
    starts
}

/// Spread each timestamp list into gap-filled buckets.
pub fn bucketize(
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    interval_minutes: i64,
    events: &[DateTime<Utc>],
    alerts: &[DateTime<Utc>],
    failures: &[DateTime<Utc>],
) -> Vec<Bucket> {
    let starts = bucket_starts(since, now, interval_minutes);
    let first = starts[0];
    let width = interval_minutes.max(1) * 60;

    let mut buckets: Vec<Bucket> = starts
        .into_iter()
        .map(|bucket_start| Bucket {
            bucket_start,
            events: 0,
            alerts: 0,
            failures: 0,
        })
        .collect();

    let slot = |ts: &DateTime<Utc>| -> Option<usize> {
        let offset = (truncate(*ts, interval_minutes) - first).num_seconds();
        if offset < 0 {
            return None;
        }
        usize::try_from(offset / width).ok()
    };

    for ts in events {
        if let Some(b) = slot(ts).and_then(|i| buckets.get_mut(i)) {
            b.events += 1;
        }
    }
    for ts in alerts {
        if let Some(b) = slot(ts).and_then(|i| buckets.get_mut(i)) {
            b.alerts += 1;
        }
    }
    for ts in failures {
        if let Some(b) = slot(ts).and_then(|i| buckets.get_mut(i)) {
            b.failures += 1;
        }
    }
    buckets
}

pub async fn overview(store: &dyn Store, since: DateTime<Utc>) -> Result<Overview, StoreError> {
    let counts = store.activity_counts(since).await?;
    let samples = store.metric_samples(since).await?;

    let successes = samples.iter().filter(|s| s.success).count();
    let latencies = samples.iter().map(|s| s.processing_ms).collect();

    Ok(Overview {
        events: counts.events,
        alerts: counts.alerts,
        failures: counts.failures,
        success_rate: success_rate(successes, samples.len()),
        p95_latency_ms: p95(latencies),
    })
}

pub async fn timeseries(
    store: &dyn Store,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    interval_minutes: i64,
) -> Result<Vec<Bucket>, StoreError> {
    let ts = store.activity_timestamps(truncate(since, interval_minutes)).await?;
    Ok(bucketize(
        since,
        now,
        interval_minutes,
        &ts.events,
        &ts.alerts,
        &ts.failures,
    ))
}

/// Record the outcome of one inbound delivery. A store failure is logged;
/// the response has already been decided by then.
pub async fn record_delivery(
    store: &dyn Store,
    event_type: &str,
    delivery_id: &str,
    success: bool,
    processing_ms: i64,
) {
    crate::metrics::delivery_duration(processing_ms.max(0) as u64, success);

    let metric = NewDeliveryMetric {
        event_type: event_type.to_string(),
        delivery_id: delivery_id.to_string(),
        success,
        processing_ms,
        recorded_at: Utc::now(),
    };
    if let Err(e) = store.record_delivery_metric(metric).await {
        tracing::error!(delivery_id, event_type, "Failed to record delivery metric: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn test_p95_of_ten_samples() {
        let samples = (1..=10).rev().map(|i| i * 10).collect();
        assert_eq!(p95(samples), 90);
    }

    #[test]
    fn test_p95_edge_cases() {
        assert_eq!(p95(vec![]), 0);
        assert_eq!(p95(vec![42]), 42);
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(3, 4), 75.0);
        assert_eq!(success_rate(5, 5), 100.0);
    }

    #[test]
    fn test_window_tokens() {
        assert_eq!(Window::parse(Some("1h")), Window::Hour);
        assert_eq!(Window::parse(Some("7d")).duration(), TimeDelta::days(7));
        assert_eq!(Window::parse(None), Window::Day);
        assert_eq!(Window::parse(Some("2w")), Window::Day);
    }

    #[test]
    fn test_interval_clamped() {
        assert_eq!(clamp_interval(None), 60);
        assert_eq!(clamp_interval(Some(0)), 1);
        assert_eq!(clamp_interval(Some(10_000)), 1440);
        assert_eq!(clamp_interval(Some(15)), 15);
    }

    #[test]
    fn test_truncate_aligns_to_slot() {
        assert_eq!(truncate(at(10, 47), 60), at(10, 0));
        assert_eq!(truncate(at(10, 47), 15), at(10, 45));
        assert_eq!(truncate(at(10, 0), 60), at(10, 0));
    }

    #[test]
    fn test_empty_three_hour_window_has_three_buckets() {
        let buckets = bucketize(at(9, 0), at(12, 0), 60, &[], &[], &[]);

        assert_eq!(buckets.len(), 3);
        let starts: Vec<_> = buckets.iter().map(|b| b.bucket_start).collect();
        assert_eq!(starts, [at(9, 0), at(10, 0), at(11, 0)]);
        assert!(buckets
            .iter()
            .all(|b| b.events == 0 && b.alerts == 0 && b.failures == 0));
    }

    #[test]
    fn test_partial_slot_includes_now() {
        let buckets = bucketize(at(9, 0), at(11, 30), 60, &[], &[], &[]);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[2].bucket_start, at(11, 0));
    }

    #[test]
    fn test_timestamps_land_in_their_bucket() {
        let events = [at(9, 5), at(9, 59), at(11, 10)];
        let alerts = [at(10, 30)];
        let failures = [at(11, 0)];

        let buckets = bucketize(at(9, 0), at(11, 30), 60, &events, &alerts, &failures);

        assert_eq!(buckets[0].events, 2);
        assert_eq!(buckets[1].alerts, 1);
        assert_eq!(buckets[2].events, 1);
        assert_eq!(buckets[2].failures, 1);
    }

    #[tokio::test]
    async fn test_overview_from_recorded_deliveries() {
        let store = MemoryStore::new();
        record_delivery(&store, "issues", "a", true, 20).await;
        record_delivery(&store, "issues", "b", true, 40).await;
        record_delivery(&store, "push", "c", false, 10).await;
        record_delivery(&store, "issues", "d", true, 30).await;

        let since = Utc::now() - Window::Day.duration();
        let o = overview(&store, since).await.unwrap();

        assert_eq!(o.success_rate, 75.0);
        // floor(0.95 * 3) = 2 -> third smallest of [10, 20, 30, 40]
        assert_eq!(o.p95_latency_ms, 30);
        assert_eq!(o.events, 0);
    }
}
