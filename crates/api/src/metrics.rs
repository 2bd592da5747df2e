use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Outcome of one flow request, as far as the counters care
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Success,
    Degraded,
    Failed,
}

#[derive(Default)]
struct FlowCounters {
    requests: AtomicUsize,
    successes: AtomicUsize,
    degraded: AtomicUsize,
    failures: AtomicUsize,
    total_time_us: AtomicU64,
}

/// One set of counters per flow name, fixed at construction so no locking is needed
pub struct Metrics {
    flows: BTreeMap<&'static str, FlowCounters>,
}

impl Metrics {
    pub fn new(flow_names: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            flows: flow_names.iter().map(|name| (*name, FlowCounters::default())).collect(),
        })
    }

    pub fn record(&self, flow: &str, outcome: Outcome, duration: std::time::Duration) {
        let Some(counters) = self.flows.get(flow) else {
            return;
        };

        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.total_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        let bucket = match outcome {
            Outcome::Success => &counters.successes,
            Outcome::Degraded => &counters.degraded,
            Outcome::Failed => &counters.failures,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let flows = self
            .flows
            .iter()
            .map(|(name, c)| {
                let requests = c.requests.load(Ordering::Relaxed);
                let total_us = c.total_time_us.load(Ordering::Relaxed) as f64;
                let stats = FlowStats {
                    requests,
                    successes: c.successes.load(Ordering::Relaxed),
                    degraded: c.degraded.load(Ordering::Relaxed),
                    failures: c.failures.load(Ordering::Relaxed),
                    avg_time_ms: if requests > 0 { total_us / requests as f64 / 1000.0 } else { 0.0 },
                };
                (name.to_string(), stats)
            })
            .collect();

        MetricsSnapshot { flows }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub flows: BTreeMap<String, FlowStats>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FlowStats {
    pub requests: usize,
    pub successes: usize,
    pub degraded: usize,
    pub failures: usize,
    pub avg_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcomes_are_counted_per_flow() {
        let metrics = Metrics::new(&["describe-image", "parse-chat"]);
        metrics.record("describe-image", Outcome::Success, Duration::from_millis(200));
        metrics.record("describe-image", Outcome::Degraded, Duration::from_millis(400));
        metrics.record("parse-chat", Outcome::Failed, Duration::from_millis(50));
        metrics.record("unknown", Outcome::Success, Duration::from_millis(1));

        let snapshot = metrics.snapshot();
        let describe = &snapshot.flows["describe-image"];
        assert_eq!(describe.requests, 2);
        assert_eq!(describe.successes, 1);
        assert_eq!(describe.degraded, 1);
        assert!((describe.avg_time_ms - 300.0).abs() < 1e-9);

        assert_eq!(snapshot.flows["parse-chat"].failures, 1);
        assert_eq!(snapshot.flows.len(), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let metrics = Metrics::new(&["extract-from-text"]);
        assert_eq!(
            metrics.snapshot().flows["extract-from-text"],
            FlowStats {
                requests: 0,
                successes: 0,
                degraded: 0,
                failures: 0,
                avg_time_ms: 0.0,
            }
        );
    }
}
