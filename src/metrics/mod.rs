//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submission outcomes
//! - Sequence conflicts and throttling
//! - Timeout reconciliation verdicts

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use tracing::warn;

lazy_static! {
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "ledger_submissions_total",
        "Logical submissions by terminal outcome",
        &["outcome"]
    ).unwrap();

    pub static ref SEQUENCE_CONFLICTS: Counter = register_counter!(
        "ledger_sequence_conflicts_total",
        "Submissions rejected with a bad sequence number"
    ).unwrap();

    pub static ref RATE_LIMITED: Counter = register_counter!(
        "ledger_rate_limited_total",
        "Submissions throttled by the ledger"
    ).unwrap();

    pub static ref TIMEOUTS: CounterVec = register_counter_vec!(
        "ledger_timeouts_total",
        "Timed out submissions by reconciliation verdict",
        &["verdict"]
    ).unwrap();

    pub static ref SUBMIT_TRIES: Histogram = register_histogram!(
        "ledger_submit_tries",
        "Retries used by successful submissions",
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0]
    ).unwrap();
}

/// Render every registered metric in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_outcome(outcome: &str) {
    SUBMISSIONS.with_label_values(&[outcome]).inc();
}

pub fn record_success(tries: u32) {
    record_outcome("success");
    SUBMIT_TRIES.observe(tries as f64);
}

pub fn record_conflict() {
    SEQUENCE_CONFLICTS.inc();
}

pub fn record_rate_limited() {
    RATE_LIMITED.inc();
}

pub fn record_timeout(verdict: &str) {
    TIMEOUTS.with_label_values(&[verdict]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        record_conflict();
        record_timeout("unchanged");
        record_success(2);

        let text = render();
        assert!(text.contains("ledger_sequence_conflicts_total"));
        assert!(text.contains("ledger_timeouts_total{verdict=\"unchanged\"}"));
        assert!(text.contains("ledger_submit_tries_bucket"));
    }
}
