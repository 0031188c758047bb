//! Worker metrics.
//!
//! - Job outcome counters
//! - Job duration histogram
//! - Fallback counter by requested method

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "edu3d_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "edu3d_job_duration_seconds";
    pub const FALLBACKS_TOTAL: &str = "edu3d_fallbacks_total";
}

/// Record a job that reached a terminal state or was scheduled for retry.
pub fn record_job(outcome: &'static str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn record_fallback(method: &'static str) {
    counter!(names::FALLBACKS_TOTAL, "method" => method).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::JOBS_TOTAL.starts_with("edu3d_"));
        assert!(names::JOB_DURATION_SECONDS.ends_with("_seconds"));
        // No recorder installed; must not panic.
        record_job("finished", 1.0);
        record_fallback("hybrid");
    }
}
