//! # Latency Metrics
//!
//! Latency measurement for the self-benchmark, built on HDR (High
//! Dynamic Range) histograms. HDR histograms record in constant time
//! regardless of value, keep memory bounded over wide value ranges, and
//! compute percentiles without storing raw samples — which keeps the
//! measurement loop from distorting what it measures.
//!
//! Workers record into private recorders that are merged after the run,
//! so no cross-thread synchronization sits on the hot path.

use anyhow::Result;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest latency the histogram can represent (one minute, in ns)
const MAX_LATENCY_NS: u64 = 60_000_000_000;

/// One percentile of the latency distribution
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PercentileValue {
    /// The percentile rank, e.g. 99.9
    pub percentile: f64,
    /// Latency at that rank in nanoseconds
    pub value_ns: u64,
}

/// Summary statistics for one latency distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Number of recorded samples
    pub samples: u64,
    /// Minimum observed latency in nanoseconds
    pub min_ns: u64,
    /// Maximum observed latency in nanoseconds
    pub max_ns: u64,
    /// Mean latency in nanoseconds
    pub mean_ns: f64,
    /// Requested percentiles of the distribution
    pub percentiles: Vec<PercentileValue>,
}

/// Per-worker latency collector
pub struct LatencyRecorder {
    histogram: Histogram<u64>,
}

impl LatencyRecorder {
    /// Create a recorder covering 1ns..=60s at three significant digits
    pub fn new() -> Result<Self> {
        Ok(Self {
            histogram: Histogram::new_with_bounds(1, MAX_LATENCY_NS, 3)?,
        })
    }

    /// Record one sample; saturates at the histogram bounds
    pub fn record(&mut self, latency: Duration) {
        let ns = (latency.as_nanos() as u64).clamp(1, MAX_LATENCY_NS);
        self.histogram.saturating_record(ns);
    }

    /// Fold another worker's samples into this recorder
    pub fn merge(&mut self, other: &LatencyRecorder) -> Result<()> {
        self.histogram.add(&other.histogram)?;
        Ok(())
    }

    /// Number of recorded samples
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    /// Whether anything has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Summarize the distribution at the requested percentiles
    pub fn summarize(&self, percentiles: &[f64]) -> LatencySummary {
        LatencySummary {
            samples: self.histogram.len(),
            min_ns: self.histogram.min(),
            max_ns: self.histogram.max(),
            mean_ns: self.histogram.mean(),
            percentiles: percentiles
                .iter()
                .map(|&percentile| PercentileValue {
                    percentile,
                    value_ns: self.histogram.value_at_quantile(percentile / 100.0),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test recording and percentile extraction over a known ramp
    #[test]
    fn test_summarize_known_distribution() {
        let mut recorder = LatencyRecorder::new().unwrap();
        for us in 1..=1000u64 {
            recorder.record(Duration::from_micros(us));
        }

        let summary = recorder.summarize(&[50.0, 99.0]);
        assert_eq!(summary.samples, 1000);
        assert!(summary.min_ns >= 1_000);
        assert!(summary.max_ns >= 999_000);

        let p50 = summary.percentiles[0].value_ns;
        assert!((400_000..=600_000).contains(&p50), "p50 was {}", p50);
        let p99 = summary.percentiles[1].value_ns;
        assert!(p99 >= 980_000, "p99 was {}", p99);
    }

    /// Test merging two recorders keeps every sample
    #[test]
    fn test_merge_recorders() {
        let mut a = LatencyRecorder::new().unwrap();
        let mut b = LatencyRecorder::new().unwrap();
        a.record(Duration::from_micros(10));
        b.record(Duration::from_micros(20));
        b.record(Duration::from_micros(30));

        a.merge(&b).unwrap();
        assert_eq!(a.len(), 3);
    }

    /// Test out-of-range samples saturate instead of failing
    #[test]
    fn test_record_saturates() {
        let mut recorder = LatencyRecorder::new().unwrap();
        recorder.record(Duration::ZERO);
        recorder.record(Duration::from_secs(3600));
        assert_eq!(recorder.len(), 2);
    }
}
