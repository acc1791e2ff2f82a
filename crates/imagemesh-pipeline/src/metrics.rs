//! Conversion metrics.
//!
//! Counters are atomics; recent durations sit behind a mutex so percentile
//! snapshots can be served from `/health`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Maximum number of duration samples to keep in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Thread-safe conversion metrics collector.
#[derive(Debug)]
pub struct ConversionMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    input_bytes: AtomicU64,
    output_bytes: AtomicU64,
    duration_samples: Mutex<Vec<Duration>>,
}

impl ConversionMetrics {
    /// Create a new empty metrics collector.
    pub fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            input_bytes: AtomicU64::new(0),
            output_bytes: AtomicU64::new(0),
            duration_samples: Mutex::new(Vec::with_capacity(MAX_DURATION_SAMPLES)),
        }
    }

    /// Record a pipeline invocation starting on an input of `input_bytes`.
    pub fn record_started(&self, input_bytes: u64) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.input_bytes.fetch_add(input_bytes, Ordering::Relaxed);
    }

    /// Record a pipeline invocation that returned a mesh.
    pub fn record_success(&self, duration: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_duration_sample(duration);
    }

    /// Record a pipeline invocation that failed.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request turned away because every slot was busy.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request made while no model was loaded.
    pub fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes of an exported mesh.
    pub fn record_output(&self, bytes: u64) {
        self.output_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn add_duration_sample(&self, duration: Duration) {
        if let Ok(mut samples) = self.duration_samples.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.remove(0);
            }
            samples.push(duration);
        }
    }

    /// Current snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let durations = self
            .duration_samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();

        let (p50, p95, p99) = Self::calculate_percentiles(&durations);

        MetricsSnapshot {
            conversions_started: self.started.load(Ordering::Relaxed),
            conversions_succeeded: self.succeeded.load(Ordering::Relaxed),
            conversions_failed: self.failed.load(Ordering::Relaxed),
            conversions_rejected: self.rejected.load(Ordering::Relaxed),
            conversions_unavailable: self.unavailable.load(Ordering::Relaxed),
            total_input_bytes: self.input_bytes.load(Ordering::Relaxed),
            total_output_bytes: self.output_bytes.load(Ordering::Relaxed),
            duration_p50_ms: p50.map(|d| d.as_millis() as u64),
            duration_p95_ms: p95.map(|d| d.as_millis() as u64),
            duration_p99_ms: p99.map(|d| d.as_millis() as u64),
            sample_count: durations.len() as u64,
        }
    }

    fn calculate_percentiles(
        durations: &[Duration],
    ) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
        if durations.is_empty() {
            return (None, None, None);
        }

        let mut sorted = durations.to_vec();
        sorted.sort();
        let len = sorted.len();

        let p50 = sorted.get(len * 50 / 100).copied();
        let p95 = sorted.get(len * 95 / 100).copied();
        let p99 = sorted.get(len.saturating_sub(1) * 99 / 100).copied();

        (p50, p95, p99)
    }
}

impl Default for ConversionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of conversion metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Pipeline invocations started.
    pub conversions_started: u64,
    /// Invocations that returned a mesh.
    pub conversions_succeeded: u64,
    /// Invocations that failed.
    pub conversions_failed: u64,
    /// Requests rejected at capacity.
    pub conversions_rejected: u64,
    /// Requests made while the model was not loaded.
    pub conversions_unavailable: u64,
    /// Bytes of images handed to the pipeline.
    pub total_input_bytes: u64,
    /// Bytes of meshes exported.
    pub total_output_bytes: u64,
    /// P50 conversion duration.
    pub duration_p50_ms: Option<u64>,
    /// P95 conversion duration.
    pub duration_p95_ms: Option<u64>,
    /// P99 conversion duration.
    pub duration_p99_ms: Option<u64>,
    /// Number of duration samples collected.
    pub sample_count: u64,
}
