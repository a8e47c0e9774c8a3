//! Sliding-window performance tracking per provider.
//!
//! Every dispatch attempt that runs to completion feeds back into the
//! tracker: successes add a latency sample and clear the failure streak,
//! failures extend the streak. Scoring reads immutable
//! [`PerformanceSnapshot`]s, never the live records.
//!
//! Each provider's record sits behind its own mutex, so concurrent
//! completions only contend when they hit the same provider. The outer map
//! is write-locked only to insert a provider seen for the first time.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::telemetry;
use crate::types::LatencyClass;

/// Latency samples kept per provider.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Consecutive failures at which a provider counts as quarantined.
pub const DEFAULT_QUARANTINE_THRESHOLD: u32 = 3;

/// Average reported for providers without samples ("unknown, assume moderate").
pub const NEUTRAL_LATENCY_MS: f64 = 1500.0;

#[derive(Debug, Default)]
struct PerformanceRecord {
    latencies: VecDeque<f64>,
    consecutive_failures: u32,
    total_requests: u64,
    total_failures: u64,
}

impl PerformanceRecord {
    fn average(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            None
        } else {
            Some(self.latencies.iter().sum::<f64>() / self.latencies.len() as f64)
        }
    }
}

/// Point-in-time view of one provider's health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    /// Mean of the current window, or [`NEUTRAL_LATENCY_MS`] when empty.
    pub avg_latency_ms: f64,
    pub consecutive_failures: u32,
    pub sample_count: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    pub quarantined: bool,
}

impl PerformanceSnapshot {
    /// Snapshot for a provider with no recorded history.
    pub fn neutral() -> Self {
        Self {
            avg_latency_ms: NEUTRAL_LATENCY_MS,
            consecutive_failures: 0,
            sample_count: 0,
            total_requests: 0,
            total_failures: 0,
            quarantined: false,
        }
    }

    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }

    /// Latency class of the tracked average; `Moderate` when unknown.
    pub fn latency_class(&self) -> LatencyClass {
        if self.has_samples() {
            LatencyClass::from_millis(self.avg_latency_ms)
        } else {
            LatencyClass::Moderate
        }
    }

    /// Fraction of recorded attempts that succeeded, if any were recorded.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_requests > 0).then(|| {
            (self.total_requests - self.total_failures) as f64 / self.total_requests as f64
        })
    }
}

impl Default for PerformanceSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Bounded per-provider latency and failure history.
#[derive(Debug)]
pub struct PerformanceTracker {
    window: usize,
    quarantine_threshold: u32,
    records: RwLock<HashMap<String, Arc<Mutex<PerformanceRecord>>>>,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW, DEFAULT_QUARANTINE_THRESHOLD)
    }
}

impl PerformanceTracker {
    /// `window` is clamped to at least one sample, `quarantine_threshold`
    /// to at least one failure.
    pub fn new(window: usize, quarantine_threshold: u32) -> Self {
        Self {
            window: window.max(1),
            quarantine_threshold: quarantine_threshold.max(1),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn quarantine_threshold(&self) -> u32 {
        self.quarantine_threshold
    }

    fn record(&self, provider: &str) -> Arc<Mutex<PerformanceRecord>> {
        if let Some(record) = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
        {
            return Arc::clone(record);
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(records.entry(provider.to_string()).or_default())
    }

    fn existing(&self, provider: &str) -> Option<Arc<Mutex<PerformanceRecord>>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    /// Append a latency sample and clear the failure streak.
    pub fn record_success(&self, provider: &str, latency_ms: f64) {
        let record = self.record(provider);
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        if record.latencies.len() == self.window {
            record.latencies.pop_front();
        }
        record.latencies.push_back(latency_ms.max(0.0));
        record.total_requests += 1;
        let recovered = record.consecutive_failures >= self.quarantine_threshold;
        record.consecutive_failures = 0;
        drop(record);

        if recovered {
            info!(provider, "provider recovered from quarantine");
        }
        debug!(provider, latency_ms, "recorded success");
    }

    /// Extend the failure streak. Latency history is left untouched.
    pub fn record_failure(&self, provider: &str) {
        let record = self.record(provider);
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.total_requests += 1;
        record.total_failures += 1;
        let failures = record.consecutive_failures;
        drop(record);

        if failures == self.quarantine_threshold {
            warn!(provider, failures, "provider quarantined after consecutive failures");
            metrics::counter!(telemetry::QUARANTINED_TOTAL, "provider" => provider.to_owned())
                .increment(1);
        } else {
            debug!(provider, failures, "recorded failure");
        }
    }

    /// Current health of `provider`; neutral if it was never tracked.
    pub fn snapshot(&self, provider: &str) -> PerformanceSnapshot {
        match self.existing(provider) {
            Some(record) => {
                let record = record.lock().unwrap_or_else(PoisonError::into_inner);
                self.to_snapshot(&record)
            }
            None => PerformanceSnapshot::neutral(),
        }
    }

    fn to_snapshot(&self, record: &PerformanceRecord) -> PerformanceSnapshot {
        PerformanceSnapshot {
            avg_latency_ms: record.average().unwrap_or(NEUTRAL_LATENCY_MS),
            consecutive_failures: record.consecutive_failures,
            sample_count: record.latencies.len(),
            total_requests: record.total_requests,
            total_failures: record.total_failures,
            quarantined: record.consecutive_failures >= self.quarantine_threshold,
        }
    }

    pub fn is_quarantined(&self, provider: &str) -> bool {
        self.snapshot(provider).quarantined
    }

    /// Snapshots of every tracked provider, keyed by name.
    pub fn snapshots(&self) -> BTreeMap<String, PerformanceSnapshot> {
        let records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, record)| (name.clone(), Arc::clone(record)))
            .collect();
        records
            .into_iter()
            .map(|(name, record)| {
                let record = record.lock().unwrap_or_else(PoisonError::into_inner);
                (name, self.to_snapshot(&record))
            })
            .collect()
    }

    /// Forget everything recorded for `provider`.
    ///
    /// The record is cleared in place, so a completion that looked it up
    /// before the reset still lands in the live record.
    pub fn reset(&self, provider: &str) {
        if let Some(record) = self.existing(provider) {
            *record.lock().unwrap_or_else(PoisonError::into_inner) = PerformanceRecord::default();
            debug!(provider, "performance record reset");
        }
    }

    pub fn reset_all(&self) {
        let records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for record in records {
            *record.lock().unwrap_or_else(PoisonError::into_inner) = PerformanceRecord::default();
        }
    }
}
