//! Metrics domain model: per-agent latency histogram and statistics snapshot.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded ring of observed latencies for one agent. Older samples are
/// overwritten in arrival order once the ring reaches capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyHistogram {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl LatencyHistogram {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, latency_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Percentile in `[0.0, 1.0]` over a sorted copy of the ring's contents.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).copied()
    }

    pub fn p50(&self) -> Option<f64> {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> Option<f64> {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> Option<f64> {
        self.percentile(0.99)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }
}

/// Per-agent statistics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub tasks_processed: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub utilization: f64,
}

impl AgentStats {
    /// Update the incremental running mean after one more task completes.
    pub fn record_success(&mut self, latency_ms: f64) {
        self.tasks_processed += 1;
        let n = self.tasks_processed as f64;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / n;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_never_exceeds_capacity() {
        let mut hist = LatencyHistogram::new(3);
        for i in 0..10 {
            hist.record(i as f64);
        }
        assert_eq!(hist.len(), 3);
    }

    #[test]
    fn ring_overwrites_oldest_first() {
        let mut hist = LatencyHistogram::new(2);
        hist.record(1.0);
        hist.record(2.0);
        hist.record(3.0);
        assert_eq!(hist.percentile(0.0), Some(2.0));
        assert_eq!(hist.percentile(1.0), Some(3.0));
    }

    #[test]
    fn running_mean_matches_simple_average() {
        let mut stats = AgentStats::default();
        stats.record_success(10.0);
        stats.record_success(20.0);
        stats.record_success(30.0);
        assert!((stats.avg_latency_ms - 20.0).abs() < 1e-9);
    }
}
