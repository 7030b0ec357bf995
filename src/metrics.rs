//! Request and latency statistics for the scoring service.

use crate::types::prediction::FraudLabel;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept before the oldest half is dropped
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for the scoring service
pub struct ServiceMetrics {
    /// Requests received (including undecodable ones)
    pub requests_received: AtomicU64,
    pub fraud_predictions: AtomicU64,
    pub legitimate_predictions: AtomicU64,
    /// Numeric fields defaulted during encoding
    pub parse_warnings: AtomicU64,
    /// Failed requests keyed by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Fraud score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            fraud_predictions: AtomicU64::new(0),
            legitimate_predictions: AtomicU64::new(0),
            parse_warnings: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful prediction
    pub fn record_prediction(
        &self,
        label: FraudLabel,
        score: f64,
        warnings: usize,
        processing_time: Duration,
    ) {
        match label {
            FraudLabel::Fraud => self.fraud_predictions.fetch_add(1, Ordering::Relaxed),
            FraudLabel::Legitimate => self.legitimate_predictions.fetch_add(1, Ordering::Relaxed),
        };
        self.parse_warnings
            .fetch_add(warnings as u64, Ordering::Relaxed);

        self.record_latency(processing_time);

        let bucket = (score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request by error kind
    pub fn record_failure(&self, kind: &str, processing_time: Duration) {
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
        self.record_latency(processing_time);
    }

    fn record_latency(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_LATENCY_SAMPLES {
                times.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }
    }

    pub fn predictions(&self) -> u64 {
        self.fraud_predictions.load(Ordering::Relaxed)
            + self.legitimate_predictions.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.get_failures_by_kind().values().sum()
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_received.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_received.load(Ordering::Relaxed);
        let fraud = self.fraud_predictions.load(Ordering::Relaxed);
        let predictions = self.predictions();
        let fraud_rate = if predictions > 0 {
            (fraud as f64 / predictions as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let failures = self.get_failures_by_kind();
        let score_dist = self.get_score_distribution();

        info!(
            requests = requests,
            predictions = predictions,
            fraud = fraud,
            fraud_rate = format!("{:.1}%", fraud_rate),
            parse_warnings = self.parse_warnings.load(Ordering::Relaxed),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Scoring summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );
        for (kind, count) in &failures {
            info!(kind = %kind, count = count, "Failed requests");
        }

        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "score {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_request();
        metrics.record_request();
        metrics.record_request();
        metrics.record_prediction(FraudLabel::Fraud, 0.93, 0, Duration::from_micros(100));
        metrics.record_prediction(FraudLabel::Legitimate, 0.12, 2, Duration::from_micros(300));
        metrics.record_failure("unknown_category", Duration::from_micros(50));

        assert_eq!(metrics.requests_received.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.predictions(), 2);
        assert_eq!(metrics.parse_warnings.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.failures(), 1);
        assert_eq!(metrics.get_failures_by_kind().get("unknown_category"), Some(&1));

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[9], 1);
        assert_eq!(dist[1], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.get_processing_stats(), ProcessingStats::default());

        for us in [100, 200, 300, 400] {
            metrics.record_prediction(FraudLabel::Legitimate, 0.1, 0, Duration::from_micros(us));
        }

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.p50_us, 300);
        assert_eq!(stats.max_us, 400);
    }

    #[test]
    fn test_score_of_one_lands_in_last_bucket() {
        let metrics = ServiceMetrics::new();
        metrics.record_prediction(FraudLabel::Fraud, 1.0, 0, Duration::from_micros(1));

        assert_eq!(metrics.get_score_distribution()[9], 1);
    }
}
