//! Run metrics collection and analysis

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use kobra_core::RequestOutcome;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Error messages kept per run; later ones are only counted.
pub const MAX_RECORDED_ERRORS: usize = 1_000;

/// Latency samples kept for the whole run.
pub const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Latency samples kept per action.
pub const MAX_ACTION_LATENCY_SAMPLES: usize = 2_000;

const SAMPLER_SEED: u64 = 0x6b6f_6272_61;

/// Collected metrics from a load run
#[derive(Debug, Clone)]
pub struct RunMetrics {
    /// Run start time
    pub start_time: Instant,

    /// Run end time
    pub end_time: Instant,

    /// Total requests attempted
    pub total_requests: usize,

    /// Successful requests
    pub successful_requests: usize,

    /// Failed requests
    pub failed_requests: usize,

    /// Uniform sample of latencies in microseconds, at most
    /// [`MAX_LATENCY_SAMPLES`]
    pub latencies_us: Vec<u64>,

    /// Largest latency recorded, sampled or not
    pub max_latency_us: u64,

    /// Breakdown by action name
    pub per_action: BTreeMap<String, ActionStats>,

    /// Error messages, capped at [`MAX_RECORDED_ERRORS`]
    pub errors: Vec<String>,

    /// Errors beyond the cap
    pub dropped_errors: usize,
}

/// Counters for one action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionStats {
    pub successes: usize,
    pub failures: usize,
    /// At most [`MAX_ACTION_LATENCY_SAMPLES`]
    pub latencies_us: Vec<u64>,
}

impl ActionStats {
    pub fn total(&self) -> usize {
        self.successes + self.failures
    }

    pub fn error_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.failures as f64 / self.total() as f64
    }

    pub fn p95_latency(&self) -> Duration {
        percentile(&self.latencies_us, 0.95)
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            end_time: now,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            latencies_us: Vec::new(),
            max_latency_us: 0,
            per_action: BTreeMap::new(),
            errors: Vec::new(),
            dropped_errors: 0,
        }
    }
}

impl RunMetrics {
    /// Calculate error rate (0.0-1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }

    /// Calculate throughput (successful requests per second)
    pub fn throughput_rps(&self) -> f64 {
        let duration = self.duration();
        if duration.as_secs_f64() == 0.0 {
            return 0.0;
        }
        self.successful_requests as f64 / duration.as_secs_f64()
    }

    /// Get run duration
    pub fn duration(&self) -> Duration {
        self.end_time.duration_since(self.start_time)
    }

    pub fn p50_latency(&self) -> Duration {
        percentile(&self.latencies_us, 0.50)
    }

    pub fn p90_latency(&self) -> Duration {
        percentile(&self.latencies_us, 0.90)
    }

    pub fn p95_latency(&self) -> Duration {
        percentile(&self.latencies_us, 0.95)
    }

    pub fn p99_latency(&self) -> Duration {
        percentile(&self.latencies_us, 0.99)
    }

    pub fn max_latency(&self) -> Duration {
        let sampled = self.latencies_us.iter().copied().max().unwrap_or(0);
        Duration::from_micros(sampled.max(self.max_latency_us))
    }
}

/// Calculate latency percentile
fn percentile(latencies_us: &[u64], p: f64) -> Duration {
    if latencies_us.is_empty() {
        return Duration::from_micros(0);
    }

    let mut sorted = latencies_us.to_vec();
    sorted.sort_unstable();

    let index = ((sorted.len() as f64) * p) as usize;
    let index = index.min(sorted.len() - 1);

    Duration::from_micros(sorted[index])
}

/// Keeps a uniform sample of at most `capacity` out of `seen` values,
/// `value` being the latest (reservoir sampling, algorithm R).
fn sample_into(
    samples: &mut Vec<u64>,
    seen: usize,
    capacity: usize,
    value: u64,
    rng: &mut StdRng,
) {
    if samples.len() < capacity {
        samples.push(value);
        return;
    }

    let slot = rng.gen_range(0..seen);
    if slot < capacity {
        samples[slot] = value;
    }
}

/// Metrics collector for real-time outcome aggregation
///
/// Counters are exact; latencies are sampled so memory stays flat however
/// long the run.
pub struct MetricsCollector {
    metrics: RunMetrics,
    rng: StdRng,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: RunMetrics {
                start_time: Instant::now(),
                ..Default::default()
            },
            rng: StdRng::seed_from_u64(SAMPLER_SEED),
        }
    }

    /// Record one outcome
    pub fn record(&mut self, outcome: &RequestOutcome) {
        let latency_us = outcome.latency.as_micros() as u64;
        let stats = self
            .metrics
            .per_action
            .entry(outcome.action_name.clone())
            .or_default();

        self.metrics.total_requests += 1;
        self.metrics.max_latency_us = self.metrics.max_latency_us.max(latency_us);
        sample_into(
            &mut self.metrics.latencies_us,
            self.metrics.total_requests,
            MAX_LATENCY_SAMPLES,
            latency_us,
            &mut self.rng,
        );
        let seen = stats.total() + 1;
        sample_into(
            &mut stats.latencies_us,
            seen,
            MAX_ACTION_LATENCY_SAMPLES,
            latency_us,
            &mut self.rng,
        );

        if outcome.success {
            self.metrics.successful_requests += 1;
            stats.successes += 1;
        } else {
            self.metrics.failed_requests += 1;
            stats.failures += 1;

            if self.metrics.errors.len() < MAX_RECORDED_ERRORS {
                let detail = outcome.error_detail.as_deref().unwrap_or("unknown error");
                self.metrics
                    .errors
                    .push(format!("{}: {}", outcome.action_name, detail));
            } else {
                self.metrics.dropped_errors += 1;
            }
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> RunMetrics {
        let mut metrics = self.metrics.clone();
        metrics.end_time = Instant::now();
        metrics
    }

    /// Finalize metrics collection
    pub fn finalize(mut self) -> RunMetrics {
        self.metrics.end_time = Instant::now();
        self.metrics
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
