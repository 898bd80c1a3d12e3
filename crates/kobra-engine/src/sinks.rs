//! [`OutcomeReporter`] implementations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kobra_core::metrics::observe_outcome;
use kobra_core::{OutcomeReporter, RequestOutcome};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::metrics::{MetricsCollector, RunMetrics};

/// Aggregates outcomes in memory and mirrors them into Prometheus.
#[derive(Default)]
pub struct AggregatingReporter {
    collector: Mutex<MetricsCollector>,
}

impl AggregatingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunMetrics {
        self.collector.lock().snapshot()
    }
}

impl OutcomeReporter for AggregatingReporter {
    fn emit(&self, outcome: RequestOutcome) {
        observe_outcome(&outcome);
        self.collector.lock().record(&outcome);
    }
}

/// Forwards outcomes into a bounded channel without ever waiting.
///
/// When the channel is full or closed the outcome is dropped and counted.
pub struct ChannelReporter {
    tx: mpsc::Sender<RequestOutcome>,
    dropped: AtomicU64,
}

impl ChannelReporter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RequestOutcome>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Outcomes lost to a full or closed channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl OutcomeReporter for ChannelReporter {
    fn emit(&self, outcome: RequestOutcome) {
        if let Err(err) = self.tx.try_send(outcome) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(error = %err, "outcome dropped");
        }
    }
}

/// Emits every outcome to each wrapped reporter.
#[derive(Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn OutcomeReporter>>,
}

impl FanoutReporter {
    pub fn new(reporters: Vec<Arc<dyn OutcomeReporter>>) -> Self {
        Self { reporters }
    }

    pub fn with(mut self, reporter: Arc<dyn OutcomeReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl OutcomeReporter for FanoutReporter {
    fn emit(&self, outcome: RequestOutcome) {
        if let Some((last, rest)) = self.reporters.split_last() {
            for reporter in rest {
                reporter.emit(outcome.clone());
            }
            last.emit(outcome);
        }
    }
}
