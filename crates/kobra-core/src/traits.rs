use std::sync::Arc;

use crate::outcome::RequestOutcome;

/// Sink for per-request outcomes.
///
/// Called concurrently from every active virtual user. Implementations must
/// return promptly: buffer, aggregate under a short lock, or drop.
pub trait OutcomeReporter: Send + Sync {
    /// Records one outcome. Fire-and-forget.
    fn emit(&self, outcome: RequestOutcome);
}

impl<T: OutcomeReporter + ?Sized> OutcomeReporter for Arc<T> {
    fn emit(&self, outcome: RequestOutcome) {
        (**self).emit(outcome);
    }
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl OutcomeReporter for NullReporter {
    fn emit(&self, _outcome: RequestOutcome) {}
}
