use std::time::Duration;

use serde::Serialize;

/// Result of one action attempt, handed to an [`OutcomeReporter`](crate::OutcomeReporter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    /// Name of the action (or `login` / `seed_deposit`).
    pub action_name: String,
    /// Whether the attempt completed with a 2xx status.
    pub success: bool,
    /// Last HTTP status received, absent on transport faults.
    pub http_status: Option<u16>,
    /// Wall-clock time spent on the attempt.
    #[serde(serialize_with = "serialize_latency_us")]
    pub latency: Duration,
    /// Failure description, absent on success.
    pub error_detail: Option<String>,
}

impl RequestOutcome {
    /// Successful attempt.
    #[must_use]
    pub fn success(action_name: impl Into<String>, http_status: u16, latency: Duration) -> Self {
        Self {
            action_name: action_name.into(),
            success: true,
            http_status: Some(http_status),
            latency,
            error_detail: None,
        }
    }

    /// Failed attempt. `http_status` is `None` for transport-level faults.
    #[must_use]
    pub fn failure(
        action_name: impl Into<String>,
        http_status: Option<u16>,
        latency: Duration,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            success: false,
            http_status,
            latency,
            error_detail: Some(error_detail.into()),
        }
    }
}

fn serialize_latency_us<S: serde::Serializer>(
    latency: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(latency.as_micros() as u64)
}
