//! Virtual-user load generation engine for the Kobra wallet API
//!
//! - [`PopulationOrchestrator`] spawns and retires virtual users
//! - [`VirtualUser`] drives one login-then-act lifecycle
//! - [`AuthenticatedSession`] issues bearer-authenticated requests
//! - [`ActionRegistry`] picks the next action by weight
//! - Outcomes flow to an [`OutcomeReporter`](kobra_core::OutcomeReporter)

pub mod actions;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod profiles;
pub mod reporter;
pub mod selector;
pub mod session;
pub mod sinks;
pub mod user;

pub use actions::{ActionContext, ActionPlan, ActionRegistry, ActionSpec};
pub use error::{EngineError, EngineResult};
pub use metrics::{ActionStats, MetricsCollector, RunMetrics};
pub use orchestrator::{PopulationOrchestrator, PopulationSummary, UserHandle};
pub use profiles::PopulationProfile;
pub use reporter::{ResultWriter, SuccessCriteria};
pub use selector::WeightedSelector;
pub use session::{AuthenticatedSession, PlannedRequest, SessionClient, SessionError};
pub use sinks::{AggregatingReporter, ChannelReporter, FanoutReporter};
pub use user::{StartupError, UserBehavior, UserReport, VirtualUser};
