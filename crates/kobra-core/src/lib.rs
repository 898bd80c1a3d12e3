//! Core domain types for the Kobra virtual-user load generator.

pub mod action;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod outcome;
pub mod session;
pub mod traits;

pub use action::{ActionKind, ActionWeight};
pub use config::{
    ActionsConfig, AmountRange, BehaviorConfig, CriteriaConfig, KobraConfig, LoggingConfig,
    PopulationConfig, ProfileConfig, ReportConfig, ReportFormat, TargetConfig,
};
pub use error::{CoreError, CoreResult};
pub use identity::{IdentityAllocator, VirtualUserIdentity};
pub use outcome::RequestOutcome;
pub use session::{SessionCredentials, VirtualUserState};
pub use traits::{NullReporter, OutcomeReporter};
