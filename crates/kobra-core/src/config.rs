//! Configuration management for Kobra load runs
//!
//! Sources, lowest to highest precedence:
//! - Built-in defaults (mirroring the wallet scripts: 1-3s think time,
//!   transfers of 1-2, deposits of 10-1000)
//! - `./config/kobra.{yaml,toml,json}` if present
//! - The file named by `KOBRA_CONFIG` or passed explicitly
//! - Environment variables, e.g. `KOBRA_POPULATION__USERS=50`
//!
//! Every value is immutable for the duration of a run.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub use crate::action::{ActionKind, ActionWeight};
use crate::action;
use crate::error::{CoreError, CoreResult};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct KobraConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub population: PopulationConfig,

    #[serde(default)]
    pub behavior: BehaviorConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl KobraConfig {
    /// Load configuration from defaults, config files and the environment.
    ///
    /// `path` takes precedence over `KOBRA_CONFIG`. The result is not
    /// validated so callers can apply their own overrides first; call
    /// [`KobraConfig::validate`] afterwards.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        Self::load_layered(Path::new("./config/kobra"), path)
    }

    fn load_layered(local: &Path, path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&local.to_string_lossy()).required(false));

        if let Ok(config_path) = std::env::var("KOBRA_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("KOBRA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: KobraConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a single file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let config: KobraConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> CoreResult<()> {
        if self.target.base_url.trim().is_empty() {
            return Err(CoreError::validation("target.base_url cannot be empty"));
        }

        if self.target.request_timeout_ms == 0 {
            return Err(CoreError::validation(
                "target.request_timeout_ms must be > 0",
            ));
        }

        if self.population.max_numbered_users == 0 {
            return Err(CoreError::validation(
                "population.max_numbered_users must be > 0",
            ));
        }

        if let Some(rate) = self.population.spawn_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(CoreError::validation(
                    "population.spawn_rate must be a positive number",
                ));
            }
        }

        self.behavior.validate()?;
        self.actions.validate()?;
        self.report.criteria.validate()?;

        Ok(())
    }
}

/// System under test
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL of the wallet API
    pub base_url: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Password shared by every numbered test user
    pub password: String,

    /// Domain appended to `user{n}` to form login emails
    pub email_domain: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_ms: 10_000,
            password: "password123".to_string(),
            email_domain: "example.com".to_string(),
        }
    }
}

impl TargetConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Population size and cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Target number of concurrent virtual users
    pub users: usize,

    /// Users spawned per second; `None` spawns the whole batch at once
    pub spawn_rate: Option<f64>,

    /// Ceiling of the numbered identity pool
    pub max_numbered_users: u64,

    /// Run length in seconds
    pub run_time_secs: u64,

    /// How the target population changes over the run; defaults to
    /// a constant population of `users`
    pub profile: Option<ProfileConfig>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            users: 10,
            spawn_rate: Some(1.0),
            max_numbered_users: 2,
            run_time_secs: 60,
            profile: None,
        }
    }
}

impl PopulationConfig {
    pub fn run_time(&self) -> Duration {
        Duration::from_secs(self.run_time_secs)
    }

    /// Delay between consecutive spawns, zero when unthrottled.
    pub fn spawn_interval(&self) -> Duration {
        match self.spawn_rate {
            Some(rate) if rate > 0.0 => Duration::from_secs_f64(1.0 / rate),
            _ => Duration::ZERO,
        }
    }
}

/// Population profile, in seconds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileConfig {
    Constant {
        users: usize,
    },
    Ramp {
        from: usize,
        to: usize,
        ramp_secs: u64,
    },
    Spike {
        baseline: usize,
        spike: usize,
        start_secs: u64,
        duration_secs: u64,
    },
}

/// Inclusive integer range used for transfer and deposit amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AmountRange {
    pub min: u64,
    pub max: u64,
}

impl AmountRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

/// Per-user pacing and payload shaping
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Lower bound of think time in milliseconds
    pub min_wait_ms: u64,

    /// Upper bound of think time in milliseconds
    pub max_wait_ms: u64,

    pub transfer_amount: AmountRange,

    /// Used for deposits and debin requests
    pub deposit_amount: AmountRange,

    /// Issue one funding deposit right after login
    pub seed_deposit: bool,

    /// Base seed for reproducible runs
    pub seed: Option<u64>,

    /// Stop each user after this many cycles
    pub max_cycles: Option<u64>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: 1_000,
            max_wait_ms: 3_000,
            transfer_amount: AmountRange::new(1, 2),
            deposit_amount: AmountRange::new(10, 1_000),
            seed_deposit: false,
            seed: None,
            max_cycles: None,
        }
    }
}

impl BehaviorConfig {
    pub fn min_wait(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.min_wait_ms > self.max_wait_ms {
            return Err(CoreError::validation(
                "behavior.min_wait_ms must be <= max_wait_ms",
            ));
        }

        if self.transfer_amount.min > self.transfer_amount.max {
            return Err(CoreError::validation(
                "behavior.transfer_amount.min must be <= max",
            ));
        }

        if self.deposit_amount.min > self.deposit_amount.max {
            return Err(CoreError::validation(
                "behavior.deposit_amount.min must be <= max",
            ));
        }

        Ok(())
    }
}

/// Weighted action mix, in registry order
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub mix: Vec<ActionWeight>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            mix: action::wallet_mix(),
        }
    }
}

impl ActionsConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.mix.is_empty() {
            return Err(CoreError::validation("actions.mix cannot be empty"));
        }

        if let Some(zero) = self.mix.iter().find(|entry| entry.weight == 0) {
            return Err(CoreError::validation(format!(
                "actions.mix weight for `{}` must be > 0",
                zero.action
            )));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,

    /// json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Report output options
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    /// Write the run report here when set
    pub path: Option<String>,

    pub format: ReportFormat,

    /// Dump Prometheus text exposition here when set
    pub metrics_path: Option<String>,

    /// Thresholds the run is judged against
    pub criteria: CriteriaConfig,
}

/// Pass/fail thresholds for a run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CriteriaConfig {
    pub max_p95_latency_ms: f64,

    /// Fraction of failed requests, 0.0-1.0
    pub max_error_rate: f64,

    /// Successful requests per second
    pub min_throughput_rps: Option<f64>,

    pub max_p99_latency_ms: Option<f64>,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            max_p95_latency_ms: 500.0,
            max_error_rate: 0.01,
            min_throughput_rps: None,
            max_p99_latency_ms: Some(1_000.0),
        }
    }
}

impl CriteriaConfig {
    fn validate(&self) -> CoreResult<()> {
        if !positive(self.max_p95_latency_ms) {
            return Err(CoreError::validation(
                "report.criteria.max_p95_latency_ms must be > 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.max_error_rate) {
            return Err(CoreError::validation(
                "report.criteria.max_error_rate must be within 0.0-1.0",
            ));
        }

        if self.max_p99_latency_ms.is_some_and(|ms| !positive(ms)) {
            return Err(CoreError::validation(
                "report.criteria.max_p99_latency_ms must be > 0",
            ));
        }

        if self.min_throughput_rps.is_some_and(|rps| !rps.is_finite() || rps < 0.0) {
            return Err(CoreError::validation(
                "report.criteria.min_throughput_rps cannot be negative",
            ));
        }

        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(CoreError::validation(format!(
                "unknown report format `{other}`"
            ))),
        }
    }
}
