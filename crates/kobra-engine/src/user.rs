//! Virtual user lifecycle
//!
//! ```text
//! Initializing --login ok--> Authenticated --(seed deposit)--> Running
//!      |                                                      |  ^
//!      +--login failed--> Stopped <--cancel / max cycles------+  |
//!                                                  think, pick, call
//! ```
//!
//! Only a failed login stops a user on its own. Action failures are reported
//! and the loop carries on. Cancellation is observed during login, think time
//! and in-flight requests; the pending request future is dropped, which
//! releases its connection.

use std::sync::Arc;
use std::time::Duration;

use kobra_core::metrics::{ACTIVE_USERS, NOOP_CYCLES, STARTUP_FAILURES};
use kobra_core::{AmountRange, KobraConfig, VirtualUserIdentity, VirtualUserState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::actions::{seed_deposit_plan, ActionContext, ActionRegistry};
use crate::session::{SessionClient, SessionError};

/// Per-user behavior shared by the whole population.
#[derive(Debug, Clone)]
pub struct UserBehavior {
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub transfer_amount: AmountRange,
    pub deposit_amount: AmountRange,
    pub seed_deposit: bool,
    pub max_cycles: Option<u64>,
    pub password: String,
    pub email_domain: String,
    pub pool_ceiling: u64,
}

impl UserBehavior {
    pub fn from_config(config: &KobraConfig) -> Self {
        Self {
            min_wait: config.behavior.min_wait(),
            max_wait: config.behavior.max_wait(),
            transfer_amount: config.behavior.transfer_amount,
            deposit_amount: config.behavior.deposit_amount,
            seed_deposit: config.behavior.seed_deposit,
            max_cycles: config.behavior.max_cycles,
            password: config.target.password.clone(),
            email_domain: config.target.email_domain.clone(),
            pool_ceiling: config.population.max_numbered_users,
        }
    }

    /// Think time drawn uniformly from `[min_wait, max_wait]`.
    pub fn think_time<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_wait <= self.min_wait {
            return self.min_wait;
        }
        let min = self.min_wait.as_millis() as u64;
        let max = self.max_wait.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// A virtual user that never got past login.
#[derive(Debug, Error)]
#[error("virtual user {identity} failed to start: {source}")]
pub struct StartupError {
    pub identity: VirtualUserIdentity,
    #[source]
    pub source: SessionError,
}

/// Final account of one virtual user.
#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    /// Spawn order within the population, starting at 0.
    pub index: u64,
    pub identity: VirtualUserIdentity,
    pub final_state: VirtualUserState,
    /// Cycles in which an action was picked.
    pub cycles: u64,
    /// Actions attempted, seed deposit included.
    pub requests: u64,
    pub failures: u64,
    /// Cycles skipped without a request.
    pub noops: u64,
    pub startup_error: Option<String>,
    /// Stopped by a ramp-down or shutdown signal.
    pub cancelled: bool,
}

impl UserReport {
    fn new(index: u64, identity: VirtualUserIdentity) -> Self {
        Self {
            index,
            identity,
            final_state: VirtualUserState::Initializing,
            cycles: 0,
            requests: 0,
            failures: 0,
            noops: 0,
            startup_error: None,
            cancelled: false,
        }
    }
}

/// One simulated user and everything it exclusively owns.
pub struct VirtualUser {
    index: u64,
    identity: VirtualUserIdentity,
    session: SessionClient,
    registry: Arc<ActionRegistry>,
    behavior: Arc<UserBehavior>,
    rng: StdRng,
    cancel: CancellationToken,
    state: watch::Sender<VirtualUserState>,
}

impl VirtualUser {
    /// Creates a user in `Initializing`. `seed` makes its random choices
    /// reproducible; without one it seeds from entropy.
    pub fn new(
        index: u64,
        identity: VirtualUserIdentity,
        session: SessionClient,
        registry: Arc<ActionRegistry>,
        behavior: Arc<UserBehavior>,
        seed: Option<u64>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<VirtualUserState>) {
        let (state, state_rx) = watch::channel(VirtualUserState::Initializing);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ index),
            None => StdRng::from_entropy(),
        };

        let user = Self {
            index,
            identity,
            session,
            registry,
            behavior,
            rng,
            cancel,
            state,
        };
        (user, state_rx)
    }

    /// Drives the lifecycle to `Stopped` and returns the user's report.
    pub async fn run(self) -> UserReport {
        let VirtualUser {
            index,
            identity,
            session,
            registry,
            behavior,
            mut rng,
            cancel,
            state,
        } = self;

        let mut report = UserReport::new(index, identity.clone());
        let email = identity.email(&behavior.email_domain);

        let login = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = session.login(&email, &behavior.password) => Some(result),
        };

        let session = match login {
            None => {
                report.cancelled = true;
                return finish(report, &state);
            }
            Some(Err(source)) => {
                let err = StartupError {
                    identity: identity.clone(),
                    source,
                };
                error!(
                    user = index,
                    identity = %identity,
                    error = %err,
                    "virtual user failed to start"
                );
                STARTUP_FAILURES.inc();
                report.startup_error = Some(err.to_string());
                return finish(report, &state);
            }
            Some(Ok(session)) => session,
        };

        transition(&mut report, &state, VirtualUserState::Authenticated);

        let ctx = ActionContext {
            identity: &identity,
            credentials: session.credentials(),
            pool_ceiling: behavior.pool_ceiling,
            email_domain: &behavior.email_domain,
            transfer_amount: behavior.transfer_amount,
            deposit_amount: behavior.deposit_amount,
        };

        if behavior.seed_deposit {
            let plan = seed_deposit_plan(&ctx, &mut rng);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    return finish(report, &state);
                }
                outcome = session.call(&plan) => {
                    report.requests += 1;
                    if !outcome.success {
                        report.failures += 1;
                    }
                }
            }
        }

        transition(&mut report, &state, VirtualUserState::Running);
        ACTIVE_USERS.inc();
        info!(user = index, identity = %identity, "virtual user running");

        loop {
            if behavior
                .max_cycles
                .is_some_and(|max| report.cycles >= max)
            {
                debug!(user = index, cycles = report.cycles, "cycle limit reached");
                break;
            }

            let think = behavior.think_time(&mut rng);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(think) => {}
            }

            let spec = registry.select(&mut rng);
            report.cycles += 1;

            let Some(plan) = spec.plan(&ctx, &mut rng) else {
                report.noops += 1;
                NOOP_CYCLES.with_label_values(&[spec.name()]).inc();
                debug!(user = index, action = spec.name(), "skipped self-targeted action");
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                outcome = session.call(&plan) => {
                    report.requests += 1;
                    if !outcome.success {
                        report.failures += 1;
                    }
                }
            }
        }

        ACTIVE_USERS.dec();
        drop(session);
        finish(report, &state)
    }
}

fn transition(
    report: &mut UserReport,
    state: &watch::Sender<VirtualUserState>,
    next: VirtualUserState,
) {
    report.final_state = next;
    state.send_replace(next);
}

fn finish(mut report: UserReport, state: &watch::Sender<VirtualUserState>) -> UserReport {
    transition(&mut report, state, VirtualUserState::Stopped);
    debug!(
        user = report.index,
        cycles = report.cycles,
        requests = report.requests,
        failures = report.failures,
        cancelled = report.cancelled,
        "virtual user stopped"
    );
    report
}
