//! Population orchestrator: spawns, retires and stops virtual users
//!
//! The orchestrator owns the run-scoped pieces every user shares: the
//! identity allocator, the action registry, the HTTP client and the
//! outcome reporter. Each user runs as its own tokio task with a child
//! cancellation token, so users can be retired individually (ramp-down) or
//! all at once (stop).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use kobra_core::{
    IdentityAllocator, KobraConfig, OutcomeReporter, VirtualUserIdentity, VirtualUserState,
};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::ActionRegistry;
use crate::error::{EngineError, EngineResult};
use crate::profiles::PopulationProfile;
use crate::session::{build_http_client, SessionClient};
use crate::user::{UserBehavior, UserReport, VirtualUser};

/// Handle to one spawned virtual user.
pub struct UserHandle {
    pub index: u64,
    pub identity: VirtualUserIdentity,
    state: watch::Receiver<VirtualUserState>,
    cancel: CancellationToken,
    join: JoinHandle<UserReport>,
}

impl UserHandle {
    pub fn state(&self) -> VirtualUserState {
        *self.state.borrow()
    }

    /// Waits until the user reaches `target` or stops.
    pub async fn wait_for(&mut self, target: VirtualUserState) -> VirtualUserState {
        let result = self
            .state
            .wait_for(|state| *state == target || state.is_terminal())
            .await
            .map(|state| *state);
        // A closed channel means the task finished and the user is stopped.
        result.unwrap_or(VirtualUserState::Stopped)
    }

    fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Totals across every user of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationSummary {
    pub spawned: u64,
    pub stopped: usize,
    pub startup_failures: usize,
    pub cancelled: usize,
    pub cycles: u64,
    pub requests: u64,
    pub failures: u64,
    pub noops: u64,
    #[serde(skip)]
    pub users: Vec<UserReport>,
}

impl PopulationSummary {
    fn from_reports(spawned: u64, users: Vec<UserReport>) -> Self {
        let mut summary = Self {
            spawned,
            ..Default::default()
        };

        for user in &users {
            summary.stopped += usize::from(user.final_state == VirtualUserState::Stopped);
            summary.startup_failures += usize::from(user.startup_error.is_some());
            summary.cancelled += usize::from(user.cancelled);
            summary.cycles += user.cycles;
            summary.requests += user.requests;
            summary.failures += user.failures;
            summary.noops += user.noops;
        }

        summary.users = users;
        summary
    }
}

/// Spawns and retires virtual users for one run.
pub struct PopulationOrchestrator {
    registry: Arc<ActionRegistry>,
    behavior: Arc<UserBehavior>,
    allocator: Arc<IdentityAllocator>,
    reporter: Arc<dyn OutcomeReporter>,
    http: Client,
    base_url: String,
    seed: Option<u64>,
    spawn_interval: Duration,
    shutdown: CancellationToken,
    users: Vec<UserHandle>,
    completed: Vec<UserReport>,
    /// Users that stopped on their own (failed login, cycle limit). They
    /// keep their slot when the population grows, so they are never
    /// replaced, but a ramp-down only ever retires live users.
    exited: usize,
    next_index: u64,
}

impl PopulationOrchestrator {
    /// Builds an orchestrator from a validated configuration.
    pub fn from_config(
        config: &KobraConfig,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let registry = ActionRegistry::new(&config.actions.mix)?;
        let allocator = IdentityAllocator::new(config.population.max_numbered_users)?;
        let http = build_http_client(config.target.request_timeout())
            .map_err(EngineError::HttpClient)?;

        Ok(Self {
            registry: Arc::new(registry),
            behavior: Arc::new(UserBehavior::from_config(config)),
            allocator: Arc::new(allocator),
            reporter,
            http,
            base_url: config.target.base_url.clone(),
            seed: config.behavior.seed,
            spawn_interval: config.population.spawn_interval(),
            shutdown: CancellationToken::new(),
            users: Vec::new(),
            completed: Vec::new(),
            exited: 0,
            next_index: 0,
        })
    }

    /// Token that stops the whole population when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn users(&self) -> &[UserHandle] {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut [UserHandle] {
        &mut self.users
    }

    /// Users whose task is still alive.
    pub fn live_users(&self) -> usize {
        self.users.iter().filter(|u| !u.is_finished()).count()
    }

    /// Spawns one user with the next identity from the pool.
    pub fn spawn_user(&mut self) -> VirtualUserIdentity {
        let index = self.next_index;
        self.next_index += 1;

        let identity = self.allocator.next_identity();
        let cancel = self.shutdown.child_token();
        let session = SessionClient::new(
            self.http.clone(),
            self.base_url.clone(),
            Arc::clone(&self.reporter),
        );

        let (user, state) = VirtualUser::new(
            index,
            identity.clone(),
            session,
            Arc::clone(&self.registry),
            Arc::clone(&self.behavior),
            self.seed,
            cancel.clone(),
        );
        let join = tokio::spawn(user.run());

        debug!(user = index, identity = %identity, "spawned virtual user");
        self.users.push(UserHandle {
            index,
            identity: identity.clone(),
            state,
            cancel,
            join,
        });

        identity
    }

    /// Spawns `count` users, pacing them by the configured spawn rate.
    ///
    /// Returns early if the population is shut down meanwhile.
    pub async fn start_population(&mut self, count: usize) -> usize {
        info!(
            count,
            interval_ms = self.spawn_interval.as_millis() as u64,
            "starting virtual users"
        );

        let mut spawned = 0;
        for i in 0..count {
            if self.shutdown.is_cancelled() {
                break;
            }

            if i > 0 && !self.spawn_interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.spawn_interval) => {}
                }
            }

            self.spawn_user();
            spawned += 1;
        }

        spawned
    }

    /// Retires up to `count` users, most recently spawned first, and waits
    /// for them to stop.
    pub async fn retire(&mut self, count: usize) -> Vec<UserReport> {
        let count = count.min(self.users.len());
        let retiring = self.users.split_off(self.users.len() - count);

        for handle in &retiring {
            handle.cancel.cancel();
        }

        info!(count, "retiring virtual users");
        let reports = collect(retiring).await;
        self.completed.extend(reports.iter().cloned());
        reports
    }

    /// Moves users that stopped on their own into the completed list.
    pub async fn reap_finished(&mut self) -> usize {
        let (finished, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.users).into_iter().partition(UserHandle::is_finished);
        self.users = running;

        let reports = collect(finished).await;
        let reaped = reports.len();
        self.exited += reaped;
        self.completed.extend(reports);
        reaped
    }

    /// Cancels every user, waits for all of them and summarizes the run.
    ///
    /// The orchestrator cannot spawn again afterwards.
    pub async fn stop_population(&mut self) -> PopulationSummary {
        self.shutdown.cancel();

        let remaining = std::mem::take(&mut self.users);
        info!(count = remaining.len(), "stopping virtual users");
        let reports = collect(remaining).await;
        self.completed.extend(reports);

        let mut users = std::mem::take(&mut self.completed);
        users.sort_by_key(|report| report.index);
        let summary = PopulationSummary::from_reports(self.next_index, users);

        info!(
            spawned = summary.spawned,
            startup_failures = summary.startup_failures,
            requests = summary.requests,
            failures = summary.failures,
            "population stopped"
        );
        summary
    }

    /// Follows `profile` for `duration`, reconciling the population once per
    /// second, then stops everyone.
    pub async fn run_profile(
        &mut self,
        profile: &PopulationProfile,
        duration: Duration,
    ) -> PopulationSummary {
        info!(profile = %profile.description(), ?duration, "starting run");

        let start = Instant::now();
        let end = start + duration;
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while Instant::now() < end && !self.shutdown.is_cancelled() {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(end) => break,
                _ = ticker.tick() => {}
            }

            self.reap_finished().await;

            let target = profile.users_at(start.elapsed());
            let live = self.users.len();
            // Self-stopped users still hold a slot when growing, but only
            // live users can be retired.
            let occupied = live + self.exited;

            if occupied < target {
                let missing = target - occupied;
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(end) => break,
                    _ = self.start_population(missing) => {}
                }
            } else if live > target {
                self.retire(live - target).await;
            }
        }

        self.stop_population().await
    }
}

async fn collect(handles: Vec<UserHandle>) -> Vec<UserReport> {
    let (indices, joins): (Vec<u64>, Vec<_>) =
        handles.into_iter().map(|h| (h.index, h.join)).unzip();

    join_all(joins)
        .await
        .into_iter()
        .zip(indices)
        .filter_map(|(result, index)| match result {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(user = index, error = %err, "virtual user task failed");
                None
            }
        })
        .collect()
}
