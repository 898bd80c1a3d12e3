//! Population orchestration end to end against the mock wallet API

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use common::MockWallet;
use kobra_core::{KobraConfig, VirtualUserState};
use kobra_engine::{
    AggregatingReporter, ChannelReporter, FanoutReporter, PopulationOrchestrator,
    PopulationProfile,
};
use serde_json::json;

fn config_for(wallet: &MockWallet, ceiling: u64) -> KobraConfig {
    let mut config = KobraConfig::default();
    config.target.base_url = wallet.base_url();
    config.target.request_timeout_ms = 2_000;
    config.population.max_numbered_users = ceiling;
    config.population.spawn_rate = None;
    config.behavior.min_wait_ms = 10;
    config.behavior.max_wait_ms = 20;
    config.behavior.seed = Some(42);
    config
}

/// Bearer tokens seen on authenticated calls at or after `from`.
fn bearers_since(wallet: &MockWallet, from: Instant) -> BTreeSet<String> {
    wallet
        .requests()
        .into_iter()
        .filter(|r| r.at >= from)
        .filter_map(|r| r.authorization)
        .collect()
}

async fn wait_until_running(orchestrator: &mut PopulationOrchestrator) {
    for handle in orchestrator.users_mut() {
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            handle.wait_for(VirtualUserState::Running),
        )
        .await
        .expect("user reached running");
        assert_eq!(state, VirtualUserState::Running);
    }
}

#[tokio::test]
async fn test_population_shares_wrapped_identities() {
    let wallet = MockWallet::start().await;
    let reporter = Arc::new(AggregatingReporter::new());
    let mut orchestrator =
        PopulationOrchestrator::from_config(&config_for(&wallet, 5), reporter.clone()).unwrap();

    assert_eq!(orchestrator.start_population(10).await, 10);
    wait_until_running(&mut orchestrator).await;
    assert_eq!(orchestrator.live_users(), 10);

    // Every pool member logged in exactly twice
    let mut logins: BTreeMap<String, usize> = BTreeMap::new();
    for request in wallet.requests_to("/auth/login") {
        let email = request.body.unwrap()["email"].as_str().unwrap().to_string();
        *logins.entry(email).or_default() += 1;
    }
    let expected: BTreeMap<String, usize> = (1..=5)
        .map(|n| (format!("user{n}@example.com"), 2))
        .collect();
    assert_eq!(logins, expected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let summary = orchestrator.stop_population().await;

    assert_eq!(summary.spawned, 10);
    assert_eq!(summary.stopped, 10);
    assert_eq!(summary.startup_failures, 0);
    assert_eq!(summary.cancelled, 10);
    assert!(summary.cycles > 0);
    assert_eq!(orchestrator.live_users(), 0);

    let indices: Vec<u64> = summary.users.iter().map(|u| u.index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());

    let metrics = reporter.snapshot();
    assert_eq!(metrics.per_action["login"].successes, 10);
    assert!(metrics.total_requests >= 10);
}

#[tokio::test]
async fn test_retire_stops_most_recent_users() {
    let wallet = MockWallet::start().await;
    let mut orchestrator = PopulationOrchestrator::from_config(
        &config_for(&wallet, 5),
        Arc::new(AggregatingReporter::new()),
    )
    .unwrap();

    orchestrator.start_population(4).await;
    wait_until_running(&mut orchestrator).await;

    let retired = orchestrator.retire(2).await;
    let indices: Vec<u64> = retired.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![2, 3]);
    assert!(retired
        .iter()
        .all(|r| r.cancelled && r.final_state == VirtualUserState::Stopped));

    assert_eq!(orchestrator.users().len(), 2);
    assert_eq!(orchestrator.live_users(), 2);
    assert!(orchestrator
        .users()
        .iter()
        .all(|u| u.state() == VirtualUserState::Running));

    let summary = orchestrator.stop_population().await;
    assert_eq!(summary.users.len(), 4);
}

#[tokio::test]
async fn test_run_profile_holds_constant_population() {
    let wallet = MockWallet::start().await;
    let (channel, mut rx) = ChannelReporter::new(10_000);
    let channel = Arc::new(channel);
    let aggregate = Arc::new(AggregatingReporter::new());
    let fanout = FanoutReporter::default()
        .with(aggregate.clone())
        .with(channel.clone());

    let mut orchestrator =
        PopulationOrchestrator::from_config(&config_for(&wallet, 3), Arc::new(fanout)).unwrap();

    let summary = orchestrator
        .run_profile(
            &PopulationProfile::Constant { users: 3 },
            Duration::from_millis(2_500),
        )
        .await;

    assert_eq!(summary.spawned, 3);
    assert_eq!(summary.startup_failures, 0);
    assert_eq!(summary.users.len(), 3);
    assert!(summary
        .users
        .iter()
        .all(|u| u.final_state == VirtualUserState::Stopped));

    let mut received = 0usize;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(channel.dropped(), 0);
    assert_eq!(received, aggregate.snapshot().total_requests);
    // Logins plus every attempted action
    assert_eq!(received as u64, 3 + summary.requests);
}

#[tokio::test]
async fn test_failed_logins_are_not_replaced() {
    let wallet = MockWallet::builder()
        .login(StatusCode::UNAUTHORIZED, json!({ "message": "nope" }))
        .start()
        .await;
    let mut orchestrator = PopulationOrchestrator::from_config(
        &config_for(&wallet, 2),
        Arc::new(AggregatingReporter::new()),
    )
    .unwrap();

    let summary = orchestrator
        .run_profile(
            &PopulationProfile::Constant { users: 3 },
            Duration::from_millis(2_500),
        )
        .await;

    assert_eq!(summary.spawned, 3);
    assert_eq!(summary.startup_failures, 3);
    assert_eq!(summary.cycles, 0);
    assert_eq!(summary.requests, 0);
    assert_eq!(wallet.requests_to("/auth/login").len(), 3);
}

#[tokio::test]
async fn test_shutdown_token_stops_run_early() {
    let wallet = MockWallet::start().await;
    let mut orchestrator = PopulationOrchestrator::from_config(
        &config_for(&wallet, 2),
        Arc::new(AggregatingReporter::new()),
    )
    .unwrap();

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run_profile(
            &PopulationProfile::Constant { users: 2 },
            Duration::from_secs(60),
        ),
    )
    .await
    .expect("run stopped on shutdown");

    assert_eq!(summary.spawned, 2);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(orchestrator.start_population(1).await, 0);
}

#[tokio::test]
async fn test_ramp_down_retires_users_after_peak() {
    let wallet = MockWallet::builder().per_user_tokens().start().await;
    let mut orchestrator = PopulationOrchestrator::from_config(
        &config_for(&wallet, 4),
        Arc::new(AggregatingReporter::new()),
    )
    .unwrap();

    let started = Instant::now();
    let summary = orchestrator
        .run_profile(
            &PopulationProfile::Ramp {
                from: 4,
                to: 1,
                ramp_duration: Duration::from_secs(2),
            },
            Duration::from_millis(3_500),
        )
        .await;

    assert_eq!(summary.spawned, 4);
    assert_eq!(summary.startup_failures, 0);
    assert_eq!(summary.cancelled, 4);
    assert!(bearers_since(&wallet, started).contains("Bearer user4@example.com"));

    // Ramp ends at 2 s; only the first user is left afterwards
    let late = bearers_since(&wallet, started + Duration::from_millis(2_600));
    let expected: BTreeSet<String> = ["Bearer user1@example.com".to_string()].into();
    assert_eq!(late, expected);
}

#[tokio::test]
async fn test_spike_end_keeps_live_users_when_others_failed() {
    let wallet = MockWallet::builder()
        .per_user_tokens()
        .reject_login("user1@example.com")
        .reject_login("user2@example.com")
        .start()
        .await;
    let mut orchestrator = PopulationOrchestrator::from_config(
        &config_for(&wallet, 4),
        Arc::new(AggregatingReporter::new()),
    )
    .unwrap();

    let started = Instant::now();
    let summary = orchestrator
        .run_profile(
            &PopulationProfile::Spike {
                baseline: 2,
                spike: 4,
                spike_start: Duration::ZERO,
                spike_duration: Duration::from_secs(2),
            },
            Duration::from_millis(3_500),
        )
        .await;

    assert_eq!(summary.spawned, 4);
    assert_eq!(summary.startup_failures, 2);

    // Back at baseline the two failed users do not count against the two
    // live ones, so both keep running to the end of the run.
    let late = bearers_since(&wallet, started + Duration::from_millis(2_600));
    let expected: BTreeSet<String> = [
        "Bearer user3@example.com".to_string(),
        "Bearer user4@example.com".to_string(),
    ]
    .into();
    assert_eq!(late, expected);
    let survivors: Vec<u64> = summary
        .users
        .iter()
        .filter(|u| u.startup_error.is_none())
        .map(|u| u.index)
        .collect();
    assert_eq!(survivors, vec![2, 3]);
}
