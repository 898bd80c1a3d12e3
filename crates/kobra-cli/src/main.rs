use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kobra_core::{KobraConfig, ReportFormat};
use kobra_engine::{
    AggregatingReporter, PopulationOrchestrator, PopulationProfile, ResultWriter, SuccessCriteria,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "kobra")]
#[command(about = "Virtual-user load generator for the Kobra wallet API", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Base URL of the wallet API
    #[arg(long)]
    host: Option<String>,

    /// Target number of concurrent virtual users
    #[arg(long, short = 'u')]
    users: Option<usize>,

    /// Users spawned per second
    #[arg(long, short = 'r')]
    spawn_rate: Option<f64>,

    /// Run length in seconds
    #[arg(long, short = 't')]
    run_time: Option<u64>,

    /// Ceiling of the numbered identity pool
    #[arg(long)]
    max_numbered_users: Option<u64>,

    /// Seed for reproducible action and payload choices
    #[arg(long)]
    seed: Option<u64>,

    /// Write the run report to this path
    #[arg(long)]
    report: Option<String>,

    /// Report format: markdown or json
    #[arg(long)]
    report_format: Option<ReportFormat>,

    /// Dump Prometheus metrics to this path at the end of the run
    #[arg(long)]
    metrics_out: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Exit with an error when the run misses its success criteria
    #[arg(long)]
    fail_on_criteria: bool,
}

impl Cli {
    /// Loads configuration, applies flag overrides, then validates the result.
    fn resolve_config(&self) -> Result<KobraConfig> {
        let mut config =
            KobraConfig::load(self.config.as_deref()).context("failed to load configuration")?;
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Applies flag overrides on top of the loaded configuration.
    fn apply(&self, config: &mut KobraConfig) {
        if let Some(host) = &self.host {
            config.target.base_url = host.clone();
        }
        if let Some(users) = self.users {
            config.population.users = users;
        }
        if let Some(rate) = self.spawn_rate {
            config.population.spawn_rate = Some(rate);
        }
        if let Some(run_time) = self.run_time {
            config.population.run_time_secs = run_time;
        }
        if let Some(ceiling) = self.max_numbered_users {
            config.population.max_numbered_users = ceiling;
        }
        if let Some(seed) = self.seed {
            config.behavior.seed = Some(seed);
        }
        if let Some(path) = &self.report {
            config.report.path = Some(path.clone());
        }
        if let Some(format) = self.report_format {
            config.report.format = format;
        }
        if let Some(path) = &self.metrics_out {
            config.report.metrics_path = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.resolve_config()?;

    logging::init_logging(&config.logging)?;

    let profile = config
        .population
        .profile
        .as_ref()
        .map(PopulationProfile::from)
        .unwrap_or(PopulationProfile::Constant {
            users: config.population.users,
        });

    info!(
        target_url = %config.target.base_url,
        profile = %profile.description(),
        run_time_secs = config.population.run_time_secs,
        max_numbered_users = config.population.max_numbered_users,
        "starting load run"
    );

    let reporter = Arc::new(AggregatingReporter::new());
    let mut orchestrator = PopulationOrchestrator::from_config(&config, reporter.clone())?;
    spawn_signal_handler(orchestrator.shutdown_token());

    let summary = orchestrator
        .run_profile(&profile, config.population.run_time())
        .await;

    let writer = ResultWriter::new(
        profile.description(),
        reporter.snapshot(),
        SuccessCriteria::from(&config.report.criteria),
    )
    .with_summary(summary);

    info!(
        requests = writer.metrics.total_requests,
        failed = writer.metrics.failed_requests,
        throughput_rps = writer.metrics.throughput_rps(),
        p95_ms = writer.metrics.p95_latency().as_secs_f64() * 1000.0,
        "load run finished"
    );

    match &config.report.path {
        Some(path) => {
            writer
                .write_report(path, config.report.format)
                .with_context(|| format!("failed to write report to {path}"))?;
            info!(path = %path, "report written");
        }
        None => println!("{}", writer.render(config.report.format)),
    }

    if let Some(path) = &config.report.metrics_path {
        let dump = kobra_core::metrics::render()?;
        std::fs::write(path, dump).with_context(|| format!("failed to write metrics to {path}"))?;
        info!(path = %path, "metrics written");
    }

    if !writer.passes() {
        warn!(failures = %writer.failure_summary(), "success criteria not met");
        if cli.fail_on_criteria {
            bail!("success criteria not met");
        }
    }

    Ok(())
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, stopping virtual users"),
            _ = terminate => info!("received SIGTERM, stopping virtual users"),
        }

        shutdown.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_configuration() {
        let cli = Cli::parse_from([
            "kobra",
            "--host",
            "http://wallet.test",
            "--users",
            "40",
            "--spawn-rate",
            "5",
            "--run-time",
            "120",
            "--max-numbered-users",
            "8",
            "--seed",
            "3",
            "--report-format",
            "json",
        ]);

        let mut config = KobraConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.target.base_url, "http://wallet.test");
        assert_eq!(config.population.users, 40);
        assert_eq!(config.population.spawn_rate, Some(5.0));
        assert_eq!(config.population.run_time_secs, 120);
        assert_eq!(config.population.max_numbered_users, 8);
        assert_eq!(config.behavior.seed, Some(3));
        assert_eq!(config.report.format, ReportFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_flags_keep_configuration() {
        let cli = Cli::parse_from(["kobra"]);
        let mut config = KobraConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.population.users, 10);
        assert_eq!(config.population.max_numbered_users, 2);
        assert!(!cli.fail_on_criteria);
    }

    #[test]
    fn test_rejects_unknown_report_format() {
        assert!(Cli::try_parse_from(["kobra", "--report-format", "xml"]).is_err());
    }

    #[test]
    fn test_flags_can_fix_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[population]\nmax_numbered_users = 0").unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["kobra", "--config", path]);
        assert!(cli.resolve_config().is_err());

        let cli = Cli::parse_from(["kobra", "--config", path, "--max-numbered-users", "3"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.population.max_numbered_users, 3);
    }
}
