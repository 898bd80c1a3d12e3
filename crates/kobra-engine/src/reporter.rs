//! Report generation for load run results

use std::fs::File;
use std::io::Write;
use std::path::Path;

use kobra_core::{CoreResult, CriteriaConfig, ReportFormat};

use crate::metrics::RunMetrics;
use crate::orchestrator::PopulationSummary;

/// Success criteria for a load run
#[derive(Debug, Clone)]
pub struct SuccessCriteria {
    /// Maximum P95 latency in milliseconds
    pub max_p95_latency_ms: f64,

    /// Maximum error rate (0.0-1.0)
    pub max_error_rate: f64,

    /// Minimum throughput (successful requests per second)
    pub min_throughput_rps: Option<f64>,

    /// Maximum P99 latency in milliseconds
    pub max_p99_latency_ms: Option<f64>,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self::from(&CriteriaConfig::default())
    }
}

impl From<&CriteriaConfig> for SuccessCriteria {
    fn from(config: &CriteriaConfig) -> Self {
        Self {
            max_p95_latency_ms: config.max_p95_latency_ms,
            max_error_rate: config.max_error_rate,
            min_throughput_rps: config.min_throughput_rps,
            max_p99_latency_ms: config.max_p99_latency_ms,
        }
    }
}

/// Result writer for generating run reports
pub struct ResultWriter {
    pub metrics: RunMetrics,
    pub summary: Option<PopulationSummary>,
    success_criteria: SuccessCriteria,
    scenario_name: String,
}

impl ResultWriter {
    pub fn new(
        scenario_name: impl Into<String>,
        metrics: RunMetrics,
        success_criteria: SuccessCriteria,
    ) -> Self {
        Self {
            metrics,
            summary: None,
            success_criteria,
            scenario_name: scenario_name.into(),
        }
    }

    /// Attach the population summary to the report
    pub fn with_summary(mut self, summary: PopulationSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Check if the run passed its success criteria
    pub fn passes(&self) -> bool {
        self.check_criteria().is_empty()
    }

    pub fn failure_summary(&self) -> String {
        let failures = self.check_criteria();
        if failures.is_empty() {
            return "All criteria passed".to_string();
        }

        failures.join("\n")
    }

    fn check_criteria(&self) -> Vec<String> {
        let mut failures = Vec::new();

        let p95_ms = self.metrics.p95_latency().as_secs_f64() * 1000.0;
        if p95_ms > self.success_criteria.max_p95_latency_ms {
            failures.push(format!(
                "P95 latency {:.2}ms exceeds target {:.2}ms",
                p95_ms, self.success_criteria.max_p95_latency_ms
            ));
        }

        if self.metrics.error_rate() > self.success_criteria.max_error_rate {
            failures.push(format!(
                "Error rate {:.4}% exceeds target {:.4}%",
                self.metrics.error_rate() * 100.0,
                self.success_criteria.max_error_rate * 100.0
            ));
        }

        if let Some(min_rps) = self.success_criteria.min_throughput_rps {
            if self.metrics.throughput_rps() < min_rps {
                failures.push(format!(
                    "Throughput {:.1} req/s below target {:.1} req/s",
                    self.metrics.throughput_rps(),
                    min_rps
                ));
            }
        }

        if let Some(max_p99) = self.success_criteria.max_p99_latency_ms {
            let p99_ms = self.metrics.p99_latency().as_secs_f64() * 1000.0;
            if p99_ms > max_p99 {
                failures.push(format!(
                    "P99 latency {:.2}ms exceeds target {:.2}ms",
                    p99_ms, max_p99
                ));
            }
        }

        failures
    }

    /// Write report to file
    pub fn write_report(&self, path: impl AsRef<Path>, format: ReportFormat) -> CoreResult<()> {
        let content = self.render(format);
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.generate_markdown(),
            ReportFormat::Json => self.generate_json(),
        }
    }

    fn generate_markdown(&self) -> String {
        let pass_emoji = if self.passes() { "✅" } else { "❌" };
        let ms = |d: std::time::Duration| d.as_secs_f64() * 1000.0;

        let mut actions = String::new();
        for (name, stats) in &self.metrics.per_action {
            actions.push_str(&format!(
                "| {} | {} | {} | {:.2}% | {:.2}ms |\n",
                name,
                stats.successes,
                stats.failures,
                stats.error_rate() * 100.0,
                ms(stats.p95_latency())
            ));
        }

        let population = match &self.summary {
            Some(summary) => format!(
                "- **Users Spawned**: {}\n\
                 - **Startup Failures**: {}\n\
                 - **Cycles**: {}\n\
                 - **No-op Cycles**: {}",
                summary.spawned, summary.startup_failures, summary.cycles, summary.noops
            ),
            None => "No population summary recorded".to_string(),
        };

        format!(
            r#"# Load Run Report: {}

**Status**: {} {}

---

## Summary

- **Duration**: {:.1} seconds
- **Total Requests**: {}
- **Successful**: {}
- **Failed**: {}
- **Error Rate**: {:.4}%
- **Throughput**: {:.1} req/s

## Population

{}

---

## Latency

| Percentile | Latency |
|------------|---------|
| P50 | {:.2}ms |
| P90 | {:.2}ms |
| P95 | {:.2}ms |
| P99 | {:.2}ms |
| Max | {:.2}ms |

---

## Actions

| Action | Successes | Failures | Error Rate | P95 |
|--------|-----------|----------|------------|-----|
{}
---

## Success Criteria

{}

---

## Errors

{}

---

**Report Generated**: {}
"#,
            self.scenario_name,
            pass_emoji,
            if self.passes() { "PASSED" } else { "FAILED" },
            self.metrics.duration().as_secs_f64(),
            self.metrics.total_requests,
            self.metrics.successful_requests,
            self.metrics.failed_requests,
            self.metrics.error_rate() * 100.0,
            self.metrics.throughput_rps(),
            population,
            ms(self.metrics.p50_latency()),
            ms(self.metrics.p90_latency()),
            ms(self.metrics.p95_latency()),
            ms(self.metrics.p99_latency()),
            ms(self.metrics.max_latency()),
            actions,
            if self.passes() {
                "✅ **All criteria passed**".to_string()
            } else {
                format!("❌ **Failed criteria**:\n\n{}", self.failure_summary())
            },
            if self.metrics.errors.is_empty() {
                "No errors recorded".to_string()
            } else {
                format!(
                    "{} errors ({} not shown):\n\n```\n{}\n```",
                    self.metrics.errors.len() + self.metrics.dropped_errors,
                    self.metrics.dropped_errors,
                    self.metrics.errors.join("\n")
                )
            },
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    fn generate_json(&self) -> String {
        let ms = |d: std::time::Duration| d.as_secs_f64() * 1000.0;
        let actions: serde_json::Map<String, serde_json::Value> = self
            .metrics
            .per_action
            .iter()
            .map(|(name, stats)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "successes": stats.successes,
                        "failures": stats.failures,
                        "error_rate": stats.error_rate(),
                        "p95_ms": ms(stats.p95_latency()),
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "scenario": self.scenario_name,
            "status": if self.passes() { "passed" } else { "failed" },
            "duration_seconds": self.metrics.duration().as_secs_f64(),
            "total_requests": self.metrics.total_requests,
            "successful_requests": self.metrics.successful_requests,
            "failed_requests": self.metrics.failed_requests,
            "error_rate": self.metrics.error_rate(),
            "throughput_rps": self.metrics.throughput_rps(),
            "latency_ms": {
                "p50": ms(self.metrics.p50_latency()),
                "p90": ms(self.metrics.p90_latency()),
                "p95": ms(self.metrics.p95_latency()),
                "p99": ms(self.metrics.p99_latency()),
                "max": ms(self.metrics.max_latency()),
            },
            "actions": actions,
            "population": self.summary,
            "success_criteria": {
                "passed": self.passes(),
                "failures": self.check_criteria(),
            },
            "errors": self.metrics.errors,
            "dropped_errors": self.metrics.dropped_errors,
        })
        .to_string()
    }
}
