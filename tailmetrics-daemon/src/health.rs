//! Health report served on `/health`.
//!
//! The overall status comes straight from the pipeline's
//! `health_check()`; the report adds uptime, rule and series counts and
//! the state of each line source.

use std::time::Instant;

use serde::Serialize;

use tailmetrics_core::pipeline::{HealthStatus, Pipeline};
use tailmetrics_log_pipeline::{CollectorStatus, LogPipeline};

/// Health report for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Pipeline health status.
    #[serde(flatten)]
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Number of rules loaded.
    pub rules: usize,
    /// Number of series currently held in the store.
    pub series: usize,
    /// Per-source state.
    pub sources: Vec<SourceHealth>,
}

/// State of a single line source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    /// Source name (`tcp`, `udp`, `file:<path>`).
    pub name: String,
    /// `running`, `stopped`, `idle` or `error: <reason>`.
    pub state: String,
}

impl From<(String, CollectorStatus)> for SourceHealth {
    fn from((name, status): (String, CollectorStatus)) -> Self {
        let state = match status {
            CollectorStatus::Idle => "idle".to_owned(),
            CollectorStatus::Running => "running".to_owned(),
            CollectorStatus::Stopped => "stopped".to_owned(),
            CollectorStatus::Error(reason) => format!("error: {reason}"),
        };
        Self { name, state }
    }
}

impl DaemonHealth {
    /// Collect a report from a pipeline.
    pub async fn collect(pipeline: &LogPipeline, start_time: Instant) -> Self {
        Self {
            status: pipeline.health_check().await,
            uptime_secs: start_time.elapsed().as_secs(),
            rules: pipeline.rule_count(),
            series: pipeline.store().len(),
            sources: pipeline
                .collector_statuses()
                .into_iter()
                .map(SourceHealth::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_state_names() {
        let health = SourceHealth::from(("udp".to_owned(), CollectorStatus::Error("boom".into())));
        assert_eq!(health.state, "error: boom");
        let health = SourceHealth::from(("tcp".to_owned(), CollectorStatus::Running));
        assert_eq!(health.state, "running");
    }

    #[test]
    fn report_serializes_flat_status() {
        let report = DaemonHealth {
            status: HealthStatus::Degraded("line source exited: udp".into()),
            uptime_secs: 12,
            rules: 3,
            series: 7,
            sources: vec![SourceHealth {
                name: "udp".into(),
                state: "stopped".into(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "line source exited: udp");
        assert_eq!(json["rules"], 3);
        assert_eq!(json["sources"][0]["name"], "udp");
    }
}
