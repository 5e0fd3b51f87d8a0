//! Daemon orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] loads the rule file, builds the log pipeline,
//! serves the scrape endpoint and drives graceful shutdown.
//!
//! # Startup Order
//!
//! 1. Rule file (any error is fatal)
//! 2. Log pipeline: rule workers, sweeper, line sources
//! 3. Scrape endpoint
//!
//! # Shutdown Order
//!
//! 1. Scrape endpoint (stop accepting scrapes)
//! 2. Log pipeline (stop sources, drain rule queues)

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use tailmetrics_core::config::TailmetricsConfig;
use tailmetrics_core::pipeline::{HealthStatus, Pipeline};
use tailmetrics_log_pipeline::{
    LogPipeline, LogPipelineBuilder, MetricRule, MetricStore, PipelineConfig, RuleLoader,
};

use crate::health::DaemonHealth;
use crate::metrics_server::{self, AppState};

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: TailmetricsConfig,
    /// The log pipeline, shared with the HTTP handlers.
    pipeline: Arc<RwLock<LogPipeline>>,
    /// Metric store owned by the pipeline.
    store: Arc<MetricStore>,
    /// Recorder handle when metrics are enabled.
    recorder: Option<PrometheusHandle>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Build from an already-loaded configuration.
    ///
    /// This performs the following steps:
    /// 1. Validate the configuration
    /// 2. Load and compile the rule file
    /// 3. Build the log pipeline
    ///
    /// The metrics recorder is not installed here; see [`Orchestrator::with_recorder`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The rule file cannot be read or any rule is invalid
    /// - The pipeline configuration is rejected
    pub async fn build_from_config(config: TailmetricsConfig) -> Result<Self> {
        config.validate().context("config validation failed")?;

        let rules = load_rules(&config).await?;
        let pipeline_config = PipelineConfig::from_core(&config.collector, &config.engine);
        let store = Arc::new(MetricStore::new());
        let pipeline = LogPipelineBuilder::new()
            .config(pipeline_config)
            .rules(rules)
            .store(Arc::clone(&store))
            .build()
            .context("failed to build log pipeline")?;

        tracing::info!(rules = pipeline.rule_count(), "orchestrator initialized");

        Ok(Self {
            config,
            pipeline: Arc::new(RwLock::new(pipeline)),
            store,
            recorder: None,
            start_time: Instant::now(),
        })
    }

    /// Attach a global recorder handle whose output is appended to scrapes.
    pub fn with_recorder(mut self, recorder: PrometheusHandle) -> Self {
        record_daemon_metrics();
        self.recorder = Some(recorder);
        self
    }

    /// Start the pipeline and scrape endpoint, then wait for a shutdown signal.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
            signal_token.cancel();
        });

        self.run_until(shutdown).await
    }

    /// Like [`Orchestrator::run`] but stops when `shutdown` is cancelled.
    pub async fn run_until(&mut self, shutdown: CancellationToken) -> Result<()> {
        self.pipeline
            .write()
            .await
            .start()
            .await
            .context("failed to start log pipeline")?;

        let server_cancel = CancellationToken::new();
        let server = if self.config.metrics.enabled {
            match self.spawn_server(server_cancel.clone()).await {
                Ok(task) => Some(task),
                Err(e) => {
                    // Rollback: the pipeline was already started
                    if let Err(stop_err) = self.pipeline.write().await.stop().await {
                        tracing::error!(error = %stop_err, "rollback of log pipeline failed");
                    }
                    return Err(e);
                }
            }
        } else {
            tracing::info!("scrape endpoint disabled");
            None
        };

        tracing::info!("tailmetrics running");
        shutdown.cancelled().await;

        server_cancel.cancel();
        if let Some(task) = server {
            match task.await {
                Ok(Err(e)) => tracing::error!(error = %e, "scrape endpoint failed"),
                Err(e) => tracing::error!(error = %e, "scrape endpoint task panicked"),
                Ok(Ok(())) => {}
            }
        }

        self.shutdown().await
    }

    async fn spawn_server(
        &self,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let listener = metrics_server::bind(&self.config.metrics).await?;
        let router = metrics_server::router(self.app_state())?;
        Ok(tokio::spawn(metrics_server::serve(listener, router, cancel)))
    }

    /// Perform graceful shutdown of the pipeline.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping log pipeline");
        self.pipeline
            .write()
            .await
            .stop()
            .await
            .context("failed to stop log pipeline")
    }

    /// State for the HTTP handlers.
    pub fn app_state(&self) -> AppState {
        AppState {
            pipeline: Arc::clone(&self.pipeline),
            store: Arc::clone(&self.store),
            recorder: self.recorder.clone(),
            endpoint: self.config.metrics.endpoint.clone(),
            start_time: self.start_time,
        }
    }

    /// Current health report.
    pub async fn health(&self) -> DaemonHealth {
        let pipeline = self.pipeline.read().await;
        DaemonHealth::collect(&pipeline, self.start_time).await
    }

    /// Current pipeline status only.
    pub async fn status(&self) -> HealthStatus {
        self.pipeline.read().await.health_check().await
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &TailmetricsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }
}

/// Load the rule file named by `engine.rules_file`.
pub async fn load_rules(config: &TailmetricsConfig) -> Result<Vec<MetricRule>> {
    let path = &config.engine.rules_file;
    let rules = RuleLoader::load_file(path)
        .await
        .with_context(|| format!("failed to load rules from {path}"))?;
    tracing::info!(path = %path, rules = rules.len(), "rules loaded");
    Ok(rules)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    Ok("Ctrl+C")
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    use tailmetrics_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}
