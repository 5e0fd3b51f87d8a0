use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use tailmetrics_core::config::TailmetricsConfig;
use tailmetrics_daemon::cli::{DEFAULT_CONFIG_PATH, DaemonCli};
use tailmetrics_daemon::orchestrator::{self, Orchestrator};
use tailmetrics_daemon::{logging, metrics_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = load_config(&cli).await?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .context("invalid configuration after command-line overrides")?;

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tailmetrics starting");

    if cli.validate {
        let rules = orchestrator::load_rules(&config).await?;
        println!(
            "configuration OK: {} rule(s) from {}",
            rules.len(),
            config.engine.rules_file
        );
        return Ok(());
    }

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    if orchestrator.config().metrics.enabled {
        let recorder = metrics_server::install_recorder()?;
        orchestrator = orchestrator.with_recorder(recorder);
    }

    orchestrator.run().await?;
    tracing::info!("tailmetrics shut down");
    Ok(())
}

/// Explicit `--config` must exist; the default path is optional.
async fn load_config(cli: &DaemonCli) -> Result<TailmetricsConfig> {
    match &cli.config {
        Some(path) => TailmetricsConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => TailmetricsConfig::load(DEFAULT_CONFIG_PATH)
            .await
            .with_context(|| format!("failed to load config from {DEFAULT_CONFIG_PATH}")),
        None => {
            let mut config = TailmetricsConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }
}
