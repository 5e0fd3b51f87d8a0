//! CLI argument definitions for the tailmetrics daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use tailmetrics_core::config::TailmetricsConfig;

/// Default configuration path, used only when it exists.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tailmetrics/tailmetrics.toml";

/// Turns log lines into Prometheus metrics.
///
/// Tails files and named pipes, accepts newline-delimited text over TCP and
/// UDP, matches every line against the configured rules and serves the
/// resulting series on an HTTP scrape endpoint.
#[derive(Parser, Debug)]
#[command(name = "tailmetrics")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to tailmetrics.toml configuration file.
    ///
    /// When omitted, /etc/tailmetrics/tailmetrics.toml is read if present,
    /// otherwise built-in defaults are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the rule file (takes precedence over `engine.rules_file`).
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Load the configuration and rule file, report, and exit without serving.
    #[arg(long)]
    pub validate: bool,

    /// Files or named pipes to tail, in addition to `collector.watch_paths`.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut TailmetricsConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(rules) = &self.rules {
            config.engine.rules_file = rules.display().to_string();
        }
        for file in &self.files {
            let file = file.display().to_string();
            if !config.collector.watch_paths.contains(&file) {
                config.collector.watch_paths.push(file);
            }
        }
    }
}
