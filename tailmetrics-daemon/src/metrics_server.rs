//! HTTP scrape endpoint.
//!
//! `metrics-exporter-prometheus` is installed as the global recorder
//! without its built-in listener; an axum router serves the metric store
//! and the recorder output together.
//!
//! # Routes
//!
//! * `GET {endpoint}` - store exposition followed by the daemon's own metrics
//! * `GET /health` - JSON [`DaemonHealth`] report, 503 when unhealthy
//! * `GET /` - small landing page linking the endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use tailmetrics_core::config::MetricsConfig;
use tailmetrics_log_pipeline::{LogPipeline, MetricStore, render_text};

use crate::health::DaemonHealth;

/// Content type of the Prometheus text exposition format.
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pipeline, read-locked by `/health` and `/`.
    pub pipeline: Arc<RwLock<LogPipeline>>,
    /// Metric store, read without touching the pipeline lock.
    pub store: Arc<MetricStore>,
    /// Global recorder handle, if one was installed.
    pub recorder: Option<PrometheusHandle>,
    /// Scrape path (e.g. `/metrics`).
    pub endpoint: String,
    /// Daemon start time for uptime reporting.
    pub start_time: Instant,
}

/// Install the global metrics recorder.
///
/// This function should be called once per process. After calling it, all
/// `metrics::counter!()` and `metrics::gauge!()` calls are recorded and can
/// be rendered through the returned handle.
///
/// # Errors
///
/// - Global recorder is already installed
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    tailmetrics_core::metrics::describe_all();
    tracing::debug!("prometheus recorder installed");
    Ok(handle)
}

/// Parse the configured listen address.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", config.listen_addr))?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "scrape endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }
    Ok(addr)
}

/// Bind the HTTP listener. A bind failure is fatal at startup.
pub async fn bind(config: &MetricsConfig) -> Result<TcpListener> {
    let addr = listen_addr(config)?;
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind scrape endpoint on {addr}"))
}

/// Build the router for the scrape endpoint, health report and landing page.
pub fn router(state: AppState) -> Result<Router> {
    if state.endpoint == "/" || state.endpoint == "/health" {
        bail!(
            "metrics endpoint '{}' collides with a built-in route",
            state.endpoint
        );
    }

    let endpoint = state.endpoint.clone();
    Ok(Router::new()
        .route(&endpoint, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .with_state(state))
}

/// Serve until `cancel` fires.
pub async fn serve(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(listen_addr = %addr, "scrape endpoint active");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("scrape endpoint shutting down");
        })
        .await
        .context("scrape endpoint server error")
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut body = render_text(&state.store.snapshot());
    if let Some(recorder) = &state.recorder {
        body.push_str(&recorder.render());
    }
    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let pipeline = state.pipeline.read().await;
    let report = DaemonHealth::collect(&pipeline, state.start_time).await;
    let code = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report)).into_response()
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let sources = state.pipeline.read().await.collector_statuses();

    let mut items = String::new();
    for (name, _) in &sources {
        items.push_str("<li>");
        push_escaped(name, &mut items);
        items.push_str("</li>");
    }
    if items.is_empty() {
        items.push_str("<li>none</li>");
    }

    Html(format!(
        "<html>\
         <head><title>tailmetrics</title></head>\
         <body>\
         <h1>tailmetrics</h1>\
         <p><a href=\"{endpoint}\">Metrics</a> &middot; <a href=\"/health\">Health</a></p>\
         <h2>Line sources</h2><ul>{items}</ul>\
         </body>\
         </html>",
        endpoint = state.endpoint,
    ))
}

fn push_escaped(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
