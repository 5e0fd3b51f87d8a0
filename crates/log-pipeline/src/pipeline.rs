//! 파이프라인 오케스트레이션 -- 수집/매칭/저장의 전체 흐름을 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](tailmetrics_core::pipeline::Pipeline) trait을 구현하여
//! daemon에서 시작/정지/상태 조회를 같은 방식으로 다룹니다.
//!
//! # 내부 아키텍처
//! ```text
//! Collectors -> Dispatcher -> mpsc(1) x N -> RuleWorker x N -> MetricStore <- Sweeper
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tailmetrics_core::error::{PipelineError, TailmetricsError};
use tailmetrics_core::metrics as m;
use tailmetrics_core::pipeline::{HealthStatus, Pipeline};

use crate::collector::{
    CollectorSet, CollectorStatus, FileCollector, FileCollectorConfig, TcpCollector,
    TcpCollectorConfig, UdpCollector,
};
use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::LogPipelineError;
use crate::export::render_text;
use crate::metric::MetricStore;
use crate::rule::MetricRule;
use crate::stats::IngestStats;
use crate::sweep::spawn_sweeper;
use crate::worker::RuleWorker;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 로그 파이프라인
///
/// 규칙마다 워커 하나를 띄우고, 모든 수집기가 공유하는 [`Dispatcher`]로
/// 라인을 팬아웃합니다. 저장소는 정지 후에도 유지되어 마지막 값을 노출할 수 있습니다.
///
/// # 사용 예시
/// ```ignore
/// use tailmetrics_log_pipeline::{LogPipelineBuilder, RuleLoader};
///
/// let rules = RuleLoader::load_file("rules.yml").await?;
/// let mut pipeline = LogPipelineBuilder::new()
///     .config(config)
///     .rules(rules)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    state: PipelineState,
    rules: Vec<Arc<MetricRule>>,
    store: Arc<MetricStore>,
    stats: Arc<IngestStats>,
    cancel: CancellationToken,
    /// 실행 중에만 존재. drop하면 워커 큐가 닫힘
    dispatcher: Option<Dispatcher>,
    workers: Vec<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
    collectors: CollectorSet,
    tcp_addr: Option<SocketAddr>,
    udp_addr: Option<SocketAddr>,
}

impl LogPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 로드된 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// 실행 중인 디스패처 핸들. 수집기 외부에서 라인을 넣을 때 사용합니다.
    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.dispatcher.clone()
    }

    /// TCP 수집기가 실제로 바인드된 주소
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// UDP 수집기가 실제로 바인드된 주소
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// 수집기별 상태
    pub fn collector_statuses(&self) -> Vec<(String, CollectorStatus)> {
        self.collectors.statuses()
    }

    /// 저장소 전체를 text exposition 형식으로 렌더링합니다.
    pub fn render_exposition(&self) -> String {
        render_text(&self.store.snapshot())
    }

    /// 규칙마다 워커를 띄우고 디스패처를 구성합니다.
    fn spawn_workers(&mut self) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(Arc::clone(&self.stats));
        for rule in &self.rules {
            let worker = RuleWorker::new(
                Arc::clone(rule),
                Arc::clone(&self.store),
                Arc::clone(&self.stats),
            );
            let (tx, handle) = worker.spawn();
            dispatcher = dispatcher.with_queue(rule.name(), tx);
            self.workers.push(handle);
        }
        dispatcher
    }

    /// 네트워크 수집기를 바인드합니다. 하나라도 실패하면 에러.
    async fn bind_network_sources(
        &self,
        dispatcher: &Dispatcher,
    ) -> Result<(Option<TcpCollector>, Option<UdpCollector>), LogPipelineError> {
        let tcp = match self.config.tcp_bind() {
            Some(addr) => {
                let config = TcpCollectorConfig {
                    bind_addr: addr.to_owned(),
                    max_connections: self.config.max_connections,
                    max_line_length: self.config.max_line_length,
                    connection_timeout_secs: self.config.connection_timeout_secs,
                };
                Some(TcpCollector::bind(config, dispatcher.clone(), self.cancel.clone()).await?)
            }
            None => None,
        };

        let udp = match self.config.udp_bind() {
            Some(addr) => {
                Some(UdpCollector::bind(addr, dispatcher.clone(), self.cancel.clone()).await?)
            }
            None => None,
        };

        Ok((tcp, udp))
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), TailmetricsError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!(rules = self.rules.len(), "starting log pipeline");
        self.cancel = CancellationToken::new();

        // 1. 규칙 워커 + 디스패처
        let dispatcher = self.spawn_workers();
        metrics::gauge!(m::RULES_CONFIGURED).set(self.rules.len() as f64);

        // 2. 네트워크 수집기 바인드 (실패 시 워커 정리 후 중단)
        let (tcp, udp) = match self.bind_network_sources(&dispatcher).await {
            Ok(bound) => bound,
            Err(e) => {
                tracing::error!(error = %e, "failed to bind line sources");
                self.cancel.cancel();
                drop(dispatcher);
                self.workers.clear();
                return Err(e.into());
            }
        };

        // 3. 수집기 태스크 스폰
        if let Some(tcp) = tcp {
            self.tcp_addr = tcp.local_addr().ok();
            self.collectors.spawn("tcp", tcp.run());
        }
        if let Some(udp) = udp {
            self.udp_addr = udp.local_addr().ok();
            self.collectors.spawn("udp", udp.run());
        }
        for path in &self.config.watch_paths {
            let config = FileCollectorConfig {
                path: path.clone(),
                poll_interval_ms: self.config.poll_interval_ms,
                max_line_length: self.config.max_line_length,
            };
            let collector = FileCollector::new(config, dispatcher.clone(), self.cancel.clone());
            self.collectors
                .spawn(format!("file:{}", path.display()), collector.run());
        }

        // 4. 만료 시계열 정리
        self.sweeper = Some(spawn_sweeper(
            Arc::clone(&self.store),
            Duration::from_secs(self.config.sweep_interval_secs),
            self.cancel.clone(),
        ));

        self.dispatcher = Some(dispatcher);
        self.state = PipelineState::Running;
        tracing::info!(
            sources = self.collectors.len(),
            tcp = ?self.tcp_addr,
            udp = ?self.udp_addr,
            "log pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TailmetricsError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping log pipeline");
        let grace = Duration::from_secs(self.config.shutdown_drain_secs);

        // 1. 수집기와 sweeper 중단
        self.cancel.cancel();
        self.collectors.join_all(grace).await;
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.await;
        }

        // 2. 디스패처를 놓아 워커 큐를 닫고, 큐에 남은 라인 처리를 기다림
        self.dispatcher = None;
        let deadline = tokio::time::Instant::now() + grace;
        for mut worker in self.workers.drain(..) {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                tracing::warn!("rule worker did not drain in time, aborting");
                worker.abort();
            }
        }

        self.tcp_addr = None;
        self.udp_addr = None;
        self.state = PipelineState::Stopped;
        tracing::info!(
            ingested = self.stats.ingested(),
            rejected = self.stats.snapshot().rejected_total(),
            series = self.store.len(),
            "log pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let exited = self.collectors.finished();
                if !exited.is_empty() {
                    return HealthStatus::Degraded(format!(
                        "line source exited: {}",
                        exited.join(", ")
                    ));
                }
                let dead_workers = self.workers.iter().filter(|w| w.is_finished()).count();
                if dead_workers > 0 {
                    return HealthStatus::Degraded(format!("{dead_workers} rule worker(s) exited"));
                }
                HealthStatus::Healthy
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 로그 파이프라인 빌더
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    rules: Vec<MetricRule>,
    store: Option<Arc<MetricStore>>,
}

impl LogPipelineBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            rules: Vec::new(),
            store: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 규칙 목록을 지정합니다. 선언 순서가 곧 팬아웃 순서입니다.
    pub fn rules(mut self, rules: Vec<MetricRule>) -> Self {
        self.rules = rules;
        self
    }

    /// 외부에서 만든 저장소를 공유합니다.
    pub fn store(mut self, store: Arc<MetricStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 설정을 검증하고 파이프라인을 생성합니다.
    pub fn build(self) -> Result<LogPipeline, LogPipelineError> {
        self.config.validate()?;

        if self.rules.is_empty() {
            tracing::warn!("no metric rules configured, lines will only be counted");
        }

        Ok(LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            rules: self.rules.into_iter().map(Arc::new).collect(),
            store: self.store.unwrap_or_default(),
            stats: Arc::new(IngestStats::new()),
            cancel: CancellationToken::new(),
            dispatcher: None,
            workers: Vec::new(),
            sweeper: None,
            collectors: CollectorSet::new(),
            tcp_addr: None,
            udp_addr: None,
        })
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
