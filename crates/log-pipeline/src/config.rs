//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`CollectorConfig`]와 [`EngineConfig`]를 합쳐
//! 파이프라인이 실제로 쓰는 값만 담습니다.
//!
//! # 사용 예시
//! ```ignore
//! use tailmetrics_core::config::TailmetricsConfig;
//! use tailmetrics_log_pipeline::config::PipelineConfig;
//!
//! let core_config = TailmetricsConfig::default();
//! let config = PipelineConfig::from_core(&core_config.collector, &core_config.engine);
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tailmetrics_core::config::{CollectorConfig, EngineConfig};

use crate::error::LogPipelineError;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// TCP/UDP 공용 바인드 주소 (빈 문자열이면 둘 다 비활성)
    pub listen_addr: String,
    /// TCP 수집기 활성화
    pub tcp_enabled: bool,
    /// UDP 수집기 활성화
    pub udp_enabled: bool,
    /// tail할 파일/named pipe 경로
    pub watch_paths: Vec<PathBuf>,
    /// 파일 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// TCP 최대 동시 연결 수
    pub max_connections: usize,
    /// TCP 유휴 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
    /// 만료 시계열 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// 종료 시 워커 드레인 대기 시간 (초)
    pub shutdown_drain_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&CollectorConfig::default(), &EngineConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(collector: &CollectorConfig, engine: &EngineConfig) -> Self {
        Self {
            listen_addr: collector.listen_addr.clone(),
            tcp_enabled: collector.tcp_enabled,
            udp_enabled: collector.udp_enabled,
            watch_paths: collector.watch_paths.iter().map(PathBuf::from).collect(),
            poll_interval_ms: collector.poll_interval_ms,
            max_connections: collector.max_connections,
            connection_timeout_secs: collector.connection_timeout_secs,
            max_line_length: collector.max_line_length,
            sweep_interval_secs: engine.sweep_interval_secs,
            shutdown_drain_secs: engine.shutdown_drain_secs,
        }
    }

    /// TCP 수집기를 띄울 주소
    pub fn tcp_bind(&self) -> Option<&str> {
        (self.tcp_enabled && !self.listen_addr.is_empty()).then_some(self.listen_addr.as_str())
    }

    /// UDP 수집기를 띄울 주소
    pub fn udp_bind(&self) -> Option<&str> {
        (self.udp_enabled && !self.listen_addr.is_empty()).then_some(self.listen_addr.as_str())
    }

    /// 감시 경로 검증: 비어 있지 않고 `..` 컴포넌트가 없어야 합니다.
    fn validate_watch_path(path: &Path) -> Result<(), LogPipelineError> {
        if path.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "watch_paths".to_owned(),
                reason: "watch path must not be empty".to_owned(),
            });
        }

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(LogPipelineError::Config {
                field: "watch_paths".to_owned(),
                reason: format!(
                    "watch path '{}' contains path traversal pattern '..'",
                    path.display()
                ),
            });
        }

        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

        if self.poll_interval_ms == 0 {
            return Err(LogPipelineError::Config {
                field: "poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_connections == 0 {
            return Err(LogPipelineError::Config {
                field: "max_connections".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_line_length == 0 || self.max_line_length > MAX_LINE_LENGTH {
            return Err(LogPipelineError::Config {
                field: "max_line_length".to_owned(),
                reason: format!("must be 1-{}", MAX_LINE_LENGTH),
            });
        }

        if self.sweep_interval_secs == 0 {
            return Err(LogPipelineError::Config {
                field: "sweep_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        for path in &self.watch_paths {
            Self::validate_watch_path(path)?;
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// TCP/UDP 바인드 주소를 설정합니다.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn tcp_enabled(mut self, enabled: bool) -> Self {
        self.config.tcp_enabled = enabled;
        self
    }

    pub fn udp_enabled(mut self, enabled: bool) -> Self {
        self.config.udp_enabled = enabled;
        self
    }

    /// 감시 경로를 추가합니다.
    pub fn watch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.watch_paths.push(path.into());
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    pub fn shutdown_drain_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_drain_secs = secs;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
