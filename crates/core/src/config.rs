//! 설정 관리 -- tailmetrics.toml 파싱 및 런타임 설정
//!
//! [`TailmetricsConfig`]는 daemon과 파이프라인 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TAILMETRICS_COLLECTOR_LISTEN_ADDR=0.0.0.0:9129` 형식)
//! 3. 설정 파일 (`tailmetrics.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tailmetrics_core::error::TailmetricsError> {
//! use tailmetrics_core::config::TailmetricsConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TailmetricsConfig::load("tailmetrics.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TailmetricsConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TailmetricsError};

/// tailmetrics 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailmetricsConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// scrape 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 라인 수집기 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 추출 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
}

impl TailmetricsConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TailmetricsError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TailmetricsError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TailmetricsError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TailmetricsError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TailmetricsError> {
        toml::from_str(toml_str).map_err(|e| {
            TailmetricsError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TAILMETRICS_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TAILMETRICS_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "TAILMETRICS_GENERAL_LOG_FORMAT",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "TAILMETRICS_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "TAILMETRICS_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "TAILMETRICS_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "TAILMETRICS_METRICS_ENDPOINT");

        // Collector
        override_string(
            &mut self.collector.listen_addr,
            "TAILMETRICS_COLLECTOR_LISTEN_ADDR",
        );
        override_bool(
            &mut self.collector.tcp_enabled,
            "TAILMETRICS_COLLECTOR_TCP_ENABLED",
        );
        override_bool(
            &mut self.collector.udp_enabled,
            "TAILMETRICS_COLLECTOR_UDP_ENABLED",
        );
        override_csv(
            &mut self.collector.watch_paths,
            "TAILMETRICS_COLLECTOR_WATCH_PATHS",
        );
        override_u64(
            &mut self.collector.poll_interval_ms,
            "TAILMETRICS_COLLECTOR_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.collector.max_connections,
            "TAILMETRICS_COLLECTOR_MAX_CONNECTIONS",
        );
        override_u64(
            &mut self.collector.connection_timeout_secs,
            "TAILMETRICS_COLLECTOR_CONNECTION_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.collector.max_line_length,
            "TAILMETRICS_COLLECTOR_MAX_LINE_LENGTH",
        );

        // Engine
        override_string(&mut self.engine.rules_file, "TAILMETRICS_ENGINE_RULES_FILE");
        override_u64(
            &mut self.engine.sweep_interval_secs,
            "TAILMETRICS_ENGINE_SWEEP_INTERVAL_SECS",
        );
        override_u64(
            &mut self.engine.shutdown_drain_secs,
            "TAILMETRICS_ENGINE_SHUTDOWN_DRAIN_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TailmetricsError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.metrics.enabled && !self.metrics.endpoint.starts_with('/') {
            return Err(invalid("metrics.endpoint", "must start with '/'"));
        }

        if self.collector.poll_interval_ms == 0 {
            return Err(invalid("collector.poll_interval_ms", "must be greater than 0"));
        }
        if self.collector.max_connections == 0 {
            return Err(invalid("collector.max_connections", "must be greater than 0"));
        }
        if self.collector.max_line_length == 0 {
            return Err(invalid("collector.max_line_length", "must be greater than 0"));
        }

        if self.engine.rules_file.trim().is_empty() {
            return Err(invalid("engine.rules_file", "must not be empty"));
        }
        if self.engine.sweep_interval_secs == 0 {
            return Err(invalid("engine.sweep_interval_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> TailmetricsError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// scrape 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// HTTP 서버 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 메트릭 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0".to_owned(),
            port: 9130,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 라인 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// TCP/UDP 공용 수신 주소. 빈 문자열이면 네트워크 수집기를 띄우지 않습니다.
    pub listen_addr: String,
    /// TCP 수집기 활성화
    pub tcp_enabled: bool,
    /// UDP 수집기 활성화
    pub udp_enabled: bool,
    /// tail 대상 파일 경로
    pub watch_paths: Vec<String>,
    /// 파일 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 동시 TCP 연결 최대 수
    pub max_connections: usize,
    /// TCP 연결 유휴 타임아웃 (초)
    pub connection_timeout_secs: u64,
    /// 한 줄 최대 길이 (바이트)
    pub max_line_length: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9129".to_owned(),
            tcp_enabled: true,
            udp_enabled: true,
            watch_paths: Vec::new(),
            poll_interval_ms: 250,
            max_connections: 256,
            connection_timeout_secs: 300,
            max_line_length: 64 * 1024,
        }
    }
}

/// 추출 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 규칙 파일 (YAML) 경로
    pub rules_file: String,
    /// 만료 시계열 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// 종료 시 워커 큐 드레인 대기 시간 (초)
    pub shutdown_drain_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_file: "/etc/tailmetrics/rules.yml".to_owned(),
            sweep_interval_secs: 15,
            shutdown_drain_secs: 5,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = TailmetricsConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.metrics.port, 9130);
        assert_eq!(config.metrics.endpoint, "/metrics");
        assert_eq!(config.collector.listen_addr, "0.0.0.0:9129");
        assert!(config.collector.watch_paths.is_empty());
        assert_eq!(config.engine.sweep_interval_secs, 15);
    }

    #[test]
    fn default_config_passes_validation() {
        TailmetricsConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = TailmetricsConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.collector.max_connections, 256);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[collector]
listen_addr = "127.0.0.1:5140"
udp_enabled = false
"#;
        let config = TailmetricsConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.collector.listen_addr, "127.0.0.1:5140");
        assert!(config.collector.tcp_enabled);
        assert!(!config.collector.udp_enabled);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"

[metrics]
enabled = true
listen_addr = "127.0.0.1"
port = 19130
endpoint = "/prom"

[collector]
listen_addr = ""
tcp_enabled = false
udp_enabled = false
watch_paths = ["/var/log/app.log", "/var/log/queue.log"]
poll_interval_ms = 100
max_connections = 8
connection_timeout_secs = 30
max_line_length = 4096

[engine]
rules_file = "/opt/rules.yml"
sweep_interval_secs = 5
shutdown_drain_secs = 1
"#;
        let config = TailmetricsConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.metrics.port, 19130);
        assert_eq!(config.collector.watch_paths.len(), 2);
        assert_eq!(config.collector.max_line_length, 4096);
        assert_eq!(config.engine.rules_file, "/opt/rules.yml");
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = TailmetricsConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            TailmetricsError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = TailmetricsConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = TailmetricsConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_relative_endpoint() {
        let mut config = TailmetricsConfig::default();
        config.metrics.endpoint = "metrics".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.endpoint"));
    }

    #[test]
    fn validate_ignores_endpoint_when_metrics_disabled() {
        let mut config = TailmetricsConfig::default();
        config.metrics.enabled = false;
        config.metrics.endpoint = "metrics".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_sweep_interval() {
        let mut config = TailmetricsConfig::default();
        config.engine.sweep_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = TailmetricsConfig::default();
        config.collector.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = TailmetricsConfig::default();
        config.collector.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = TailmetricsConfig::default();
        config.collector.max_line_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_rules_file() {
        let mut config = TailmetricsConfig::default();
        config.engine.rules_file = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rules_file"));
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TAILMETRICS_STR", "overridden") };
        override_string(&mut val, "TEST_TAILMETRICS_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_TAILMETRICS_STR") };
    }

    #[test]
    fn env_override_u16_valid() {
        let mut val = 9130u16;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TAILMETRICS_PORT", "19000") };
        override_u16(&mut val, "TEST_TAILMETRICS_PORT");
        assert_eq!(val, 19000);
        unsafe { std::env::remove_var("TEST_TAILMETRICS_PORT") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TAILMETRICS_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_TAILMETRICS_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_TAILMETRICS_BOOL_BAD") };
    }

    #[test]
    fn env_override_csv_skips_blank_entries() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_TAILMETRICS_CSV", "x, y,, z") };
        override_csv(&mut val, "TEST_TAILMETRICS_CSV");
        assert_eq!(val, vec!["x", "y", "z"]);
        unsafe { std::env::remove_var("TEST_TAILMETRICS_CSV") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 7u64;
        override_u64(&mut val, "TEST_TAILMETRICS_NONEXISTENT_12345");
        assert_eq!(val, 7);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = TailmetricsConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = TailmetricsConfig::parse(&toml_str).unwrap();
        assert_eq!(config.metrics.port, parsed.metrics.port);
        assert_eq!(config.collector.listen_addr, parsed.collector.listen_addr);
        assert_eq!(config.engine.rules_file, parsed.engine.rules_file);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = TailmetricsConfig::from_file("/nonexistent/path/tailmetrics.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TailmetricsError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
