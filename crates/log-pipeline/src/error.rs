//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 규칙 로딩, 수집기, 파이프라인 수명주기에서 발생하는
//! 에러를 표현합니다. 라인 단위 추출 실패는 에러가 아니라
//! [`RejectReason`](crate::extract::RejectReason)으로 집계됩니다.
//!
//! `From<LogPipelineError> for TailmetricsError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use tailmetrics_core::error::{ConfigError, PipelineError, TailmetricsError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 유효성 검증 실패
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 메트릭 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 라벨/값 필드 문법 에러
    #[error("unparseable field spec '{spec}': {reason}")]
    FieldSpec {
        /// 원본 필드 문자열
        spec: String,
        /// 실패 사유
        reason: String,
    },

    /// 패턴 컴파일 실패 (플래그 포함)
    #[error("pattern error: {0}")]
    Pattern(String),

    /// 수집기 에러 (파일 I/O, 네트워크 등)
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// 수집 소스 유형 (file, tcp, udp)
        source_type: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LogPipelineError> for TailmetricsError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Config { field, reason } => {
                TailmetricsError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogPipelineError::RuleLoad { .. }
            | LogPipelineError::RuleValidation { .. }
            | LogPipelineError::FieldSpec { .. }
            | LogPipelineError::Pattern(_) => TailmetricsError::Config(ConfigError::ParseFailed {
                reason: err.to_string(),
            }),
            LogPipelineError::Channel(msg) => {
                TailmetricsError::Pipeline(PipelineError::ChannelSend(msg))
            }
            LogPipelineError::Io(e) => TailmetricsError::Io(e),
            LogPipelineError::Collector { .. } => {
                TailmetricsError::Pipeline(PipelineError::InitFailed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation_display_names_rule() {
        let err = LogPipelineError::RuleValidation {
            rule: "app_requests_total".to_owned(),
            reason: "help must not be empty".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("app_requests_total"));
        assert!(msg.contains("help must not be empty"));
    }

    #[test]
    fn rule_load_error_display() {
        let err = LogPipelineError::RuleLoad {
            path: "/etc/tailmetrics/rules.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        };
        assert!(err.to_string().contains("rules.yml"));
    }

    #[test]
    fn rule_errors_become_config_errors() {
        let err = LogPipelineError::FieldSpec {
            spec: "$".to_owned(),
            reason: "empty reference".to_owned(),
        };
        let top: TailmetricsError = err.into();
        assert!(matches!(top, TailmetricsError::Config(_)));
    }

    #[test]
    fn collector_error_becomes_init_failure() {
        let err = LogPipelineError::Collector {
            source_type: "tcp".to_owned(),
            reason: "address in use".to_owned(),
        };
        let top: TailmetricsError = err.into();
        assert!(matches!(
            top,
            TailmetricsError::Pipeline(PipelineError::InitFailed(_))
        ));
        assert!(top.to_string().contains("address in use"));
    }
}
