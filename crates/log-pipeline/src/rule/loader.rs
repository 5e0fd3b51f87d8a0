//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 하나라도 잘못되면 전체 로딩이 실패합니다. 잘못된 규칙 집합으로는
//! 서비스를 시작하지 않습니다.

use std::collections::HashMap;
use std::path::Path;

use crate::error::LogPipelineError;
use crate::metric::MetricKind;

use super::MetricRule;
use super::types::RuleFile;

/// 규칙 파일 최대 크기
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// YAML 파일에서 규칙 집합을 로드하고 컴파일합니다.
    ///
    /// # Errors
    /// - 파일을 읽을 수 없거나 크기 제한을 넘는 경우
    /// - YAML 구조가 맞지 않는 경우
    /// - 규칙 하나라도 검증에 실패하는 경우
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Vec<MetricRule>, LogPipelineError> {
        let path = path.as_ref();

        // 파일 크기 검증
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(LogPipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| LogPipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let rules = Self::parse_yaml(&content, &path.display().to_string())?;
        tracing::info!(
            path = %path.display(),
            count = rules.len(),
            "loaded metric rules"
        );
        Ok(rules)
    }

    /// YAML 문자열을 파싱하여 규칙 집합을 생성합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Vec<MetricRule>, LogPipelineError> {
        let file: RuleFile =
            serde_yaml::from_str(yaml_str).map_err(|e| LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if file.metric_configs.len() > MAX_RULES_COUNT {
            return Err(LogPipelineError::RuleLoad {
                path: source.to_owned(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }

        let rules = file
            .metric_configs
            .iter()
            .map(MetricRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Self::check_families(&rules)?;

        if rules.is_empty() {
            tracing::warn!(source, "rule file defines no metric_configs");
        }
        Ok(rules)
    }

    /// 같은 메트릭 이름을 쓰는 규칙들이 종류와 HELP를 공유하는지 확인합니다.
    ///
    /// 한 메트릭 패밀리는 exposition에서 TYPE/HELP를 한 번만 가집니다.
    fn check_families(rules: &[MetricRule]) -> Result<(), LogPipelineError> {
        let mut families: HashMap<&str, (MetricKind, &str)> = HashMap::new();
        for rule in rules {
            match families.get(rule.name()) {
                Some(&(kind, help)) if kind != rule.kind() || help != rule.help() => {
                    return Err(LogPipelineError::RuleValidation {
                        rule: rule.name().to_owned(),
                        reason: "rules sharing a metric name must agree on type and help".to_owned(),
                    });
                }
                Some(_) => {}
                None => {
                    families.insert(rule.name(), (rule.kind(), rule.help()));
                }
            }
        }
        Ok(())
    }
}
