//! 메트릭 추출 규칙
//!
//! YAML로 선언된 [`RuleDef`]를 검증하고 패턴을 컴파일하여 실행 가능한
//! [`MetricRule`]로 만듭니다. 규칙은 생성 후 변경되지 않으며 여러 워커가
//! `Arc`로 공유합니다.
//!
//! # 아키텍처
//! - [`types`]: 규칙 파일 데이터 구조
//! - [`field`]: 라벨/값 필드 문법
//! - [`pattern`]: 매칭 엔진 capability와 `regex` 기반 구현
//! - [`loader`]: 파일 로딩과 규칙 집합 검증

pub mod field;
pub mod loader;
pub mod pattern;
pub mod types;

pub use field::{CaptureRef, FieldSpec, ValueSource, ValueSpec};
pub use loader::RuleLoader;
pub use pattern::{CaptureSet, Pattern, PatternFlags, RegexPattern};
pub use types::{FlagList, LabelDef, PatternDef, RuleDef, RuleFile};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LogPipelineError;
use crate::metric::MetricKind;

use field::is_identifier;

/// 컴파일된 라벨 규칙
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRule {
    pub name: FieldSpec,
    pub value: FieldSpec,
    /// 값 캡처가 매치에 참여하지 않았을 때의 대체 값
    pub default: Option<String>,
}

/// 실행 가능한 메트릭 추출 규칙
pub struct MetricRule {
    name: String,
    help: String,
    kind: MetricKind,
    pattern: Arc<dyn Pattern>,
    labels: Vec<LabelRule>,
    value: ValueSpec,
    timeout: Duration,
}

impl MetricRule {
    /// 기본 매칭 엔진([`RegexPattern`])으로 규칙을 컴파일합니다.
    pub fn compile(def: &RuleDef) -> Result<Self, LogPipelineError> {
        let flags = PatternFlags::parse(def.regex.flag_names())
            .map_err(|e| validation(&def.name, e.to_string()))?;
        let pattern = RegexPattern::compile(def.regex.expr(), &flags)
            .map_err(|e| validation(&def.name, e.to_string()))?;
        Self::with_pattern(def, Arc::new(pattern))
    }

    /// 이미 컴파일된 패턴으로 규칙을 만듭니다.
    ///
    /// 필드가 참조하는 캡처 그룹이 패턴에 존재하는지 여기서 확인합니다.
    pub fn with_pattern(def: &RuleDef, pattern: Arc<dyn Pattern>) -> Result<Self, LogPipelineError> {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(validation("(empty)", "metric name must not be empty"));
        }
        if !is_metric_name(name) {
            return Err(validation(
                name,
                "metric name must match [a-zA-Z_:][a-zA-Z0-9_:]*",
            ));
        }
        if def.help.trim().is_empty() {
            return Err(validation(name, "help must not be empty"));
        }

        let check_ref = |r: &CaptureRef| -> Result<(), LogPipelineError> {
            match r {
                CaptureRef::Positional(i) if *i > pattern.group_count() => Err(validation(
                    name,
                    format!(
                        "{r} refers past the pattern's {} capture group(s)",
                        pattern.group_count()
                    ),
                )),
                CaptureRef::Named(n) if !pattern.has_named_group(n) => Err(validation(
                    name,
                    format!("{r} refers to a group the pattern does not define"),
                )),
                _ => Ok(()),
            }
        };

        let mut labels = Vec::with_capacity(def.labels.len());
        let mut literal_names = HashSet::new();
        for label in &def.labels {
            let label_name = FieldSpec::parse(&label.name).map_err(|e| validation(name, e.to_string()))?;
            let label_value = FieldSpec::parse(&label.value).map_err(|e| validation(name, e.to_string()))?;

            match &label_name {
                FieldSpec::Literal(n) => {
                    if !is_label_name(n) {
                        return Err(validation(name, format!("invalid label name '{n}'")));
                    }
                    if !literal_names.insert(n.clone()) {
                        return Err(validation(name, format!("duplicate label name '{n}'")));
                    }
                }
                FieldSpec::Capture(r) => check_ref(r)?,
            }
            if let Some(r) = label_value.capture() {
                check_ref(r)?;
            }

            labels.push(LabelRule {
                name: label_name,
                value: label_value,
                default: label.default.clone(),
            });
        }

        let value = ValueSpec::parse(&def.value).map_err(|e| validation(name, e.to_string()))?;
        if let ValueSource::Capture(r) = &value.source {
            check_ref(r)?;
        }

        let timeout = match def.timeout.as_deref().map(str::trim) {
            None | Some("") | Some("0") => Duration::ZERO,
            Some(raw) => humantime::parse_duration(raw)
                .map_err(|e| validation(name, format!("unparseable timeout '{raw}': {e}")))?,
        };

        Ok(Self {
            name: name.to_owned(),
            help: def.help.clone(),
            kind: def.kind,
            pattern,
            labels,
            value,
            timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn pattern(&self) -> &dyn Pattern {
        self.pattern.as_ref()
    }

    pub fn labels(&self) -> &[LabelRule] {
        &self.labels
    }

    pub fn value(&self) -> &ValueSpec {
        &self.value
    }

    /// 0이면 만료 없음
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for MetricRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pattern", &self.pattern.expr())
            .field("labels", &self.labels.len())
            .field("value", &self.value)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_metric_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' || b == b':' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, `__` 접두어는 예약
pub fn is_label_name(s: &str) -> bool {
    is_identifier(s) && !s.starts_with("__")
}

fn validation(rule: &str, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::RuleValidation {
        rule: rule.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::UpdateOp;

    fn def(yaml: &str) -> RuleDef {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn compile_err(yaml: &str) -> String {
        MetricRule::compile(&def(yaml)).unwrap_err().to_string()
    }

    #[test]
    fn compiles_full_rule() {
        let rule = MetricRule::compile(&def(
            r#"
name: app_requests_total
help: requests
type: counter
regex: '^METRICS: uuid=(\S+) result=(\S+)'
labels:
  - { name: uuid, value: $1 }
  - { name: result, value: $2, default: unknown }
value: "+1"
timeout: 15m
"#,
        ))
        .unwrap();
        assert_eq!(rule.name(), "app_requests_total");
        assert_eq!(rule.kind(), MetricKind::Counter);
        assert_eq!(rule.labels().len(), 2);
        assert_eq!(rule.labels()[1].default.as_deref(), Some("unknown"));
        assert_eq!(rule.value().op, UpdateOp::Add);
        assert_eq!(rule.timeout(), Duration::from_secs(900));
    }

    #[test]
    fn zero_or_missing_timeout_means_never() {
        let rule = MetricRule::compile(&def("name: m\nhelp: h\nregex: x\nvalue: '+1'\ntimeout: '0'\n")).unwrap();
        assert!(rule.timeout().is_zero());
        let rule = MetricRule::compile(&def("name: m\nhelp: h\nregex: x\nvalue: '+1'\n")).unwrap();
        assert!(rule.timeout().is_zero());
    }

    #[test]
    fn empty_help_is_fatal() {
        assert!(compile_err("name: m\nhelp: ''\nregex: x\nvalue: '+1'\n").contains("help"));
    }

    #[test]
    fn invalid_metric_name_is_fatal() {
        assert!(compile_err("name: 1bad\nhelp: h\nregex: x\nvalue: '+1'\n").contains("metric name"));
    }

    #[test]
    fn bad_pattern_and_flags_are_fatal() {
        assert!(compile_err("name: m\nhelp: h\nregex: '(x'\nvalue: '+1'\n").contains("unparseable pattern"));
        assert!(
            compile_err("name: m\nhelp: h\nregex: { expr: x, flags: 'fast' }\nvalue: '+1'\n")
                .contains("unparseable flags")
        );
    }

    #[test]
    fn missing_value_prefix_is_fatal() {
        assert!(compile_err("name: m\nhelp: h\nregex: '(\\d+)'\nvalue: '$1'\n").contains("missing operation prefix"));
    }

    #[test]
    fn positional_ref_past_group_count_is_fatal() {
        let err = compile_err("name: m\nhelp: h\nregex: '(a)'\nlabels: [{ name: x, value: $2 }]\nvalue: '+1'\n");
        assert!(err.contains("$2"));
    }

    #[test]
    fn unknown_named_group_is_fatal() {
        let err = compile_err("name: m\nhelp: h\nregex: '(?P<a>x)'\nvalue: '+$b'\n");
        assert!(err.contains("$b"));
    }

    #[test]
    fn duplicate_literal_label_is_fatal() {
        let err = compile_err(
            "name: m\nhelp: h\nregex: x\nlabels: [{ name: a, value: '1' }, { name: a, value: '2' }]\nvalue: '+1'\n",
        );
        assert!(err.contains("duplicate label name"));
    }

    #[test]
    fn reserved_label_name_is_fatal() {
        let err = compile_err("name: m\nhelp: h\nregex: x\nlabels: [{ name: __name__, value: y }]\nvalue: '+1'\n");
        assert!(err.contains("invalid label name"));
    }

    #[test]
    fn unparseable_timeout_is_fatal() {
        let err = compile_err("name: m\nhelp: h\nregex: x\nvalue: '+1'\ntimeout: soon\n");
        assert!(err.contains("timeout"));
    }

    #[test]
    fn metric_and_label_name_rules() {
        assert!(is_metric_name("http:requests_total"));
        assert!(!is_metric_name("http-requests"));
        assert!(!is_metric_name(""));
        assert!(is_label_name("_shard"));
        assert!(!is_label_name("__reserved"));
        assert!(!is_label_name("a:b"));
    }
}
