//! 규칙 파일 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체들을 정의합니다. 여기 있는 값들은
//! 아직 검증/컴파일 전이며, [`MetricRule::compile`](super::MetricRule::compile)이
//! 실행 가능한 규칙으로 바꿉니다.

use serde::{Deserialize, Deserializer, Serialize};

use crate::metric::MetricKind;

/// 규칙 파일 최상위 구조
///
/// # YAML 스키마
/// ```yaml
/// metric_configs:
///   - name: app_requests_total
///     help: requests seen in the app log
///     type: counter
///     regex: '^METRICS: uuid=(\S+) result=(\S+)'
///     labels:
///       - { name: uuid, value: $1 }
///       - { name: result, value: $2, default: unknown }
///     value: "+1"
///     timeout: 15m
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleFile {
    #[serde(default)]
    pub metric_configs: Vec<RuleDef>,
}

/// 규칙 하나의 선언
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    /// 메트릭 이름
    pub name: String,
    /// HELP 텍스트 (비어 있으면 안 됨)
    #[serde(default)]
    pub help: String,
    /// 메트릭 종류 (기본 untyped)
    #[serde(default, rename = "type")]
    pub kind: MetricKind,
    /// 매칭 패턴
    pub regex: PatternDef,
    /// 라벨 선언 (순서 유지)
    #[serde(default)]
    pub labels: Vec<LabelDef>,
    /// 값 문법 문자열 (`+1`, `=$depth`, `increment` ...)
    #[serde(deserialize_with = "value_string")]
    pub value: String,
    /// 만료 시간 (`15m`, `30s`, `0` = 없음)
    #[serde(default)]
    pub timeout: Option<String>,
}

/// 패턴 선언 -- 짧은 형식(문자열) 또는 플래그를 포함한 전체 형식
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternDef {
    Short(String),
    Full {
        expr: String,
        #[serde(default)]
        flags: FlagList,
    },
}

impl PatternDef {
    pub fn expr(&self) -> &str {
        match self {
            Self::Short(expr) | Self::Full { expr, .. } => expr,
        }
    }

    /// 플래그 이름 목록
    pub fn flag_names(&self) -> Vec<&str> {
        match self {
            Self::Short(_) => Vec::new(),
            Self::Full { flags, .. } => flags.names(),
        }
    }
}

/// 플래그 목록 -- 쉼표로 구분된 문자열 또는 YAML 리스트
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagList {
    #[default]
    None,
    Csv(String),
    List(Vec<String>),
}

impl FlagList {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::None => Vec::new(),
            Self::Csv(s) => s.split(',').map(str::trim).filter(|f| !f.is_empty()).collect(),
            Self::List(items) => items.iter().map(|f| f.trim()).collect(),
        }
    }
}

/// 라벨 선언
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelDef {
    /// 라벨 이름 필드 (리터럴 또는 캡처 참조)
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    /// 라벨 값 필드
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    /// 값 캡처가 매치에 참여하지 않았을 때 사용할 값
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub default: Option<String>,
}

/// YAML 스칼라(문자열/숫자/불리언)를 문자열로 받습니다.
///
/// `value: 1` 처럼 따옴표 없이 쓴 리터럴도 허용하기 위함입니다.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar value, found {other:?}"
        ))),
    }
}

/// 값 문법은 문자열만 받습니다.
///
/// YAML은 따옴표 없는 `+1`을 숫자 1로 읽어 연산 접두사가 사라지므로,
/// 숫자는 따옴표를 요구하는 에러로 거부합니다.
fn value_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Err(D::Error::custom(format!(
            "value {n} was read as a number; quote it to keep the operation prefix (e.g. \"+1\")"
        ))),
        other => Err(D::Error::custom(format!(
            "expected a value string such as \"+1\", found {other:?}"
        ))),
    }
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_string(deserializer).map(Some)
}
