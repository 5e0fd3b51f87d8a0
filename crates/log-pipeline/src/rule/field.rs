//! 라벨/값 필드 문법
//!
//! ```text
//! field  := literal | '$' <int> | '$' <ident>
//! value  := ('+' | '-' | '=') (float | '$' <int> | '$' <ident>)
//!         | "increment" | "decrement"
//! ```
//!
//! 위치 참조는 1부터 시작합니다 (`$0`은 허용하지 않음).

use std::fmt;

use crate::error::LogPipelineError;
use crate::metric::UpdateOp;

/// 캡처 그룹 참조
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaptureRef {
    /// 1부터 시작하는 위치 그룹
    Positional(usize),
    /// 이름 있는 그룹
    Named(String),
}

impl fmt::Display for CaptureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional(i) => write!(f, "${i}"),
            Self::Named(n) => write!(f, "${n}"),
        }
    }
}

/// 라벨 이름/값 필드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    Literal(String),
    Capture(CaptureRef),
}

impl FieldSpec {
    /// 필드 문자열을 해석합니다. `$`로 시작하지 않으면 리터럴입니다.
    pub fn parse(spec: &str) -> Result<Self, LogPipelineError> {
        match spec.strip_prefix('$') {
            Some(reference) => parse_capture_ref(spec, reference).map(Self::Capture),
            None => Ok(Self::Literal(spec.to_owned())),
        }
    }

    pub fn capture(&self) -> Option<&CaptureRef> {
        match self {
            Self::Literal(_) => None,
            Self::Capture(r) => Some(r),
        }
    }
}

/// 값의 출처
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Literal(f64),
    Capture(CaptureRef),
}

/// 값 필드: 연산과 출처
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    pub op: UpdateOp,
    pub source: ValueSource,
}

impl ValueSpec {
    /// 값 문자열을 해석합니다.
    pub fn parse(spec: &str) -> Result<Self, LogPipelineError> {
        let trimmed = spec.trim();
        match trimmed {
            "increment" => {
                return Ok(Self {
                    op: UpdateOp::Add,
                    source: ValueSource::Literal(1.0),
                });
            }
            "decrement" => {
                return Ok(Self {
                    op: UpdateOp::Subtract,
                    source: ValueSource::Literal(1.0),
                });
            }
            _ => {}
        }

        let mut chars = trimmed.chars();
        let op = match chars.next() {
            Some('+') => UpdateOp::Add,
            Some('-') => UpdateOp::Subtract,
            Some('=') => UpdateOp::Set,
            _ => {
                return Err(field_error(
                    spec,
                    "missing operation prefix (expected '+', '-' or '=')",
                ));
            }
        };
        let operand = chars.as_str().trim_start();

        let source = if let Some(reference) = operand.strip_prefix('$') {
            ValueSource::Capture(parse_capture_ref(spec, reference)?)
        } else {
            let literal: f64 = operand
                .parse()
                .map_err(|_| field_error(spec, "unparseable literal"))?;
            if !literal.is_finite() {
                return Err(field_error(spec, "literal must be finite"));
            }
            ValueSource::Literal(literal)
        };

        Ok(Self { op, source })
    }
}

fn parse_capture_ref(spec: &str, reference: &str) -> Result<CaptureRef, LogPipelineError> {
    if reference.is_empty() {
        return Err(field_error(spec, "empty capture reference"));
    }
    if reference.bytes().all(|b| b.is_ascii_digit()) {
        let index: usize = reference
            .parse()
            .map_err(|_| field_error(spec, "capture index out of range"))?;
        if index == 0 {
            return Err(field_error(spec, "capture groups are numbered from 1"));
        }
        return Ok(CaptureRef::Positional(index));
    }
    if is_identifier(reference) {
        Ok(CaptureRef::Named(reference.to_owned()))
    } else {
        Err(field_error(spec, "invalid capture group name"))
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn field_error(spec: &str, reason: &str) -> LogPipelineError {
    LogPipelineError::FieldSpec {
        spec: spec.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_literal_and_refs() {
        assert_eq!(
            FieldSpec::parse("static").unwrap(),
            FieldSpec::Literal("static".into())
        );
        assert_eq!(
            FieldSpec::parse("$2").unwrap(),
            FieldSpec::Capture(CaptureRef::Positional(2))
        );
        assert_eq!(
            FieldSpec::parse("$code").unwrap(),
            FieldSpec::Capture(CaptureRef::Named("code".into()))
        );
    }

    #[test]
    fn field_rejects_bad_refs() {
        for bad in ["$", "$0", "$1x", "$-a", "$a-b"] {
            assert!(FieldSpec::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn value_literal_ops() {
        assert_eq!(
            ValueSpec::parse("+1").unwrap(),
            ValueSpec {
                op: UpdateOp::Add,
                source: ValueSource::Literal(1.0)
            }
        );
        assert_eq!(
            ValueSpec::parse("-1").unwrap(),
            ValueSpec {
                op: UpdateOp::Subtract,
                source: ValueSource::Literal(1.0)
            }
        );
        assert_eq!(
            ValueSpec::parse("=2.5e3").unwrap(),
            ValueSpec {
                op: UpdateOp::Set,
                source: ValueSource::Literal(2500.0)
            }
        );
    }

    #[test]
    fn value_capture_refs() {
        assert_eq!(
            ValueSpec::parse("+$amount").unwrap().source,
            ValueSource::Capture(CaptureRef::Named("amount".into()))
        );
        assert_eq!(
            ValueSpec::parse("=$3").unwrap().source,
            ValueSource::Capture(CaptureRef::Positional(3))
        );
    }

    #[test]
    fn value_keyword_aliases() {
        assert_eq!(
            ValueSpec::parse("increment").unwrap(),
            ValueSpec::parse("+1").unwrap()
        );
        assert_eq!(
            ValueSpec::parse("decrement").unwrap(),
            ValueSpec::parse("-1").unwrap()
        );
    }

    #[test]
    fn value_requires_prefix() {
        let err = ValueSpec::parse("1").unwrap_err();
        assert!(err.to_string().contains("missing operation prefix"));
        assert!(ValueSpec::parse("$1").is_err());
        assert!(ValueSpec::parse("").is_err());
    }

    #[test]
    fn value_rejects_unparseable_literal() {
        let err = ValueSpec::parse("+abc").unwrap_err();
        assert!(err.to_string().contains("unparseable literal"));
        assert!(ValueSpec::parse("+").is_err());
        assert!(ValueSpec::parse("=inf").is_err());
        assert!(ValueSpec::parse("+$").is_err());
    }
}
