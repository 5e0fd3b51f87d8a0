//! 추출 엔진 -- 매치 결과를 라벨 집합과 값 연산으로 바꿉니다.
//!
//! 상태를 갖지 않는 순수 함수입니다. 실패는 [`RejectReason`]으로 돌려주며
//! 호출자는 해당 규칙에 대해서만 라인을 버립니다.

use std::fmt;

use crate::metric::{LabelSet, UpdateOp};
use crate::rule::{CaptureRef, CaptureSet, FieldSpec, MetricRule, ValueSource, is_label_name};

/// 라인 거부 사유 (rejected_lines_total의 `reason` 라벨)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// 라벨 캡처가 비었고 default가 없음, 또는 캡처로 만든 라벨 이름이 잘못됨
    UnparseableLabel,
    /// 값 캡처를 숫자로 바꿀 수 없음
    UnconvertibleValue,
    /// 값이 참조하는 캡처가 매치에 참여하지 않음
    MissingCapture,
}

impl RejectReason {
    pub const ALL: [RejectReason; 3] = [
        Self::UnparseableLabel,
        Self::UnconvertibleValue,
        Self::MissingCapture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnparseableLabel => "unparseable label",
            Self::UnconvertibleValue => "unconvertible value",
            Self::MissingCapture => "missing capture",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 추출 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub labels: LabelSet,
    pub op: UpdateOp,
    pub value: f64,
}

/// 규칙과 매치 결과로부터 라벨과 값 연산을 만듭니다.
pub fn extract(rule: &MetricRule, caps: &CaptureSet<'_>) -> Result<Extraction, RejectReason> {
    let labels = resolve_labels(rule, caps)?;
    let value = resolve_value(&rule.value().source, caps)?;
    Ok(Extraction {
        labels,
        op: rule.value().op,
        value,
    })
}

fn capture<'a>(caps: &CaptureSet<'a>, r: &CaptureRef) -> Option<&'a str> {
    match r {
        CaptureRef::Positional(i) => caps.positional(*i),
        CaptureRef::Named(n) => caps.named(n),
    }
}

fn resolve_labels(rule: &MetricRule, caps: &CaptureSet<'_>) -> Result<LabelSet, RejectReason> {
    let mut labels = LabelSet::new();
    for label in rule.labels() {
        let name = match &label.name {
            FieldSpec::Literal(n) => n.clone(),
            FieldSpec::Capture(r) => {
                let n = capture(caps, r).ok_or(RejectReason::UnparseableLabel)?;
                if !is_label_name(n) {
                    return Err(RejectReason::UnparseableLabel);
                }
                n.to_owned()
            }
        };

        let value = match &label.value {
            FieldSpec::Literal(v) => v.clone(),
            FieldSpec::Capture(r) => match (capture(caps, r), &label.default) {
                (Some(v), _) => v.to_owned(),
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(RejectReason::UnparseableLabel),
            },
        };

        if !labels.insert(name, value) {
            // 캡처로 만든 이름이 다른 라벨과 겹침
            return Err(RejectReason::UnparseableLabel);
        }
    }
    Ok(labels)
}

fn resolve_value(source: &ValueSource, caps: &CaptureSet<'_>) -> Result<f64, RejectReason> {
    match source {
        ValueSource::Literal(v) => Ok(*v),
        ValueSource::Capture(r) => {
            let text = capture(caps, r).ok_or(RejectReason::MissingCapture)?;
            let v: f64 = text.parse().map_err(|_| RejectReason::UnconvertibleValue)?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(RejectReason::UnconvertibleValue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDef;

    fn rule(yaml: &str) -> MetricRule {
        let def: RuleDef = serde_yaml::from_str(yaml).unwrap();
        MetricRule::compile(&def).unwrap()
    }

    fn run(rule: &MetricRule, line: &str) -> Option<Result<Extraction, RejectReason>> {
        rule.pattern().match_line(line).map(|caps| extract(rule, &caps))
    }

    #[test]
    fn positional_labels_and_literal_value() {
        let r = rule(
            r#"
name: m
help: h
type: counter
regex: '^METRICS: uuid=(\S+) result=(\S+)'
labels: [{ name: uuid, value: $1 }, { name: result, value: $2 }]
value: "+1"
"#,
        );
        let ex = run(&r, "METRICS: uuid=abc result=ok").unwrap().unwrap();
        assert_eq!(ex.labels.get("uuid"), Some("abc"));
        assert_eq!(ex.labels.get("result"), Some("ok"));
        assert_eq!(ex.op, UpdateOp::Add);
        assert_eq!(ex.value, 1.0);
    }

    #[test]
    fn absent_label_capture_without_default_rejects() {
        let r = rule(
            r#"
name: m
help: h
regex: 'status (?:(ok)|code=(\d+)|unknown)'
labels: [{ name: code, value: $2 }]
value: "+1"
"#,
        );
        assert_eq!(
            run(&r, "status ok").unwrap(),
            Err(RejectReason::UnparseableLabel)
        );
        assert!(run(&r, "status code=500").unwrap().is_ok());
    }

    #[test]
    fn absent_label_capture_uses_default() {
        let r = rule(
            r#"
name: m
help: h
regex: 'status (?:(ok)|code=(\d+))'
labels: [{ name: code, value: $2, default: none }]
value: "+1"
"#,
        );
        let ex = run(&r, "status ok").unwrap().unwrap();
        assert_eq!(ex.labels.get("code"), Some("none"));
    }

    #[test]
    fn named_value_capture() {
        let r = rule(
            r#"
name: m
help: h
type: gauge
regex: 'amount=(?P<amount>\S+)'
value: "+$amount"
"#,
        );
        assert_eq!(run(&r, "amount=12.5").unwrap().unwrap().value, 12.5);
        assert_eq!(
            run(&r, "amount=abc").unwrap(),
            Err(RejectReason::UnconvertibleValue)
        );
        assert_eq!(
            run(&r, "amount=NaN").unwrap(),
            Err(RejectReason::UnconvertibleValue)
        );
    }

    #[test]
    fn value_capture_with_surrounding_whitespace_is_unconvertible() {
        let r = rule(
            r#"
name: m
help: h
type: gauge
regex: 'amount=\[(.*)\]'
value: "=$1"
"#,
        );
        assert_eq!(run(&r, "amount=[12]").unwrap().unwrap().value, 12.0);
        assert_eq!(
            run(&r, "amount=[ 12 ]").unwrap(),
            Err(RejectReason::UnconvertibleValue)
        );
    }

    #[test]
    fn non_participating_value_capture_is_missing() {
        let r = rule(
            r#"
name: m
help: h
regex: 'took(?: (?P<ms>\d+)ms)?'
value: "=$ms"
"#,
        );
        assert_eq!(run(&r, "took").unwrap(), Err(RejectReason::MissingCapture));
        assert_eq!(run(&r, "took 30ms").unwrap().unwrap().value, 30.0);
    }

    #[test]
    fn label_name_from_capture() {
        let r = rule(
            r#"
name: m
help: h
regex: '(\w+)=(\S+)'
labels: [{ name: $1, value: $2 }]
value: "+1"
"#,
        );
        let ex = run(&r, "region=eu").unwrap().unwrap();
        assert_eq!(ex.labels.get("region"), Some("eu"));

        // 캡처된 이름이 예약 접두어
        assert_eq!(
            run(&r, "__name__=x").unwrap(),
            Err(RejectReason::UnparseableLabel)
        );
    }

    #[test]
    fn dynamic_label_name_colliding_with_literal_rejects() {
        let r = rule(
            r#"
name: m
help: h
regex: '(\w+)=(\S+)'
labels: [{ name: env, value: prod }, { name: $1, value: $2 }]
value: "+1"
"#,
        );
        assert_eq!(
            run(&r, "env=dev").unwrap(),
            Err(RejectReason::UnparseableLabel)
        );
    }

    #[test]
    fn no_match_is_not_an_extraction() {
        let r = rule("name: m\nhelp: h\nregex: '^METRICS:'\nvalue: '+1'\n");
        assert!(run(&r, "other line").is_none());
    }

    #[test]
    fn reason_labels_are_stable() {
        let names: Vec<_> = RejectReason::ALL.iter().map(|r| r.as_str()).collect();
        assert_eq!(
            names,
            vec!["unparseable label", "unconvertible value", "missing capture"]
        );
    }
}
