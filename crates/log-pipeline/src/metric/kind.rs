//! 메트릭 종류와 값 갱신 규칙

use std::fmt;

use serde::{Deserialize, Serialize};

/// 메트릭 종류
///
/// 규칙 파일의 `type` 필드에 대응합니다. 생략 시 `Untyped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// 종류 없음 (exposition에서 `untyped`)
    #[default]
    Untyped,
    /// 임의로 오르내리는 값
    Gauge,
    /// 음수가 되지 않는 누적 값
    Counter,
}

impl MetricKind {
    /// exposition `# TYPE` 줄에 쓰는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untyped => "untyped",
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }

    /// 현재 값에 연산을 적용한 결과를 돌려줍니다.
    ///
    /// - `Set`: `v`로 대체
    /// - `Add`: 더한 결과
    /// - `Subtract`: counter는 0으로 리셋, 그 외는 뺀 결과
    ///
    /// counter는 어떤 연산 뒤에도 음수가 되지 않습니다 (음수 결과는 0).
    pub fn apply(self, current: f64, op: UpdateOp, v: f64) -> f64 {
        match (op, self) {
            (UpdateOp::Set, Self::Counter) | (UpdateOp::Add, Self::Counter) => {
                let next = if op == UpdateOp::Set { v } else { current + v };
                if next < 0.0 { 0.0 } else { next }
            }
            (UpdateOp::Set, _) => v,
            (UpdateOp::Add, _) => current + v,
            (UpdateOp::Subtract, Self::Counter) => 0.0,
            (UpdateOp::Subtract, _) => current - v,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 값 갱신 연산
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `=`
    Set,
}

impl UpdateOp {
    /// 규칙 문법의 접두 문자
    pub fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Set => '=',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn set_replaces_for_every_kind() {
        for kind in [MetricKind::Untyped, MetricKind::Gauge, MetricKind::Counter] {
            assert_eq!(kind.apply(10.0, UpdateOp::Set, 3.5), 3.5);
        }
        assert_eq!(MetricKind::Gauge.apply(10.0, UpdateOp::Set, -3.5), -3.5);
    }

    #[test]
    fn counter_set_negative_clamps() {
        assert_eq!(MetricKind::Counter.apply(10.0, UpdateOp::Set, -1.0), 0.0);
    }

    #[test]
    fn counter_add_clamps_at_zero() {
        assert_eq!(MetricKind::Counter.apply(3.0, UpdateOp::Add, -5.0), 0.0);
        assert_eq!(MetricKind::Counter.apply(3.0, UpdateOp::Add, 2.0), 5.0);
    }

    #[test]
    fn counter_subtract_resets() {
        assert_eq!(MetricKind::Counter.apply(42.0, UpdateOp::Subtract, 1.0), 0.0);
    }

    #[test]
    fn gauge_add_and_subtract_are_plain_arithmetic() {
        assert_eq!(MetricKind::Gauge.apply(1.0, UpdateOp::Add, -4.0), -3.0);
        assert_eq!(MetricKind::Gauge.apply(1.0, UpdateOp::Subtract, 4.0), -3.0);
        assert_eq!(MetricKind::Untyped.apply(0.0, UpdateOp::Subtract, 2.5), -2.5);
    }

    #[test]
    fn kind_deserializes_lowercase() {
        let kind: MetricKind = serde_yaml::from_str("counter").unwrap();
        assert_eq!(kind, MetricKind::Counter);
        assert!(serde_yaml::from_str::<MetricKind>("histogram").is_err());
    }

    proptest! {
        #[test]
        fn counter_never_goes_negative(
            ops in proptest::collection::vec((0u8..3, -1.0e6f64..1.0e6), 0..64)
        ) {
            let mut value = 0.0;
            for (op, v) in ops {
                let op = match op {
                    0 => UpdateOp::Add,
                    1 => UpdateOp::Subtract,
                    _ => UpdateOp::Set,
                };
                value = MetricKind::Counter.apply(value, op, v);
                prop_assert!(value >= 0.0);
                if op == UpdateOp::Subtract {
                    prop_assert_eq!(value, 0.0);
                }
            }
        }
    }
}
