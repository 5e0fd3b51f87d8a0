#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use tailmetrics_log_pipeline::rule::{Pattern, PatternFlags, RegexPattern};
use tailmetrics_log_pipeline::{RuleLoader, extract};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 임의 정규식
    expr: String,
    /// 매칭 대상 라인
    line: String,
    caseless: bool,
    ungreedy: bool,
}

/// 위치/이름 캡처와 값 연산을 모두 쓰는 고정 규칙
const RULES: &str = r#"
metric_configs:
  - name: fuzz_gauge
    help: fuzz
    type: gauge
    regex: '^(\S*) (?P<amount>\S*)'
    labels:
      - name: first
        value: $1
    value: "+$amount"
"#;

fuzz_target!(|input: FuzzInput| {
    let flags = PatternFlags {
        caseless: input.caseless,
        ungreedy: input.ungreedy,
        ..PatternFlags::default()
    };

    // 임의 정규식은 컴파일 실패해도 크래시는 안 됨
    if let Ok(pattern) = RegexPattern::compile(&input.expr, &flags) {
        if let Some(caps) = pattern.match_line(&input.line) {
            for i in 0..=pattern.group_count() {
                let _ = caps.positional(i);
            }
        }
    }

    let Ok(rules) = RuleLoader::parse_yaml(RULES, "fuzz.yml") else {
        return;
    };
    for rule in &rules {
        if let Some(caps) = rule.pattern().match_line(&input.line) {
            // 거부 사유는 Err로만 보고되어야 함
            let _ = extract(rule, &caps);
        }
    }
});
