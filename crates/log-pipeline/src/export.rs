//! 저장소 스냅샷을 Prometheus text exposition 형식으로 렌더링합니다.
//!
//! 같은 이름의 시계열은 하나의 family로 묶어 `# HELP`/`# TYPE`을 한 번만 씁니다.
//! 입력은 [`MetricStore::snapshot`](crate::metric::MetricStore::snapshot)처럼
//! 이름순으로 정렬돼 있어야 합니다.

use std::fmt::Write;

use crate::metric::SeriesSnapshot;
use crate::metric::identity::escape_label_value;

/// 스냅샷 목록을 text exposition 형식 문자열로 만듭니다.
pub fn render_text(series: &[SeriesSnapshot]) -> String {
    let mut out = String::with_capacity(series.len() * 64);
    let mut current_family: Option<&str> = None;

    for s in series {
        if current_family != Some(s.name.as_str()) {
            out.push_str("# HELP ");
            out.push_str(&s.name);
            out.push(' ');
            escape_help(&s.help, &mut out);
            out.push('\n');
            // String에 쓰는 write!는 실패하지 않음
            let _ = writeln!(out, "# TYPE {} {}", s.name, s.kind.as_str());
            current_family = Some(s.name.as_str());
        }

        out.push_str(&s.name);
        if !s.labels.is_empty() {
            out.push('{');
            for (i, (k, v)) in s.labels.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push_str("=\"");
                escape_label_value(v, &mut out);
                out.push('"');
            }
            out.push('}');
        }
        out.push(' ');
        out.push_str(&format_value(s.value));
        out.push('\n');
    }

    out
}

/// HELP 텍스트는 `\`와 개행만 이스케이프합니다.
fn escape_help(help: &str, out: &mut String) {
    for c in help.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_owned()
    } else if v == f64::INFINITY {
        "+Inf".to_owned()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_owned()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{LabelSet, MetricKind};

    fn snap(name: &str, kind: MetricKind, labels: &[(&str, &str)], value: f64) -> SeriesSnapshot {
        SeriesSnapshot {
            name: name.to_owned(),
            help: format!("help for {name}"),
            kind,
            labels: labels.iter().copied().collect::<LabelSet>(),
            value,
        }
    }

    #[test]
    fn empty_store_renders_nothing() {
        assert_eq!(render_text(&[]), "");
    }

    #[test]
    fn family_header_written_once() {
        let text = render_text(&[
            snap("hits_total", MetricKind::Counter, &[("code", "200")], 2.0),
            snap("hits_total", MetricKind::Counter, &[("code", "500")], 1.0),
            snap("depth", MetricKind::Gauge, &[], 7.5),
        ]);
        let expected = "\
# HELP hits_total help for hits_total
# TYPE hits_total counter
hits_total{code=\"200\"} 2
hits_total{code=\"500\"} 1
# HELP depth help for depth
# TYPE depth gauge
depth 7.5
";
        assert_eq!(text, expected);
    }

    #[test]
    fn label_values_are_escaped() {
        let text = render_text(&[snap(
            "m",
            MetricKind::Untyped,
            &[("path", "C:\\dir \"x\"\nnext")],
            1.0,
        )]);
        assert!(text.contains(r#"m{path="C:\\dir \"x\"\nnext"} 1"#), "{text}");
        assert!(text.contains("# TYPE m untyped"));
    }

    #[test]
    fn help_is_escaped() {
        let mut s = snap("m", MetricKind::Gauge, &[], 0.0);
        s.help = "line one\nback\\slash".to_owned();
        let text = render_text(&[s]);
        assert!(text.starts_with("# HELP m line one\\nback\\\\slash\n"));
    }

    #[test]
    fn special_floats() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(-0.25), "-0.25");
        assert_eq!(format_value(3.0), "3");
    }
}
