//! 패턴 매칭 capability
//!
//! 추출 엔진은 특정 정규식 엔진에 의존하지 않고 [`Pattern`] trait만 사용합니다.
//! 기본 구현인 [`RegexPattern`]은 `regex` 크레이트 위에서 동작하며
//! 규칙 파일의 PCRE 스타일 플래그 이름을 빌더 옵션으로 옮깁니다.

use std::collections::HashMap;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::LogPipelineError;

/// 컴파일된 패턴
pub trait Pattern: Send + Sync + fmt::Debug {
    /// 원본 표현식
    fn expr(&self) -> &str;

    /// 캡처 그룹 수 (전체 매치인 그룹 0 제외)
    fn group_count(&self) -> usize;

    /// 이름 있는 그룹이 있는지 확인합니다.
    fn has_named_group(&self, name: &str) -> bool;

    /// 한 줄에 대해 매칭하고, 성공하면 캡처 집합을 반환합니다.
    fn match_line<'a>(&'a self, line: &'a str) -> Option<CaptureSet<'a>>;
}

/// 한 번의 매치에서 얻은 캡처
///
/// 매치에 참여하지 않은 그룹은 `None`입니다.
#[derive(Debug, Clone)]
pub struct CaptureSet<'a> {
    groups: Vec<Option<&'a str>>,
    names: &'a HashMap<String, usize>,
}

impl<'a> CaptureSet<'a> {
    /// `groups[0]`은 전체 매치, `names`는 그룹 이름 → 인덱스
    pub fn new(groups: Vec<Option<&'a str>>, names: &'a HashMap<String, usize>) -> Self {
        Self { groups, names }
    }

    /// 위치 그룹 (1부터)
    pub fn positional(&self, index: usize) -> Option<&'a str> {
        self.groups.get(index).copied().flatten()
    }

    /// 이름 있는 그룹
    pub fn named(&self, name: &str) -> Option<&'a str> {
        self.names.get(name).and_then(|&i| self.positional(i))
    }
}

/// 규칙 파일의 플래그 이름
///
/// 매칭 엔진이 지원하지 않는 PCRE 옵션은 컴파일 단계에서 거부됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternFlags {
    pub caseless: bool,
    pub multiline: bool,
    pub dotall: bool,
    pub extended: bool,
    pub ungreedy: bool,
    pub anchored: bool,
    pub crlf: bool,
}

/// PCRE에는 있지만 이 엔진으로 옮길 수 없는 옵션
const UNSUPPORTED_FLAGS: &[&str] = &[
    "bsr-anycrlf",
    "bsr-unicode",
    "newline-is-any",
    "newline-is-anycrlf",
    "newline-is-cr",
    "dupnames",
    "extra",
    "firstline",
    "javascript-compat",
    "no-auto-capture",
];

impl PatternFlags {
    /// 플래그 이름 목록을 해석합니다. 빈 항목은 무시합니다.
    pub fn parse<'s>(names: impl IntoIterator<Item = &'s str>) -> Result<Self, LogPipelineError> {
        let mut flags = Self::default();
        for raw in names {
            let name = raw.trim();
            match name {
                "" => {}
                "caseless" => flags.caseless = true,
                "multiline" => flags.multiline = true,
                "dotall" => flags.dotall = true,
                "extended" => flags.extended = true,
                "ungreedy" => flags.ungreedy = true,
                "anchored" => flags.anchored = true,
                "newline-crlf" => flags.crlf = true,
                // 이 엔진의 기본 동작과 같음 (입력은 항상 UTF-8 `&str`)
                "utf8" | "newline-lf" | "dollar-end-only" | "no-utf8-check" => {}
                other if UNSUPPORTED_FLAGS.contains(&other) => {
                    return Err(LogPipelineError::Pattern(format!(
                        "flag '{other}' is not supported by the pattern engine"
                    )));
                }
                other => {
                    return Err(LogPipelineError::Pattern(format!(
                        "unparseable flags: unknown flag '{other}'"
                    )));
                }
            }
        }
        Ok(flags)
    }
}

/// `regex` 크레이트 기반 패턴
#[derive(Debug)]
pub struct RegexPattern {
    expr: String,
    regex: Regex,
    names: HashMap<String, usize>,
}

impl RegexPattern {
    /// 표현식과 플래그로 패턴을 컴파일합니다.
    pub fn compile(expr: &str, flags: &PatternFlags) -> Result<Self, LogPipelineError> {
        let source = if flags.anchored && flags.extended {
            // extended 모드의 끝 주석이 닫는 괄호를 삼키지 않도록 줄을 바꿈
            format!("\\A(?:{expr}\n)")
        } else if flags.anchored {
            format!(r"\A(?:{expr})")
        } else {
            expr.to_owned()
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(flags.caseless)
            .multi_line(flags.multiline)
            .dot_matches_new_line(flags.dotall)
            .ignore_whitespace(flags.extended)
            .swap_greed(flags.ungreedy)
            .crlf(flags.crlf)
            .unicode(true)
            .build()
            .map_err(|e| LogPipelineError::Pattern(format!("unparseable pattern: {e}")))?;

        let names = regex
            .capture_names()
            .enumerate()
            .filter_map(|(i, name)| name.map(|n| (n.to_owned(), i)))
            .collect();

        Ok(Self {
            expr: expr.to_owned(),
            regex,
            names,
        })
    }
}

impl Pattern for RegexPattern {
    fn expr(&self) -> &str {
        &self.expr
    }

    fn group_count(&self) -> usize {
        self.regex.captures_len().saturating_sub(1)
    }

    fn has_named_group(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    fn match_line<'a>(&'a self, line: &'a str) -> Option<CaptureSet<'a>> {
        let caps = self.regex.captures(line)?;
        let groups = caps
            .iter()
            .map(|m| m.map(|m| m.as_str()))
            .collect();
        Some(CaptureSet::new(groups, &self.names))
    }
}
