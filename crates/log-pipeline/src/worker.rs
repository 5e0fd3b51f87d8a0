//! 규칙 워커 -- 규칙 하나당 하나의 태스크
//!
//! 용량 1의 큐에서 라인을 하나씩 꺼내 매칭, 추출, 저장소 갱신을 순서대로
//! 수행합니다. 큐가 가득 차면 디스패처가 기다리므로 느린 규칙은 전체 수집을
//! 늦춥니다.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::extract::{RejectReason, extract};
use crate::metric::{MetricStore, SeriesDescriptor};
use crate::rule::MetricRule;
use crate::stats::IngestStats;

/// 워커 입력 큐 용량
pub const RULE_QUEUE_CAPACITY: usize = 1;

/// 라인 한 줄의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineOutcome {
    /// 패턴 불일치 (거부가 아님)
    NoMatch,
    /// 갱신 적용, 새 값
    Applied(f64),
    /// 매치했지만 추출 실패
    Rejected(RejectReason),
}

/// 규칙 하나를 담당하는 워커
pub struct RuleWorker {
    rule: Arc<MetricRule>,
    store: Arc<MetricStore>,
    stats: Arc<IngestStats>,
}

impl RuleWorker {
    pub fn new(rule: Arc<MetricRule>, store: Arc<MetricStore>, stats: Arc<IngestStats>) -> Self {
        Self { rule, store, stats }
    }

    pub fn rule(&self) -> &MetricRule {
        &self.rule
    }

    /// 한 줄을 동기적으로 처리합니다.
    pub fn process_line(&self, line: &str) -> LineOutcome {
        let Some(caps) = self.rule.pattern().match_line(line) else {
            return LineOutcome::NoMatch;
        };

        let extraction = match extract(&self.rule, &caps) {
            Ok(extraction) => extraction,
            Err(reason) => {
                tracing::debug!(rule = %self.rule.name(), %reason, "line rejected");
                self.stats.record_rejected(reason);
                return LineOutcome::Rejected(reason);
            }
        };

        let descriptor = SeriesDescriptor {
            name: self.rule.name().to_owned(),
            help: self.rule.help().to_owned(),
            kind: self.rule.kind(),
            labels: extraction.labels,
        };
        let value = self.store.update(
            &descriptor,
            self.rule.timeout(),
            extraction.op,
            extraction.value,
        );
        LineOutcome::Applied(value)
    }

    /// 워커 태스크를 띄우고 입력 큐의 송신측을 반환합니다.
    ///
    /// 모든 송신측이 drop되면 남은 라인을 처리한 뒤 태스크가 끝납니다.
    pub fn spawn(self) -> (mpsc::Sender<Arc<str>>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(RULE_QUEUE_CAPACITY);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    async fn run(self, mut rx: mpsc::Receiver<Arc<str>>) {
        tracing::debug!(rule = %self.rule.name(), "rule worker started");
        let mut processed: u64 = 0;
        while let Some(line) = rx.recv().await {
            self.process_line(&line);
            processed += 1;
        }
        tracing::debug!(rule = %self.rule.name(), processed, "rule worker stopped");
    }
}
