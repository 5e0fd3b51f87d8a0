//! 디스패처 -- 모든 수집기의 단일 진입점
//!
//! `ingest`는 라인을 세고, 규칙 선언 순서대로 각 워커 큐에 차례로 넣습니다.
//! 큐가 가득 차면 그 자리에서 기다리므로 느린 워커 하나가 디스패처와
//! 이를 호출하는 모든 수집기를 멈춥니다. 메모리 사용량을 제한하기 위한
//! 의도된 backpressure입니다.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::stats::IngestStats;

struct RuleQueue {
    rule: String,
    tx: mpsc::Sender<Arc<str>>,
}

struct Inner {
    queues: Vec<RuleQueue>,
    stats: Arc<IngestStats>,
}

/// 라인 팬아웃 핸들. 복제해서 수집기마다 나눠 줍니다.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(stats: Arc<IngestStats>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Vec::new(),
                stats,
            }),
        }
    }

    /// 규칙 큐를 선언 순서대로 추가합니다. 복제 전에만 호출할 수 있습니다.
    pub fn with_queue(mut self, rule: impl Into<String>, tx: mpsc::Sender<Arc<str>>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.queues.push(RuleQueue {
                rule: rule.into(),
                tx,
            });
        } else {
            tracing::error!("rule queue added to a shared dispatcher, ignoring");
        }
        self
    }

    /// 한 줄을 모든 규칙 워커에 전달합니다.
    ///
    /// 워커 큐가 닫혀 있으면 에러 로그를 남기고 나머지 규칙에는 계속 전달합니다.
    pub async fn ingest(&self, line: &str) {
        self.inner.stats.record_ingested();
        if self.inner.queues.is_empty() {
            return;
        }

        let line: Arc<str> = Arc::from(line);
        for queue in &self.inner.queues {
            if queue.tx.send(Arc::clone(&line)).await.is_err() {
                tracing::error!(rule = %queue.rule, "rule worker is gone, line not delivered");
            }
        }
    }

    pub fn rule_count(&self) -> usize {
        self.inner.queues.len()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.inner.stats
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rules", &self.inner.queues.len())
            .finish()
    }
}
