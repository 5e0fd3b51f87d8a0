//! 수집/거부 카운터
//!
//! 전역 `metrics` 레코더가 없어도 엔진 상태를 관찰할 수 있도록 자체 원자
//! 카운터를 유지하고, 같은 값을 `metrics` 매크로로도 내보냅니다.

use std::sync::atomic::{AtomicU64, Ordering};

use tailmetrics_core::metrics as m;

use crate::extract::RejectReason;

/// 프로세스 수명 동안의 단조 증가 카운터
#[derive(Debug, Default)]
pub struct IngestStats {
    ingested: AtomicU64,
    unparseable_label: AtomicU64,
    unconvertible_value: AtomicU64,
    missing_capture: AtomicU64,
}

/// 카운터 읽기 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ingested: u64,
    pub unparseable_label: u64,
    pub unconvertible_value: u64,
    pub missing_capture: u64,
}

impl StatsSnapshot {
    pub fn rejected(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::UnparseableLabel => self.unparseable_label,
            RejectReason::UnconvertibleValue => self.unconvertible_value,
            RejectReason::MissingCapture => self.missing_capture,
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.unparseable_label + self.unconvertible_value + self.missing_capture
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::INGESTED_LINES_TOTAL).increment(1);
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        self.slot(reason).fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::REJECTED_LINES_TOTAL, m::LABEL_REASON => reason.as_str()).increment(1);
    }

    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.slot(reason).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ingested: self.ingested(),
            unparseable_label: self.rejected(RejectReason::UnparseableLabel),
            unconvertible_value: self.rejected(RejectReason::UnconvertibleValue),
            missing_capture: self.rejected(RejectReason::MissingCapture),
        }
    }

    fn slot(&self, reason: RejectReason) -> &AtomicU64 {
        match reason {
            RejectReason::UnparseableLabel => &self.unparseable_label,
            RejectReason::UnconvertibleValue => &self.unconvertible_value,
            RejectReason::MissingCapture => &self.missing_capture,
        }
    }
}
