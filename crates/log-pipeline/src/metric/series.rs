//! 단일 시계열 -- 고정된 descriptor와 잠금으로 보호되는 현재 값

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::identity::{LabelSet, SeriesIdentity};
use super::kind::{MetricKind, UpdateOp};

/// 생성 후 바뀌지 않는 시계열 정보
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesDescriptor {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub labels: LabelSet,
}

#[derive(Debug)]
struct SeriesState {
    value: f64,
    last_updated: Instant,
    /// sweep이 저장소에서 제거했음을 표시
    evicted: bool,
}

/// 저장소가 제거한 핸들에 갱신을 시도함
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted;

/// 저장소 엔트리
#[derive(Debug)]
pub struct MetricSeries {
    identity: SeriesIdentity,
    descriptor: SeriesDescriptor,
    timeout: Duration,
    state: Mutex<SeriesState>,
}

impl MetricSeries {
    /// 값 0, 마지막 갱신 시각 `now`로 새 시계열을 만듭니다.
    pub fn new(
        identity: SeriesIdentity,
        descriptor: SeriesDescriptor,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            identity,
            descriptor,
            timeout,
            state: Mutex::new(SeriesState {
                value: 0.0,
                last_updated: now,
                evicted: false,
            }),
        }
    }

    pub fn identity(&self) -> SeriesIdentity {
        self.identity
    }

    pub fn descriptor(&self) -> &SeriesDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> MetricKind {
        self.descriptor.kind
    }

    /// 0이면 만료되지 않음
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn value(&self) -> f64 {
        self.lock().value
    }

    pub fn last_updated(&self) -> Instant {
        self.lock().last_updated
    }

    /// 연산을 적용하고 갱신 시각을 기록합니다. 새 값을 반환합니다.
    pub fn apply(&self, op: UpdateOp, v: f64, now: Instant) -> Result<f64, Evicted> {
        let mut state = self.lock();
        if state.evicted {
            return Err(Evicted);
        }
        state.value = self.descriptor.kind.apply(state.value, op, v);
        state.last_updated = now;
        Ok(state.value)
    }

    /// `now` 기준으로 만료되었는지 판단합니다.
    pub fn is_stale(&self, now: Instant) -> bool {
        let state = self.lock();
        self.stale_at(&state, now)
    }

    /// 만료되었으면 제거 표시를 하고 `true`를 반환합니다.
    ///
    /// 판단과 표시가 같은 잠금 안에서 일어나므로 동시에 들어온 갱신은
    /// 만료 판단 전에 반영되거나 `Evicted`를 받습니다.
    pub(crate) fn evict_if_stale(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if self.stale_at(&state, now) {
            state.evicted = true;
            true
        } else {
            false
        }
    }

    /// 값과 갱신 시각을 한 번에 읽습니다.
    pub(crate) fn read(&self) -> (f64, Instant) {
        let state = self.lock();
        (state.value, state.last_updated)
    }

    fn stale_at(&self, state: &SeriesState, now: Instant) -> bool {
        !self.timeout.is_zero() && now.saturating_duration_since(state.last_updated) > self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, SeriesState> {
        // 상태는 단순 값이므로 poison 이후에도 그대로 사용
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
