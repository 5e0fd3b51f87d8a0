//! 메트릭 저장소 -- identity → 시계열의 동시성 맵
//!
//! - 조회는 샤드 읽기 잠금만 잡습니다.
//! - 생성은 entry API(샤드 쓰기 잠금) 안에서 한 번만 일어납니다.
//! - 값 갱신은 시계열 자체의 잠금만 사용하므로 맵 전체를 막지 않습니다.
//! - 만료 정리는 엔트리마다 시계열 잠금 안에서 판단과 제거 표시를 함께 합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tailmetrics_core::metrics as m;

use super::identity::{LabelSet, SeriesIdentity};
use super::kind::{MetricKind, UpdateOp};
use super::series::{Evicted, MetricSeries, SeriesDescriptor};

/// 시계열 핸들
pub type SeriesHandle = Arc<MetricSeries>;

/// scrape 시점의 시계열 복사본
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub labels: LabelSet,
    pub value: f64,
}

/// 모든 규칙 워커가 공유하는 시계열 저장소
#[derive(Debug, Default)]
pub struct MetricStore {
    series: DashMap<SeriesIdentity, SeriesHandle>,
    timed_out: AtomicU64,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// identity에 해당하는 시계열을 반환하고, 없으면 `factory`로 한 번만 생성합니다.
    ///
    /// 같은 새 identity에 동시에 들어온 호출자들은 모두 같은 핸들을 받습니다.
    pub fn get_or_create<F>(&self, identity: SeriesIdentity, factory: F) -> SeriesHandle
    where
        F: FnOnce() -> MetricSeries,
    {
        if let Some(existing) = self.series.get(&identity) {
            return Arc::clone(existing.value());
        }

        let handle = Arc::clone(
            self.series
                .entry(identity)
                .or_insert_with(|| {
                    tracing::debug!(%identity, "creating series");
                    Arc::new(factory())
                })
                .value(),
        );
        metrics::gauge!(m::SERIES_STORED).set(self.series.len() as f64);
        handle
    }

    /// 핸들에 연산을 적용합니다.
    ///
    /// 핸들이 그 사이 sweep으로 제거되었으면 `Evicted`를 반환하며, 호출자는
    /// [`get_or_create`](Self::get_or_create)로 다시 해석해야 합니다.
    pub fn apply_update(
        &self,
        handle: &MetricSeries,
        op: UpdateOp,
        value: f64,
    ) -> Result<f64, Evicted> {
        handle.apply(op, value, Instant::now())
    }

    /// 조회/생성과 갱신을 합친 경로. 제거된 핸들을 만나면 다시 해석합니다.
    pub fn update(
        &self,
        descriptor: &SeriesDescriptor,
        timeout: Duration,
        op: UpdateOp,
        value: f64,
    ) -> f64 {
        let identity = SeriesIdentity::of(&descriptor.name, &descriptor.labels);
        loop {
            let handle = self.get_or_create(identity, || {
                MetricSeries::new(identity, descriptor.clone(), timeout, Instant::now())
            });
            match self.apply_update(&handle, op, value) {
                Ok(updated) => return updated,
                Err(Evicted) => {
                    // sweep이 맵에서 제거한 직후일 수 있으므로 남아 있는 엔트리도 치웁니다
                    self.series
                        .remove_if(&identity, |_, current| Arc::ptr_eq(current, &handle));
                }
            }
        }
    }

    /// `now` 기준으로 만료된 시계열을 제거하고 제거한 개수를 반환합니다.
    pub fn sweep_stale(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.series.retain(|identity, series| {
            if series.evict_if_stale(now) {
                tracing::debug!(%identity, name = %series.descriptor().name, "series timed out");
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.timed_out.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::counter!(m::TIMEDOUT_SERIES_TOTAL).increment(removed as u64);
        }
        metrics::gauge!(m::SERIES_STORED).set(self.series.len() as f64);
        removed
    }

    /// 현재 시계열의 복사본을 (이름, 라벨) 순으로 정렬해 반환합니다.
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        let handles: Vec<SeriesHandle> = self
            .series
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut out: Vec<SeriesSnapshot> = handles
            .iter()
            .map(|series| {
                let d = series.descriptor();
                let (value, _) = series.read();
                SeriesSnapshot {
                    name: d.name.clone(),
                    help: d.help.clone(),
                    kind: d.kind,
                    labels: d.labels.clone(),
                    value,
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        out
    }

    /// identity로 핸들을 조회합니다.
    pub fn get(&self, identity: &SeriesIdentity) -> Option<SeriesHandle> {
        self.series.get(identity).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// 지금까지 만료로 제거된 시계열 수
    pub fn timed_out_total(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn descriptor(kind: MetricKind, labels: &[(&str, &str)]) -> SeriesDescriptor {
        SeriesDescriptor {
            name: "test_metric".to_owned(),
            help: "test".to_owned(),
            kind,
            labels: labels.iter().copied().collect(),
        }
    }

    #[test]
    fn update_creates_then_mutates() {
        let store = MetricStore::new();
        let d = descriptor(MetricKind::Counter, &[("uuid", "abc")]);
        store.update(&d, Duration::ZERO, UpdateOp::Add, 1.0);
        store.update(&d, Duration::ZERO, UpdateOp::Add, 1.0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].value, 2.0);
    }

    #[test]
    fn counter_subtract_resets_to_zero() {
        let store = MetricStore::new();
        let d = descriptor(MetricKind::Counter, &[]);
        store.update(&d, Duration::ZERO, UpdateOp::Set, 5.0);
        assert_eq!(store.update(&d, Duration::ZERO, UpdateOp::Subtract, 1.0), 0.0);
    }

    #[test]
    fn gauge_goes_negative() {
        let store = MetricStore::new();
        let d = descriptor(MetricKind::Gauge, &[]);
        store.update(&d, Duration::ZERO, UpdateOp::Set, 3.0);
        assert_eq!(store.update(&d, Duration::ZERO, UpdateOp::Subtract, 5.0), -2.0);
    }

    #[test]
    fn get_or_create_runs_factory_once() {
        let store = MetricStore::new();
        let d = descriptor(MetricKind::Gauge, &[]);
        let id = SeriesIdentity::of(&d.name, &d.labels);
        let calls = AtomicUsize::new(0);
        let make = || {
            calls.fetch_add(1, Ordering::SeqCst);
            MetricSeries::new(id, d.clone(), Duration::ZERO, Instant::now())
        };
        let a = store.get_or_create(id, make);
        let b = store.get_or_create(id, || {
            calls.fetch_add(1, Ordering::SeqCst);
            MetricSeries::new(id, d.clone(), Duration::ZERO, Instant::now())
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_touch_creates_exactly_one_series() {
        let store = Arc::new(MetricStore::new());
        let created = Arc::new(AtomicUsize::new(0));
        let d = descriptor(MetricKind::Counter, &[("host", "a")]);
        let id = SeriesIdentity::of(&d.name, &d.labels);

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let created = Arc::clone(&created);
                let d = d.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let handle = store.get_or_create(id, || {
                            created.fetch_add(1, Ordering::SeqCst);
                            MetricSeries::new(id, d.clone(), Duration::ZERO, Instant::now())
                        });
                        store.apply_update(&handle, UpdateOp::Add, 1.0).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().value(), 1600.0);
    }

    #[test]
    fn sweep_removes_only_expired_series() {
        let store = MetricStore::new();
        let forever = descriptor(MetricKind::Counter, &[("rule", "x")]);
        let short = descriptor(MetricKind::Counter, &[("rule", "y")]);
        store.update(&forever, Duration::ZERO, UpdateOp::Add, 1.0);
        store.update(&short, Duration::from_secs(1), UpdateOp::Add, 1.0);

        let now = Instant::now();
        assert_eq!(store.sweep_stale(now), 0);
        assert_eq!(store.sweep_stale(now + Duration::from_secs(2)), 1);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].labels.get("rule"), Some("x"));
        assert_eq!(store.timed_out_total(), 1);
    }

    #[test]
    fn update_after_sweep_recreates_series_from_zero() {
        let store = MetricStore::new();
        let d = descriptor(MetricKind::Counter, &[]);
        store.update(&d, Duration::from_millis(10), UpdateOp::Add, 7.0);
        store.sweep_stale(Instant::now() + Duration::from_secs(1));
        assert!(store.is_empty());
        assert_eq!(store.update(&d, Duration::from_millis(10), UpdateOp::Add, 1.0), 1.0);
    }

    #[test]
    fn stale_handle_update_is_retried_through_store() {
        let store = MetricStore::new();
        let d = descriptor(MetricKind::Gauge, &[]);
        let id = SeriesIdentity::of(&d.name, &d.labels);
        let handle = store.get_or_create(id, || {
            MetricSeries::new(id, d.clone(), Duration::from_millis(1), Instant::now())
        });
        store.sweep_stale(Instant::now() + Duration::from_secs(1));
        assert!(store.apply_update(&handle, UpdateOp::Set, 4.0).is_err());
        assert_eq!(store.update(&d, Duration::from_millis(1), UpdateOp::Set, 4.0), 4.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_by_name_then_labels() {
        let store = MetricStore::new();
        let mut b = descriptor(MetricKind::Gauge, &[("k", "2")]);
        b.name = "b".to_owned();
        let mut a2 = descriptor(MetricKind::Gauge, &[("k", "2")]);
        a2.name = "a".to_owned();
        let mut a1 = descriptor(MetricKind::Gauge, &[("k", "1")]);
        a1.name = "a".to_owned();
        for d in [&b, &a2, &a1] {
            store.update(d, Duration::ZERO, UpdateOp::Set, 1.0);
        }
        let order: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|s| format!("{}{}", s.name, s.labels.get("k").unwrap()))
            .collect();
        assert_eq!(order, vec!["a1", "a2", "b2"]);
    }
}
