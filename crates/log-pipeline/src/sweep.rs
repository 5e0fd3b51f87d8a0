//! 만료 시계열 정리 태스크

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metric::MetricStore;

/// 주기적으로 [`MetricStore::sweep_stale`]을 호출하는 태스크를 띄웁니다.
///
/// `cancel`이 취소되면 종료합니다.
pub fn spawn_sweeper(
    store: Arc<MetricStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 첫 tick은 즉시 반환되므로 건너뜀
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("staleness sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = store.sweep_stale(Instant::now());
                    if removed > 0 {
                        tracing::info!(removed, remaining = store.len(), "removed timed-out series");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricKind, SeriesDescriptor, UpdateOp};

    #[tokio::test]
    async fn sweeper_removes_expired_series_and_stops_on_cancel() {
        let store = Arc::new(MetricStore::new());
        let descriptor = SeriesDescriptor {
            name: "m".to_owned(),
            help: "h".to_owned(),
            kind: MetricKind::Gauge,
            labels: Default::default(),
        };
        store.update(&descriptor, Duration::from_millis(20), UpdateOp::Set, 1.0);

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(Arc::clone(&store), Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.is_empty());
        assert_eq!(store.timed_out_total(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
