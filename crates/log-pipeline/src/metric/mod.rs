//! 메트릭 상태 엔진
//!
//! - [`kind`]: 메트릭 종류와 단일 갱신 규칙
//! - [`identity`]: 라벨 집합과 SHA-256 기반 시계열 식별자
//! - [`series`]: 잠금으로 보호되는 단일 시계열
//! - [`store`]: 동시성 저장소와 만료 정리

pub mod identity;
pub mod kind;
pub mod series;
pub mod store;

pub use identity::{LabelSet, SeriesIdentity, canonical_descriptor};
pub use kind::{MetricKind, UpdateOp};
pub use series::{Evicted, MetricSeries, SeriesDescriptor};
pub use store::{MetricStore, SeriesHandle, SeriesSnapshot};
