//! tailmetrics 로그 파이프라인
//!
//! 여러 소스에서 들어오는 텍스트 라인을 선언적 규칙으로 매칭해
//! Prometheus 스타일 시계열 값으로 바꿉니다.
//!
//! # 모듈 구성
//!
//! - [`collector`]: 라인 소스 (파일/named pipe tail, TCP, UDP)
//! - [`dispatcher`]: 모든 소스의 단일 진입점, 규칙 워커로 팬아웃
//! - [`rule`]: YAML 규칙 파일, 패턴 컴파일, 라벨/값 문법
//! - [`extract`]: 캡처에서 라벨 집합과 값 연산을 도출
//! - [`worker`]: 규칙당 하나의 매칭/갱신 태스크
//! - [`metric`]: 시계열 identity, 종류별 갱신 규칙, 동시성 저장소
//! - [`sweep`]: 만료 시계열 주기 정리
//! - [`export`]: 저장소의 text exposition 렌더링
//! - [`pipeline`]: 전체 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! File/TCP/UDP -> Dispatcher.ingest -> [queue(1)] x N -> RuleWorker -> MetricStore
//!                       |                                     |             |
//!                  IngestStats                        RejectReason     Sweeper, export
//! ```

pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod extract;
pub mod metric;
pub mod pipeline;
pub mod rule;
pub mod stats;
pub mod sweep;
pub mod worker;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 규칙
pub use rule::{MetricRule, RuleLoader};

// 추출
pub use extract::{Extraction, RejectReason, extract};

// 저장소
pub use metric::{LabelSet, MetricKind, MetricStore, SeriesIdentity, SeriesSnapshot, UpdateOp};

// 팬아웃
pub use dispatcher::Dispatcher;
pub use stats::{IngestStats, StatsSnapshot};
pub use worker::{LineOutcome, RuleWorker};

// 수집기
pub use collector::{CollectorSet, CollectorStatus};

// exposition
pub use export::render_text;
