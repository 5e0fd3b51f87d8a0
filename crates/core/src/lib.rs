//! tailmetrics 공통 크레이트
//!
//! 에러 타입, 설정, 운영 메트릭 이름, 파이프라인 생명주기 trait을 제공합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, PipelineError, TailmetricsError};

// 설정
pub use config::TailmetricsConfig;

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};
