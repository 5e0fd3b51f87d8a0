//! 메트릭 상수 및 설명 등록
//!
//! 운영 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! 규칙에서 추출한 사용자 메트릭은 여기에 속하지 않습니다. 그 값은 파이프라인의
//! 메트릭 저장소에 있고 scrape 시점에 별도로 렌더링됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tailmetrics_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 라인 거부 사유 레이블 키
pub const LABEL_REASON: &str = "reason";

/// 수집기 종류 레이블 키 (file, tcp, udp)
pub const LABEL_SOURCE: &str = "source";

// ─── 추출 엔진 메트릭 ───────────────────────────────────────────────

/// 로드된 규칙 수 (gauge)
pub const RULES_CONFIGURED: &str = "tailmetrics_rules_configured";

/// 수집된 전체 라인 수 (counter)
pub const INGESTED_LINES_TOTAL: &str = "tailmetrics_ingested_lines_total";

/// 매칭 후 추출 실패로 거부된 라인 수 (counter, label: reason)
pub const REJECTED_LINES_TOTAL: &str = "tailmetrics_rejected_lines_total";

/// 만료되어 제거된 시계열 수 (counter)
pub const TIMEDOUT_SERIES_TOTAL: &str = "tailmetrics_timedout_series_total";

/// 저장소에 있는 시계열 수 (gauge)
pub const SERIES_STORED: &str = "tailmetrics_series_stored";

// ─── 수집기 메트릭 ─────────────────────────────────────────────────

/// 수집기가 받아들인 연결/파일 열기 수 (counter, label: source)
pub const SOURCE_CONNECTIONS_TOTAL: &str = "tailmetrics_source_connections_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "tailmetrics_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다. 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_gauge!(RULES_CONFIGURED, "Number of metric rules loaded");
    describe_counter!(
        INGESTED_LINES_TOTAL,
        "Total number of lines received from all sources"
    );
    describe_counter!(
        REJECTED_LINES_TOTAL,
        "Lines that matched a rule but could not be turned into an update"
    );
    describe_counter!(
        TIMEDOUT_SERIES_TOTAL,
        "Series removed because they were not updated within their timeout"
    );
    describe_gauge!(SERIES_STORED, "Number of series currently held in the store");
    describe_counter!(
        SOURCE_CONNECTIONS_TOTAL,
        "Connections accepted or files opened, per source kind"
    );
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
