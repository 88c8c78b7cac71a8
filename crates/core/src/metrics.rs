//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logflow_`
//! - 영역: `pipeline_`, `sink_`, `engine_`
//! - 접미어: `_total` (counter), `_seconds` (gauge/duration), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 파이프라인 이름 레이블 키
pub const LABEL_PIPELINE: &str = "pipeline";

/// 플러그인 이름 레이블 키
pub const LABEL_PLUGIN: &str = "plugin";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// Pipeline: 소스가 emit한 전체 이벤트 수 (counter)
pub const EVENTS_EMITTED_TOTAL: &str = "logflow_pipeline_events_emitted_total";

/// Pipeline: 싱크 단계까지 도달한 이벤트 수 (counter)
pub const EVENTS_PROCESSED_TOTAL: &str = "logflow_pipeline_events_processed_total";

/// Pipeline: 드롭된 이벤트 수 (counter)
pub const EVENTS_DROPPED_TOTAL: &str = "logflow_pipeline_events_dropped_total";

/// Pipeline: 프로세서 에러 수 (counter)
pub const PROCESSING_ERRORS_TOTAL: &str = "logflow_pipeline_processing_errors_total";

/// Pipeline: 방출된 배치 수 (counter)
pub const BATCHES_EMITTED_TOTAL: &str = "logflow_pipeline_batches_emitted_total";

/// Pipeline: 인리치먼트 미스 수 (counter)
pub const ENRICH_MISSES_TOTAL: &str = "logflow_pipeline_enrich_misses_total";

/// Pipeline: 가동 시간 (gauge, 초)
pub const PIPELINE_UPTIME_SECONDS: &str = "logflow_pipeline_uptime_seconds";

// ─── Sink 메트릭 ────────────────────────────────────────────────────

/// Sink: write 실패 수 (counter, label: pipeline, plugin)
pub const SINK_WRITE_ERRORS_TOTAL: &str = "logflow_sink_write_errors_total";

/// Sink: write 재시도 수 (counter, label: pipeline, plugin)
pub const SINK_WRITE_RETRIES_TOTAL: &str = "logflow_sink_write_retries_total";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 등록된 파이프라인 수 (gauge)
pub const ENGINE_PIPELINES: &str = "logflow_engine_pipelines";

/// Engine: 실행 중인 파이프라인 수 (gauge)
pub const ENGINE_PIPELINES_RUNNING: &str = "logflow_engine_pipelines_running";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        EVENTS_EMITTED_TOTAL,
        "Total number of events emitted by sources across all pipelines"
    );
    describe_counter!(
        EVENTS_PROCESSED_TOTAL,
        "Total number of events that reached the sink stage"
    );
    describe_counter!(
        EVENTS_DROPPED_TOTAL,
        "Total number of events dropped (filtered, errored, or shed under overflow)"
    );
    describe_counter!(
        PROCESSING_ERRORS_TOTAL,
        "Total number of processor errors, including ignored ones"
    );
    describe_counter!(
        BATCHES_EMITTED_TOTAL,
        "Total number of batches produced by the batcher"
    );
    describe_counter!(
        ENRICH_MISSES_TOTAL,
        "Total number of enrichment lookups that found no match"
    );
    describe_gauge!(PIPELINE_UPTIME_SECONDS, "Pipeline uptime in seconds");
    describe_counter!(
        SINK_WRITE_ERRORS_TOTAL,
        "Total number of failed sink write attempts"
    );
    describe_counter!(
        SINK_WRITE_RETRIES_TOTAL,
        "Total number of sink write retries"
    );
    describe_gauge!(ENGINE_PIPELINES, "Number of pipelines loaded in the engine");
    describe_gauge!(
        ENGINE_PIPELINES_RUNNING,
        "Number of pipelines currently running"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        EVENTS_EMITTED_TOTAL,
        EVENTS_PROCESSED_TOTAL,
        EVENTS_DROPPED_TOTAL,
        PROCESSING_ERRORS_TOTAL,
        BATCHES_EMITTED_TOTAL,
        ENRICH_MISSES_TOTAL,
        PIPELINE_UPTIME_SECONDS,
        SINK_WRITE_ERRORS_TOTAL,
        SINK_WRITE_RETRIES_TOTAL,
        ENGINE_PIPELINES,
        ENGINE_PIPELINES_RUNNING,
    ];

    #[test]
    fn all_metrics_start_with_logflow_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("logflow_"),
                "Metric '{}' does not start with 'logflow_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 설치되지 않아도 panic하지 않아야 합니다
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_PIPELINE, LABEL_PLUGIN] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
