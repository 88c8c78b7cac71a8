//! 파이프라인 메트릭 -- 공유 카운터와 스냅샷
//!
//! 런타임 태스크들이 공유하는 Atomic 카운터를 정의합니다.
//! 카운터는 실행 중 단조 증가하며, 재시작 시 0으로 리셋됩니다.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 파이프라인 공유 카운터
///
/// 소스/드라이버/배처/싱크 태스크가 `Arc`로 공유합니다.
/// `events_emitted`/`events_dropped`는 소스의
/// [`EventSender`](logflow_core::plugin::EventSender)에도 공유되므로
/// 별도의 `Arc`로 감싸져 있습니다.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// 소스가 emit한 이벤트 수
    pub events_emitted: Arc<AtomicU64>,
    /// 싱크 단계까지 도달한 이벤트 수
    pub events_processed: AtomicU64,
    /// 드롭된 이벤트 수 (필터 드롭, 에러 드롭, 오버플로우, 재시도 소진)
    pub events_dropped: Arc<AtomicU64>,
    /// 프로세서 에러 수
    pub processing_errors: AtomicU64,
    /// 싱크별 write 에러 수
    write_errors: Mutex<BTreeMap<String, u64>>,
}

impl PipelineMetrics {
    /// 새 카운터 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 모든 카운터를 0으로 리셋합니다 (재시작 시 호출).
    pub fn reset(&self) {
        self.events_emitted.store(0, Ordering::Relaxed);
        self.events_processed.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
        self.processing_errors.store(0, Ordering::Relaxed);
        self.write_errors
            .lock()
            .expect("write_errors lock poisoned")
            .clear();
    }

    /// 이벤트 드롭을 기록합니다.
    pub fn record_dropped(&self, count: u64) {
        self.events_dropped.fetch_add(count, Ordering::Relaxed);
        metrics::counter!(logflow_core::metrics::EVENTS_DROPPED_TOTAL).increment(count);
    }

    /// 프로세서 에러를 기록합니다.
    pub fn record_processing_error(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(logflow_core::metrics::PROCESSING_ERRORS_TOTAL).increment(1);
    }

    /// 싱크 단계 도달 이벤트를 기록합니다.
    pub fn record_processed(&self, count: u64) {
        self.events_processed.fetch_add(count, Ordering::Relaxed);
        metrics::counter!(logflow_core::metrics::EVENTS_PROCESSED_TOTAL).increment(count);
    }

    /// 싱크 write 에러를 기록합니다.
    pub fn record_write_error(&self, sink: &str) {
        let mut errors = self
            .write_errors
            .lock()
            .expect("write_errors lock poisoned");
        *errors.entry(sink.to_owned()).or_insert(0) += 1;
    }

    /// 싱크별 write 에러 수의 사본을 반환합니다.
    pub fn write_errors(&self) -> BTreeMap<String, u64> {
        self.write_errors
            .lock()
            .expect("write_errors lock poisoned")
            .clone()
    }
}

/// 파이프라인 메트릭 스냅샷
///
/// 엔진의 `get_metrics`가 반환하는 읽기 전용 뷰입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// 파이프라인 이름
    pub name: String,
    /// 실행 중 여부
    pub running: bool,
    /// 생명주기 상태 문자열
    pub state: String,
    /// 실패 상태일 때의 종결 사유
    pub failure_reason: Option<String>,
    /// 소스 수
    pub sources: usize,
    /// 프로세서 수
    pub processors: usize,
    /// 싱크 수
    pub sinks: usize,
    /// 소스가 emit한 이벤트 수
    pub events_emitted: u64,
    /// 싱크 단계까지 도달한 이벤트 수
    pub events_processed: u64,
    /// 드롭된 이벤트 수
    pub events_dropped: u64,
    /// 프로세서 에러 수
    pub processing_errors: u64,
    /// 싱크별 write 에러 수
    pub write_errors: BTreeMap<String, u64>,
    /// 가동 시간 (초). 실행 중이 아니면 0입니다.
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_processed(10);
        metrics.record_dropped(3);
        metrics.record_processing_error();
        assert_eq!(metrics.events_processed.load(Ordering::Relaxed), 10);
        assert_eq!(metrics.events_dropped.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.processing_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn write_errors_tracked_per_sink() {
        let metrics = PipelineMetrics::new();
        metrics.record_write_error("es");
        metrics.record_write_error("es");
        metrics.record_write_error("file");
        let errors = metrics.write_errors();
        assert_eq!(errors.get("es"), Some(&2));
        assert_eq!(errors.get("file"), Some(&1));
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = PipelineMetrics::new();
        metrics.record_processed(5);
        metrics.record_write_error("s");
        metrics.reset();
        assert_eq!(metrics.events_processed.load(Ordering::Relaxed), 0);
        assert!(metrics.write_errors().is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let snapshot = MetricsSnapshot {
            name: "p".to_owned(),
            running: true,
            state: "running".to_owned(),
            failure_reason: None,
            sources: 1,
            processors: 2,
            sinks: 1,
            events_emitted: 100,
            events_processed: 90,
            events_dropped: 10,
            processing_errors: 0,
            write_errors: BTreeMap::new(),
            uptime_seconds: 42,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"running\":true"));
        assert!(json.contains("\"events_processed\":90"));
    }
}
