//! 싱크 워커 -- 싱크별 소비 태스크와 재시도 정책
//!
//! 싱크 대기 큐에서 배치를 꺼내 `write`를 호출합니다. 재시도 가능한
//! 실패는 유계 지수 백오프로 재시도하며 (기본 500ms, 상한 30s, 배치당
//! 최대 5회), 소진되면 배치를 드롭하고 이벤트 수를 카운트합니다.
//! 치명적 실패는 파이프라인을 실패 상태로 전환합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use logflow_core::error::SinkError;
use logflow_core::event::Batch;
use logflow_core::metrics as metric_names;
use logflow_core::plugin::DynSink;

use crate::metrics::PipelineMetrics;
use crate::pipeline::PipelineShared;
use crate::sink_queue::SinkQueue;

/// 배치당 최대 write 시도 횟수
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// 재시도 백오프 기본값
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// 재시도 백오프 상한
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// 배치 하나에 대한 write 결과
enum WriteOutcome {
    Delivered,
    Dropped,
    Fatal(String),
}

/// 싱크 워커 태스크
pub(crate) struct SinkWorker {
    pipeline: String,
    sink: Box<dyn DynSink>,
    queue: Arc<SinkQueue>,
    metrics: Arc<PipelineMetrics>,
    shared: Arc<PipelineShared>,
    write_timeout: Duration,
}

impl SinkWorker {
    pub(crate) fn new(
        pipeline: String,
        sink: Box<dyn DynSink>,
        queue: Arc<SinkQueue>,
        metrics: Arc<PipelineMetrics>,
        shared: Arc<PipelineShared>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            sink,
            queue,
            metrics,
            shared,
            write_timeout,
        }
    }

    /// 소비 루프를 실행합니다. 큐가 닫히고 비워지면 싱크를 flush/close
    /// 하고 반환합니다.
    pub(crate) async fn run(mut self) {
        let sink_name = self.sink.name().to_owned();

        while let Some(batch) = self.queue.pop().await {
            match self.write_with_retry(&sink_name, &batch).await {
                WriteOutcome::Delivered => {}
                WriteOutcome::Dropped => {
                    self.metrics.record_dropped(batch.len() as u64);
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        sink = %sink_name,
                        events = batch.len(),
                        "batch dropped after retry exhaustion"
                    );
                }
                WriteOutcome::Fatal(reason) => {
                    // 큐를 닫아 배처가 죽은 싱크에 블록되지 않게 함
                    self.queue.close();
                    self.shared
                        .fail(format!("sink '{sink_name}' failed permanently: {reason}"));
                    break;
                }
            }
        }

        if let Err(e) = self.sink.flush().await {
            tracing::warn!(
                pipeline = %self.pipeline,
                sink = %sink_name,
                error = %e,
                "sink flush failed during shutdown"
            );
        }
        if let Err(e) = self.sink.close().await {
            tracing::warn!(
                pipeline = %self.pipeline,
                sink = %sink_name,
                error = %e,
                "sink close failed"
            );
        }
        tracing::debug!(pipeline = %self.pipeline, sink = %sink_name, "sink worker stopped");
    }

    async fn write_with_retry(&mut self, sink_name: &str, batch: &Batch) -> WriteOutcome {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let reason = match timeout(self.write_timeout, self.sink.write(batch)).await {
                Ok(Ok(())) => return WriteOutcome::Delivered,
                Ok(Err(SinkError::Fatal(reason))) => return WriteOutcome::Fatal(reason),
                Ok(Err(SinkError::Retryable(reason))) => reason,
                // 제한 시간 초과는 재시도 대상
                Err(_) => format!("write timed out after {:?}", self.write_timeout),
            };

            self.metrics.record_write_error(sink_name);
            metrics::counter!(
                metric_names::SINK_WRITE_ERRORS_TOTAL,
                metric_names::LABEL_PIPELINE => self.pipeline.clone(),
                metric_names::LABEL_PLUGIN => sink_name.to_owned(),
            )
            .increment(1);

            tracing::warn!(
                pipeline = %self.pipeline,
                sink = %sink_name,
                attempt = attempt,
                error = %reason,
                "sink write failed"
            );

            if attempt == MAX_WRITE_ATTEMPTS {
                break;
            }

            metrics::counter!(
                metric_names::SINK_WRITE_RETRIES_TOTAL,
                metric_names::LABEL_PIPELINE => self.pipeline.clone(),
                metric_names::LABEL_PLUGIN => sink_name.to_owned(),
            )
            .increment(1);

            let backoff = BACKOFF_BASE
                .saturating_mul(1u32 << (attempt - 1).min(16))
                .min(BACKOFF_CAP);
            sleep(backoff).await;
        }

        WriteOutcome::Dropped
    }
}
