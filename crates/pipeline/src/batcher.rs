//! 배처 -- 크기/타임아웃 기반 배치 생성
//!
//! 프로세서 출력 큐에서 이벤트를 읽어 배치를 만들고 모든 싱크 큐에
//! 팬아웃합니다. 배치는 (a) `batch_size`에 도달하거나 (b) 현재 배치의
//! 첫 이벤트 수용 이후 `batch_timeout`이 지나면 방출됩니다.
//! 이벤트가 없는 타이머 틱은 아무것도 방출하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use logflow_core::event::{Batch, LogEvent};

use crate::metrics::PipelineMetrics;
use crate::sink_queue::SinkQueue;

/// 배처 태스크
pub(crate) struct Batcher {
    pipeline: String,
    batch_size: usize,
    batch_timeout: Duration,
    queues: Vec<Arc<SinkQueue>>,
    metrics: Arc<PipelineMetrics>,
}

impl Batcher {
    pub(crate) fn new(
        pipeline: String,
        batch_size: usize,
        batch_timeout: Duration,
        queues: Vec<Arc<SinkQueue>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            pipeline,
            batch_size,
            batch_timeout,
            queues,
            metrics,
        }
    }

    /// 배치 루프를 실행합니다. 출력 큐가 닫히면 잔여 배치를 방출하고
    /// 반환합니다.
    pub(crate) async fn run(self, mut out_rx: mpsc::Receiver<LogEvent>) {
        let mut pending: Vec<LogEvent> = Vec::with_capacity(self.batch_size);
        let mut deadline: Option<Instant> = None;

        loop {
            let timer = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                maybe = out_rx.recv() => match maybe {
                    Some(event) => {
                        if pending.is_empty() {
                            deadline = Some(Instant::now() + self.batch_timeout);
                        }
                        pending.push(event);
                        if pending.len() >= self.batch_size {
                            self.flush(&mut pending).await;
                            deadline = None;
                        }
                    }
                    None => {
                        // 업스트림 종료: 잔여 이벤트 방출 후 종료
                        if !pending.is_empty() {
                            self.flush(&mut pending).await;
                        }
                        break;
                    }
                },
                _ = timer => {
                    if !pending.is_empty() {
                        tracing::debug!(
                            pipeline = %self.pipeline,
                            size = pending.len(),
                            "flushing batch (timeout trigger)"
                        );
                        self.flush(&mut pending).await;
                    }
                    deadline = None;
                }
            }
        }

        tracing::debug!(pipeline = %self.pipeline, "batcher stopped");
    }

    /// 배치를 모든 싱크 큐에 팬아웃합니다.
    ///
    /// 배치 인스턴스는 `Arc`로 읽기 전용 공유됩니다. 오버플로우 정책에
    /// 따라 드롭된 이벤트는 카운트됩니다.
    async fn flush(&self, pending: &mut Vec<LogEvent>) {
        let events = std::mem::take(pending);
        let count = events.len() as u64;
        let batch = Arc::new(Batch::new(self.pipeline.clone(), events));

        for queue in &self.queues {
            let dropped = queue.push(Arc::clone(&batch)).await;
            if dropped > 0 {
                self.metrics.record_dropped(dropped);
                tracing::warn!(
                    pipeline = %self.pipeline,
                    dropped = dropped,
                    "sink queue overflow"
                );
            }
        }

        self.metrics.record_processed(count);
        metrics::counter!(logflow_core::metrics::BATCHES_EMITTED_TOTAL).increment(1);
        pending.reserve(self.batch_size);
    }
}
