//! 파이프라인 런타임 -- 소스 → 프로세서 → 배처 → 싱크 동시 데이터 경로
//!
//! # 내부 아키텍처
//! ```text
//! Sources -> ingest(mpsc) -> ProcessorDriver -> out(mpsc) -> Batcher -> SinkQueue -> SinkWorker
//! ```
//!
//! # 생명주기
//! ```text
//! created -> starting -> running -> stopping -> stopped
//!                │            │
//!                ▼            ▼
//!              failed       failed
//! stopped -> starting (재시작)
//! ```
//!
//! 시작 순서는 싱크 open → 프로세서 → 소스이며, 정지는 역순으로
//! 진행됩니다. 정지의 각 단계는 `stop_grace` 내에 끝나야 하고,
//! 초과 시 해당 단계가 강제 해제되고 파이프라인은 실패 상태가 됩니다.
//! 재시작 시 모든 플러그인이 설정에서 다시 생성되고 카운터는 0으로
//! 리셋되며, 이전 실행의 이벤트는 살아남지 않습니다.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use logflow_core::config::PipelineConfig;
use logflow_core::error::{ConfigError, LogflowError, PipelineError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::{
    DynProcessor, DynSink, DynSource, EventSender, PluginRegistry,
};

use crate::batcher::Batcher;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::sink_queue::SinkQueue;
use crate::sink_worker::SinkWorker;

/// 파이프라인 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 생성됨, 아직 시작하지 않음
    Created,
    /// 시작 진행 중
    Starting,
    /// 실행 중
    Running,
    /// 정지 진행 중
    Stopping,
    /// 정지됨 (재시작 가능)
    Stopped,
    /// 실패로 종결됨. 사유는 메트릭 스냅샷으로 공개됩니다.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 런타임 태스크들이 공유하는 파이프라인 상태
///
/// 싱크 워커의 치명적 실패가 여기로 전파되어 파이프라인을 실패 상태로
/// 전환하고 소스들에게 정지 신호를 보냅니다.
pub(crate) struct PipelineShared {
    state: Mutex<PipelineState>,
    failure_reason: Mutex<Option<String>>,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
}

impl PipelineShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Created),
            failure_reason: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    pub(crate) fn failure_reason(&self) -> Option<String> {
        self.failure_reason
            .lock()
            .expect("failure lock poisoned")
            .clone()
    }

    fn clear_failure(&self) {
        *self.failure_reason.lock().expect("failure lock poisoned") = None;
    }

    fn set_shutdown(&self, tx: broadcast::Sender<()>) {
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(tx);
    }

    fn signal_shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().expect("shutdown lock poisoned").as_ref() {
            let _ = tx.send(());
        }
    }

    /// 파이프라인을 실패 상태로 전환합니다. 최초 사유만 보존됩니다.
    pub(crate) fn fail(&self, reason: String) {
        {
            let mut failure = self.failure_reason.lock().expect("failure lock poisoned");
            if failure.is_none() {
                *failure = Some(reason.clone());
            }
        }
        self.set_state(PipelineState::Failed);
        tracing::error!(reason = %reason, "pipeline failed");
        self.signal_shutdown();
    }
}

/// 팩토리로 생성된 플러그인 인스턴스 집합
struct PluginSet {
    sources: Vec<Box<dyn DynSource>>,
    processors: Vec<Box<dyn DynProcessor>>,
    sinks: Vec<Box<dyn DynSink>>,
}

/// 실행 중인 파이프라인의 태스크 핸들
struct RunningTasks {
    source_handles: Vec<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
    batcher_handle: Vec<JoinHandle<()>>,
    sink_handles: Vec<JoinHandle<()>>,
    queues: Vec<Arc<SinkQueue>>,
    processors: Arc<Vec<Box<dyn DynProcessor>>>,
}

/// 프로세서 드라이버 워커
///
/// 유입 큐에서 이벤트를 꺼내 프로세서 체인을 순차 적용합니다.
/// 워커가 1개면 소스별 순서가 보존되고, 여러 개면 워커 간 순서는
/// 보장되지 않습니다.
struct ProcessorDriver {
    pipeline: String,
    chain: Arc<Vec<Box<dyn DynProcessor>>>,
    ingest_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<LogEvent>>>,
    out_tx: mpsc::Sender<LogEvent>,
    metrics: Arc<PipelineMetrics>,
}

impl ProcessorDriver {
    async fn run(self) {
        loop {
            let maybe = {
                let mut rx = self.ingest_rx.lock().await;
                rx.recv().await
            };
            let Some(event) = maybe else {
                // 모든 소스가 종료되어 유입 큐가 닫힘
                break;
            };

            let mut current = vec![event];
            for processor in self.chain.iter() {
                let mut next = Vec::with_capacity(current.len());
                for event in current {
                    match processor.process(event).await {
                        Ok(out) => next.extend(out),
                        Err(e) => {
                            self.metrics.record_processing_error();
                            tracing::debug!(
                                pipeline = %self.pipeline,
                                processor = %processor.name(),
                                error = %e,
                                "processor error, event dropped"
                            );
                        }
                    }
                }
                current = next;
                if current.is_empty() {
                    break;
                }
            }

            if current.is_empty() {
                self.metrics.record_dropped(1);
                continue;
            }

            for event in current {
                if self.out_tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// 파이프라인 -- 하나의 설정 레코드를 실행 중인 데이터 흐름에 결합
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<PluginRegistry>,
    shared: Arc<PipelineShared>,
    metrics: Arc<PipelineMetrics>,
    /// 로드 시점 검증에서 생성된 플러그인. 첫 시작에서 소비됩니다.
    prepared: Option<PluginSet>,
    running: Option<RunningTasks>,
    started_at: Option<Instant>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// 설정을 검증하고 파이프라인을 생성합니다.
    ///
    /// 모든 플러그인이 이 시점에 팩토리를 통해 생성되므로, 알 수 없는
    /// 타입 태그와 컴파일 불가능한 플러그인 설정은 로드 시점에
    /// 거부됩니다.
    pub fn new(config: PipelineConfig, registry: Arc<PluginRegistry>) -> Result<Self, LogflowError> {
        config.validate().map_err(LogflowError::from)?;
        let prepared = Self::instantiate(&config, &registry)?;
        Ok(Self {
            config,
            registry,
            shared: Arc::new(PipelineShared::new()),
            metrics: Arc::new(PipelineMetrics::new()),
            prepared: Some(prepared),
            running: None,
            started_at: None,
        })
    }

    /// 파이프라인 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// 현재 생명주기 상태를 반환합니다.
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// 메트릭 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> MetricsSnapshot {
        use std::sync::atomic::Ordering;

        let state = self.shared.state();
        let running = state == PipelineState::Running;
        MetricsSnapshot {
            name: self.config.name.clone(),
            running,
            state: state.to_string(),
            failure_reason: self.shared.failure_reason(),
            sources: self.config.sources.len(),
            processors: self.config.processors.len(),
            sinks: self.config.sinks.len(),
            events_emitted: self.metrics.events_emitted.load(Ordering::Relaxed),
            events_processed: self.metrics.events_processed.load(Ordering::Relaxed),
            events_dropped: self.metrics.events_dropped.load(Ordering::Relaxed),
            processing_errors: self.metrics.processing_errors.load(Ordering::Relaxed),
            write_errors: self.metrics.write_errors(),
            uptime_seconds: if running {
                self.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0)
            } else {
                0
            },
        }
    }

    fn instantiate(
        config: &PipelineConfig,
        registry: &PluginRegistry,
    ) -> Result<PluginSet, LogflowError> {
        let sinks = config
            .sinks
            .iter()
            .map(|record| registry.create_sink(record))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let processors = config
            .processors
            .iter()
            .map(|record| registry.create_processor(record))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let sources = config
            .sources
            .iter()
            .map(|record| registry.create_source(record))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(PluginSet {
            sources,
            processors,
            sinks,
        })
    }

    /// 파이프라인을 시작합니다. 이미 실행 중이면 no-op입니다.
    ///
    /// 시작 순서: 싱크 open → 싱크 태스크 → 배처 → 프로세서 드라이버
    /// → 소스. 어느 단계든 실패하면 파이프라인은 실패 상태로 전환되고
    /// 사유가 기록됩니다.
    pub async fn start(&mut self) -> Result<(), LogflowError> {
        match self.shared.state() {
            PipelineState::Running | PipelineState::Starting => {
                tracing::warn!(pipeline = %self.config.name, "pipeline already running");
                return Ok(());
            }
            PipelineState::Stopping => {
                return Err(PipelineError::AlreadyRunning.into());
            }
            PipelineState::Created | PipelineState::Stopped | PipelineState::Failed => {}
        }

        tracing::info!(pipeline = %self.config.name, "starting pipeline");
        self.shared.set_state(PipelineState::Starting);
        self.shared.clear_failure();
        self.metrics.reset();

        let plugins = match self.prepared.take() {
            Some(set) => set,
            None => match Self::instantiate(&self.config, &self.registry) {
                Ok(set) => set,
                Err(e) => {
                    self.shared.fail(e.to_string());
                    return Err(e);
                }
            },
        };
        let PluginSet {
            sources,
            processors,
            mut sinks,
        } = plugins;

        // 1. 싱크 open (실패 시 이미 연 싱크를 롤백)
        for i in 0..sinks.len() {
            if let Err(e) = sinks[i].open().await {
                let error = PipelineError::OpenFailed {
                    kind: "sink",
                    name: sinks[i].name().to_owned(),
                    reason: e.to_string(),
                };
                for opened in sinks[..i].iter_mut() {
                    if let Err(close_err) = opened.close().await {
                        tracing::warn!(
                            sink = %opened.name(),
                            error = %close_err,
                            "rollback close failed"
                        );
                    }
                }
                self.shared.fail(error.to_string());
                return Err(error.into());
            }
        }

        let name = self.config.name.clone();
        let (shutdown_tx, _) = broadcast::channel(16);
        self.shared.set_shutdown(shutdown_tx.clone());

        let (ingest_tx, ingest_rx) = mpsc::channel(self.config.ingest_capacity());
        let (out_tx, out_rx) = mpsc::channel(self.config.out_capacity());

        // 2. 싱크 태스크
        let mut queues = Vec::with_capacity(sinks.len());
        let mut sink_handles = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let queue = Arc::new(SinkQueue::new(
                self.config.sink_queue_capacity,
                self.config.overflow_policy,
            ));
            queues.push(Arc::clone(&queue));
            let worker = SinkWorker::new(
                name.clone(),
                sink,
                queue,
                Arc::clone(&self.metrics),
                Arc::clone(&self.shared),
                Duration::from_secs(self.config.write_timeout_secs),
            );
            sink_handles.push(tokio::spawn(worker.run()));
        }

        // 3. 배처
        let batcher = Batcher::new(
            name.clone(),
            self.config.batch_size,
            Duration::from_secs_f64(self.config.batch_timeout_secs),
            queues.clone(),
            Arc::clone(&self.metrics),
        );
        let batcher_handle = vec![tokio::spawn(batcher.run(out_rx))];

        // 4. 프로세서 드라이버 (workers > 1이면 워커 간 순서 미보장)
        let chain = Arc::new(processors);
        let shared_ingest_rx = Arc::new(tokio::sync::Mutex::new(ingest_rx));
        let mut worker_handles = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            let driver = ProcessorDriver {
                pipeline: name.clone(),
                chain: Arc::clone(&chain),
                ingest_rx: Arc::clone(&shared_ingest_rx),
                out_tx: out_tx.clone(),
                metrics: Arc::clone(&self.metrics),
            };
            worker_handles.push(tokio::spawn(driver.run()));
        }
        drop(out_tx);

        // 5. 소스 태스크
        let mut source_handles = Vec::with_capacity(sources.len());
        for mut source in sources {
            let emit = EventSender::new(
                ingest_tx.clone(),
                source.backpressure(),
                Arc::clone(&self.metrics.events_emitted),
                Arc::clone(&self.metrics.events_dropped),
            );
            let shutdown_rx = shutdown_tx.subscribe();
            let pipeline_name = name.clone();
            source_handles.push(tokio::spawn(async move {
                let source_name = source.name().to_owned();
                if let Err(e) = source.run(emit, shutdown_rx).await {
                    tracing::error!(
                        pipeline = %pipeline_name,
                        source = %source_name,
                        error = %e,
                        "source terminated with error"
                    );
                }
            }));
        }
        drop(ingest_tx);

        self.running = Some(RunningTasks {
            source_handles,
            worker_handles,
            batcher_handle,
            sink_handles,
            queues,
            processors: chain,
        });
        self.started_at = Some(Instant::now());
        self.shared.set_state(PipelineState::Running);
        tracing::info!(
            pipeline = %self.config.name,
            sources = self.config.sources.len(),
            processors = self.config.processors.len(),
            sinks = self.config.sinks.len(),
            "pipeline started"
        );
        Ok(())
    }

    /// 파이프라인을 정지합니다. 실행 중이 아니면 no-op입니다.
    ///
    /// 정지 순서: 소스 → 프로세서 드라이버 → 배처 → 싱크. 각 단계는
    /// 업스트림 채널이 닫히면서 잔여 이벤트를 드레인한 뒤 종료되며,
    /// `stop_grace`를 초과한 단계는 강제 중단되고 파이프라인은 실패
    /// 상태로 기록됩니다.
    pub async fn stop(&mut self) -> Result<(), LogflowError> {
        let state = self.shared.state();
        let was_failed = state == PipelineState::Failed;
        if !matches!(state, PipelineState::Running | PipelineState::Failed) {
            tracing::warn!(
                pipeline = %self.config.name,
                state = %state,
                "pipeline not running, stop is a no-op"
            );
            return Ok(());
        }

        tracing::info!(pipeline = %self.config.name, "stopping pipeline");
        if !was_failed {
            self.shared.set_state(PipelineState::Stopping);
        }
        self.shared.signal_shutdown();

        let Some(mut tasks) = self.running.take() else {
            self.started_at = None;
            if !was_failed {
                self.shared.set_state(PipelineState::Stopped);
            }
            return Ok(());
        };

        let grace = Duration::from_secs(self.config.stop_grace_secs);
        let mut stop_error: Option<PipelineError> = None;

        // 소스가 멈추면 유입 큐가 닫히고, 이후 단계들이 차례로 드레인 후 종료됩니다
        for (stage, handles) in [
            ("sources", &mut tasks.source_handles),
            ("processors", &mut tasks.worker_handles),
            ("batcher", &mut tasks.batcher_handle),
        ] {
            if let Err(e) = join_stage(handles, grace, stage, &self.shared).await {
                stop_error.get_or_insert(e);
            }
        }

        // 배처 종료 후 싱크 큐를 닫아 잔여 배치 드레인을 허용
        for queue in &tasks.queues {
            queue.close();
        }
        if let Err(e) = join_stage(&mut tasks.sink_handles, grace, "sinks", &self.shared).await {
            stop_error.get_or_insert(e);
        }

        // 프로세서 정리 (워커가 모두 종료된 뒤에만 단독 소유)
        match Arc::try_unwrap(tasks.processors) {
            Ok(processors) => {
                for processor in &processors {
                    processor.close().await;
                }
            }
            Err(_) => {
                tracing::warn!(
                    pipeline = %self.config.name,
                    "processor chain still referenced, skipping close"
                );
            }
        }

        self.started_at = None;

        if let Some(error) = stop_error {
            self.shared.fail(error.to_string());
            tracing::warn!(pipeline = %self.config.name, error = %error, "pipeline stop forced");
            return Err(error.into());
        }

        if !was_failed && self.shared.state() != PipelineState::Failed {
            self.shared.set_state(PipelineState::Stopped);
        }
        tracing::info!(pipeline = %self.config.name, "pipeline stopped");
        Ok(())
    }

    /// 파이프라인을 재시작합니다. 카운터는 리셋되고 플러그인은 설정에서
    /// 다시 생성됩니다.
    pub async fn restart(&mut self) -> Result<(), LogflowError> {
        self.stop().await?;
        self.start().await
    }
}

/// 한 단계의 태스크들을 유예 시간 내에 join하고, 초과분은 강제
/// 중단합니다. panic으로 종료된 태스크는 파이프라인 실패로 기록됩니다.
async fn join_stage(
    handles: &mut Vec<JoinHandle<()>>,
    grace: Duration,
    stage: &'static str,
    shared: &PipelineShared,
) -> Result<(), PipelineError> {
    let deadline = Instant::now() + grace;
    let mut timed_out = false;

    for mut handle in handles.drain(..) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    shared.fail(format!("task panicked in stage '{stage}'"));
                }
            }
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                timed_out = true;
            }
        }
    }

    if timed_out {
        Err(PipelineError::StopTimeout { stage })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_core::config::PipelineConfigBuilder;
    use logflow_core::event::Batch;
    use serde_json::json;

    use crate::sinks::ChannelSink;
    use crate::sources::ChannelSource;

    /// 채널 소스/싱크가 연결된 테스트 레지스트리를 만듭니다.
    fn test_registry(
        capacity: usize,
    ) -> (
        Arc<PluginRegistry>,
        mpsc::Sender<LogEvent>,
        mpsc::Receiver<Batch>,
    ) {
        let (source_factory, inject) = ChannelSource::factory(capacity);
        let (sink_factory, observe) = ChannelSink::factory(capacity);
        let mut registry = crate::builtin_registry();
        registry
            .register_source("test-channel", source_factory)
            .unwrap();
        registry
            .register_sink("test-channel", sink_factory)
            .unwrap();
        (Arc::new(registry), inject, observe)
    }

    fn config(batch_size: usize, timeout_secs: f64) -> PipelineConfig {
        PipelineConfigBuilder::new("unit")
            .source("in", "test-channel", json!({}))
            .sink("out", "test-channel", json!({}))
            .batch_size(batch_size)
            .batch_timeout_secs(timeout_secs)
            .stop_grace_secs(5)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn events_flow_end_to_end() {
        let (registry, inject, mut observe) = test_registry(64);
        let mut pipeline = Pipeline::new(config(2, 30.0), registry).unwrap();

        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);

        inject.send(LogEvent::new("a", "t")).await.unwrap();
        inject.send(LogEvent::new("b", "t")).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(2), observe.recv())
            .await
            .expect("batch should arrive")
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.events[0].raw_data, "a");
        assert_eq!(batch.events[1].raw_data, "b");

        drop(inject);
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.events_emitted, 2);
        assert_eq!(snapshot.events_processed, 2);
        assert_eq!(snapshot.events_dropped, 0);
    }

    #[tokio::test]
    async fn stop_drains_in_flight_events() {
        let (registry, inject, mut observe) = test_registry(64);
        // 큰 batch_size + 긴 타임아웃: 드레인만이 배치를 방출할 수 있음
        let mut pipeline = Pipeline::new(config(1000, 3600.0), registry).unwrap();

        pipeline.start().await.unwrap();
        for i in 0..5 {
            inject.send(LogEvent::new(format!("e{i}"), "t")).await.unwrap();
        }
        drop(inject);

        pipeline.stop().await.unwrap();

        let batch = observe.recv().await.expect("drained batch");
        assert_eq!(batch.len(), 5);
        assert_eq!(pipeline.snapshot().events_processed, 5);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (registry, _inject, _observe) = test_registry(8);
        let mut pipeline = Pipeline::new(config(10, 1.0), registry).unwrap();

        pipeline.start().await.unwrap();
        pipeline.start().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (registry, _inject, _observe) = test_registry(8);
        let mut pipeline = Pipeline::new(config(10, 1.0), registry).unwrap();

        // 시작 전 stop은 no-op
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Created);

        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn unknown_plugin_type_fails_at_load() {
        let (registry, _inject, _observe) = test_registry(8);
        let config = PipelineConfigBuilder::new("bad")
            .source("in", "nonexistent-type", json!({}))
            .sink("out", "test-channel", json!({}))
            .build()
            .unwrap();
        let err = Pipeline::new(config, registry).unwrap_err();
        assert!(err.to_string().contains("nonexistent-type"));
    }

    #[tokio::test]
    async fn processor_chain_filters_events() {
        let (registry, inject, mut observe) = test_registry(64);
        let config = PipelineConfigBuilder::new("filtered")
            .source("in", "test-channel", json!({}))
            .processor("parse", "json", json!({"target_field": ""}))
            .processor("keep-errors", "filter", json!({"condition": "level == 'ERROR'"}))
            .sink("out", "test-channel", json!({}))
            .batch_size(1)
            .stop_grace_secs(5)
            .build()
            .unwrap();
        let mut pipeline = Pipeline::new(config, registry).unwrap();
        pipeline.start().await.unwrap();

        inject
            .send(LogEvent::new(r#"{"level":"DEBUG"}"#, "t"))
            .await
            .unwrap();
        inject
            .send(LogEvent::new(r#"{"level":"ERROR"}"#, "t"))
            .await
            .unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(2), observe.recv())
            .await
            .expect("batch should arrive")
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.events[0].field("level"), Some(&json!("ERROR")));

        drop(inject);
        pipeline.stop().await.unwrap();

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.events_emitted, 2);
        assert_eq!(snapshot.events_processed, 1);
        assert_eq!(snapshot.events_dropped, 1);
    }

    #[tokio::test]
    async fn restart_resets_counters_and_rebuilds_plugins() {
        // 채널 플러그인은 1회용이므로 재시작 테스트는 파일 소스/싱크로 수행
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.log");
        let out_path = dir.path().join("out.jsonl");
        std::fs::write(&in_path, "line 1\nline 2\n").unwrap();

        let registry = Arc::new(crate::builtin_registry());
        let config = PipelineConfigBuilder::new("restartable")
            .source(
                "in",
                "file",
                json!({"path": in_path, "read_from_start": true, "tail": false}),
            )
            .sink("out", "file", json!({"path": out_path}))
            .batch_size(10)
            .batch_timeout_secs(0.05)
            .stop_grace_secs(5)
            .build()
            .unwrap();
        let mut pipeline = Pipeline::new(config, registry).unwrap();

        pipeline.start().await.unwrap();
        // 비-tail 소스는 EOF에서 스스로 종료하므로 드레인이 끝나길 기다림
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.snapshot().events_processed, 2);

        pipeline.restart().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        // 재시작 직후 카운터는 리셋됨 (소스는 다시 EOF부터 처음까지 재독)
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await.unwrap();
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.events_processed, 2, "counters reset on restart");
    }

    #[tokio::test]
    async fn fatal_sink_marks_pipeline_failed() {
        let (source_factory, inject) = ChannelSource::factory(8);
        let (sink_factory, observe) = ChannelSink::factory(1);
        let mut registry = PluginRegistry::new();
        registry.register_source("test-channel", source_factory).unwrap();
        registry.register_sink("test-channel", sink_factory).unwrap();

        let config = PipelineConfigBuilder::new("doomed")
            .source("in", "test-channel", json!({}))
            .sink("out", "test-channel", json!({}))
            .batch_size(1)
            .stop_grace_secs(5)
            .build()
            .unwrap();
        let mut pipeline = Pipeline::new(config, Arc::new(registry)).unwrap();
        pipeline.start().await.unwrap();

        // 관찰 채널을 닫으면 채널 싱크의 write가 치명적 실패가 됨
        drop(observe);
        inject.send(LogEvent::new("x", "t")).await.unwrap();

        // 실패 전파 대기
        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.state() != PipelineState::Failed && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pipeline.state(), PipelineState::Failed);
        let snapshot = pipeline.snapshot();
        assert!(snapshot.failure_reason.is_some());

        drop(inject);
        // 실패한 파이프라인의 stop은 정리를 수행하고 실패 상태를 유지
        let _ = pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }
}
