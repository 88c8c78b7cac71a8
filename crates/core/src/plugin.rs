//! 플러그인 시스템 -- Source / Processor / Sink 계약과 타입 태그 레지스트리
//!
//! 세 가지 플러그인 계약과, 타입 태그를 팩토리에 매핑하는
//! [`PluginRegistry`]를 정의합니다. 레지스트리는 프로세스 초기화 시점에
//! 구성된 뒤 불변으로 공유됩니다.
//!
//! # 생명주기
//! ```text
//! factory(record) -> 인스턴스 생성 (설정 파싱/컴파일, 로드 시점 검증)
//! Sink::open()    -> 외부 리소스 획득 (파이프라인 시작 단계)
//! run/process/write -> 데이터 경로
//! close()         -> 리소스 해제 (정지 단계)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc};

use crate::config::{BackpressureMode, PluginRecord};
use crate::error::{ConfigError, ProcessorError, SinkError, SourceError};
use crate::event::{Batch, LogEvent};

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── EventSender ─────────────────────────────────────────────────────

/// 소스가 파이프라인에 이벤트를 전달하는 핸들
///
/// 유입 큐가 가득 찼을 때의 동작은 소스별 백프레셔 정책을 따릅니다.
/// [`BackpressureMode::Block`]은 공간이 생길 때까지 대기하고,
/// [`BackpressureMode::Drop`]은 이벤트를 드롭하며 카운트합니다.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<LogEvent>,
    mode: BackpressureMode,
    emitted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// 새 이벤트 송신 핸들을 생성합니다.
    pub fn new(
        tx: mpsc::Sender<LogEvent>,
        mode: BackpressureMode,
        emitted: Arc<AtomicU64>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            mode,
            emitted,
            dropped,
        }
    }

    /// 이벤트를 유입 큐에 전달합니다.
    ///
    /// 큐가 닫혔으면 (파이프라인 정지 중) `SourceError::ChannelClosed`를
    /// 반환하며, 소스는 이를 수집 종료 신호로 취급해야 합니다.
    pub async fn emit(&self, event: LogEvent) -> Result<(), SourceError> {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(crate::metrics::EVENTS_EMITTED_TOTAL).increment(1);
        match self.mode {
            BackpressureMode::Block => self
                .tx
                .send(event)
                .await
                .map_err(|_| SourceError::ChannelClosed),
            BackpressureMode::Drop => match self.tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    metrics::counter!(crate::metrics::EVENTS_DROPPED_TOTAL).increment(1);
                    tracing::warn!(dropped = dropped, "ingest queue full, event dropped");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(SourceError::ChannelClosed),
            },
        }
    }

    /// 지금까지 emit된 이벤트 수를 반환합니다.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

// ─── Source ──────────────────────────────────────────────────────────

/// 소스 플러그인 -- 잠재적으로 무한한 이벤트 시퀀스를 생산합니다.
///
/// 팩토리가 설정을 검증하고 인스턴스를 생성하면, 파이프라인이 소스별
/// 태스크에서 [`Source::run`]을 실행합니다. `shutdown` 신호를 받으면
/// 유예 시간 내에 반환해야 하며, 그 전에 내부 버퍼를 가능한 만큼
/// 전달합니다.
pub trait Source: Send + Sync {
    /// 소스 인스턴스 이름
    fn name(&self) -> &str;

    /// 유입 큐 백프레셔 정책 (기본: 블록)
    fn backpressure(&self) -> BackpressureMode {
        BackpressureMode::Block
    }

    /// 이벤트 생산 루프를 실행합니다.
    ///
    /// `emit`으로 이벤트를 전달하고, `shutdown` 수신 시 정리 후
    /// 반환합니다. 반환 시점에 모든 리소스가 해제되어야 합니다.
    fn run(
        &mut self,
        emit: EventSender,
        shutdown: broadcast::Receiver<()>,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// dyn-compatible 소스 trait
///
/// `Source`는 RPITIT를 사용하므로 `dyn Source`가 불가합니다.
/// blanket impl로 모든 `Source` 구현이 자동으로 `DynSource`가 됩니다.
pub trait DynSource: Send + Sync {
    /// 소스 인스턴스 이름
    fn name(&self) -> &str;

    /// 유입 큐 백프레셔 정책
    fn backpressure(&self) -> BackpressureMode;

    /// 이벤트 생산 루프를 실행합니다.
    fn run(
        &mut self,
        emit: EventSender,
        shutdown: broadcast::Receiver<()>,
    ) -> BoxFuture<'_, Result<(), SourceError>>;
}

impl fmt::Debug for dyn DynSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynSource").field(&self.name()).finish()
    }
}

impl<T: Source> DynSource for T {
    fn name(&self) -> &str {
        Source::name(self)
    }

    fn backpressure(&self) -> BackpressureMode {
        Source::backpressure(self)
    }

    fn run(
        &mut self,
        emit: EventSender,
        shutdown: broadcast::Receiver<()>,
    ) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(Source::run(self, emit, shutdown))
    }
}

// ─── Processor ───────────────────────────────────────────────────────

/// 프로세서 플러그인 -- 이벤트 하나를 0개, 1개, 여러 개로 변환합니다.
///
/// 빈 Vec 반환이 이벤트 드롭의 표준 방식입니다. 컴파일 가능한 상태
/// (정규식, grok 템플릿, 룩업 테이블, 필터 표현식)는 팩토리에서
/// 구성되며, 컴파일에 실패하는 설정은 파이프라인 시작 전에 거부됩니다.
///
/// 프로세서는 CPU 바운드로 간주되며 I/O 대기를 하지 않아야 합니다.
/// 예외적으로 블로킹이 필요한 프로세서(`enrich`의 dns 모드)는 제한
/// 시간을 가진 비동기 해석을 사용합니다.
pub trait Processor: Send + Sync {
    /// 프로세서 인스턴스 이름
    fn name(&self) -> &str;

    /// 이벤트를 처리합니다.
    ///
    /// 반환 규약:
    /// - `Ok(vec![event])` -- 동일/변환된 이벤트 전달
    /// - `Ok(vec![a, b, ..])` -- 분할
    /// - `Ok(vec![])` -- 드롭
    /// - `Err(..)` -- 이 이벤트에 대한 구조화 에러 (드라이버가 드롭 + 카운트)
    fn process(
        &self,
        event: LogEvent,
    ) -> impl Future<Output = Result<Vec<LogEvent>, ProcessorError>> + Send;

    /// 리소스를 해제합니다.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// dyn-compatible 프로세서 trait
pub trait DynProcessor: Send + Sync {
    /// 프로세서 인스턴스 이름
    fn name(&self) -> &str;

    /// 이벤트를 처리합니다.
    fn process(&self, event: LogEvent) -> BoxFuture<'_, Result<Vec<LogEvent>, ProcessorError>>;

    /// 리소스를 해제합니다.
    fn close(&self) -> BoxFuture<'_, ()>;
}

impl<T: Processor> DynProcessor for T {
    fn name(&self) -> &str {
        Processor::name(self)
    }

    fn process(&self, event: LogEvent) -> BoxFuture<'_, Result<Vec<LogEvent>, ProcessorError>> {
        Box::pin(Processor::process(self, event))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(Processor::close(self))
    }
}

// ─── Sink ────────────────────────────────────────────────────────────

/// 싱크 플러그인 -- 배치를 소비합니다.
///
/// `write`는 싱크 관점에서 원자적으로 배치를 전달합니다 (최선 노력).
/// [`SinkError::Retryable`]은 지수 백오프 재시도를, [`SinkError::Fatal`]은
/// 파이프라인 실패 전환을 유발합니다. 싱크는 전달받은 배치를 변경해서는
/// 안 됩니다.
pub trait Sink: Send + Sync {
    /// 싱크 인스턴스 이름
    fn name(&self) -> &str;

    /// 외부 리소스를 연결하고 대상을 검증합니다.
    ///
    /// 파이프라인 시작 단계에서 태스크 기동 전에 호출됩니다.
    fn open(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// 배치를 전달합니다.
    fn write(&mut self, batch: &Batch) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// 진행 중인 쓰기가 모두 내구화되거나 실패할 때까지 블록합니다.
    fn flush(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// flush 후 리소스를 해제합니다.
    fn close(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// dyn-compatible 싱크 trait
pub trait DynSink: Send + Sync {
    /// 싱크 인스턴스 이름
    fn name(&self) -> &str;

    /// 외부 리소스를 연결합니다.
    fn open(&mut self) -> BoxFuture<'_, Result<(), SinkError>>;

    /// 배치를 전달합니다.
    fn write<'a>(&'a mut self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>>;

    /// 진행 중인 쓰기를 내구화합니다.
    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>>;

    /// flush 후 리소스를 해제합니다.
    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>>;
}

impl<T: Sink> DynSink for T {
    fn name(&self) -> &str {
        Sink::name(self)
    }

    fn open(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(Sink::open(self))
    }

    fn write<'a>(&'a mut self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(Sink::write(self, batch))
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(Sink::flush(self))
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(Sink::close(self))
    }
}

// ─── PluginRegistry ──────────────────────────────────────────────────

/// 소스 팩토리: 플러그인 레코드에서 설정된 소스 인스턴스를 생성합니다.
pub type SourceFactory =
    Arc<dyn Fn(&PluginRecord) -> Result<Box<dyn DynSource>, ConfigError> + Send + Sync>;

/// 프로세서 팩토리
pub type ProcessorFactory =
    Arc<dyn Fn(&PluginRecord) -> Result<Box<dyn DynProcessor>, ConfigError> + Send + Sync>;

/// 싱크 팩토리
pub type SinkFactory =
    Arc<dyn Fn(&PluginRecord) -> Result<Box<dyn DynSink>, ConfigError> + Send + Sync>;

/// 플러그인 레지스트리 -- 타입 태그를 팩토리에 매핑합니다.
///
/// 프로세스 초기화 시점에 구성된 뒤 `Arc`로 불변 공유됩니다.
/// 알 수 없는 타입 태그는 로드 시점 실패입니다.
///
/// # 사용 예시
/// ```ignore
/// let mut registry = PluginRegistry::new();
/// registry.register_processor("json", Arc::new(|record| {
///     Ok(Box::new(JsonProcessor::from_record(record)?))
/// }))?;
/// let registry = Arc::new(registry);
/// ```
#[derive(Default)]
pub struct PluginRegistry {
    sources: HashMap<String, SourceFactory>,
    processors: HashMap<String, ProcessorFactory>,
    sinks: HashMap<String, SinkFactory>,
}

impl PluginRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 소스 팩토리를 등록합니다. 동일 태그 재등록은 에러입니다.
    pub fn register_source(
        &mut self,
        type_tag: impl Into<String>,
        factory: SourceFactory,
    ) -> Result<(), ConfigError> {
        let type_tag = type_tag.into();
        if self.sources.contains_key(&type_tag) {
            return Err(ConfigError::AlreadyRegistered { type_tag });
        }
        self.sources.insert(type_tag, factory);
        Ok(())
    }

    /// 프로세서 팩토리를 등록합니다.
    pub fn register_processor(
        &mut self,
        type_tag: impl Into<String>,
        factory: ProcessorFactory,
    ) -> Result<(), ConfigError> {
        let type_tag = type_tag.into();
        if self.processors.contains_key(&type_tag) {
            return Err(ConfigError::AlreadyRegistered { type_tag });
        }
        self.processors.insert(type_tag, factory);
        Ok(())
    }

    /// 싱크 팩토리를 등록합니다.
    pub fn register_sink(
        &mut self,
        type_tag: impl Into<String>,
        factory: SinkFactory,
    ) -> Result<(), ConfigError> {
        let type_tag = type_tag.into();
        if self.sinks.contains_key(&type_tag) {
            return Err(ConfigError::AlreadyRegistered { type_tag });
        }
        self.sinks.insert(type_tag, factory);
        Ok(())
    }

    /// 레코드의 타입 태그로 소스 인스턴스를 생성합니다.
    pub fn create_source(&self, record: &PluginRecord) -> Result<Box<dyn DynSource>, ConfigError> {
        let factory =
            self.sources
                .get(&record.type_tag)
                .ok_or_else(|| ConfigError::UnknownPluginType {
                    kind: "source",
                    type_tag: record.type_tag.clone(),
                })?;
        factory(record)
    }

    /// 레코드의 타입 태그로 프로세서 인스턴스를 생성합니다.
    pub fn create_processor(
        &self,
        record: &PluginRecord,
    ) -> Result<Box<dyn DynProcessor>, ConfigError> {
        let factory =
            self.processors
                .get(&record.type_tag)
                .ok_or_else(|| ConfigError::UnknownPluginType {
                    kind: "processor",
                    type_tag: record.type_tag.clone(),
                })?;
        factory(record)
    }

    /// 레코드의 타입 태그로 싱크 인스턴스를 생성합니다.
    pub fn create_sink(&self, record: &PluginRecord) -> Result<Box<dyn DynSink>, ConfigError> {
        let factory =
            self.sinks
                .get(&record.type_tag)
                .ok_or_else(|| ConfigError::UnknownPluginType {
                    kind: "sink",
                    type_tag: record.type_tag.clone(),
                })?;
        factory(record)
    }

    /// 등록된 타입 태그 수를 (소스, 프로세서, 싱크) 순으로 반환합니다.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.sources.len(), self.processors.len(), self.sinks.len())
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}
