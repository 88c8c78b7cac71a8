#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod plugin;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    ConfigError, LogflowError, PipelineError, ProcessorError, SinkError, SourceError,
};

// 설정
pub use config::{
    BackpressureMode, OverflowPolicy, PipelineConfig, PipelineConfigBuilder, PluginRecord,
};

// 이벤트
pub use event::{Batch, LogEvent};

// 플러그인 계약
pub use plugin::{
    BoxFuture, DynProcessor, DynSink, DynSource, EventSender, PluginRegistry, Processor,
    ProcessorFactory, Sink, SinkFactory, Source, SourceFactory,
};
