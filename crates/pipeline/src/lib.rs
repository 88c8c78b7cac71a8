#![doc = include_str!("../README.md")]

use std::sync::Arc;

use logflow_core::plugin::PluginRegistry;

mod batcher;
mod sink_worker;

pub mod metrics;
pub mod pipeline;
pub mod processors;
pub mod sink_queue;
pub mod sinks;
pub mod sources;

// --- 주요 타입 re-export ---

pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{Pipeline, PipelineState};
pub use sink_queue::SinkQueue;

/// 모든 내장 플러그인이 등록된 레지스트리를 생성합니다.
///
/// 타입 태그:
/// - 소스: `file`
/// - 프로세서: `json`, `filter`, `regex`, `grok`, `mutate`, `enrich`
/// - 싱크: `file`
///
/// 호출자는 반환된 레지스트리에 자체 플러그인을 추가 등록한 뒤
/// `Arc`로 감싸 엔진에 전달합니다.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    registry
        .register_source(
            "file",
            Arc::new(|record| Ok(Box::new(sources::FileSource::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");

    registry
        .register_processor(
            "json",
            Arc::new(|record| Ok(Box::new(processors::JsonProcessor::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");
    registry
        .register_processor(
            "filter",
            Arc::new(|record| Ok(Box::new(processors::FilterProcessor::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");
    registry
        .register_processor(
            "regex",
            Arc::new(|record| Ok(Box::new(processors::RegexProcessor::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");
    registry
        .register_processor(
            "grok",
            Arc::new(|record| Ok(Box::new(processors::GrokProcessor::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");
    registry
        .register_processor(
            "mutate",
            Arc::new(|record| Ok(Box::new(processors::MutateProcessor::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");
    registry
        .register_processor(
            "enrich",
            Arc::new(|record| Ok(Box::new(processors::EnrichProcessor::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");

    registry
        .register_sink(
            "file",
            Arc::new(|record| Ok(Box::new(sinks::FileSink::from_record(record)?))),
        )
        .expect("empty registry cannot hold duplicates");

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflow_core::PluginRecord;
    use serde_json::json;

    #[test]
    fn builtin_registry_registers_all_tags() {
        let registry = builtin_registry();
        let (sources, processors, sinks) = registry.counts();
        assert_eq!(sources, 1);
        assert_eq!(processors, 6);
        assert_eq!(sinks, 1);
    }

    #[test]
    fn builtin_factories_produce_plugins() {
        let registry = builtin_registry();

        let source = registry
            .create_source(&PluginRecord::new("in", "file", json!({"path": "/tmp/a.log"})))
            .unwrap();
        assert_eq!(source.name(), "in");

        let processor = registry
            .create_processor(&PluginRecord::new("p", "mutate", json!({})))
            .unwrap();
        assert_eq!(processor.name(), "p");

        let sink = registry
            .create_sink(&PluginRecord::new("out", "file", json!({"path": "/tmp/b.log"})))
            .unwrap();
        assert_eq!(sink.name(), "out");
    }

    #[test]
    fn builtin_factories_reject_bad_configs() {
        let registry = builtin_registry();
        assert!(
            registry
                .create_processor(&PluginRecord::new(
                    "p",
                    "filter",
                    json!({"condition": "a =="})
                ))
                .is_err()
        );
        assert!(
            registry
                .create_sink(&PluginRecord::new("out", "file", json!({})))
                .is_err()
        );
    }
}
