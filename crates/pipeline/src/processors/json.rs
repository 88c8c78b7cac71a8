//! JSON 프로세서 -- 필드의 JSON 텍스트를 구조화 필드로 파싱
//!
//! 소스 필드(기본: `raw_data`)의 JSON을 파싱하여 `target_field`에
//! 기록합니다. `target_field`가 빈 문자열이면 파싱된 객체를 이벤트
//! 최상위 필드에 병합하며, 키 충돌 시 파싱된 값이 우선합니다.

use serde::Deserialize;
use serde_json::Value;

use logflow_core::PluginRecord;
use logflow_core::error::{ConfigError, ProcessorError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::Processor;

/// JSON 프로세서 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct JsonConfig {
    /// JSON 텍스트를 담은 소스 필드 경로
    pub field: String,
    /// 파싱 결과를 기록할 필드. 빈 문자열이면 최상위에 병합합니다.
    pub target_field: String,
    /// 소스 필드 보존 여부
    pub preserve_original: bool,
    /// 파싱 실패 시 이벤트를 통과시킬지 여부
    pub ignore_errors: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            field: "raw_data".to_owned(),
            target_field: "parsed".to_owned(),
            preserve_original: true,
            ignore_errors: false,
        }
    }
}

/// JSON 프로세서
pub struct JsonProcessor {
    name: String,
    config: JsonConfig,
}

impl JsonProcessor {
    /// 플러그인 레코드에서 프로세서를 생성합니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: JsonConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("processors.{}", record.name),
                    reason: e.to_string(),
                }
            })?;
        Ok(Self {
            name: record.name.clone(),
            config,
        })
    }

    fn source_text(&self, event: &LogEvent) -> Option<String> {
        if self.config.field == "raw_data" {
            if event.raw_data.is_empty() {
                None
            } else {
                Some(event.raw_data.clone())
            }
        } else {
            event.field_str(&self.config.field).filter(|s| !s.is_empty())
        }
    }
}

impl Processor for JsonProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut event: LogEvent) -> Result<Vec<LogEvent>, ProcessorError> {
        // 소스 필드가 없거나 비어있으면 그대로 통과
        let Some(text) = self.source_text(&event) else {
            return Ok(vec![event]);
        };

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                metrics::counter!(logflow_core::metrics::PROCESSING_ERRORS_TOTAL).increment(1);
                if self.config.ignore_errors {
                    event.add_metadata("json_error", e.to_string());
                    return Ok(vec![event]);
                }
                return Err(ProcessorError::Parse {
                    processor: self.name.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if self.config.target_field.is_empty() {
            // 최상위 병합: 파싱된 값이 기존 필드를 덮어씁니다
            if let Value::Object(map) = parsed {
                for (key, value) in map {
                    event.add_field(key, value);
                }
            }
        } else {
            event.add_field(self.config.target_field.clone(), parsed);
        }

        if !self.config.preserve_original && self.config.field != "raw_data" {
            event.remove_field(&self.config.field);
        }

        Ok(vec![event])
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn processor(config: serde_json::Value) -> JsonProcessor {
        JsonProcessor::from_record(&PluginRecord::new("test-json", "json", config)).unwrap()
    }

    #[tokio::test]
    async fn parses_raw_data_into_target_field() {
        let processor = processor(json!({}));
        let event = LogEvent::new(r#"{"level":"INFO","status":200}"#, "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field("parsed.level"), Some(&json!("INFO")));
        assert_eq!(out[0].field("parsed.status"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn empty_target_field_merges_at_top_level() {
        let processor = processor(json!({"target_field": ""}));
        let mut event = LogEvent::new(r#"{"level":"INFO","host":"web-01"}"#, "test");
        event.add_field("host", json!("stale"));
        let out = processor.process(event).await.unwrap();
        // 병합 충돌 시 파싱된 값이 우선
        assert_eq!(out[0].field("host"), Some(&json!("web-01")));
        assert_eq!(out[0].field("level"), Some(&json!("INFO")));
    }

    #[tokio::test]
    async fn merge_of_non_object_is_a_no_op() {
        let processor = processor(json!({"target_field": ""}));
        let event = LogEvent::new("[1, 2, 3]", "test");
        let out = processor.process(event).await.unwrap();
        assert!(out[0].fields.is_empty());
    }

    #[tokio::test]
    async fn parses_from_named_field() {
        let processor = processor(json!({"field": "payload", "target_field": "data"}));
        let mut event = LogEvent::new("", "test");
        event.add_field("payload", json!(r#"{"ok":true}"#));
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("data.ok"), Some(&json!(true)));
        // preserve_original 기본값은 true
        assert!(out[0].field("payload").is_some());
    }

    #[tokio::test]
    async fn preserve_original_false_removes_source_field() {
        let processor = processor(json!({
            "field": "payload",
            "target_field": "data",
            "preserve_original": false
        }));
        let mut event = LogEvent::new("", "test");
        event.add_field("payload", json!(r#"{"ok":true}"#));
        let out = processor.process(event).await.unwrap();
        assert!(out[0].field("payload").is_none());
        assert!(out[0].field("data").is_some());
    }

    #[tokio::test]
    async fn raw_data_is_never_removed() {
        let processor = processor(json!({"preserve_original": false, "target_field": ""}));
        let event = LogEvent::new(r#"{"a":1}"#, "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].raw_data, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn missing_source_field_passes_through() {
        let processor = processor(json!({"field": "absent"}));
        let event = LogEvent::new("not json", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].fields.is_empty());
    }

    #[tokio::test]
    async fn parse_failure_surfaces_by_default() {
        let processor = processor(json!({}));
        let event = LogEvent::new("not json at all", "test");
        let err = processor.process(event).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Parse { .. }));
    }

    #[tokio::test]
    async fn parse_failure_ignored_passes_through_with_metadata() {
        let processor = processor(json!({"ignore_errors": true}));
        let event = LogEvent::new("not json at all", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].metadata.contains_key("json_error"));
    }

    #[test]
    fn rejects_unknown_config_keys() {
        let record = PluginRecord::new("j", "json", json!({"fiedl": "typo"}));
        assert!(JsonProcessor::from_record(&record).is_err());
    }

    #[tokio::test]
    async fn round_trip_with_remove_restores_event() {
        // json 파싱 후 target_field 제거 시 원래 이벤트와 같아야 합니다
        let processor = processor(json!({}));
        let event = LogEvent::new(r#"{"a":1}"#, "test");
        let before = event.fields.clone();
        let mut out = processor.process(event).await.unwrap();
        out[0].remove_field("parsed");
        assert_eq!(out[0].fields, before);
    }
}
