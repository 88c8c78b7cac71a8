//! 정규식 프로세서 -- 이름 있는 캡처 그룹으로 필드 추출
//!
//! 하나 이상의 패턴을 순서대로 시도하며, 첫 번째로 매칭된 패턴의
//! 캡처가 필드로 기록됩니다. 패턴은 로드 시점에 컴파일됩니다.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use logflow_core::PluginRecord;
use logflow_core::error::{ConfigError, ProcessorError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::Processor;

/// 정규식 프로세서 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RegexConfig {
    /// 매칭 대상 필드 경로
    pub field: String,
    /// 단일 패턴 (patterns와 함께 사용 가능)
    pub pattern: Option<String>,
    /// 패턴 목록. 순서대로 시도합니다.
    pub patterns: Vec<String>,
    /// 캡처를 이 필드 아래 중첩 객체로 기록합니다. 비어있으면 최상위에 기록합니다.
    pub target_field: String,
    /// 매칭 성공 시 소스 필드 보존 여부
    pub preserve_original: bool,
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            field: "raw_data".to_owned(),
            pattern: None,
            patterns: Vec::new(),
            target_field: String::new(),
            preserve_original: true,
        }
    }
}

/// 정규식 프로세서
pub struct RegexProcessor {
    name: String,
    field: String,
    target_field: String,
    preserve_original: bool,
    compiled: Vec<Regex>,
}

impl RegexProcessor {
    /// 플러그인 레코드에서 프로세서를 생성합니다.
    ///
    /// 컴파일되지 않는 패턴은 이 시점에 거부됩니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: RegexConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("processors.{}", record.name),
                    reason: e.to_string(),
                }
            })?;

        let mut patterns = Vec::new();
        if let Some(pattern) = config.pattern {
            patterns.push(pattern);
        }
        patterns.extend(config.patterns);

        if patterns.is_empty() {
            return Err(ConfigError::MissingField {
                field: "pattern".to_owned(),
            });
        }

        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidValue {
                    field: "pattern".to_owned(),
                    reason: format!("invalid regex '{p}': {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: record.name.clone(),
            field: config.field,
            target_field: config.target_field,
            preserve_original: config.preserve_original,
            compiled,
        })
    }

    fn source_text(&self, event: &LogEvent) -> Option<String> {
        if self.field == "raw_data" {
            if event.raw_data.is_empty() {
                None
            } else {
                Some(event.raw_data.clone())
            }
        } else {
            event.field_str(&self.field).filter(|s| !s.is_empty())
        }
    }

    /// 캡처 결과를 이벤트에 기록합니다.
    fn apply_captures(&self, event: &mut LogEvent, extracted: Map<String, Value>) {
        if self.target_field.is_empty() {
            for (key, value) in extracted {
                event.add_field(key, value);
            }
        } else {
            event.add_field(self.target_field.clone(), Value::Object(extracted));
        }
    }
}

impl Processor for RegexProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut event: LogEvent) -> Result<Vec<LogEvent>, ProcessorError> {
        let Some(text) = self.source_text(&event) else {
            return Ok(vec![event]);
        };

        let mut matched = false;
        for regex in &self.compiled {
            if let Some(captures) = regex.captures(&text) {
                let mut extracted = Map::new();
                for name in regex.capture_names().flatten() {
                    if let Some(capture) = captures.name(name) {
                        extracted.insert(
                            name.to_owned(),
                            Value::String(capture.as_str().to_owned()),
                        );
                    }
                }
                self.apply_captures(&mut event, extracted);
                matched = true;
                // 첫 번째로 성공한 패턴이 우선
                break;
            }
        }

        if matched && !self.preserve_original && self.field != "raw_data" {
            event.remove_field(&self.field);
        }

        Ok(vec![event])
    }

    async fn close(&self) {}
}
