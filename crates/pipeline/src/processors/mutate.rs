//! Mutate 프로세서 -- 필드 구조 편집
//!
//! 고정된 순서로 필드를 편집합니다:
//! rename → convert → uppercase/lowercase → strip → gsub → add → remove.
//! 이 순서는 계약의 일부입니다. 빈 설정은 항등 변환입니다.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use logflow_core::PluginRecord;
use logflow_core::error::{ConfigError, ProcessorError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::Processor;

/// convert_fields의 대상 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertType {
    Int,
    Float,
    String,
    Bool,
}

/// Mutate 프로세서 설정
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MutateConfig {
    /// 필드 이름 변경 (old -> new)
    pub rename_fields: BTreeMap<String, String>,
    /// 필드 타입 변환 (field -> 타입)
    pub convert_fields: BTreeMap<String, ConvertType>,
    /// 대문자 변환 대상 필드
    pub uppercase_fields: Vec<String>,
    /// 소문자 변환 대상 필드
    pub lowercase_fields: Vec<String>,
    /// 공백 제거 대상 필드
    pub strip_fields: Vec<String>,
    /// 정규식 치환 (field -> [pattern, replacement])
    pub gsub_fields: BTreeMap<String, (String, String)>,
    /// 추가할 필드. 기존 값을 덮어씁니다.
    pub add_fields: Map<String, Value>,
    /// 제거할 필드
    pub remove_fields: Vec<String>,
}

/// Mutate 프로세서
pub struct MutateProcessor {
    name: String,
    config: MutateConfig,
    gsub_compiled: BTreeMap<String, (Regex, String)>,
}

impl MutateProcessor {
    /// 플러그인 레코드에서 프로세서를 생성합니다.
    ///
    /// gsub 패턴은 이 시점에 컴파일되며, 잘못된 패턴은 거부됩니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: MutateConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("processors.{}", record.name),
                    reason: e.to_string(),
                }
            })?;

        let mut gsub_compiled = BTreeMap::new();
        for (field, (pattern, replacement)) in &config.gsub_fields {
            let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: format!("gsub_fields.{field}"),
                reason: format!("invalid regex '{pattern}': {e}"),
            })?;
            gsub_compiled.insert(field.clone(), (regex, replacement.clone()));
        }

        Ok(Self {
            name: record.name.clone(),
            config,
            gsub_compiled,
        })
    }

    fn convert_value(value: &Value, target: ConvertType) -> Result<Value, String> {
        match target {
            ConvertType::Int => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(Value::from)
                    .ok_or_else(|| format!("cannot convert {n} to int")),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| format!("cannot convert '{s}' to int")),
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                other => Err(format!("cannot convert {other} to int")),
            },
            ConvertType::Float => match value {
                Value::Number(n) => n
                    .as_f64()
                    .map(Value::from)
                    .ok_or_else(|| format!("cannot convert {n} to float")),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .map_err(|_| format!("cannot convert '{s}' to float")),
                other => Err(format!("cannot convert {other} to float")),
            },
            ConvertType::String => match value {
                Value::String(s) => Ok(Value::String(s.clone())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("cannot convert {other} to string")),
            },
            ConvertType::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) => {
                    let lowered = s.to_lowercase();
                    Ok(Value::Bool(matches!(
                        lowered.as_str(),
                        "true" | "yes" | "y" | "1"
                    )))
                }
                Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
                other => Err(format!("cannot convert {other} to bool")),
            },
        }
    }

    fn apply_string_edit(event: &mut LogEvent, field: &str, edit: impl Fn(&str) -> String) {
        if let Some(Value::String(s)) = event.fields.get(field) {
            let edited = edit(s);
            event.add_field(field.to_owned(), Value::String(edited));
        }
    }
}

impl Processor for MutateProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut event: LogEvent) -> Result<Vec<LogEvent>, ProcessorError> {
        // 1. rename
        for (old_name, new_name) in &self.config.rename_fields {
            if let Some(value) = event.remove_field(old_name) {
                event.add_field(new_name.clone(), value);
            }
        }

        // 2. convert
        for (field, target) in &self.config.convert_fields {
            let Some(value) = event.fields.get(field) else {
                continue;
            };
            match Self::convert_value(value, *target) {
                Ok(converted) => event.add_field(field.clone(), converted),
                Err(reason) => {
                    // 변환 실패 시 필드는 그대로 두고 메타데이터로 기록
                    event.add_metadata(format!("convert_error_{field}"), reason);
                }
            }
        }

        // 3. uppercase / lowercase
        for field in &self.config.uppercase_fields {
            Self::apply_string_edit(&mut event, field, str::to_uppercase);
        }
        for field in &self.config.lowercase_fields {
            Self::apply_string_edit(&mut event, field, str::to_lowercase);
        }

        // 4. strip
        for field in &self.config.strip_fields {
            Self::apply_string_edit(&mut event, field, |s| s.trim().to_owned());
        }

        // 5. gsub
        for (field, (regex, replacement)) in &self.gsub_compiled {
            Self::apply_string_edit(&mut event, field, |s| {
                regex.replace_all(s, replacement.as_str()).into_owned()
            });
        }

        // 6. add
        for (field, value) in &self.config.add_fields {
            event.add_field(field.clone(), value.clone());
        }

        // 7. remove
        for field in &self.config.remove_fields {
            event.remove_field(field);
        }

        Ok(vec![event])
    }

    async fn close(&self) {}
}
