//! 파일 싱크 -- 이벤트를 파일에 기록
//!
//! `json` 형식은 이벤트 전체를 JSON Lines로, `text` 형식은 템플릿으로
//! 렌더링하여 기록합니다. 배치 단위로 버퍼를 플러시합니다.

use std::path::PathBuf;

use chrono::SecondsFormat;
use serde::Deserialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use logflow_core::PluginRecord;
use logflow_core::error::{ConfigError, SinkError};
use logflow_core::event::{Batch, LogEvent};
use logflow_core::plugin::Sink;

/// 출력 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSinkFormat {
    /// 이벤트 전체를 JSON Lines로 기록 (기본값)
    #[default]
    Json,
    /// 템플릿 기반 텍스트 기록
    Text,
}

/// 파일 싱크 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSinkConfig {
    /// 출력 파일 경로
    pub path: PathBuf,
    /// 출력 형식
    #[serde(default)]
    pub format: FileSinkFormat,
    /// 기존 파일에 이어쓰기 여부
    #[serde(default = "default_append")]
    pub append: bool,
    /// text 형식의 라인 템플릿. `{name}` 자리에 값이 치환됩니다.
    #[serde(default = "default_template")]
    pub template: String,
    /// text 형식에서 `{message}`로 사용할 필드
    #[serde(default = "default_message_field")]
    pub message_field: String,
}

fn default_append() -> bool {
    true
}

fn default_template() -> String {
    "{timestamp} {message}".to_owned()
}

fn default_message_field() -> String {
    "message".to_owned()
}

/// 파일 싱크
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// 플러그인 레코드에서 싱크를 생성합니다.
    ///
    /// 파일은 이 시점이 아니라 `open()`에서 열립니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: FileSinkConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("sinks.{}", record.name),
                    reason: e.to_string(),
                }
            })?;
        Ok(Self {
            name: record.name.clone(),
            config,
            writer: None,
        })
    }

    /// 템플릿의 `{name}` 자리 표시자를 이벤트 값으로 치환합니다.
    ///
    /// 알 수 없는 자리 표시자가 있으면 `None`을 반환하며, 호출자는
    /// 단순화된 대체 라인을 사용합니다.
    fn render_template(&self, event: &LogEvent) -> Option<String> {
        let mut rendered = String::with_capacity(self.config.template.len() + 32);
        let mut chars = self.config.template.chars();

        while let Some(ch) = chars.next() {
            if ch != '{' {
                rendered.push(ch);
                continue;
            }
            let mut key = String::new();
            let mut terminated = false;
            for inner in chars.by_ref() {
                if inner == '}' {
                    terminated = true;
                    break;
                }
                key.push(inner);
            }
            if !terminated {
                return None;
            }
            rendered.push_str(&self.resolve_placeholder(event, &key)?);
        }

        Some(rendered)
    }

    fn resolve_placeholder(&self, event: &LogEvent, key: &str) -> Option<String> {
        match key {
            "id" => Some(event.id.clone()),
            "timestamp" => Some(event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
            "source" => Some(event.source.clone()),
            "raw_data" => Some(event.raw_data.clone()),
            "message" => Some(
                event
                    .field_str(&self.config.message_field)
                    .unwrap_or_else(|| event.raw_data.clone()),
            ),
            field => event
                .field_str(field)
                .or_else(|| event.field(field).map(|v| v.to_string())),
        }
    }

    fn render_line(&self, event: &LogEvent) -> Result<String, SinkError> {
        match self.config.format {
            FileSinkFormat::Json => serde_json::to_string(event)
                .map_err(|e| SinkError::Fatal(format!("event serialization failed: {e}"))),
            FileSinkFormat::Text => Ok(self.render_template(event).unwrap_or_else(|| {
                format!(
                    "{} {}",
                    event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                    event.raw_data
                )
            })),
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<(), SinkError> {
        if let Some(parent) = self.config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::Fatal(format!("cannot create output directory: {e}")))?;
        }

        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if self.config.append {
            options.append(true);
        } else {
            options.truncate(true);
        }

        let file = options
            .open(&self.config.path)
            .await
            .map_err(|e| SinkError::Fatal(format!("cannot open output file: {e}")))?;

        self.writer = Some(BufWriter::new(file));
        tracing::info!(
            sink = %self.name,
            path = %self.config.path.display(),
            "file sink opened"
        );
        Ok(())
    }

    async fn write(&mut self, batch: &Batch) -> Result<(), SinkError> {
        let lines: Vec<String> = batch
            .iter()
            .map(|event| self.render_line(event))
            .collect::<Result<_, _>>()?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Fatal("sink is not open".to_owned()))?;

        for line in lines {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.shutdown().await?;
        }
        tracing::info!(sink = %self.name, "file sink closed");
        Ok(())
    }
}
