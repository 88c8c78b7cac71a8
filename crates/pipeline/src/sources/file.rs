//! 파일 소스 -- 로그 파일을 테일링하여 이벤트를 생성
//!
//! 기본 동작은 파일 끝(EOF)부터 새 라인을 수집하는 `tail -f` 방식이며,
//! `read_from_start`로 처음부터 읽을 수 있습니다. `tail: false`면
//! EOF 도달 시 수집을 종료합니다 (배치 처리용).
//!
//! # 로테이션 감지
//! - inode 변경 감지 (logrotate 등)
//! - 파일 크기 축소 감지 (truncation)

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::fs::{File, metadata};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::sleep;

use logflow_core::PluginRecord;
use logflow_core::config::BackpressureMode;
use logflow_core::error::{ConfigError, SourceError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::{EventSender, Source};

/// 한 번의 폴링에서 읽는 최대 라인 수
const MAX_LINES_PER_READ: usize = 1000;

/// 최대 라인 길이 (바이트)
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// 파일 소스 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSourceConfig {
    /// 감시할 파일 경로
    pub path: PathBuf,
    /// 파일 처음부터 읽기 여부. false면 현재 EOF부터 수집합니다.
    #[serde(default)]
    pub read_from_start: bool,
    /// 지속 수집 여부. false면 EOF 도달 시 종료합니다.
    #[serde(default = "default_tail")]
    pub tail: bool,
    /// 파일 상태 체크 주기 (밀리초)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 유입 큐 백프레셔 정책
    #[serde(default)]
    pub backpressure: BackpressureMode,
}

fn default_tail() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// 파일 소스
pub struct FileSource {
    name: String,
    config: FileSourceConfig,
    /// 마지막 읽기 위치 (바이트 오프셋)
    offset: u64,
    /// 현재 파일의 inode (Unix 전용)
    #[cfg(unix)]
    inode: Option<u64>,
    /// 읽기 에러 카운터
    read_errors: u64,
}

impl FileSource {
    /// 플러그인 레코드에서 소스를 생성합니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: FileSourceConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("sources.{}", record.name),
                    reason: e.to_string(),
                }
            })?;
        if config.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(Self {
            name: record.name.clone(),
            config,
            offset: 0,
            #[cfg(unix)]
            inode: None,
            read_errors: 0,
        })
    }

    /// 단일 파일에서 새로운 라인을 읽습니다.
    ///
    /// 주어진 오프셋부터 읽어 (라인들, 새 오프셋)을 반환합니다.
    async fn read_new_lines(path: &Path, offset: u64) -> Result<(Vec<Bytes>, u64), SourceError> {
        let file = File::open(path).await.map_err(|e| SourceError::Read {
            name: path.display().to_string(),
            reason: format!("failed to open: {e}"),
        })?;

        let mut reader = BufReader::new(file);
        reader
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| SourceError::Read {
                name: path.display().to_string(),
                reason: format!("failed to seek to offset {offset}: {e}"),
            })?;

        let mut lines = Vec::new();
        let mut current_offset = offset;
        let mut line_buffer = String::new();

        loop {
            line_buffer.clear();
            let bytes_read =
                reader
                    .read_line(&mut line_buffer)
                    .await
                    .map_err(|e| SourceError::Read {
                        name: path.display().to_string(),
                        reason: format!("failed to read line: {e}"),
                    })?;

            if bytes_read == 0 {
                break;
            }

            if line_buffer.len() > MAX_LINE_LENGTH {
                return Err(SourceError::Read {
                    name: path.display().to_string(),
                    reason: format!(
                        "line exceeds max length: {} (max: {})",
                        line_buffer.len(),
                        MAX_LINE_LENGTH
                    ),
                });
            }

            // 라인 끝이 개행이 아니면 파일 끝의 미완성 라인이므로 다음 폴링까지 보류
            if !line_buffer.ends_with('\n') {
                break;
            }

            current_offset += bytes_read as u64;

            if !line_buffer.trim().is_empty() {
                lines.push(Bytes::from(line_buffer.trim_end().to_owned()));
            }

            if lines.len() >= MAX_LINES_PER_READ {
                break;
            }
        }

        Ok((lines, current_offset))
    }

    /// 파일의 inode를 가져옵니다 (Unix 전용).
    #[cfg(unix)]
    async fn get_inode(path: &Path) -> Option<u64> {
        use std::os::unix::fs::MetadataExt;
        metadata(path).await.ok().map(|m| m.ino())
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn backpressure(&self) -> BackpressureMode {
        self.config.backpressure
    }

    async fn run(
        &mut self,
        emit: EventSender,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), SourceError> {
        let path = self.config.path.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        // 초기 오프셋: read_from_start가 아니면 현재 EOF부터
        self.offset = if self.config.read_from_start {
            0
        } else {
            metadata(&path).await.map(|m| m.len()).unwrap_or(0)
        };
        #[cfg(unix)]
        {
            self.inode = Self::get_inode(&path).await;
        }

        tracing::info!(
            source = %self.name,
            path = %path.display(),
            offset = self.offset,
            "file source started"
        );

        loop {
            // 로테이션 감지: inode가 바뀌면 처음부터 다시 읽음
            #[cfg(unix)]
            if let Some(current) = Self::get_inode(&path).await {
                if let Some(last) = self.inode
                    && current != last
                {
                    tracing::info!(path = %path.display(), "file rotation detected");
                    self.offset = 0;
                }
                self.inode = Some(current);
            }

            // Truncation 감지: 파일이 오프셋보다 작아지면 처음부터
            if let Ok(meta) = metadata(&path).await
                && meta.len() < self.offset
            {
                tracing::warn!(
                    path = %path.display(),
                    size = meta.len(),
                    offset = self.offset,
                    "file truncation detected"
                );
                self.offset = 0;
            }

            let lines = match Self::read_new_lines(&path, self.offset).await {
                Ok((lines, new_offset)) => {
                    self.offset = new_offset;
                    lines
                }
                Err(e) => {
                    self.read_errors += 1;
                    tracing::warn!(source = %self.name, error = %e, "file read failed");
                    // 일시적 에러: 백오프 후 계속
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = sleep(Duration::from_secs(1)) => continue,
                    }
                }
            };

            let drained = lines.is_empty();
            for line in lines {
                let mut event =
                    LogEvent::new(String::from_utf8_lossy(&line).into_owned(), &self.name);
                event.add_metadata("path", path.display().to_string());
                if emit.emit(event).await.is_err() {
                    // 유입 큐가 닫힘: 파이프라인 정지 중
                    tracing::debug!(source = %self.name, "ingest channel closed, stopping");
                    return Ok(());
                }
            }

            if drained {
                if !self.config.tail {
                    tracing::info!(source = %self.name, "reached end of file, stopping");
                    break;
                }
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = sleep(poll_interval) => {}
                }
            } else if shutdown.try_recv().is_ok() {
                break;
            }
        }

        tracing::info!(
            source = %self.name,
            errors = self.read_errors,
            "file source stopped"
        );
        Ok(())
    }
}
