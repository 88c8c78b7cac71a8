//! 에러 타입 -- 도메인별 에러 정의

/// LogFlow 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogflowError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기/런타임 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 프로세서 에러
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
///
/// `load_pipeline` 단계에서 발생하며 호출자에게 그대로 전달됩니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 레지스트리에 등록되지 않은 플러그인 타입
    #[error("unknown {kind} type: '{type_tag}'")]
    UnknownPluginType {
        /// 플러그인 종류 (source, processor, sink)
        kind: &'static str,
        /// 요청된 타입 태그
        type_tag: String,
    },

    /// 필수 설정 필드 누락
    #[error("missing required config field: {field}")]
    MissingField { field: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 동일한 타입 태그가 이미 등록됨
    #[error("plugin type already registered: {type_tag}")]
    AlreadyRegistered { type_tag: String },
}

/// 파이프라인 생명주기/런타임 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 플러그인 open 실패 (시작 단계)
    #[error("failed to open {kind} '{name}': {reason}")]
    OpenFailed {
        /// 플러그인 종류 (source, processor, sink)
        kind: &'static str,
        /// 플러그인 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 정지 단계가 유예 시간 내에 끝나지 않음
    #[error("stop grace period expired at stage '{stage}'")]
    StopTimeout { stage: &'static str },

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인이 실패 상태로 전환됨
    #[error("pipeline failed: {0}")]
    Failed(String),
}

/// 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 수집 대상 접근 실패
    #[error("source '{name}' read failed: {reason}")]
    Read { name: String, reason: String },

    /// 유입 채널이 닫힘 (파이프라인 정지 중)
    #[error("ingest channel closed")]
    ChannelClosed,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 프로세서 에러
///
/// 이벤트 단위의 구조화된 에러입니다. `ignore_errors` 설정에 따라
/// 프로세서가 자체적으로 삼키거나 드라이버로 전파됩니다.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// 필드 파싱 실패 (json, grok 타입 변환 등)
    #[error("{processor}: parse failed: {reason}")]
    Parse { processor: String, reason: String },

    /// 이벤트 처리 실패
    #[error("{processor}: {reason}")]
    Failed { processor: String, reason: String },
}

/// 싱크 에러
///
/// 재시도 가능 여부가 배치 재전송 정책을 결정합니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 일시적 장애 (타임아웃, 5xx, 연결 리셋). 지수 백오프로 재시도됩니다.
    #[error("retryable sink error: {0}")]
    Retryable(String),

    /// 영구적 장애 (인증 실패, 영구 거부). 파이프라인을 실패 상태로 전환합니다.
    #[error("fatal sink error: {0}")]
    Fatal(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        // I/O 장애는 기본적으로 재시도 대상입니다.
        SinkError::Retryable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::UnknownPluginType {
            kind: "source",
            type_tag: "kafka2".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("source"));
        assert!(msg.contains("kafka2"));
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::InvalidValue {
            field: "batch_size".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn pipeline_open_failed_display() {
        let err = PipelineError::OpenFailed {
            kind: "sink",
            name: "out".to_owned(),
            reason: "permission denied".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sink"));
        assert!(msg.contains("out"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn sink_error_from_io_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: SinkError = io.into();
        assert!(matches!(err, SinkError::Retryable(_)));
    }

    #[test]
    fn errors_convert_to_logflow_error() {
        let err: LogflowError = ConfigError::MissingField {
            field: "path".to_owned(),
        }
        .into();
        assert!(matches!(err, LogflowError::Config(_)));

        let err: LogflowError = PipelineError::AlreadyRunning.into();
        assert!(matches!(err, LogflowError::Pipeline(_)));

        let err: LogflowError = SinkError::Fatal("auth".to_owned()).into();
        assert!(matches!(err, LogflowError::Sink(_)));
    }

    #[test]
    fn processor_error_display() {
        let err = ProcessorError::Parse {
            processor: "json".to_owned(),
            reason: "unexpected end of input".to_owned(),
        };
        assert!(err.to_string().contains("json"));
        assert!(err.to_string().contains("unexpected end"));
    }
}
