//! 파이프라인 선언 설정 -- 설정 레코드와 유효성 검증
//!
//! 외부 로더(YAML/JSON)가 역직렬화하는 대상 타입을 정의합니다.
//! 로더 자체는 이 크레이트의 범위 밖이며, 모든 레코드는 serde
//! `Deserialize`를 구현하여 어떤 로더든 대상 삼을 수 있습니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// 싱크 큐가 가득 찼을 때의 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 공간이 생길 때까지 배처를 블록 (기본값)
    #[default]
    Block,
    /// 가장 오래된 배치를 드롭하고 새 배치를 수용
    DropOldest,
    /// 새 배치를 거부
    DropNew,
}

/// 소스의 유입 큐 백프레셔 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureMode {
    /// 큐에 공간이 생길 때까지 소스 태스크를 블록 (기본값)
    #[default]
    Block,
    /// 이벤트를 드롭하고 카운트
    Drop,
}

/// 플러그인 선언 레코드
///
/// `type`은 레지스트리 키이며, `config`는 팩토리에 그대로 전달되는
/// 불투명 매핑입니다. 알 수 없는 `type`은 로드 시점 실패입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    /// 플러그인 인스턴스 이름 (이벤트의 `source` 필드 등에 사용)
    pub name: String,
    /// 레지스트리 타입 태그 (예: "file", "json", "filter")
    #[serde(rename = "type")]
    pub type_tag: String,
    /// 플러그인별 설정. 팩토리가 강타입 레코드로 역직렬화합니다.
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl PluginRecord {
    /// 새 플러그인 레코드를 생성합니다.
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            config,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// 파이프라인 설정 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 파이프라인 이름 (엔진 레지스트리 키)
    pub name: String,
    /// 소스 플러그인 목록 (1개 이상)
    pub sources: Vec<PluginRecord>,
    /// 프로세서 체인 (순서대로 적용, 0개 허용)
    #[serde(default)]
    pub processors: Vec<PluginRecord>,
    /// 싱크 플러그인 목록 (1개 이상)
    pub sinks: Vec<PluginRecord>,
    /// 배치 크기
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 배치 타임아웃 (초). 배치의 첫 이벤트 수용 이후 이 시간이 지나면 방출합니다.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: f64,
    /// 싱크 큐 오버플로우 정책
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// 싱크별 대기 큐 용량 (배치 단위)
    #[serde(default = "default_sink_queue_capacity")]
    pub sink_queue_capacity: usize,
    /// 프로세서 드라이버 워커 수. 1이면 소스별 순서가 보존됩니다.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 정지 단계별 유예 시간 (초)
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
    /// 싱크 write 1회의 제한 시간 (초). 초과 시 재시도 대상입니다.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout() -> f64 {
    5.0
}

fn default_sink_queue_capacity() -> usize {
    2
}

fn default_workers() -> usize {
    1
}

fn default_stop_grace() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    10
}

impl PipelineConfig {
    /// 유입 큐 용량 (batch_size의 10배)
    pub fn ingest_capacity(&self) -> usize {
        self.batch_size.saturating_mul(10).max(1)
    }

    /// 프로세서-배처 사이 큐 용량 (batch_size의 4배)
    pub fn out_capacity(&self) -> usize {
        self.batch_size.saturating_mul(4).max(1)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_WORKERS: usize = 256;

        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "name".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.sources.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sources".to_owned(),
                reason: "at least one source is required".to_owned(),
            });
        }

        if self.sinks.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sinks".to_owned(),
                reason: "at least one sink is required".to_owned(),
            });
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            });
        }

        if !(self.batch_timeout_secs > 0.0) || !self.batch_timeout_secs.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "batch_timeout_secs".to_owned(),
                reason: "must be a positive number of seconds".to_owned(),
            });
        }

        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sink_queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidValue {
                field: "workers".to_owned(),
                reason: format!("must be 1-{MAX_WORKERS}"),
            });
        }

        if self.stop_grace_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stop_grace_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.write_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "write_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for record in self
            .sources
            .iter()
            .chain(self.processors.iter())
            .chain(self.sinks.iter())
        {
            if record.name.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "plugin name".to_owned(),
                });
            }
            if record.type_tag.is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("type for plugin '{}'", record.name),
                });
            }
            if !seen.insert(record.name.clone()) {
                return Err(ConfigError::InvalidValue {
                    field: "plugins".to_owned(),
                    reason: format!("duplicate plugin name '{}'", record.name),
                });
            }
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
///
/// 프로그래매틱 구성과 테스트에서 사용합니다.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 주어진 이름으로 새 빌더를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: PipelineConfig {
                name: name.into(),
                sources: Vec::new(),
                processors: Vec::new(),
                sinks: Vec::new(),
                batch_size: default_batch_size(),
                batch_timeout_secs: default_batch_timeout(),
                overflow_policy: OverflowPolicy::default(),
                sink_queue_capacity: default_sink_queue_capacity(),
                workers: default_workers(),
                stop_grace_secs: default_stop_grace(),
                write_timeout_secs: default_write_timeout(),
            },
        }
    }

    /// 소스를 추가합니다.
    pub fn source(mut self, name: impl Into<String>, type_tag: impl Into<String>, config: Value) -> Self {
        self.config.sources.push(PluginRecord::new(name, type_tag, config));
        self
    }

    /// 프로세서를 체인 끝에 추가합니다.
    pub fn processor(
        mut self,
        name: impl Into<String>,
        type_tag: impl Into<String>,
        config: Value,
    ) -> Self {
        self.config
            .processors
            .push(PluginRecord::new(name, type_tag, config));
        self
    }

    /// 싱크를 추가합니다.
    pub fn sink(mut self, name: impl Into<String>, type_tag: impl Into<String>, config: Value) -> Self {
        self.config.sinks.push(PluginRecord::new(name, type_tag, config));
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// 배치 타임아웃(초)을 설정합니다.
    pub fn batch_timeout_secs(mut self, secs: f64) -> Self {
        self.config.batch_timeout_secs = secs;
        self
    }

    /// 오버플로우 정책을 설정합니다.
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    /// 싱크 큐 용량을 설정합니다.
    pub fn sink_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.sink_queue_capacity = capacity;
        self
    }

    /// 워커 수를 설정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// 정지 유예 시간(초)을 설정합니다.
    pub fn stop_grace_secs(mut self, secs: u64) -> Self {
        self.config.stop_grace_secs = secs;
        self
    }

    /// 싱크 write 제한 시간(초)을 설정합니다.
    pub fn write_timeout_secs(mut self, secs: u64) -> Self {
        self.config.write_timeout_secs = secs;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
