//! 이벤트 모델 -- 파이프라인을 흐르는 표준 레코드
//!
//! [`LogEvent`]는 소스가 생성하고 프로세서가 변환하며 싱크가 소비하는
//! 정규화된 인메모리 레코드입니다. [`Batch`]는 싱크에 함께 전달되는
//! 순서 있는 이벤트 묶음입니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 로그 이벤트 -- 파이프라인의 표준 레코드
///
/// 소스에서 생성된 후 프로세서 체인을 거쳐 싱크까지 전달됩니다.
/// `raw_data`는 유입 이후 개념적으로 불변이며, 프로세서는 파생 데이터를
/// `fields`에 기록합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// 이벤트 고유 ID (UUID v4). 로깅과 추적에만 사용됩니다.
    pub id: String,
    /// 이벤트 발생 시각 (UTC). 소스가 제공하지 못하면 유입 시각이 됩니다.
    pub timestamp: DateTime<Utc>,
    /// 이벤트를 생성한 소스 플러그인 이름
    pub source: String,
    /// 소스가 전달한 원본 페이로드
    pub raw_data: String,
    /// 프로세서가 추출/파생한 구조화 필드
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// 소스와 인리처가 설정하는 대역 외 주석 (호스트, 파티션, 오프셋 등)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// 분류 마커. 중복 없이 유지됩니다.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl LogEvent {
    /// 새 이벤트를 생성합니다. ID는 UUID v4, 시각은 현재 시각입니다.
    pub fn new(raw_data: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: source.into(),
            raw_data: raw_data.into(),
            fields: Map::new(),
            metadata: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }

    /// 이벤트 시각을 지정하여 생성합니다.
    pub fn with_timestamp(
        raw_data: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            ..Self::new(raw_data, source)
        }
    }

    /// 최상위 필드를 추가하거나 덮어씁니다.
    pub fn add_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// 필드를 조회합니다.
    ///
    /// 정확히 일치하는 최상위 키가 우선이며, 없으면 점 표기 경로
    /// (`a.b.c`)로 중첩 매핑을 탐색합니다. 경로 도중에 매핑이 아닌 값을
    /// 만나면 미스이며, 에러가 아닙니다.
    pub fn field(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(path) {
            return Some(value);
        }
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// 필드 값을 문자열로 조회합니다.
    ///
    /// 문자열은 그대로, 숫자/불리언은 표기 그대로 변환됩니다.
    /// 리스트/매핑/null은 문자열 표현이 없으므로 `None`입니다.
    pub fn field_str(&self, path: &str) -> Option<String> {
        match self.field(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// 최상위 필드를 제거하고 값을 반환합니다.
    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// 메타데이터 항목을 추가하거나 덮어씁니다.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// 태그를 추가합니다. 이미 있으면 무시됩니다.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    /// 태그 존재 여부를 확인합니다.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogEvent[{}] source={} fields={} tags={}",
            &self.id[..8.min(self.id.len())],
            self.source,
            self.fields.len(),
            self.tags.len(),
        )
    }
}

/// 배치 -- 싱크에 함께 전달되는 순서 있는 이벤트 묶음
///
/// 하나의 배치는 하나의 파이프라인에서만 생성되며, 배치 내 순서는
/// 프로세서의 방출 순서를 반영합니다. 여러 싱크에 공유될 때는
/// `Arc<Batch>`로 읽기 전용 공유됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// 배치를 생성한 파이프라인 이름
    pub pipeline: String,
    /// 배치에 담긴 이벤트
    pub events: Vec<LogEvent>,
}

impl Batch {
    /// 새 배치를 생성합니다.
    pub fn new(pipeline: impl Into<String>, events: Vec<LogEvent>) -> Self {
        Self {
            pipeline: pipeline.into(),
            events,
        }
    }

    /// 배치에 담긴 이벤트 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 배치가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 이벤트 이터레이터를 반환합니다.
    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> {
        self.events.iter()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch[{}] events={}", self.pipeline, self.events.len())
    }
}
