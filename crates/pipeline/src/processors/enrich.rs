//! Enrich 프로세서 -- 파생 필드 추가
//!
//! 서브 모드:
//! - `lookup`: 인메모리 사전으로 `source_field`를 매핑
//! - `geoip`: IP 필드를 `{country, city, lat, lon}`으로 해석
//! - `useragent`: UA 문자열을 `{browser, os, device}`로 파싱
//! - `dns`: IP는 역방향, 호스트명은 정방향으로 해석 (제한 시간 + LRU 캐시)
//!
//! dns 모드는 내장 프로세서 중 유일하게 I/O 대기를 수행합니다.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use logflow_core::PluginRecord;
use logflow_core::error::{ConfigError, ProcessorError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::Processor;

/// 인리치먼트 서브 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichType {
    Lookup,
    Geoip,
    Useragent,
    Dns,
}

/// Enrich 프로세서 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichConfig {
    /// 인리치먼트 모드
    pub enrich_type: EnrichType,
    /// 입력 필드 경로
    pub source_field: String,
    /// 결과를 기록할 필드
    pub target_field: String,
    /// lookup 모드의 인라인 사전
    #[serde(default)]
    pub lookup_table: BTreeMap<String, Value>,
    /// lookup 모드의 JSON 사전 파일. 인라인 사전 위에 병합됩니다.
    #[serde(default)]
    pub lookup_file: Option<PathBuf>,
    /// 매핑 실패 시 기록할 기본값
    #[serde(default)]
    pub default_value: Option<Value>,
    /// 대상 필드가 이미 있으면 건드리지 않음
    #[serde(default = "default_true")]
    pub preserve_existing: bool,
    /// 소스 필드가 없으면 조용히 통과
    #[serde(default = "default_true")]
    pub ignore_missing: bool,
    /// geoip 모드의 JSON 데이터베이스 파일 (IP 문자열 -> 레코드)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// dns 모드의 정적 호스트 테이블 (IP -> 호스트명, 호스트명 -> IP)
    #[serde(default)]
    pub hosts: BTreeMap<String, String>,
    /// dns 해석 1회의 제한 시간 (밀리초)
    #[serde(default = "default_dns_timeout_ms")]
    pub timeout_ms: u64,
    /// dns LRU 캐시 용량
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_dns_timeout_ms() -> u64 {
    500
}

fn default_cache_capacity() -> usize {
    10_000
}

/// 해석 결과 LRU 캐시
///
/// 조회 성공 시 항목이 최신으로 이동하고, 용량 초과 시 가장 오래
/// 사용되지 않은 항목이 제거됩니다.
struct LruCache {
    map: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let value = self.map.get(key)?.clone();
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key.to_owned());
        }
        Some(value)
    }

    fn insert(&mut self, key: String, value: String) {
        if self.map.contains_key(&key) {
            if let Some(pos) = self.order.iter().position(|k| *k == key) {
                self.order.remove(pos);
            }
        } else if self.map.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Enrich 프로세서
pub struct EnrichProcessor {
    name: String,
    config: EnrichConfig,
    lookup_table: BTreeMap<String, Value>,
    geo_db: HashMap<String, Value>,
    dns_cache: Mutex<LruCache>,
}

impl EnrichProcessor {
    /// 플러그인 레코드에서 프로세서를 생성합니다.
    ///
    /// lookup/geoip 데이터 파일은 이 시점에 로드되며, 파일이 없거나
    /// JSON 객체가 아니면 거부됩니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: EnrichConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("processors.{}", record.name),
                    reason: e.to_string(),
                }
            })?;

        if config.source_field.is_empty() {
            return Err(ConfigError::MissingField {
                field: "source_field".to_owned(),
            });
        }
        if config.target_field.is_empty() {
            return Err(ConfigError::MissingField {
                field: "target_field".to_owned(),
            });
        }

        let mut lookup_table = config.lookup_table.clone();
        if let Some(path) = &config.lookup_file {
            let loaded = load_json_object(path, "lookup_file")?;
            for (key, value) in loaded {
                lookup_table.insert(key, value);
            }
        }

        let mut geo_db = HashMap::new();
        if config.enrich_type == EnrichType::Geoip {
            let Some(path) = &config.database_path else {
                return Err(ConfigError::MissingField {
                    field: "database_path".to_owned(),
                });
            };
            geo_db = load_json_object(path, "database_path")?
                .into_iter()
                .collect();
        }

        let cache_capacity = config.cache_capacity;
        Ok(Self {
            name: record.name.clone(),
            lookup_table,
            geo_db,
            dns_cache: Mutex::new(LruCache::new(cache_capacity)),
            config,
        })
    }

    fn source_value(&self, event: &LogEvent) -> Option<String> {
        if self.config.source_field == "raw_data" {
            if event.raw_data.is_empty() {
                None
            } else {
                Some(event.raw_data.clone())
            }
        } else {
            event.field_str(&self.config.source_field)
        }
    }

    async fn enrich_dns(&self, value: &str) -> Option<String> {
        {
            let mut cache = self.dns_cache.lock().await;
            if let Some(hit) = cache.get(value) {
                return Some(hit);
            }
        }

        let resolved = if value.parse::<IpAddr>().is_ok() {
            // IP -> 호스트명 역방향 해석은 정적 호스트 테이블을 사용
            self.config.hosts.get(value).cloned()
        } else {
            match self.config.hosts.get(value).cloned() {
                Some(mapped) => Some(mapped),
                None => {
                    let timeout = Duration::from_millis(self.config.timeout_ms);
                    let lookup = tokio::net::lookup_host((value, 0));
                    match tokio::time::timeout(timeout, lookup).await {
                        Ok(Ok(mut addrs)) => addrs.next().map(|addr| addr.ip().to_string()),
                        Ok(Err(e)) => {
                            tracing::debug!(host = value, error = %e, "dns lookup failed");
                            None
                        }
                        Err(_) => {
                            tracing::debug!(host = value, "dns lookup timed out");
                            None
                        }
                    }
                }
            }
        };

        if let Some(resolved) = &resolved {
            let mut cache = self.dns_cache.lock().await;
            cache.insert(value.to_owned(), resolved.clone());
        }
        resolved
    }

    fn enrich_useragent(ua: &str) -> Value {
        let browser = if ua.contains("Edg/") || ua.contains("Edge/") {
            "Edge"
        } else if ua.contains("OPR/") || ua.contains("Opera") {
            "Opera"
        } else if ua.contains("Chrome/") {
            "Chrome"
        } else if ua.contains("Firefox/") {
            "Firefox"
        } else if ua.contains("Safari/") {
            "Safari"
        } else if ua.contains("MSIE") || ua.contains("Trident/") {
            "Internet Explorer"
        } else if ua.contains("curl/") {
            "curl"
        } else {
            "Other"
        };

        let lowered = ua.to_lowercase();
        let is_bot =
            lowered.contains("bot") || lowered.contains("crawler") || lowered.contains("spider");

        let os = if ua.contains("Windows NT") {
            "Windows"
        } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
            "iOS"
        } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
            "macOS"
        } else if ua.contains("Android") {
            "Android"
        } else if ua.contains("Linux") {
            "Linux"
        } else {
            "Other"
        };

        let device = if is_bot {
            "Bot"
        } else if ua.contains("iPad") || lowered.contains("tablet") {
            "Tablet"
        } else if ua.contains("iPhone") || ua.contains("Android") || lowered.contains("mobile") {
            "Mobile"
        } else {
            "Desktop"
        };

        json!({"browser": browser, "os": os, "device": device})
    }

    /// 사설/루프백 IP 여부. geoip 대상에서 제외됩니다.
    fn is_non_routable(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        }
    }

    #[cfg(test)]
    async fn cache_len(&self) -> usize {
        self.dns_cache.lock().await.len()
    }
}

fn load_json_object(path: &PathBuf, field: &str) -> Result<Map<String, Value>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: format!("cannot read {}: {e}", path.display()),
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: format!("invalid JSON in {}: {e}", path.display()),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("{} must contain a JSON object", path.display()),
        }),
    }
}

impl Processor for EnrichProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut event: LogEvent) -> Result<Vec<LogEvent>, ProcessorError> {
        let Some(source_value) = self.source_value(&event) else {
            if !self.config.ignore_missing {
                event.add_metadata(
                    "enrich_error",
                    format!("source field not found: {}", self.config.source_field),
                );
            }
            return Ok(vec![event]);
        };

        if self.config.preserve_existing && event.field(&self.config.target_field).is_some() {
            return Ok(vec![event]);
        }

        match self.config.enrich_type {
            EnrichType::Lookup => {
                let enriched = self
                    .lookup_table
                    .get(&source_value)
                    .or(self.config.default_value.as_ref());
                if let Some(value) = enriched {
                    event.add_field(self.config.target_field.clone(), value.clone());
                }
            }
            EnrichType::Geoip => match source_value.parse::<IpAddr>() {
                Ok(ip) => {
                    if !Self::is_non_routable(ip) {
                        match self.geo_db.get(&source_value) {
                            Some(record) => {
                                event.add_field(self.config.target_field.clone(), record.clone());
                            }
                            None => {
                                metrics::counter!(logflow_core::metrics::ENRICH_MISSES_TOTAL)
                                    .increment(1);
                            }
                        }
                    }
                }
                Err(_) => {
                    if !self.config.ignore_missing {
                        event.add_metadata(
                            "enrich_error",
                            format!("invalid IP address: {source_value}"),
                        );
                    }
                }
            },
            EnrichType::Useragent => {
                event.add_field(
                    self.config.target_field.clone(),
                    Self::enrich_useragent(&source_value),
                );
            }
            EnrichType::Dns => match self.enrich_dns(&source_value).await {
                Some(resolved) => {
                    event.add_field(self.config.target_field.clone(), Value::String(resolved));
                }
                None => {
                    metrics::counter!(logflow_core::metrics::ENRICH_MISSES_TOTAL).increment(1);
                    if let Some(default) = &self.config.default_value {
                        event.add_field(self.config.target_field.clone(), default.clone());
                    } else if !self.config.ignore_missing {
                        event.add_metadata(
                            "enrich_error",
                            format!("dns lookup failed for: {source_value}"),
                        );
                    }
                }
            },
        }

        Ok(vec![event])
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn processor(config: serde_json::Value) -> EnrichProcessor {
        EnrichProcessor::from_record(&PluginRecord::new("test-enrich", "enrich", config)).unwrap()
    }

    fn event_with(fields: serde_json::Value) -> LogEvent {
        let mut event = LogEvent::new("raw", "test");
        if let Value::Object(map) = fields {
            event.fields = map;
        }
        event
    }

    #[tokio::test]
    async fn lookup_maps_through_table() {
        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "event_id",
            "target_field": "event_description",
            "lookup_table": {"4625": "Failed logon attempt"},
            "default_value": "Unknown"
        }));
        let out = processor
            .process(event_with(json!({"event_id": "4625"})))
            .await
            .unwrap();
        assert_eq!(
            out[0].field("event_description"),
            Some(&json!("Failed logon attempt"))
        );
    }

    #[tokio::test]
    async fn lookup_falls_back_to_default() {
        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "event_id",
            "target_field": "event_description",
            "lookup_table": {"4625": "Failed logon attempt"},
            "default_value": "Unknown"
        }));
        let out = processor
            .process(event_with(json!({"event_id": "9999"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("event_description"), Some(&json!("Unknown")));
    }

    #[tokio::test]
    async fn lookup_without_default_leaves_event_unchanged() {
        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "k",
            "target_field": "v",
            "lookup_table": {}
        }));
        let out = processor
            .process(event_with(json!({"k": "missing"})))
            .await
            .unwrap();
        assert!(out[0].field("v").is_none());
    }

    #[tokio::test]
    async fn lookup_file_merges_over_inline_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"a": "from-file", "b": "file-only"}}"#).unwrap();
        file.flush().unwrap();

        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "k",
            "target_field": "v",
            "lookup_table": {"a": "inline"},
            "lookup_file": file.path()
        }));
        let out = processor
            .process(event_with(json!({"k": "a"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("v"), Some(&json!("from-file")));
    }

    #[tokio::test]
    async fn preserve_existing_skips_enrichment() {
        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "k",
            "target_field": "v",
            "lookup_table": {"x": "new"}
        }));
        let out = processor
            .process(event_with(json!({"k": "x", "v": "old"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("v"), Some(&json!("old")));
    }

    #[tokio::test]
    async fn missing_source_field_passes_quietly_by_default() {
        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "absent",
            "target_field": "v",
            "lookup_table": {}
        }));
        let out = processor.process(event_with(json!({}))).await.unwrap();
        assert!(out[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn missing_source_field_records_error_when_not_ignored() {
        let processor = processor(json!({
            "enrich_type": "lookup",
            "source_field": "absent",
            "target_field": "v",
            "ignore_missing": false
        }));
        let out = processor.process(event_with(json!({}))).await.unwrap();
        assert!(out[0].metadata.contains_key("enrich_error"));
    }

    #[tokio::test]
    async fn geoip_resolves_from_database() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"8.8.8.8": {{"country": "US", "city": "Mountain View", "lat": 37.4, "lon": -122.1}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let processor = processor(json!({
            "enrich_type": "geoip",
            "source_field": "ip",
            "target_field": "geo",
            "database_path": file.path()
        }));
        let out = processor
            .process(event_with(json!({"ip": "8.8.8.8"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("geo.country"), Some(&json!("US")));
        assert_eq!(out[0].field("geo.lat"), Some(&json!(37.4)));
    }

    #[tokio::test]
    async fn geoip_skips_private_ip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"192.168.0.1": {{"country": "XX"}}}}"#).unwrap();
        file.flush().unwrap();

        let processor = processor(json!({
            "enrich_type": "geoip",
            "source_field": "ip",
            "target_field": "geo",
            "database_path": file.path()
        }));
        let out = processor
            .process(event_with(json!({"ip": "192.168.0.1"})))
            .await
            .unwrap();
        assert!(out[0].field("geo").is_none());
    }

    #[tokio::test]
    async fn geoip_miss_passes_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        file.flush().unwrap();

        let processor = processor(json!({
            "enrich_type": "geoip",
            "source_field": "ip",
            "target_field": "geo",
            "database_path": file.path()
        }));
        let out = processor
            .process(event_with(json!({"ip": "1.1.1.1"})))
            .await
            .unwrap();
        assert!(out[0].field("geo").is_none());
    }

    #[test]
    fn geoip_requires_database_path() {
        let record = PluginRecord::new(
            "e",
            "enrich",
            json!({
                "enrich_type": "geoip",
                "source_field": "ip",
                "target_field": "geo"
            }),
        );
        assert!(EnrichProcessor::from_record(&record).is_err());
    }

    #[tokio::test]
    async fn useragent_parses_chrome_on_windows() {
        let processor = processor(json!({
            "enrich_type": "useragent",
            "source_field": "ua",
            "target_field": "agent"
        }));
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        let out = processor
            .process(event_with(json!({"ua": ua})))
            .await
            .unwrap();
        assert_eq!(out[0].field("agent.browser"), Some(&json!("Chrome")));
        assert_eq!(out[0].field("agent.os"), Some(&json!("Windows")));
        assert_eq!(out[0].field("agent.device"), Some(&json!("Desktop")));
    }

    #[tokio::test]
    async fn useragent_detects_mobile_and_bot() {
        let processor = processor(json!({
            "enrich_type": "useragent",
            "source_field": "ua",
            "target_field": "agent"
        }));

        let mobile = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                      AppleWebKit/605.1.15 (KHTML, like Gecko) Safari/604.1";
        let out = processor
            .process(event_with(json!({"ua": mobile})))
            .await
            .unwrap();
        assert_eq!(out[0].field("agent.os"), Some(&json!("iOS")));
        assert_eq!(out[0].field("agent.device"), Some(&json!("Mobile")));

        let bot = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
        let out = processor
            .process(event_with(json!({"ua": bot})))
            .await
            .unwrap();
        assert_eq!(out[0].field("agent.device"), Some(&json!("Bot")));
    }

    #[tokio::test]
    async fn dns_reverse_uses_hosts_table() {
        let processor = processor(json!({
            "enrich_type": "dns",
            "source_field": "ip",
            "target_field": "hostname",
            "hosts": {"10.0.0.5": "db-01.internal"}
        }));
        let out = processor
            .process(event_with(json!({"ip": "10.0.0.5"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("hostname"), Some(&json!("db-01.internal")));
        // 두 번째 조회는 캐시에서 옵니다
        assert_eq!(processor.cache_len().await, 1);
        let out = processor
            .process(event_with(json!({"ip": "10.0.0.5"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("hostname"), Some(&json!("db-01.internal")));
    }

    #[tokio::test]
    async fn dns_forward_uses_hosts_table() {
        let processor = processor(json!({
            "enrich_type": "dns",
            "source_field": "host",
            "target_field": "ip",
            "hosts": {"db-01.internal": "10.0.0.5"}
        }));
        let out = processor
            .process(event_with(json!({"host": "db-01.internal"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("ip"), Some(&json!("10.0.0.5")));
    }

    #[tokio::test]
    async fn dns_failure_falls_back_to_default() {
        let processor = processor(json!({
            "enrich_type": "dns",
            "source_field": "ip",
            "target_field": "hostname",
            "default_value": "unknown",
            "timeout_ms": 50
        }));
        let out = processor
            .process(event_with(json!({"ip": "203.0.113.200"})))
            .await
            .unwrap();
        assert_eq!(out[0].field("hostname"), Some(&json!("unknown")));
    }

    #[test]
    fn requires_source_and_target_fields() {
        let record = PluginRecord::new(
            "e",
            "enrich",
            json!({"enrich_type": "lookup", "source_field": "", "target_field": "t"}),
        );
        assert!(EnrichProcessor::from_record(&record).is_err());

        let record = PluginRecord::new(
            "e",
            "enrich",
            json!({"enrich_type": "lookup", "source_field": "s", "target_field": ""}),
        );
        assert!(EnrichProcessor::from_record(&record).is_err());
    }

    #[test]
    fn unknown_enrich_type_rejected() {
        let record = PluginRecord::new(
            "e",
            "enrich",
            json!({"enrich_type": "magic", "source_field": "s", "target_field": "t"}),
        );
        assert!(EnrichProcessor::from_record(&record).is_err());
    }

    #[test]
    fn lru_cache_evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a".to_owned(), "1".to_owned());
        cache.insert("b".to_owned(), "2".to_owned());
        // a를 최신으로 만들고 c를 넣으면 b가 밀려남
        assert_eq!(cache.get("a"), Some("1".to_owned()));
        cache.insert("c".to_owned(), "3".to_owned());
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some("1".to_owned()));
        assert_eq!(cache.get("c"), Some("3".to_owned()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn lru_cache_update_does_not_grow() {
        let mut cache = LruCache::new(2);
        cache.insert("a".to_owned(), "1".to_owned());
        cache.insert("a".to_owned(), "2".to_owned());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some("2".to_owned()));
    }
}
