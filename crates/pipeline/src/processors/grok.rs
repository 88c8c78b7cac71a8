//! Grok 프로세서 -- 이름 있는 서브 패턴 카탈로그 기반 필드 추출
//!
//! `%{PATTERN:name}` / `%{PATTERN:name:type}` 구문을 정규식으로 전개한
//! 뒤 매칭합니다. 표준 패턴 카탈로그가 내장되어 있으며,
//! `custom_patterns`로 덮어쓰거나 추가할 수 있습니다.
//!
//! `type`은 `int`, `float`, `string` 중 하나이며 캡처 값을 해당
//! 타입으로 변환하여 기록합니다.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use logflow_core::PluginRecord;
use logflow_core::error::{ConfigError, ProcessorError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::Processor;

/// 패턴 전개 재귀 깊이 제한 (순환 참조 방어)
const MAX_EXPANSION_DEPTH: usize = 16;

/// 내장 표준 패턴 카탈로그
///
/// 모든 패턴은 룩어라운드 없이 작성되어 있습니다.
const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    // 기본
    ("WORD", r"\b\w+\b"),
    ("NOTSPACE", r"\S+"),
    ("SPACE", r"\s+"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    ("QUOTEDSTRING", r#""[^"]*"|'[^']*'"#),
    ("QS", r"%{QUOTEDSTRING}"),
    // 숫자
    ("INT", r"[+-]?[0-9]+"),
    ("NONNEGINT", r"[0-9]+"),
    ("POSINT", r"[1-9][0-9]*"),
    ("BASE10NUM", r"[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)"),
    ("NUMBER", r"%{BASE10NUM}"),
    ("BASE16NUM", r"[+-]?(?:0x)?[0-9A-Fa-f]+"),
    // 네트워크
    (
        "IPV4",
        r"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(?:\.(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){3}",
    ),
    ("IPV6", r"(?:[0-9A-Fa-f]{0,4}:){2,7}[0-9A-Fa-f.:]+"),
    ("IP", r"%{IPV4}|%{IPV6}"),
    (
        "HOSTNAME",
        r"\b[0-9A-Za-z][0-9A-Za-z-]{0,62}(?:\.[0-9A-Za-z][0-9A-Za-z-]{0,62})*\.?\b",
    ),
    ("HOST", r"%{HOSTNAME}"),
    ("IPORHOST", r"%{IP}|%{HOSTNAME}"),
    ("HOSTPORT", r"(?:%{IPORHOST}):(?:%{POSINT})"),
    // 경로 / URI
    ("UNIXPATH", r"(?:/[^/\s]*)+"),
    ("URIPROTO", r"[A-Za-z][A-Za-z0-9+.-]+"),
    ("URIPATH", r"(?:/[A-Za-z0-9$.+!*'(){},~:;=@#%_-]*)+"),
    ("URIPARAM", r"\?[A-Za-z0-9$.+!*'|(){},~@#%&/=:;_?\[\]<>-]*"),
    ("URIPATHPARAM", r"%{URIPATH}(?:%{URIPARAM})?"),
    // 사용자 / 이메일
    ("USER", r"[a-zA-Z0-9._-]+"),
    ("USERNAME", r"[a-zA-Z0-9._-]+"),
    ("EMAILLOCALPART", r"[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+"),
    ("EMAILADDRESS", r"(?:%{EMAILLOCALPART})@(?:%{HOSTNAME})"),
    ("HTTPDUSER", r"%{EMAILADDRESS}|%{USER}"),
    // 날짜 / 시각
    (
        "MONTH",
        r"\b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\b",
    ),
    ("MONTHNUM", r"0?[1-9]|1[0-2]"),
    ("MONTHDAY", r"(?:0[1-9])|(?:[12][0-9])|(?:3[01])|[1-9]"),
    (
        "DAY",
        r"Mon(?:day)?|Tue(?:sday)?|Wed(?:nesday)?|Thu(?:rsday)?|Fri(?:day)?|Sat(?:urday)?|Sun(?:day)?",
    ),
    ("YEAR", r"(?:\d\d){1,2}"),
    ("HOUR", r"2[0123]|[01]?[0-9]"),
    ("MINUTE", r"[0-5][0-9]"),
    ("SECOND", r"(?:[0-5]?[0-9]|60)(?:[:.,][0-9]+)?"),
    ("TIME", r"(?:%{HOUR}):(?:%{MINUTE})(?::(?:%{SECOND}))?"),
    ("ISO8601_TIMEZONE", r"Z|[+-](?:%{HOUR})(?::?(?:%{MINUTE}))?"),
    (
        "TIMESTAMP_ISO8601",
        r"(?:%{YEAR})-(?:%{MONTHNUM})-(?:%{MONTHDAY})[T ](?:%{HOUR}):?(?:%{MINUTE})(?::?(?:%{SECOND}))?(?:%{ISO8601_TIMEZONE})?",
    ),
    ("DATE_US", r"(?:%{MONTHNUM})[/-](?:%{MONTHDAY})[/-](?:%{YEAR})"),
    ("DATE_EU", r"(?:%{MONTHDAY})[./-](?:%{MONTHNUM})[./-](?:%{YEAR})"),
    ("DATE", r"%{DATE_US}|%{DATE_EU}"),
    ("DATESTAMP", r"(?:%{DATE})[- ](?:%{TIME})"),
    ("HTTPDATE", r"(?:%{MONTHDAY})/(?:%{MONTH})/(?:%{YEAR}):(?:%{TIME}) (?:%{INT})"),
    // 로그 레벨
    (
        "LOGLEVEL",
        r"[Aa]lert|ALERT|[Tt]race|TRACE|[Dd]ebug|DEBUG|[Nn]otice|NOTICE|[Ii]nfo(?:rmation)?|INFO(?:RMATION)?|[Ww]arn(?:ing)?|WARN(?:ING)?|[Ee]rr(?:or)?|ERR(?:OR)?|[Cc]rit(?:ical)?|CRIT(?:ICAL)?|[Ff]atal|FATAL|[Ss]evere|SEVERE|EMERG(?:ENCY)?|[Ee]merg(?:ency)?",
    ),
    // Syslog
    ("SYSLOGTIMESTAMP", r"(?:%{MONTH}) +(?:%{MONTHDAY}) (?:%{TIME})"),
    ("PROG", r"[\w._/%-]+"),
    ("SYSLOGPROG", r"%{PROG:program}(?:\[%{POSINT:pid}\])?"),
    ("SYSLOGHOST", r"%{IPORHOST}"),
    (
        "SYSLOGBASE",
        r"%{SYSLOGTIMESTAMP:timestamp} %{SYSLOGHOST:logsource} %{SYSLOGPROG}:",
    ),
    // HTTP 로그
    (
        "COMMONAPACHELOG",
        r#"%{IPORHOST:clientip} %{HTTPDUSER:ident} %{USER:auth} \[%{HTTPDATE:timestamp}\] "(?:%{WORD:verb} %{NOTSPACE:request}(?: HTTP/%{NUMBER:httpversion})?|%{DATA:rawrequest})" %{NUMBER:response} (?:%{NUMBER:bytes}|-)"#,
    ),
    (
        "COMBINEDAPACHELOG",
        r"%{COMMONAPACHELOG} %{QS:referrer} %{QS:agent}",
    ),
];

/// 캡처 타입 변환
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureType {
    Int,
    Float,
    Str,
}

/// Grok 프로세서 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GrokConfig {
    /// 매칭 대상 필드 경로
    pub field: String,
    /// 단일 Grok 패턴
    pub pattern: Option<String>,
    /// Grok 패턴 목록. 순서대로 시도합니다.
    pub patterns: Vec<String>,
    /// 사용자 정의 서브 패턴. 내장 카탈로그를 덮어씁니다.
    pub custom_patterns: HashMap<String, String>,
    /// 캡처를 이 필드 아래 중첩 객체로 기록합니다. 비어있으면 최상위에 기록합니다.
    pub target_field: String,
    /// 매칭 성공 시 소스 필드 보존 여부
    pub preserve_original: bool,
    /// 타입 변환 실패 시 이벤트를 통과시킬지 여부
    pub ignore_errors: bool,
    /// 첫 매칭 후 중단 여부
    pub break_on_match: bool,
}

impl Default for GrokConfig {
    fn default() -> Self {
        Self {
            field: "raw_data".to_owned(),
            pattern: None,
            patterns: Vec::new(),
            custom_patterns: HashMap::new(),
            target_field: String::new(),
            preserve_original: true,
            ignore_errors: false,
            break_on_match: true,
        }
    }
}

#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
    types: HashMap<String, CaptureType>,
}

/// Grok 프로세서
#[derive(Debug)]
pub struct GrokProcessor {
    name: String,
    field: String,
    target_field: String,
    preserve_original: bool,
    ignore_errors: bool,
    break_on_match: bool,
    compiled: Vec<CompiledPattern>,
}

/// `%{PATTERN}` / `%{PATTERN:name}` / `%{PATTERN:name:type}` 참조
fn reference_regex() -> Regex {
    Regex::new(r"%\{([A-Za-z0-9_]+)(?::([A-Za-z][A-Za-z0-9_]*))?(?::(int|float|string))?\}")
        .expect("grok reference regex is valid")
}

/// Grok 패턴을 정규식 문자열로 전개합니다.
fn expand(
    pattern: &str,
    catalogue: &HashMap<&str, &str>,
    types: &mut HashMap<String, CaptureType>,
    depth: usize,
) -> Result<String, ConfigError> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(ConfigError::InvalidValue {
            field: "pattern".to_owned(),
            reason: "grok pattern expansion too deep (possible cycle)".to_owned(),
        });
    }

    let reference = reference_regex();
    let mut result = String::with_capacity(pattern.len());
    let mut last_end = 0;

    for captures in reference.captures_iter(pattern) {
        let whole = captures.get(0).expect("group 0 always matches");
        result.push_str(&pattern[last_end..whole.start()]);
        last_end = whole.end();

        let pattern_name = &captures[1];
        let field_name = captures.get(2).map(|m| m.as_str());
        let type_name = captures.get(3).map(|m| m.as_str());

        let Some(sub_pattern) = catalogue.get(pattern_name) else {
            return Err(ConfigError::InvalidValue {
                field: "pattern".to_owned(),
                reason: format!("unknown grok pattern: {pattern_name}"),
            });
        };

        let expanded = expand(sub_pattern, catalogue, types, depth + 1)?;
        match field_name {
            Some(field) => {
                let capture_type = match type_name {
                    Some("int") => CaptureType::Int,
                    Some("float") => CaptureType::Float,
                    _ => CaptureType::Str,
                };
                types.insert(field.to_owned(), capture_type);
                result.push_str(&format!("(?P<{field}>{expanded})"));
            }
            None => {
                result.push_str(&format!("(?:{expanded})"));
            }
        }
    }

    result.push_str(&pattern[last_end..]);
    Ok(result)
}

impl GrokProcessor {
    /// 플러그인 레코드에서 프로세서를 생성합니다.
    ///
    /// 모든 패턴이 이 시점에 전개/컴파일되며, 알 수 없는 서브 패턴과
    /// 순환 참조는 거부됩니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: GrokConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("processors.{}", record.name),
                    reason: e.to_string(),
                }
            })?;

        let mut patterns = Vec::new();
        if let Some(pattern) = config.pattern.clone() {
            patterns.push(pattern);
        }
        patterns.extend(config.patterns.iter().cloned());

        if patterns.is_empty() {
            return Err(ConfigError::MissingField {
                field: "pattern".to_owned(),
            });
        }

        let mut catalogue: HashMap<&str, &str> = DEFAULT_PATTERNS.iter().copied().collect();
        for (name, sub_pattern) in &config.custom_patterns {
            catalogue.insert(name.as_str(), sub_pattern.as_str());
        }

        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            let mut types = HashMap::new();
            let expanded = expand(pattern, &catalogue, &mut types, 0)?;
            let regex = Regex::new(&expanded).map_err(|e| ConfigError::InvalidValue {
                field: "pattern".to_owned(),
                reason: format!("grok pattern '{pattern}' expands to invalid regex: {e}"),
            })?;
            compiled.push(CompiledPattern { regex, types });
        }

        Ok(Self {
            name: record.name.clone(),
            field: config.field,
            target_field: config.target_field,
            preserve_original: config.preserve_original,
            ignore_errors: config.ignore_errors,
            break_on_match: config.break_on_match,
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

    fn convert(
        &self,
        name: &str,
        raw: &str,
        capture_type: CaptureType,
    ) -> Result<Value, ProcessorError> {
        match capture_type {
            CaptureType::Str => Ok(Value::String(raw.to_owned())),
            CaptureType::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ProcessorError::Parse {
                    processor: self.name.clone(),
                    reason: format!("capture '{name}': '{raw}' is not an integer"),
                }),
            CaptureType::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| ProcessorError::Parse {
                    processor: self.name.clone(),
                    reason: format!("capture '{name}': '{raw}' is not a float"),
                }),
        }
    }
}

impl Processor for GrokProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut event: LogEvent) -> Result<Vec<LogEvent>, ProcessorError> {
        let Some(text) = self.source_text(&event) else {
            return Ok(vec![event]);
        };

        let mut matched = false;
        for pattern in &self.compiled {
            let Some(captures) = pattern.regex.captures(&text) else {
                continue;
            };
            matched = true;

            let mut extracted = Map::new();
            for name in pattern.regex.capture_names().flatten() {
                let Some(capture) = captures.name(name) else {
                    continue;
                };
                let capture_type = pattern
                    .types
                    .get(name)
                    .copied()
                    .unwrap_or(CaptureType::Str);
                match self.convert(name, capture.as_str(), capture_type) {
                    Ok(value) => {
                        extracted.insert(name.to_owned(), value);
                    }
                    Err(e) => {
                        metrics::counter!(logflow_core::metrics::PROCESSING_ERRORS_TOTAL)
                            .increment(1);
                        if self.ignore_errors {
                            event.add_metadata("grok_error", e.to_string());
                            extracted
                                .insert(name.to_owned(), Value::String(capture.as_str().to_owned()));
                        } else {
                            return Err(e);
                        }
                    }
                }
            }

            if self.target_field.is_empty() {
                for (key, value) in extracted {
                    event.add_field(key, value);
                }
            } else {
                event.add_field(self.target_field.clone(), Value::Object(extracted));
            }

            if self.break_on_match {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn processor(config: serde_json::Value) -> GrokProcessor {
        GrokProcessor::from_record(&PluginRecord::new("test-grok", "grok", config)).unwrap()
    }

    #[tokio::test]
    async fn extracts_fields_from_syslog_line() {
        let processor = processor(json!({
            "pattern": "%{SYSLOGTIMESTAMP:ts} %{HOSTNAME:host} %{PROG:prog}: %{GREEDYDATA:msg}"
        }));
        let event = LogEvent::new(
            "Jan 15 12:00:01 web-01 sshd: Failed password for root",
            "test",
        );
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("host"), Some(&json!("web-01")));
        assert_eq!(out[0].field("prog"), Some(&json!("sshd")));
        assert_eq!(
            out[0].field("msg"),
            Some(&json!("Failed password for root"))
        );
    }

    #[tokio::test]
    async fn iso8601_and_loglevel_patterns() {
        let processor = processor(json!({
            "pattern": "%{TIMESTAMP_ISO8601:ts} %{LOGLEVEL:level} %{GREEDYDATA:msg}"
        }));
        let event = LogEvent::new("2024-01-15T12:00:00Z ERROR disk full", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("ts"), Some(&json!("2024-01-15T12:00:00Z")));
        assert_eq!(out[0].field("level"), Some(&json!("ERROR")));
        assert_eq!(out[0].field("msg"), Some(&json!("disk full")));
    }

    #[tokio::test]
    async fn ip_pattern_matches_ipv4() {
        let processor = processor(json!({
            "pattern": "client %{IP:client_ip} connected"
        }));
        let event = LogEvent::new("client 192.168.1.100 connected", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("client_ip"), Some(&json!("192.168.1.100")));
    }

    #[tokio::test]
    async fn typed_captures_convert_values() {
        let processor = processor(json!({
            "pattern": "%{WORD:verb} %{NOTSPACE:path} %{INT:status:int} %{NUMBER:elapsed:float}"
        }));
        let event = LogEvent::new("GET /health 200 0.042", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("status"), Some(&json!(200)));
        assert_eq!(out[0].field("elapsed"), Some(&json!(0.042)));
        assert_eq!(out[0].field("verb"), Some(&json!("GET")));
    }

    #[tokio::test]
    async fn custom_patterns_extend_catalogue() {
        let processor = processor(json!({
            "pattern": "%{EVENTID:event_id}",
            "custom_patterns": {"EVENTID": r"4[0-9]{3}"}
        }));
        let event = LogEvent::new("logon failure 4625 detected", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("event_id"), Some(&json!("4625")));
    }

    #[tokio::test]
    async fn nested_catalogue_names_become_fields() {
        // SYSLOGPROG 내부의 %{PROG:program} / %{POSINT:pid} 참조가 전개됨
        let processor = processor(json!({"pattern": "%{SYSLOGPROG}"}));
        let event = LogEvent::new("sshd[1234]", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("program"), Some(&json!("sshd")));
        assert_eq!(out[0].field("pid"), Some(&json!("1234")));
    }

    #[tokio::test]
    async fn first_pattern_wins_with_break_on_match() {
        let processor = processor(json!({
            "patterns": [
                "level=%{LOGLEVEL:level}",
                "%{WORD:level}"
            ]
        }));
        let event = LogEvent::new("level=WARN rest", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("level"), Some(&json!("WARN")));
    }

    #[tokio::test]
    async fn no_match_passes_through() {
        let processor = processor(json!({"pattern": "%{IPV4:ip}"}));
        let event = LogEvent::new("no address here", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].fields.is_empty());
    }

    #[tokio::test]
    async fn target_field_nests_captures() {
        let processor = processor(json!({
            "pattern": "%{INT:status:int}",
            "target_field": "http"
        }));
        let event = LogEvent::new("503", "test");
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("http.status"), Some(&json!(503)));
    }

    #[test]
    fn unknown_sub_pattern_rejected_at_open() {
        let record = PluginRecord::new("g", "grok", json!({"pattern": "%{NO_SUCH_PATTERN:x}"}));
        let err = GrokProcessor::from_record(&record).unwrap_err();
        assert!(err.to_string().contains("NO_SUCH_PATTERN"));
    }

    #[test]
    fn cyclic_custom_pattern_rejected_at_open() {
        let record = PluginRecord::new(
            "g",
            "grok",
            json!({
                "pattern": "%{A:x}",
                "custom_patterns": {"A": "%{B}", "B": "%{A}"}
            }),
        );
        let err = GrokProcessor::from_record(&record).unwrap_err();
        assert!(err.to_string().contains("too deep"));
    }

    #[test]
    fn missing_pattern_rejected() {
        let record = PluginRecord::new("g", "grok", json!({}));
        assert!(GrokProcessor::from_record(&record).is_err());
    }

    #[test]
    fn all_default_patterns_expand_and_compile() {
        let catalogue: HashMap<&str, &str> = DEFAULT_PATTERNS.iter().copied().collect();
        for (name, _) in DEFAULT_PATTERNS {
            let mut types = HashMap::new();
            let expanded = expand(&format!("%{{{name}}}"), &catalogue, &mut types, 0)
                .unwrap_or_else(|e| panic!("pattern {name} failed to expand: {e}"));
            Regex::new(&expanded)
                .unwrap_or_else(|e| panic!("pattern {name} failed to compile: {e}"));
        }
    }

    #[tokio::test]
    async fn apache_common_log_extracts_request() {
        let processor = processor(json!({"pattern": "%{COMMONAPACHELOG}"}));
        let event = LogEvent::new(
            r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326"#,
            "test",
        );
        let out = processor.process(event).await.unwrap();
        assert_eq!(out[0].field("clientip"), Some(&json!("127.0.0.1")));
        assert_eq!(out[0].field("verb"), Some(&json!("GET")));
        assert_eq!(out[0].field("response"), Some(&json!("200")));
    }
}
