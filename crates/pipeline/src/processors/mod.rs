//! 내장 프로세서 -- 이벤트 변환 플러그인
//!
//! # 내장 프로세서 목록
//! - [`JsonProcessor`]: 필드의 JSON 텍스트를 구조화 필드로 파싱
//! - [`FilterProcessor`]: 조건식 기반 통과/드롭
//! - [`RegexProcessor`]: 이름 있는 캡처 그룹으로 필드 추출
//! - [`GrokProcessor`]: 패턴 카탈로그 기반 필드 추출
//! - [`MutateProcessor`]: 필드 구조 편집
//! - [`EnrichProcessor`]: 룩업/geoip/UA/dns 파생 필드 추가

pub mod enrich;
pub mod expr;
pub mod filter;
pub mod grok;
pub mod json;
pub mod mutate;
pub mod regex;

pub use enrich::EnrichProcessor;
pub use filter::FilterProcessor;
pub use grok::GrokProcessor;
pub use json::JsonProcessor;
pub use mutate::MutateProcessor;
pub use regex::RegexProcessor;
