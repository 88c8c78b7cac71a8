//! 필터 프로세서 -- 조건식 기반 이벤트 통과/드롭
//!
//! 이벤트 필드에 대한 불리언 조건식을 평가하여 참이면 통과,
//! 거짓이면 드롭합니다. 여러 줄로 작성된 조건은 `mode`에 따라
//! `all`(and) 또는 `any`(or)로 결합됩니다.

use serde::Deserialize;

use logflow_core::error::{ConfigError, ProcessorError};
use logflow_core::event::LogEvent;
use logflow_core::plugin::Processor;
use logflow_core::PluginRecord;

use super::expr::{BinOp, Expr};

/// 조건 결합 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// 모든 조건이 참이어야 통과
    #[default]
    All,
    /// 하나라도 참이면 통과
    Any,
}

/// 필터 프로세서 설정
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// 조건식. 줄 단위로 분리하여 `mode`로 결합합니다.
    pub condition: String,
    /// 결합 모드 (기본: all)
    #[serde(default)]
    pub mode: FilterMode,
    /// 전체 결과 반전 여부
    #[serde(default)]
    pub negate: bool,
}

/// 필터 프로세서
pub struct FilterProcessor {
    name: String,
    expr: Expr,
}

impl FilterProcessor {
    /// 플러그인 레코드에서 필터를 생성합니다.
    ///
    /// 조건식은 이 시점에 AST로 컴파일되며, 문법 오류는 로드 시점에
    /// 거부됩니다.
    pub fn from_record(record: &PluginRecord) -> Result<Self, ConfigError> {
        let config: FilterConfig =
            serde_json::from_value(record.config.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("processors.{}", record.name),
                    reason: e.to_string(),
                }
            })?;

        let clauses: Vec<Expr> = config
            .condition
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Expr::parse)
            .collect::<Result<_, _>>()?;

        if clauses.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "condition".to_owned(),
                reason: "at least one condition is required".to_owned(),
            });
        }

        let op = match config.mode {
            FilterMode::All => BinOp::And,
            FilterMode::Any => BinOp::Or,
        };

        let mut iter = clauses.into_iter();
        let mut combined = iter.next().expect("clauses is non-empty");
        for clause in iter {
            combined = Expr::Binary {
                op,
                lhs: Box::new(combined),
                rhs: Box::new(clause),
            };
        }

        if config.negate {
            combined = Expr::Not(Box::new(combined));
        }

        Ok(Self {
            name: record.name.clone(),
            expr: combined,
        })
    }
}

impl Processor for FilterProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: LogEvent) -> Result<Vec<LogEvent>, ProcessorError> {
        if self.expr.eval(&event) {
            Ok(vec![event])
        } else {
            Ok(vec![])
        }
    }

    async fn close(&self) {}
}
