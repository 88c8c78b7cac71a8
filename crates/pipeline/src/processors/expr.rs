//! 필터 조건 표현식 -- 토크나이저, Pratt 파서, 평가기
//!
//! 필터 프로세서의 조건식을 AST로 컴파일하고 이벤트에 대해 평가합니다.
//!
//! # 문법
//! - 원자: 점 표기 식별자, 문자열 리터럴(`'...'`, `"..."`), 정수/실수,
//!   `true`/`false`, 레벨 토큰 심볼(`DEBUG`, `INFO`, `WARNING`, `ERROR`,
//!   `CRITICAL`)
//! - 비교: `==`, `!=`, `<`, `<=`, `>`, `>=`
//! - 포함: `in` (우변은 리스트 리터럴 `[a, b, ...]`)
//! - 논리: `and`, `or`, `not` (우선순위 `not` > `and` > `or`), 괄호 허용
//!
//! # 평가 규칙
//! - 없는 필드는 어떤 리터럴과도 같지 않고, 어떤 리스트에도 속하지 않음
//! - 수치 비교는 int/float 사이에서만, 심볼과 문자열은 텍스트 비교

use logflow_core::error::ConfigError;
use logflow_core::event::LogEvent;
use serde_json::Value;

/// 레벨 토큰으로 인식되는 bare word 목록
const LEVEL_SYMBOLS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

// ─── 토큰 ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Symbol(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
    Not,
}

fn lex_error(reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: "condition".to_owned(),
        reason: reason.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Eq);
                    }
                    _ => return Err(lex_error(format!("unexpected '=' at offset {pos}"))),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => return Err(lex_error(format!("unexpected '!' at offset {pos}"))),
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let mut text = String::new();
                let mut terminated = false;
                for (_, c) in chars.by_ref() {
                    if c == quote {
                        terminated = true;
                        break;
                    }
                    text.push(c);
                }
                if !terminated {
                    return Err(lex_error(format!(
                        "unterminated string literal at offset {pos}"
                    )));
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                if (c == '-' || c == '+')
                    && !chars.peek().is_some_and(|&(_, d)| d.is_ascii_digit())
                {
                    return Err(lex_error(format!("unexpected '{c}' at offset {pos}")));
                }
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if text.contains('.') {
                    let value: f64 = text
                        .parse()
                        .map_err(|_| lex_error(format!("invalid number '{text}'")))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value: i64 = text
                        .parse()
                        .map_err(|_| lex_error(format!("invalid number '{text}'")))?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '.' {
                        word.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::In),
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    w if LEVEL_SYMBOLS.contains(&w) => tokens.push(Token::Symbol(word)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(lex_error(format!(
                    "unexpected character '{other}' at offset {pos}"
                )));
            }
        }
    }

    Ok(tokens)
}

// ─── AST ─────────────────────────────────────────────────────────────

/// 리터럴 값
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// 레벨 토큰 bare word. 텍스트로 비교됩니다.
    Symbol(String),
}

/// 이항 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

/// 조건 표현식 AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Lit),
    /// 점 표기 필드 경로
    Ident(String),
    /// `in`의 우변 리스트 리터럴
    List(Vec<Lit>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// 조건식 문자열을 AST로 파싱합니다.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(lex_error("empty condition"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(lex_error(format!(
                "unexpected trailing token: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(expr)
    }

    /// 이벤트에 대해 불리언으로 평가합니다.
    pub fn eval(&self, event: &LogEvent) -> bool {
        match self {
            Expr::Literal(Lit::Bool(b)) => *b,
            Expr::Literal(_) | Expr::List(_) => false,
            Expr::Ident(path) => matches!(
                resolve_path(event, path),
                Scalar::Str(_) | Scalar::Int(_) | Scalar::Float(_) | Scalar::Bool(true)
            ),
            Expr::Not(inner) => !inner.eval(event),
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And => lhs.eval(event) && rhs.eval(event),
                BinOp::Or => lhs.eval(event) || rhs.eval(event),
                BinOp::In => {
                    let value = resolve(event, lhs);
                    match rhs.as_ref() {
                        Expr::List(items) => items
                            .iter()
                            .any(|item| compare_eq(&value, &Scalar::from_lit(item))),
                        _ => false,
                    }
                }
                _ => {
                    let left = resolve(event, lhs);
                    let right = resolve(event, rhs);
                    compare(*op, &left, &right)
                }
            },
        }
    }
}

// ─── Pratt 파서 ──────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ConfigError> {
        match self.advance() {
            Some(token) if token == *expected => Ok(()),
            other => Err(lex_error(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    /// 연산자의 좌측 결합력. `not`(5)보다 비교(7)가 강하게,
    /// `and`(3) / `or`(1)는 약하게 결합합니다.
    fn binding_power(token: &Token) -> Option<(u8, BinOp)> {
        match token {
            Token::Or => Some((1, BinOp::Or)),
            Token::And => Some((3, BinOp::And)),
            Token::Eq => Some((7, BinOp::Eq)),
            Token::Ne => Some((7, BinOp::Ne)),
            Token::Lt => Some((7, BinOp::Lt)),
            Token::Le => Some((7, BinOp::Le)),
            Token::Gt => Some((7, BinOp::Gt)),
            Token::Ge => Some((7, BinOp::Ge)),
            Token::In => Some((7, BinOp::In)),
            _ => None,
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ConfigError> {
        let mut lhs = self.parse_prefix()?;

        while let Some(token) = self.peek() {
            let Some((lbp, op)) = Self::binding_power(token) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.advance();
            let rhs = if op == BinOp::In {
                self.parse_list()?
            } else {
                self.parse_expr(lbp + 1)?
            };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ConfigError> {
        match self.advance() {
            Some(Token::Not) => {
                let inner = self.parse_expr(5)?;
                Ok(Expr::Not(Box::new(inner)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Lit::Str(s))),
            Some(Token::Int(n)) => Ok(Expr::Literal(Lit::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Lit::Float(f))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Lit::Bool(b))),
            Some(Token::Symbol(s)) => Ok(Expr::Literal(Lit::Symbol(s))),
            other => Err(lex_error(format!("unexpected token: {other:?}"))),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, ConfigError> {
        self.expect(&Token::LBracket)?;
        let mut items = Vec::new();
        loop {
            match self.advance() {
                Some(Token::RBracket) => break,
                Some(Token::Str(s)) => items.push(Lit::Str(s)),
                Some(Token::Int(n)) => items.push(Lit::Int(n)),
                Some(Token::Float(f)) => items.push(Lit::Float(f)),
                Some(Token::Bool(b)) => items.push(Lit::Bool(b)),
                Some(Token::Symbol(s)) => items.push(Lit::Symbol(s)),
                other => {
                    return Err(lex_error(format!("invalid list element: {other:?}")));
                }
            }
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::RBracket) => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(lex_error(format!("expected ',' or ']', got {other:?}")));
                }
            }
        }
        Ok(Expr::List(items))
    }
}

// ─── 평가 ────────────────────────────────────────────────────────────

/// 비교 피연산자로 해석된 스칼라 값
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Missing,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn from_lit(lit: &Lit) -> Self {
        match lit {
            Lit::Str(s) | Lit::Symbol(s) => Scalar::Str(s.clone()),
            Lit::Int(n) => Scalar::Int(*n),
            Lit::Float(f) => Scalar::Float(*f),
            Lit::Bool(b) => Scalar::Bool(*b),
        }
    }
}

fn resolve(event: &LogEvent, expr: &Expr) -> Scalar {
    match expr {
        Expr::Literal(lit) => Scalar::from_lit(lit),
        Expr::Ident(path) => resolve_path(event, path),
        _ => Scalar::Missing,
    }
}

fn resolve_path(event: &LogEvent, path: &str) -> Scalar {
    if path == "raw_data" {
        return Scalar::Str(event.raw_data.clone());
    }
    match event.field(path) {
        Some(Value::String(s)) => Scalar::Str(s.clone()),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Scalar::Int(i)
            } else {
                Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Some(Value::Bool(b)) => Scalar::Bool(*b),
        _ => Scalar::Missing,
    }
}

fn compare(op: BinOp, lhs: &Scalar, rhs: &Scalar) -> bool {
    match op {
        BinOp::Eq => compare_eq(lhs, rhs),
        BinOp::Ne => !compare_eq(lhs, rhs),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let Some(ordering) = numeric_ordering(lhs, rhs) else {
                return false;
            };
            match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
        _ => false,
    }
}

fn compare_eq(lhs: &Scalar, rhs: &Scalar) -> bool {
    match (lhs, rhs) {
        (Scalar::Missing, _) | (_, Scalar::Missing) => false,
        (Scalar::Str(a), Scalar::Str(b)) => a == b,
        (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
        (Scalar::Int(a), Scalar::Int(b)) => a == b,
        (Scalar::Float(a), Scalar::Float(b)) => a == b,
        (Scalar::Int(a), Scalar::Float(b)) | (Scalar::Float(b), Scalar::Int(a)) => {
            (*a as f64) == *b
        }
        _ => false,
    }
}

/// 수치 쌍에 대해서만 순서를 반환합니다.
fn numeric_ordering(lhs: &Scalar, rhs: &Scalar) -> Option<std::cmp::Ordering> {
    let left = match lhs {
        Scalar::Int(n) => *n as f64,
        Scalar::Float(f) => *f,
        _ => return None,
    };
    let right = match rhs {
        Scalar::Int(n) => *n as f64,
        Scalar::Float(f) => *f,
        _ => return None,
    };
    left.partial_cmp(&right)
}
