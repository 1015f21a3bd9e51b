//! Edge condition evaluation.
//!
//! Conditions are small boolean expressions written on edges, such as
//! `output.status == 'ok' && variables.retries < 3`. They are parsed into an
//! AST and interpreted over JSON values; nothing is ever compiled or handed to
//! a host language.
//!
//! Two roots are available:
//! - `output` (alias `sourceOutput`): what the edge's source node produced
//! - `variables`: the run's variables, including `variables.trigger`
//!
//! Supported syntax: `true`, `false`, `null`, `undefined`, numbers, quoted
//! strings, `a.b`, `a[expr]`, `.length`, unary `!` and `-`, `* / %`, `+ -`,
//! `< <= > >=`, `== === != !==`, `&&`, `||` and parentheses. Truthiness
//! follows the usual rules: `false`, `null`, `0` and `""` are falsy.

use crate::edge::WorkflowEdge;
use crate::error::ConditionError;
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::collections::HashMap;
use weft_core::NodeId;

/// Deepest nesting the parser accepts.
const MAX_DEPTH: usize = 64;

/// Most operators and accessors a single expression may contain.
const MAX_NODES: usize = 256;

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid expression.
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
            nodes: 0,
        };
        let expr = parser.expression(0)?;
        parser.expect_end()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Returns the original expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression and returns its raw value.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown identifiers and unsupported operand types.
    pub fn evaluate(
        &self,
        output: &JsonValue,
        variables: &JsonValue,
    ) -> Result<JsonValue, ConditionError> {
        let scope = Scope { output, variables };
        scope.eval(&self.expr).map(Cow::into_owned)
    }

    /// Evaluates the expression and applies truthiness.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails.
    pub fn is_satisfied(
        &self,
        output: &JsonValue,
        variables: &JsonValue,
    ) -> Result<bool, ConditionError> {
        let scope = Scope { output, variables };
        scope.eval(&self.expr).map(|value| is_truthy(&value))
    }
}

/// Parses and evaluates a condition in one step.
///
/// # Errors
///
/// Returns an error if parsing or evaluation fails.
pub fn evaluate_condition(
    source: &str,
    output: &JsonValue,
    variables: &JsonValue,
) -> Result<bool, ConditionError> {
    Condition::parse(source)?.is_satisfied(output, variables)
}

/// Returns whether every guarded incoming edge of a node is satisfied.
///
/// Each condition sees the output of its own edge's source node (`null` if
/// that node produced nothing). The check short-circuits on the first falsy
/// or failing condition, and failures count as unsatisfied.
pub fn conditions_met<'a>(
    incoming: impl IntoIterator<Item = &'a WorkflowEdge>,
    outputs: &HashMap<NodeId, JsonValue>,
    variables: &JsonValue,
) -> bool {
    for edge in incoming {
        let Some(guard) = edge.guard() else {
            continue;
        };
        let output = outputs.get(&edge.source).unwrap_or(&JsonValue::Null);
        match evaluate_condition(guard, output, variables) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(edge = %edge.id, condition = guard, "condition not met");
                return false;
            }
            Err(e) => {
                tracing::debug!(
                    edge = %edge.id,
                    condition = guard,
                    error = %e,
                    "condition failed to evaluate, treating as not met"
                );
                return false;
            }
        }
    }
    true
}

/// Applies truthiness to a JSON value.
#[must_use]
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Bang,
    Op(BinaryOp),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::NotEq => 3,
            Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Output,
    Variables,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(JsonValue),
    Root(Root),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let syntax = |position: usize, message: String| ConditionError::Syntax { position, message };

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let after = chars.get(i + 2).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match c {
            '.' if next.is_some_and(|n| n.is_ascii_digit()) && !follows_value(&tokens) => {
                let (number, width) = lex_number(&chars, i)?;
                (Token::Number(number), width)
            }
            '0'..='9' => {
                let (number, width) = lex_number(&chars, i)?;
                (Token::Number(number), width)
            }
            '\'' | '"' => {
                let (text, width) = lex_string(&chars, i)?;
                (Token::Str(text), width)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let ident: String = chars[i..]
                    .iter()
                    .map(|(_, c)| *c)
                    .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                    .collect();
                let width = ident.chars().count();
                (Token::Ident(ident), width)
            }
            '.' => (Token::Dot, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '+' => (Token::Op(BinaryOp::Add), 1),
            '-' => (Token::Op(BinaryOp::Sub), 1),
            '*' => (Token::Op(BinaryOp::Mul), 1),
            '/' => (Token::Op(BinaryOp::Div), 1),
            '%' => (Token::Op(BinaryOp::Rem), 1),
            '&' if next == Some('&') => (Token::Op(BinaryOp::And), 2),
            '|' if next == Some('|') => (Token::Op(BinaryOp::Or), 2),
            '<' if next == Some('=') => (Token::Op(BinaryOp::LtEq), 2),
            '<' => (Token::Op(BinaryOp::Lt), 1),
            '>' if next == Some('=') => (Token::Op(BinaryOp::GtEq), 2),
            '>' => (Token::Op(BinaryOp::Gt), 1),
            '=' if next == Some('=') && after == Some('=') => (Token::Op(BinaryOp::Eq), 3),
            '=' if next == Some('=') => (Token::Op(BinaryOp::Eq), 2),
            '!' if next == Some('=') && after == Some('=') => (Token::Op(BinaryOp::NotEq), 3),
            '!' if next == Some('=') => (Token::Op(BinaryOp::NotEq), 2),
            '!' => (Token::Bang, 1),
            other => return Err(syntax(pos, format!("unexpected character '{other}'"))),
        };

        tokens.push((pos, token));
        i += width;
    }

    tokens.push((source.len(), Token::End));
    Ok(tokens)
}

/// Whether the last token ends a value, making a following `.` an accessor.
fn follows_value(tokens: &[(usize, Token)]) -> bool {
    matches!(
        tokens.last(),
        Some((
            _,
            Token::Ident(_) | Token::Number(_) | Token::Str(_) | Token::RParen | Token::RBracket
        ))
    )
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(f64, usize), ConditionError> {
    let mut end = start;
    let mut seen_dot = false;
    let mut seen_exp = false;

    while let Some(&(_, c)) = chars.get(end) {
        match c {
            '0'..='9' => {}
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if !seen_exp => {
                seen_exp = true;
                if matches!(chars.get(end + 1), Some((_, '+' | '-'))) {
                    end += 1;
                }
            }
            _ => break,
        }
        end += 1;
    }

    let text: String = chars[start..end].iter().map(|(_, c)| *c).collect();
    text.parse::<f64>()
        .map(|n| (n, end - start))
        .map_err(|_| ConditionError::Syntax {
            position: chars[start].0,
            message: format!("invalid number '{text}'"),
        })
}

fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), ConditionError> {
    let quote = chars[start].1;
    let mut text = String::new();
    let mut i = start + 1;

    while let Some(&(_, c)) = chars.get(i) {
        match c {
            c if c == quote => return Ok((text, i + 1 - start)),
            '\\' => {
                let escaped = chars.get(i + 1).map(|(_, c)| *c);
                match escaped {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some(other) => text.push(other),
                    None => break,
                }
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ConditionError::Syntax {
        position: chars[start].0,
        message: "unterminated string".to_string(),
    })
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.cursor)
            .map_or(&Token::End, |(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.cursor).map_or(0, |(pos, _)| *pos)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ConditionError {
        ConditionError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ConditionError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> Result<(), ConditionError> {
        match self.peek() {
            Token::End => Ok(()),
            token => Err(self.error(format!("unexpected trailing {token:?}"))),
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    /// Counts one operator or accessor against `MAX_NODES`.
    fn grow(&mut self) -> Result<(), ConditionError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(self.error("expression too long"));
        }
        Ok(())
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, ConditionError> {
        self.descend()?;
        let mut lhs = self.unary()?;

        while let Token::Op(op) = *self.peek() {
            if op.precedence() < min_precedence {
                break;
            }
            self.grow()?;
            self.advance();
            let rhs = self.expression(op.precedence() + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        self.depth -= 1;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        match self.peek() {
            Token::Bang => {
                self.grow()?;
                self.advance();
                self.descend()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Not(Box::new(operand)))
            }
            Token::Op(BinaryOp::Sub) => {
                self.grow()?;
                self.advance();
                self.descend()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(operand)))
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        let position = self.position();
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(number(n).map_err(|_| {
                ConditionError::Syntax {
                    position,
                    message: "number out of range".to_string(),
                }
            })?)),
            Token::Str(s) => Ok(Expr::Literal(JsonValue::String(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(JsonValue::Bool(true))),
                "false" => Ok(Expr::Literal(JsonValue::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(JsonValue::Null)),
                "output" | "sourceOutput" => Ok(Expr::Root(Root::Output)),
                "variables" => Ok(Expr::Root(Root::Variables)),
                _ => Err(ConditionError::UnknownIdentifier { name }),
            },
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::End => Err(ConditionError::Syntax {
                position,
                message: "unexpected end of expression".to_string(),
            }),
            token => Err(ConditionError::Syntax {
                position,
                message: format!("unexpected {token:?}"),
            }),
        }
    }

    fn postfix(&mut self, mut expr: Expr) -> Result<Expr, ConditionError> {
        loop {
            match self.peek() {
                Token::Dot => {
                    self.grow()?;
                    self.advance();
                    match self.advance() {
                        Token::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                        _ => return Err(self.error("expected property name after '.'")),
                    }
                }
                Token::LBracket => {
                    self.grow()?;
                    self.advance();
                    let index = self.expression(0)?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }
}

struct Scope<'a> {
    output: &'a JsonValue,
    variables: &'a JsonValue,
}

impl<'a> Scope<'a> {
    fn eval(&self, expr: &Expr) -> Result<Cow<'a, JsonValue>, ConditionError> {
        match expr {
            Expr::Literal(value) => Ok(Cow::Owned(value.clone())),
            Expr::Root(Root::Output) => Ok(Cow::Borrowed(self.output)),
            Expr::Root(Root::Variables) => Ok(Cow::Borrowed(self.variables)),
            Expr::Member(base, name) => member(self.eval(base)?, name),
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let key = self.eval(index)?;
                match &*key {
                    JsonValue::String(key) => member(base, key),
                    JsonValue::Number(n) => member(base, &n.to_string()),
                    other => Err(type_error(format!("cannot index with {}", kind(other)))),
                }
            }
            Expr::Not(operand) => {
                let value = self.eval(operand)?;
                Ok(Cow::Owned(JsonValue::Bool(!is_truthy(&value))))
            }
            Expr::Neg(operand) => {
                let value = self.eval(operand)?;
                let n = as_number(&value, "-")?;
                Ok(Cow::Owned(number(-n)?))
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let left = self.eval(lhs)?;
                if is_truthy(&left) { self.eval(rhs) } else { Ok(left) }
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let left = self.eval(lhs)?;
                if is_truthy(&left) { Ok(left) } else { self.eval(rhs) }
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                binary(*op, &left, &right).map(Cow::Owned)
            }
        }
    }
}

fn member<'a>(base: Cow<'a, JsonValue>, key: &str) -> Result<Cow<'a, JsonValue>, ConditionError> {
    match base {
        Cow::Borrowed(value) => property(value, key),
        Cow::Owned(value) => property(&value, key).map(|v| Cow::Owned(v.into_owned())),
    }
}

fn property<'v>(value: &'v JsonValue, key: &str) -> Result<Cow<'v, JsonValue>, ConditionError> {
    let missing = || Cow::Owned(JsonValue::Null);
    match value {
        JsonValue::Null => Err(type_error(format!("cannot read property '{key}' of null"))),
        JsonValue::Object(map) => Ok(map.get(key).map_or_else(missing, Cow::Borrowed)),
        JsonValue::Array(items) if key == "length" => Ok(Cow::Owned(items.len().into())),
        JsonValue::Array(items) => Ok(key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .map_or_else(missing, Cow::Borrowed)),
        JsonValue::String(s) if key == "length" => Ok(Cow::Owned(s.chars().count().into())),
        _ => Ok(missing()),
    }
}

fn binary(op: BinaryOp, left: &JsonValue, right: &JsonValue) -> Result<JsonValue, ConditionError> {
    match op {
        BinaryOp::Eq => Ok(JsonValue::Bool(loose_eq(left, right))),
        BinaryOp::NotEq => Ok(JsonValue::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (JsonValue::String(a), JsonValue::String(b)) => a.partial_cmp(b),
                _ => as_number(left, "comparison")?.partial_cmp(&as_number(right, "comparison")?),
            };
            let Some(ordering) = ordering else {
                return Ok(JsonValue::Bool(false));
            };
            Ok(JsonValue::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Add if left.is_string() || right.is_string() => {
            Ok(JsonValue::String(format!("{}{}", render(left), render(right))))
        }
        BinaryOp::Add => number(as_number(left, "+")? + as_number(right, "+")?),
        BinaryOp::Sub => number(as_number(left, "-")? - as_number(right, "-")?),
        BinaryOp::Mul => number(as_number(left, "*")? * as_number(right, "*")?),
        BinaryOp::Div => number(as_number(left, "/")? / as_number(right, "/")?),
        BinaryOp::Rem => number(as_number(left, "%")? % as_number(right, "%")?),
        BinaryOp::And if is_truthy(left) => Ok(right.clone()),
        BinaryOp::And => Ok(left.clone()),
        BinaryOp::Or if is_truthy(left) => Ok(left.clone()),
        BinaryOp::Or => Ok(right.clone()),
    }
}

fn loose_eq(left: &JsonValue, right: &JsonValue) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn as_number(value: &JsonValue, op: &str) -> Result<f64, ConditionError> {
    value
        .as_f64()
        .ok_or_else(|| type_error(format!("'{op}' expects numbers, got {}", kind(value))))
}

/// Converts an arithmetic result back into JSON, keeping integers integral.
fn number(n: f64) -> Result<JsonValue, ConditionError> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(JsonValue::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or_else(|| type_error("arithmetic produced a non-finite number"))
}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn type_error(message: impl Into<String>) -> ConditionError {
    ConditionError::Type {
        message: message.into(),
    }
}
