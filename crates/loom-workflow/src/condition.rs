//! Safe, bounded condition evaluation for workflow steps.
//!
//! Supports literals, `${...}` and bare dotted lookups, equality, comparison
//! and boolean operators. There is deliberately no function application or
//! arbitrary evaluation; anything outside the grammar is an expression error.

use serde_json::Value;

use crate::error::WorkflowError;
use crate::interpolate::lookup_path;

/// Evaluate a condition expression against a scope, coercing to boolean.
pub fn evaluate_condition(expression: &str, scope: &Value) -> Result<bool, WorkflowError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        scope,
    };
    let value = parser.parse_or()?;
    if parser.position != parser.tokens.len() {
        return Err(WorkflowError::Expression(format!(
            "unexpected trailing input in '{expression}'"
        )));
    }
    Ok(truthy(&value))
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    /// Bare identifier or `${...}` placeholder, both resolved as a path.
    Lookup(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, WorkflowError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(WorkflowError::Expression(format!(
                                "unterminated string in '{input}'"
                            )))
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                let mut name = String::new();
                i += 2;
                loop {
                    match chars.get(i) {
                        Some('}') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            name.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(WorkflowError::Expression(format!(
                                "unterminated placeholder in '{input}'"
                            )))
                        }
                    }
                }
                tokens.push(Token::Lookup(name));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                text.push(c);
                i += 1;
                while let Some(&ch) = chars.get(i) {
                    if ch.is_ascii_digit() || ch == '.' {
                        text.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                let number = text.parse::<f64>().map_err(|_| {
                    WorkflowError::Expression(format!("invalid number '{text}'"))
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                text.push(c);
                i += 1;
                while let Some(&ch) = chars.get(i) {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        text.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                match text.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Lookup(text)),
                }
            }
            other => {
                return Err(WorkflowError::Expression(format!(
                    "unexpected character '{other}' in '{input}'"
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    scope: &'a Value,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Value, WorkflowError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, WorkflowError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Value, WorkflowError> {
        let left = self.parse_unary()?;
        let operator = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Le) => Token::Le,
            Some(Token::Ge) => Token::Ge,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Gt) => Token::Gt,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary()?;

        let result = match operator {
            Token::Eq => loose_equals(&left, &right),
            Token::Ne => !loose_equals(&left, &right),
            Token::Lt | Token::Le | Token::Gt | Token::Ge => {
                let ordering = compare(&left, &right)?;
                match operator {
                    Token::Lt => ordering == std::cmp::Ordering::Less,
                    Token::Le => ordering != std::cmp::Ordering::Greater,
                    Token::Gt => ordering == std::cmp::Ordering::Greater,
                    Token::Ge => ordering != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                }
            }
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }

    fn parse_unary(&mut self) -> Result<Value, WorkflowError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value, WorkflowError> {
        match self.advance() {
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(WorkflowError::Expression("missing ')'".to_string())),
                }
            }
            Some(Token::Number(n)) => Ok(serde_json::json!(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Lookup(path)) => {
                Ok(lookup_path(self.scope, &path).cloned().unwrap_or(Value::Null))
            }
            other => Err(WorkflowError::Expression(format!(
                "unexpected token {other:?}"
            ))),
        }
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, WorkflowError> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l
            .partial_cmp(&r)
            .ok_or_else(|| WorkflowError::Expression("incomparable numbers".to_string()));
    }
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return Ok(l.cmp(r));
    }
    Err(WorkflowError::Expression(format!(
        "cannot compare {left} and {right}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Value {
        json!({
            "count": 5,
            "name": "alice",
            "ready": true,
            "step_results": { "fetch": { "status": "ok", "items": 3 } }
        })
    }

    #[test]
    fn literals_and_lookups() {
        let scope = scope();
        assert!(evaluate_condition("true", &scope).unwrap());
        assert!(!evaluate_condition("false", &scope).unwrap());
        assert!(!evaluate_condition("null", &scope).unwrap());
        assert!(evaluate_condition("ready", &scope).unwrap());
        assert!(evaluate_condition("${ready}", &scope).unwrap());
        assert!(!evaluate_condition("missing", &scope).unwrap());
    }

    #[test]
    fn equality_and_comparison() {
        let scope = scope();
        assert!(evaluate_condition("count == 5", &scope).unwrap());
        assert!(evaluate_condition("count != 4", &scope).unwrap());
        assert!(evaluate_condition("count > 3", &scope).unwrap());
        assert!(evaluate_condition("count <= 5", &scope).unwrap());
        assert!(evaluate_condition("name == 'alice'", &scope).unwrap());
        assert!(evaluate_condition("name < \"bob\"", &scope).unwrap());
    }

    #[test]
    fn step_result_lookup() {
        let scope = scope();
        assert!(evaluate_condition("step_results.fetch.status == 'ok'", &scope).unwrap());
        assert!(evaluate_condition("${step_results.fetch.items} >= 3", &scope).unwrap());
    }

    #[test]
    fn boolean_operators_and_grouping() {
        let scope = scope();
        assert!(evaluate_condition("count > 3 && name == 'alice'", &scope).unwrap());
        assert!(evaluate_condition("count > 10 || ready", &scope).unwrap());
        assert!(evaluate_condition("!(count > 10)", &scope).unwrap());
        assert!(evaluate_condition("(count > 10 || count < 6) && ready", &scope).unwrap());
    }

    #[test]
    fn missing_lookups_compare_as_null() {
        let scope = scope();
        assert!(evaluate_condition("missing == null", &scope).unwrap());
        assert!(!evaluate_condition("missing == 'x'", &scope).unwrap());
    }

    #[test]
    fn malformed_expressions_error() {
        let scope = scope();
        assert!(evaluate_condition("count >", &scope).is_err());
        assert!(evaluate_condition("(count > 1", &scope).is_err());
        assert!(evaluate_condition("count @ 3", &scope).is_err());
        assert!(evaluate_condition("'unterminated", &scope).is_err());
        assert!(evaluate_condition("count > 1 extra", &scope).is_err());
    }

    #[test]
    fn incomparable_types_error() {
        let scope = scope();
        assert!(evaluate_condition("name > 3", &scope).is_err());
    }
}
