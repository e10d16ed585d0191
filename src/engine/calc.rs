//! Built-in arithmetic engine.
//!
//! A deliberately small reference engine so a farm is usable without any
//! external language plugged in: numbers, `+ - * /`, unary minus, parentheses,
//! identifiers resolved from the machine's bindings, and `name = expr`
//! assignment writing a binding back.

use serde_json::Value;

use super::{EngineFactory, EvalError, ScriptEngine};
use crate::bindings::Bindings;

pub struct CalcEngineFactory;

impl EngineFactory for CalcEngineFactory {
    fn language(&self) -> &str {
        "calc"
    }

    fn create_engine(&self) -> Box<dyn ScriptEngine> {
        Box::new(CalcEngine)
    }
}

pub struct CalcEngine;

impl ScriptEngine for CalcEngine {
    fn evaluate(
        &mut self,
        expression: &str,
        bindings: &mut Bindings,
    ) -> std::result::Result<Value, EvalError> {
        if let Some((name, rest)) = split_assignment(expression) {
            let value = number_to_value(eval_str(rest, bindings)?);
            bindings.set(name, value.clone());
            return Ok(value);
        }
        Ok(number_to_value(eval_str(expression, bindings)?))
    }
}

/// Recognizes `name = expr` where `name` is a plain identifier.
fn split_assignment(input: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = input.split_once('=')?;
    let name = lhs.trim();
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some((name, rhs))
    } else {
        None
    }
}

fn number_to_value(n: f64) -> Value {
    // Integral results surface as JSON integers.
    if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn eval_str(input: &str, bindings: &Bindings) -> std::result::Result<f64, EvalError> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        bindings,
    };
    let value = parser.expr()?;
    parser.skip_whitespace();
    match parser.peek() {
        None => Ok(value),
        Some(c) => Err(EvalError::new(format!("unexpected character '{c}'"))),
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    bindings: &'a Bindings,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expr(&mut self) -> std::result::Result<f64, EvalError> {
        let mut value = self.term()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.bump();
                    value += self.term()?;
                }
                Some('-') => {
                    self.bump();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> std::result::Result<f64, EvalError> {
        let mut value = self.factor()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') => {
                    self.bump();
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.bump();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(EvalError::new("division by zero"));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> std::result::Result<f64, EvalError> {
        self.skip_whitespace();
        match self.peek() {
            Some('-') => {
                self.bump();
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.bump();
                let value = self.expr()?;
                self.skip_whitespace();
                match self.bump() {
                    Some(')') => Ok(value),
                    _ => Err(EvalError::new("expected ')'")),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            Some(c) => Err(EvalError::new(format!("unexpected character '{c}'"))),
            None => Err(EvalError::new("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, EvalError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map_err(|_| EvalError::new(format!("malformed number '{text}'")))
    }

    fn identifier(&mut self) -> std::result::Result<f64, EvalError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        match self.bindings.get(&name) {
            Some(value) => value
                .as_f64()
                .ok_or_else(|| EvalError::new(format!("binding '{name}' is not numeric"))),
            None => Err(EvalError::new(format!("unbound identifier '{name}'"))),
        }
    }
}
