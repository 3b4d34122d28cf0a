// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::toolset::{ToolContext, ToolDescriptor, Toolset};

/// Arithmetic evaluator: `+ - * /`, parentheses, unary minus.
pub struct CalculatorToolset;

#[async_trait]
impl Toolset for CalculatorToolset {
    fn name(&self) -> &str {
        "calculator"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "evaluate".into(),
            description: "Evaluate an arithmetic expression and return the result. \
                          Supports +, -, *, /, parentheses, and unary minus."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "expr": { "type": "string", "description": "Expression, e.g. \"2+2\"" }
                },
                "required": ["expr"],
                "additionalProperties": false
            }),
        }]
    }

    async fn call(&self, function: &str, args: Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        if function != "evaluate" {
            anyhow::bail!("no function '{function}' on calculator");
        }
        let expr = args
            .get("expr")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'expr'"))?;
        let value = evaluate(expr)?;
        Ok(format_number(value))
    }
}

/// Integral results print without a trailing `.0` so `2+2` yields `4`.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

pub fn evaluate(expr: &str) -> anyhow::Result<f64> {
    let tokens: Vec<char> = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        anyhow::bail!("unexpected input at position {}", parser.pos);
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn expression(&mut self) -> anyhow::Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> anyhow::Result<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    anyhow::bail!("division by zero");
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> anyhow::Result<f64> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(')') {
                    anyhow::bail!("missing closing parenthesis");
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            other => anyhow::bail!("unexpected token {other:?}"),
        }
    }

    fn number(&mut self) -> anyhow::Result<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.tokens[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| anyhow::anyhow!("invalid number '{text}'"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_arithmetic() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
    }

    #[test]
    fn division_by_zero_errors() {
        assert!(evaluate("1/0").is_err());
    }

    #[test]
    fn garbage_errors() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("hello").is_err());
        assert!(evaluate("(1+2").is_err());
    }

    #[tokio::test]
    async fn evaluate_tool_returns_plain_integer() {
        let out = CalculatorToolset
            .call("evaluate", json!({"expr": "2+2"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out, "4");
    }

    #[tokio::test]
    async fn missing_expr_is_error() {
        assert!(CalculatorToolset
            .call("evaluate", json!({}), &ToolContext::default())
            .await
            .is_err());
    }
}
