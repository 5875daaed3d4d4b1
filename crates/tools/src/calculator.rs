//! Calculator tool: arithmetic over `+ - * /`, parentheses and unary minus.

use async_trait::async_trait;
use ferroact_core::error::ToolError;
use ferroact_core::tool::{ParameterDefinition, ParameterType, Tool, ToolArgs};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

/// Deepest nesting of parentheses and unary signs accepted.
const MAX_DEPTH: usize = 256;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression with +, -, *, /, parentheses and decimals."
    }

    fn parameters(&self) -> BTreeMap<String, ParameterDefinition> {
        BTreeMap::from([(
            "expression".to_string(),
            ParameterDefinition::new(ParameterType::String, "Expression to evaluate, e.g. '(2 + 3) * 4'")
                .required()
                .with_range(Some(1.0), None),
        )])
    }

    async fn execute(&self, args: ToolArgs) -> Result<serde_json::Value, ToolError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let value = evaluate(expression).map_err(|e| ToolError::failed(self.name(), e))?;
        Ok(serde_json::json!(value))
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut eval = Evaluator {
        chars: expression.chars().peekable(),
        depth: 0,
    };
    let value = eval.expression(0)?;
    eval.skip_whitespace();
    match eval.chars.peek() {
        None => Ok(value),
        Some(c) => Err(format!("Unexpected character: '{c}'")),
    }
}

/// Precedence climbing directly over the character stream.
struct Evaluator<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

fn binding_power(op: char) -> Option<u8> {
    match op {
        '+' | '-' => Some(1),
        '*' | '/' => Some(2),
        _ => None,
    }
}

impl Evaluator<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn expression(&mut self, min_power: u8) -> Result<f64, String> {
        let mut left = self.operand()?;

        loop {
            self.skip_whitespace();
            let Some(&op) = self.chars.peek() else { break };
            let Some(power) = binding_power(op) else { break };
            if power <= min_power {
                break;
            }
            self.chars.next();

            let right = self.expression(power)?;
            left = match op {
                '+' => left + right,
                '-' => left - right,
                '*' => left * right,
                _ if right == 0.0 => return Err("Division by zero".into()),
                _ => left / right,
            };
        }
        Ok(left)
    }

    fn operand(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = self.nested_operand();
        self.depth -= 1;
        value
    }

    fn nested_operand(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            Some('-') => {
                self.chars.next();
                Ok(-self.operand()?)
            }
            Some('+') => {
                self.chars.next();
                self.operand()
            }
            Some('(') => {
                self.chars.next();
                let inner = self.expression(0)?;
                self.skip_whitespace();
                match self.chars.next() {
                    Some(')') => Ok(inner),
                    _ => Err("Missing closing parenthesis".into()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("Unexpected character: '{c}'")),
            None => Err("Unexpected end of expression".into()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        literal
            .parse()
            .map_err(|_| format!("Invalid number: {literal}"))
    }
}
