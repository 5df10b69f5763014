//! Closed predicate language for trigger and conditional content.
//!
//! Mission content describes conditions as short expressions such as
//!
//! ```text
//! toId == 'players.mom' && contains_any(message.content, 'done', 'fixed')
//! ```
//!
//! A [`Condition`] is compiled once per arming, after `{{var}}` placeholders
//! have been substituted, and then evaluated once per emission of the
//! subscribed event. Only the leading emitted arguments named by the
//! `conditionArgs` list are bound; extra arguments are ignored and missing ones
//! bind as `null`.
//!
//! The language has literals, names, field access, `!`, comparisons, `&&`,
//! `||`, the ternary operator, and a fixed set of string helpers (see
//! [`evaluator`]). It cannot call services, loop, or mutate anything.

pub mod evaluator;
pub mod parser;

pub use evaluator::{Bindings, Evaluator, Value};
pub use parser::{parse_expression, AstNode, BinaryOperator};

use super::errors::{MissionError, Result};

/// A parsed condition with its positional parameter names.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    params: Vec<String>,
    ast: AstNode,
}

impl Condition {
    /// Compile `source` with parameters taken from a comma separated list.
    pub fn compile(condition_args: &str, source: &str) -> Result<Self> {
        let params = parse_params(condition_args)?;
        let ast = parse_expression(source.trim()).map_err(|e| {
            MissionError::Condition(format!("{} in `{}`", e, crate::logutil::escape_log(source)))
        })?;
        Ok(Self {
            source: source.to_string(),
            params,
            ast,
        })
    }

    /// Compile an expression that only reads named bindings.
    pub fn expression(source: &str) -> Result<Self> {
        Self::compile("", source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Bind the leading `arity()` arguments positionally and evaluate.
    pub fn evaluate_args(&self, args: &[Value]) -> std::result::Result<bool, String> {
        let bindings: Bindings = self
            .params
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), args.get(i).cloned().unwrap_or(Value::Null)))
            .collect();
        self.evaluate_with(&bindings)
    }

    pub fn evaluate_with(&self, bindings: &Bindings) -> std::result::Result<bool, String> {
        Evaluator::new(bindings)
            .evaluate(&self.ast)
            .map(|v| v.is_truthy())
    }
}

fn parse_params(condition_args: &str) -> Result<Vec<String>> {
    let mut params = Vec::new();
    for raw in condition_args.split(',') {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }
        let valid = name
            .chars()
            .next()
            .map_or(false, |c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid {
            return Err(MissionError::Condition(format!(
                "invalid parameter name '{}' in conditionArgs",
                name
            )));
        }
        params.push(name.to_string());
    }
    Ok(params)
}
