/// Evaluator for condition ASTs
///
/// Evaluates parsed conditions against a fixed set of bindings. There are no
/// side effects and no access to anything but the bindings and the built-in
/// string helpers, and every run is capped at `MAX_STEPS` node visits.
use std::collections::BTreeMap;
use std::fmt;

use super::parser::{AstNode, BinaryOperator};

/// Node visits allowed per evaluation.
pub const MAX_STEPS: usize = 256;

/// Names visible to a condition.
pub type Bindings = BTreeMap<String, Value>;

/// Value type for evaluation results and emitted event arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(i64),
    Boolean(bool),
    Null,
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Convert value to boolean for condition evaluation
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
            Value::List(_) | Value::Object(_) => true,
        }
    }

    /// Get string representation
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(
                n.as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .unwrap_or_default(),
            ),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Evaluator state and execution
pub struct Evaluator<'a> {
    bindings: &'a Bindings,
    steps: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a Bindings) -> Self {
        Self { bindings, steps: 0 }
    }

    /// Evaluate an AST node
    pub fn evaluate(&mut self, node: &AstNode) -> Result<Value, String> {
        self.steps += 1;
        if self.steps > MAX_STEPS {
            return Err(format!("Evaluation exceeded {} steps", MAX_STEPS));
        }

        match node {
            AstNode::StringLiteral(s) => Ok(Value::String(s.clone())),

            AstNode::NumberLiteral(n) => Ok(Value::Number(*n)),

            AstNode::BooleanLiteral(b) => Ok(Value::Boolean(*b)),

            AstNode::Null => Ok(Value::Null),

            AstNode::Identifier(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| format!("Unknown name: {}", name)),

            AstNode::Field { target, field } => {
                let value = self.evaluate(target)?;
                self.evaluate_field(value, field)
            }

            AstNode::Not(inner) => Ok(Value::Boolean(!self.evaluate(inner)?.is_truthy())),

            AstNode::Call { name, args } => self.evaluate_call(name, args),

            AstNode::BinaryOp { op, left, right } => self.evaluate_binary_op(*op, left, right),

            AstNode::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_value = self.evaluate(condition)?;
                if cond_value.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
        }
    }

    fn evaluate_field(&self, value: Value, field: &str) -> Result<Value, String> {
        match (value, field) {
            (Value::Object(mut map), _) => Ok(map.remove(field).unwrap_or(Value::Null)),
            (Value::String(s), "length") => Ok(Value::Number(s.chars().count() as i64)),
            (Value::List(items), "length") => Ok(Value::Number(items.len() as i64)),
            (Value::Null, _) => Err(format!("Cannot read field '{}' of null", field)),
            (other, _) => Err(format!("Cannot read field '{}' of {}", field, other)),
        }
    }

    /// Evaluate a binary operator
    fn evaluate_binary_op(
        &mut self,
        op: BinaryOperator,
        left: &AstNode,
        right: &AstNode,
    ) -> Result<Value, String> {
        match op {
            BinaryOperator::And => {
                let left_val = self.evaluate(left)?;
                if !left_val.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                let right_val = self.evaluate(right)?;
                Ok(Value::Boolean(right_val.is_truthy()))
            }

            BinaryOperator::Or => {
                let left_val = self.evaluate(left)?;
                if left_val.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                let right_val = self.evaluate(right)?;
                Ok(Value::Boolean(right_val.is_truthy()))
            }

            BinaryOperator::Equal => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;
                Ok(Value::Boolean(left_val == right_val))
            }

            BinaryOperator::NotEqual => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;
                Ok(Value::Boolean(left_val != right_val))
            }

            BinaryOperator::Greater
            | BinaryOperator::Less
            | BinaryOperator::GreaterEqual
            | BinaryOperator::LessEqual => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;
                match (left_val, right_val) {
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Boolean(match op {
                        BinaryOperator::Greater => l > r,
                        BinaryOperator::Less => l < r,
                        BinaryOperator::GreaterEqual => l >= r,
                        _ => l <= r,
                    })),
                    (l, r) => Err(format!("'{}' requires numbers, got {} and {}", op, l, r)),
                }
            }
        }
    }

    /// Evaluate a built-in function call
    fn evaluate_call(&mut self, name: &str, args: &[AstNode]) -> Result<Value, String> {
        let values = args
            .iter()
            .map(|a| self.evaluate(a))
            .collect::<Result<Vec<_>, _>>()?;

        match name {
            "lower" => Ok(Value::String(one_string(name, &values)?.to_lowercase())),
            "upper" => Ok(Value::String(one_string(name, &values)?.to_uppercase())),
            "len" => match values.as_slice() {
                [Value::List(items)] => Ok(Value::Number(items.len() as i64)),
                _ => Ok(Value::Number(one_string(name, &values)?.chars().count() as i64)),
            },
            "number" => {
                let s = one_string(name, &values)?;
                Ok(s.trim().parse::<i64>().map(Value::Number).unwrap_or(Value::Null))
            }
            "contains" => {
                let (haystack, needle) = two_strings(name, &values)?;
                Ok(Value::Boolean(haystack.contains(needle)))
            }
            "starts_with" => {
                let (haystack, prefix) = two_strings(name, &values)?;
                Ok(Value::Boolean(haystack.starts_with(prefix)))
            }
            "ends_with" => {
                let (haystack, suffix) = two_strings(name, &values)?;
                Ok(Value::Boolean(haystack.ends_with(suffix)))
            }
            "equals_ignore_case" => {
                let (a, b) = two_strings(name, &values)?;
                Ok(Value::Boolean(a.to_lowercase() == b.to_lowercase()))
            }
            "contains_any" => {
                let Some((first, words)) = values.split_first() else {
                    return Err("contains_any() needs a text and at least one keyword".to_string());
                };
                let haystack = first
                    .as_str()
                    .ok_or_else(|| format!("contains_any() expects a string, got {}", first))?
                    .to_lowercase();
                let mut found = false;
                for word in words {
                    let word = word
                        .as_str()
                        .ok_or_else(|| format!("contains_any() keywords must be strings, got {}", word))?;
                    if haystack.contains(&word.to_lowercase()) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Boolean(found))
            }
            _ => Err(format!("Unknown function: {}()", name)),
        }
    }
}

fn one_string<'v>(name: &str, values: &'v [Value]) -> Result<&'v str, String> {
    match values {
        [Value::String(s)] => Ok(s),
        _ => Err(format!("{}() expects one string argument", name)),
    }
}

fn two_strings<'v>(name: &str, values: &'v [Value]) -> Result<(&'v str, &'v str), String> {
    match values {
        [Value::String(a), Value::String(b)] => Ok((a, b)),
        _ => Err(format!("{}() expects two string arguments", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_expression;
    use super::*;

    fn eval(source: &str, bindings: &Bindings) -> Result<Value, String> {
        let ast = parse_expression(source)?;
        Evaluator::new(bindings).evaluate(&ast)
    }

    fn chat_bindings(to: &str, content: &str) -> Bindings {
        let mut b = Bindings::new();
        b.insert("toId".into(), Value::from(to));
        b.insert(
            "message".into(),
            Value::object([("content", Value::from(content)), ("sender", Value::from("player"))]),
        );
        b
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let b = chat_bindings("players.mom", "I REBOOTED it");
        let v = eval(
            "toId == 'players.mom' && contains_any(message.content, 'done', 'rebooted')",
            &b,
        )
        .unwrap();
        assert_eq!(v, Value::Boolean(true));

        let b = chat_bindings("players.uncle", "I rebooted it");
        let v = eval(
            "toId == 'players.mom' && contains_any(message.content, 'done', 'rebooted')",
            &b,
        )
        .unwrap();
        assert_eq!(v, Value::Boolean(false));
    }

    #[test]
    fn and_short_circuits_before_bad_field() {
        let mut b = Bindings::new();
        b.insert("event".into(), Value::Null);
        assert_eq!(eval("false && event.type == 'x'", &b).unwrap(), Value::Boolean(false));
        assert!(eval("event.type == 'x'", &b).is_err());
    }

    #[test]
    fn missing_object_field_is_null() {
        let b = chat_bindings("a", "b");
        assert_eq!(eval("message.nope", &b).unwrap(), Value::Null);
        assert_eq!(eval("message.content.length", &b).unwrap(), Value::Number(1));
    }

    #[test]
    fn numeric_comparisons_require_numbers() {
        let mut b = Bindings::new();
        b.insert("balance".into(), Value::Number(50));
        assert_eq!(eval("balance >= 50", &b).unwrap(), Value::Boolean(true));
        assert_eq!(eval("balance < 10", &b).unwrap(), Value::Boolean(false));
        assert!(eval("balance > 'x'", &b).is_err());
    }

    #[test]
    fn string_helpers() {
        let b = Bindings::new();
        assert_eq!(eval("lower('AbC')", &b).unwrap(), Value::from("abc"));
        assert_eq!(eval("len('abcd') == 4", &b).unwrap(), Value::Boolean(true));
        assert_eq!(eval("starts_with('reboot now', 'reboot')", &b).unwrap(), Value::Boolean(true));
        assert_eq!(eval("equals_ignore_case('Luna', 'LUNA')", &b).unwrap(), Value::Boolean(true));
        assert_eq!(eval("number(' 42 ')", &b).unwrap(), Value::Number(42));
        assert_eq!(eval("!contains('abc', 'z')", &b).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn unknown_name_and_function_are_errors() {
        let b = Bindings::new();
        assert!(eval("nobody", &b).unwrap_err().contains("Unknown name"));
        assert!(eval("exec('rm')", &b).unwrap_err().contains("Unknown function"));
    }

    #[test]
    fn step_limit_stops_runaway_expressions() {
        let b = Bindings::new();
        let long = vec!["true"; 200].join(" && ");
        assert!(eval(&long, &b).unwrap_err().contains("steps"));
    }
}
