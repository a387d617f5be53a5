use std::fmt;

use serde_json::{Map, Number, Value};

/// Resolved variable values for one operation, keyed by variable name.
pub type Variables = Map<String, Value>;

/// Argument and default-value literals as written in a document or schema.
///
/// Unlike result data, an input literal may reference a variable, which is
/// only resolved once the request's variable values are known.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    Bool(bool),
    /// A UTF-8 string.
    String(String),
    /// A bare enum value such as `ADMIN`.
    Enum(String),
    List(Vec<InputValue>),
    /// Object literal; entries keep their written order.
    Object(Vec<(String, InputValue)>),
    /// A `$name` reference.
    Variable(String),
}

impl InputValue {
    /// Resolve this literal against the request variables.
    ///
    /// Returns `None` only when the literal itself is a variable with no
    /// value; nested missing variables resolve to `null`.
    #[must_use]
    pub fn resolve(&self, variables: &Variables) -> Option<Value> {
        match self {
            InputValue::Variable(name) => variables.get(name).cloned(),
            other => Some(other.resolve_nested(variables)),
        }
    }

    fn resolve_nested(&self, variables: &Variables) -> Value {
        match self {
            InputValue::Null => Value::Null,
            InputValue::Int(v) => Value::Number(Number::from(*v)),
            InputValue::Float(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
            InputValue::Bool(v) => Value::Bool(*v),
            InputValue::String(v) | InputValue::Enum(v) => Value::String(v.clone()),
            InputValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve_nested(variables))
                    .collect(),
            ),
            InputValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, item)| (key.clone(), item.resolve_nested(variables)))
                    .collect(),
            ),
            InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        }
    }

    /// Names inside a list literal (or a single name), used for rule lists in
    /// annotations. Accepts enum-style names and strings.
    pub(crate) fn as_name_list(&self) -> Option<Vec<String>> {
        match self {
            InputValue::Enum(name) | InputValue::String(name) => Some(vec![name.clone()]),
            InputValue::List(items) => items
                .iter()
                .map(|item| match item {
                    InputValue::Enum(name) | InputValue::String(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        InputValue::Int(v)
    }
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        InputValue::Float(v)
    }
}

impl From<bool> for InputValue {
    fn from(v: bool) -> Self {
        InputValue::Bool(v)
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        InputValue::String(v.to_owned())
    }
}

impl From<String> for InputValue {
    fn from(v: String) -> Self {
        InputValue::String(v)
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Null => write!(f, "null"),
            InputValue::Int(v) => write!(f, "{v}"),
            InputValue::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            InputValue::Bool(v) => write!(f, "{v}"),
            InputValue::String(v) => {
                write!(f, "\"")?;
                for ch in v.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            InputValue::Enum(v) => write!(f, "{v}"),
            InputValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            InputValue::Object(entries) => {
                write!(f, "{{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                write!(f, "}}")
            }
            InputValue::Variable(name) => write!(f, "${name}"),
        }
    }
}
