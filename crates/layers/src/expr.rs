use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

/// Layer filter over feature properties.
///
/// Kept as a small tree rather than engine JSON so filters can be compared,
/// evaluated in tests and in the headless engine, and only serialized at the
/// engine boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(bool),
    /// String property is a member of `values`.
    In {
        property: String,
        values: BTreeSet<String>,
    },
    Eq {
        property: String,
        value: Value,
    },
    /// Boolean property is `true`.
    Truthy(String),
    Not(Box<Expr>),
    All(Vec<Expr>),
}

impl Expr {
    pub fn is_in<I, S>(property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::In {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn equals(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Expr::Eq {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn truthy(property: impl Into<String>) -> Self {
        Expr::Truthy(property.into())
    }

    pub fn negate(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn evaluate(&self, props: &Map<String, Value>) -> bool {
        match self {
            Expr::Literal(b) => *b,
            Expr::In { property, values } => props
                .get(property)
                .and_then(Value::as_str)
                .is_some_and(|v| values.contains(v)),
            Expr::Eq { property, value } => props.get(property) == Some(value),
            Expr::Truthy(property) => props.get(property) == Some(&Value::Bool(true)),
            Expr::Not(inner) => !inner.evaluate(props),
            Expr::All(all) => all.iter().all(|e| e.evaluate(props)),
        }
    }

    /// The membership set of an `In` filter, looking through `All`.
    pub fn membership(&self, property: &str) -> Option<&BTreeSet<String>> {
        match self {
            Expr::In { property: p, values } if p == property => Some(values),
            Expr::All(all) => all.iter().find_map(|e| e.membership(property)),
            _ => None,
        }
    }

    /// MapLibre style-spec expression.
    pub fn to_json(&self) -> Value {
        match self {
            Expr::Literal(b) => Value::Bool(*b),
            Expr::In { property, values } => {
                let list: Vec<&str> = values.iter().map(String::as_str).collect();
                json!(["in", ["get", property], ["literal", list]])
            }
            Expr::Eq { property, value } => json!(["==", ["get", property], value]),
            Expr::Truthy(property) => json!(["==", ["get", property], true]),
            Expr::Not(inner) => json!(["!", inner.to_json()]),
            Expr::All(all) => {
                let mut out = vec![Value::String("all".to_string())];
                out.extend(all.iter().map(Expr::to_json));
                Value::Array(out)
            }
        }
    }
}
