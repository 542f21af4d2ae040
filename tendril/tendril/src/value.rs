//! Helpers over the value domain. Values are `serde_json::Value` with
//! insertion-ordered objects (the `preserve_order` feature).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tendril_parser::lexer::lr::Literal;
use tendril_parser::parser::pr::ValueType;

/// One step from a value to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSeg {
    Index(usize),
    Key(String),
}

impl std::fmt::Display for PathSeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSeg::Index(i) => write!(f, "[{i}]"),
            PathSeg::Key(k) => write!(f, ".{k}"),
        }
    }
}

/// A location in the input, from the root down.
pub type Path = Vec<PathSeg>;

/// Structural equality with SameValueZero on numbers: all numbers compare
/// by numeric value, so `1` equals `1.0`, and `+0` equals `-0`. (NaN cannot
/// occur in the value domain, so the NaN-equals-NaN clause is vacuous.)
/// Objects compare by key set, not insertion order.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => num_eq(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| deep_eq(x, y)))
        }
        _ => a == b,
    }
}

fn num_eq(x: &serde_json::Number, y: &serde_json::Number) -> bool {
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => x == y,
    }
}

/// Element-wise deep equality of two slices.
pub fn slices_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_eq(x, y))
}

pub fn value_at<'a>(root: &'a Value, path: &[PathSeg]) -> Option<&'a Value> {
    let mut node = root;
    for seg in path {
        node = match (seg, node) {
            (PathSeg::Index(i), Value::Array(items)) => items.get(*i)?,
            (PathSeg::Key(k), Value::Object(map)) => map.get(k)?,
            _ => return None,
        };
    }
    Some(node)
}

pub fn value_at_mut<'a>(root: &'a mut Value, path: &[PathSeg]) -> Option<&'a mut Value> {
    let mut node = root;
    for seg in path {
        node = match (seg, node) {
            (PathSeg::Index(i), Value::Array(items)) => items.get_mut(*i)?,
            (PathSeg::Key(k), Value::Object(map)) => map.get_mut(k)?,
            _ => return None,
        };
    }
    Some(node)
}

/// The value a pattern literal stands for. Regex and `/i` literals are
/// matchers, not values.
pub fn lit_to_value(lit: &Literal) -> Option<Value> {
    Some(match lit {
        Literal::Null => Value::Null,
        Literal::Integer(i) => Value::Number((*i).into()),
        Literal::Float(f) => Value::Number(serde_json::Number::from_f64(*f)?),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::String(s) => Value::String(s.clone()),
        Literal::CaseInsensitive(_) | Literal::Regex { .. } => return None,
    })
}

pub fn is_of_type(value: &Value, ty: ValueType) -> bool {
    match ty {
        ValueType::String => value.is_string(),
        ValueType::Number => value.is_number(),
        ValueType::Boolean => value.is_boolean(),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn number_equality_is_numeric() {
        assert!(deep_eq(&json!(1), &json!(1.0)));
        assert!(deep_eq(&json!(0.0), &json!(-0.0)));
        assert!(!deep_eq(&json!(1), &json!(2)));
    }

    #[test]
    fn object_equality_ignores_order() {
        let a = json!({"x": 1, "y": [1, 2]});
        let b = json!({"y": [1, 2], "x": 1});
        assert!(deep_eq(&a, &b));
        assert!(!deep_eq(&a, &json!({"x": 1})));
    }

    #[test]
    fn paths() {
        let v = json!({"a": [10, {"b": true}]});
        let path = vec![
            PathSeg::Key("a".to_string()),
            PathSeg::Index(1),
            PathSeg::Key("b".to_string()),
        ];
        assert_eq!(value_at(&v, &path), Some(&json!(true)));
        assert_eq!(value_at(&v, &[PathSeg::Index(0)]), None);
    }
}
