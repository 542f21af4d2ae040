//! Guard evaluation. Guards are total: any failure — a type mismatch, a
//! missing property, an unbound variable — is false, never a panic.

use std::collections::BTreeMap;

use serde_json::Value;

use tendril_parser::parser::pr::{GuardBinOp, GuardExpr, GuardExprKind, GuardUnOp};

use crate::engine::solution::Binding;
use crate::value::deep_eq;

pub(crate) fn eval_guard(
    expr: &GuardExpr,
    env: &BTreeMap<String, Binding>,
    current: Option<&Value>,
) -> bool {
    matches!(eval(expr, env, current), Some(Value::Bool(true)))
}

fn eval(
    expr: &GuardExpr,
    env: &BTreeMap<String, Binding>,
    current: Option<&Value>,
) -> Option<Value> {
    match &expr.kind {
        GuardExprKind::Literal(lit) => crate::value::lit_to_value(lit),
        GuardExprKind::Var(name) => env.get(name).map(Binding::to_value),
        GuardExprKind::Current => current.cloned(),

        GuardExprKind::Unary(u) => {
            let v = eval(&u.expr, env, current)?;
            match u.op {
                GuardUnOp::Not => match v {
                    Value::Bool(b) => Some(Value::Bool(!b)),
                    _ => None,
                },
                GuardUnOp::Neg => num(&v).and_then(|n| num_value(-n)),
            }
        }

        GuardExprKind::Binary(b) => {
            let left = eval(&b.left, env, current)?;

            // boolean connectives short-circuit
            match b.op {
                GuardBinOp::And => {
                    return match left {
                        Value::Bool(false) => Some(Value::Bool(false)),
                        Value::Bool(true) => match eval(&b.right, env, current)? {
                            Value::Bool(r) => Some(Value::Bool(r)),
                            _ => None,
                        },
                        _ => None,
                    }
                }
                GuardBinOp::Or => {
                    return match left {
                        Value::Bool(true) => Some(Value::Bool(true)),
                        Value::Bool(false) => match eval(&b.right, env, current)? {
                            Value::Bool(r) => Some(Value::Bool(r)),
                            _ => None,
                        },
                        _ => None,
                    }
                }
                _ => {}
            }

            let right = eval(&b.right, env, current)?;
            match b.op {
                GuardBinOp::Eq => Some(Value::Bool(deep_eq(&left, &right))),
                GuardBinOp::Ne => Some(Value::Bool(!deep_eq(&left, &right))),
                GuardBinOp::Lt => compare(&left, &right, |o| o.is_lt()),
                GuardBinOp::Lte => compare(&left, &right, |o| o.is_le()),
                GuardBinOp::Gt => compare(&left, &right, |o| o.is_gt()),
                GuardBinOp::Gte => compare(&left, &right, |o| o.is_ge()),
                GuardBinOp::Add => add(&left, &right),
                GuardBinOp::Sub => arith(&left, &right, i64::checked_sub, |x, y| x - y),
                GuardBinOp::Mul => arith(&left, &right, i64::checked_mul, |x, y| x * y),
                GuardBinOp::Mod => {
                    if matches!(&right, Value::Number(n) if n.as_f64() == Some(0.0)) {
                        return None;
                    }
                    arith(&left, &right, i64::checked_rem, |x, y| x % y)
                }
                GuardBinOp::And | GuardBinOp::Or => unreachable!("handled above"),
            }
        }

        GuardExprKind::Member(m) => {
            let base = eval(&m.base, env, current)?;
            if let Value::Object(map) = &base {
                if let Some(v) = map.get(&m.name) {
                    return Some(v.clone());
                }
            }
            if m.name == "length" {
                let len = match &base {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    _ => return None,
                };
                return Some(Value::Number(len.into()));
            }
            None
        }

        GuardExprKind::Index(ix) => {
            let base = eval(&ix.base, env, current)?;
            let index = eval(&ix.index, env, current)?;
            match (&base, &index) {
                (Value::Array(items), Value::Number(n)) => {
                    let i = n.as_u64()? as usize;
                    items.get(i).cloned()
                }
                (Value::Object(map), Value::String(k)) => map.get(k).cloned(),
                _ => None,
            }
        }
    }
}

fn num(v: &Value) -> Option<f64> {
    v.as_number().and_then(|n| n.as_f64())
}

fn num_value(f: f64) -> Option<Value> {
    serde_json::Number::from_f64(f).map(Value::Number)
}

fn compare(
    left: &Value,
    right: &Value,
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<Value> {
    let ordering = match (left, right) {
        (Value::Number(_), Value::Number(_)) => num(left)?.partial_cmp(&num(right)?)?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => return None,
    };
    Some(Value::Bool(test(ordering)))
}

/// `+` adds numbers and concatenates strings.
fn add(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(Value::String(format!("{a}{b}"))),
        _ => arith(left, right, i64::checked_add, |x, y| x + y),
    }
}

fn arith(
    left: &Value,
    right: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Option<Value> {
    let (Value::Number(l), Value::Number(r)) = (left, right) else {
        return None;
    };
    if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
        return int_op(l, r).map(|n| Value::Number(n.into()));
    }
    num_value(float_op(l.as_f64()?, r.as_f64()?))
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use tendril_parser::parser::parse_source;
    use tendril_parser::parser::pr::PatternKind;

    use super::*;

    /// Parse `{k: $x where <src>}` and pull out the guard.
    fn guard(src: &str) -> GuardExpr {
        let pattern = parse_source(&format!("{{k: $x where {src}}}")).unwrap();
        let PatternKind::Obj(obj) = pattern.kind else {
            panic!("not an object")
        };
        let term = obj.terms[0].as_key_value().unwrap();
        term.value
            .kind
            .as_s_bind()
            .unwrap()
            .guard
            .clone()
            .unwrap()
    }

    fn env(pairs: &[(&str, Value)]) -> BTreeMap<String, Binding> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Binding::Scalar(v.clone())))
            .collect()
    }

    #[test]
    fn comparisons() {
        let e = env(&[("x", json!(21))]);
        assert!(eval_guard(&guard("$x >= 18"), &e, None));
        assert!(!eval_guard(&guard("$x < 18"), &e, None));
        assert!(eval_guard(&guard("$x % 3 == 0"), &e, None));
        assert!(eval_guard(&guard("$x == 21.0"), &e, None));
    }

    #[test]
    fn strings_and_length() {
        let e = env(&[("s", json!("hi")), ("xs", json!([1, 2, 3]))]);
        assert!(eval_guard(&guard(r#"$s + "!" == "hi!""#), &e, None));
        assert!(eval_guard(&guard("$s.length == 2"), &e, None));
        assert!(eval_guard(&guard("$xs.length == 3"), &e, None));
        assert!(eval_guard(&guard("$xs[0] == 1"), &e, None));
    }

    #[test]
    fn failures_are_false() {
        let e = env(&[("x", json!("nan"))]);
        // type errors
        assert!(!eval_guard(&guard("$x > 3"), &e, None));
        // unbound variables
        assert!(!eval_guard(&guard("$missing == 1"), &e, None));
        // division-free: modulo by zero
        assert!(!eval_guard(&guard("3 % 0 == 0"), &e, None));
        // property access on a scalar
        assert!(!eval_guard(&guard("$x.foo == 1"), &e, None));
    }

    #[test]
    fn current_node() {
        let e = env(&[]);
        assert!(eval_guard(&guard("_ > 3"), &e, Some(&json!(5))));
        assert!(!eval_guard(&guard("_ > 3"), &e, None));
    }

    #[test]
    fn connectives() {
        let e = env(&[("a", json!(1)), ("b", json!(2))]);
        assert!(eval_guard(&guard("$a == 1 && $b == 2"), &e, None));
        assert!(eval_guard(&guard("$a == 9 || $b == 2"), &e, None));
        assert!(!eval_guard(&guard("!($a == 1)"), &e, None));
        // short-circuit: the bad operand on the right is never reached
        assert!(eval_guard(&guard("$a == 9 || $b == 2 || $nope > 1"), &e, None));
    }
}
