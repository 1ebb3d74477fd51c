use std::cmp::Ordering;
use std::fmt;

use serde_json::{Number, Value};

use super::parser::{BinaryOp, Expr, Function, UnaryOp};

/// Why an expression could not be evaluated against one object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalError(String);

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EvalError {}

fn fail<T>(message: impl Into<String>) -> Result<T, EvalError> {
    Err(EvalError(message.into()))
}

/// Bindings visible to an expression: the object and its path.
#[derive(Clone, Copy, Debug)]
pub struct Scope<'a> {
    pub obj: &'a Value,
    pub obj_path: &'a str,
}

pub(crate) fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => Ok(match name.as_str() {
            "obj" => scope.obj.clone(),
            "objPath" => Value::String(scope.obj_path.to_string()),
            field => scope.obj.get(field).cloned().unwrap_or(Value::Null),
        }),
        Expr::Member(target, field) => {
            let target = evaluate(target, scope)?;
            member(&target, field)
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => {
                    let value = n
                        .as_u64()
                        .and_then(|i| items.get(i as usize))
                        .cloned()
                        .unwrap_or(Value::Null);
                    Ok(value)
                }
                (_, Value::String(field)) => member(&target, field),
                _ => fail(format!("cannot index {} with {}", type_name(&target), type_name(&index))),
            }
        }
        Expr::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, &args)
        }
        Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!truthy(&evaluate(operand, scope)?))),
        Expr::Unary(UnaryOp::Neg, operand) => {
            let value = evaluate(operand, scope)?;
            number(-as_number(&value)?)
        }
        Expr::And(left, right) => {
            let left = evaluate(left, scope)?;
            if truthy(&left) {
                evaluate(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, scope)?;
            if truthy(&left) {
                Ok(left)
            } else {
                evaluate(right, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            binary(*op, &left, &right)
        }
    }
}

fn member(target: &Value, field: &str) -> Result<Value, EvalError> {
    match target {
        Value::Object(map) => Ok(map.get(field).cloned().unwrap_or(Value::Null)),
        Value::Null => fail(format!("cannot read {field:?} of null")),
        _ => Ok(Value::Null),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Add => match (left, right) {
            (Value::String(a), b) => Ok(Value::String(format!("{a}{}", display(b)))),
            (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", display(a)))),
            _ => number(as_number(left)? + as_number(right)?),
        },
        BinaryOp::Sub => number(as_number(left)? - as_number(right)?),
        BinaryOp::Mul => number(as_number(left)? * as_number(right)?),
        BinaryOp::Div => number(as_number(left)? / as_number(right)?),
        BinaryOp::Rem => number(as_number(left)? % as_number(right)?),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Number(_), Value::Number(_)) => as_number(left)?.partial_cmp(&as_number(right)?),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    return fail(format!(
                        "cannot compare {} with {}",
                        type_name(left),
                        type_name(right)
                    ))
                }
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::LtEq => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
    }
}

fn call(function: Function, args: &[Value]) -> Result<Value, EvalError> {
    match (function, args) {
        (Function::StartsWith, [Value::String(s), Value::String(p)]) => Ok(Value::Bool(s.starts_with(p.as_str()))),
        (Function::EndsWith, [Value::String(s), Value::String(p)]) => Ok(Value::Bool(s.ends_with(p.as_str()))),
        (Function::Includes, [Value::String(s), Value::String(p)]) => Ok(Value::Bool(s.contains(p.as_str()))),
        (Function::Includes, [Value::Array(items), needle]) => {
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, needle))))
        }
        (Function::Lower, [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),
        (Function::Upper, [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
        (Function::Len, [Value::String(s)]) => Ok(Value::from(s.chars().count())),
        (Function::Len, [Value::Array(items)]) => Ok(Value::from(items.len())),
        (Function::Len, [Value::Object(map)]) => Ok(Value::from(map.len())),
        _ => fail(format!(
            "{function:?} does not accept ({})",
            args.iter().map(type_name).collect::<Vec<_>>().join(", ")
        )),
    }
}

/// JavaScript-style truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn as_number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| EvalError("number out of range".into())),
        other => fail(format!("expected a number, found {}", type_name(other))),
    }
}

/// Convert an arithmetic result back into JSON, keeping integers integral.
pub(crate) fn number(value: f64) -> Result<Value, EvalError> {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| EvalError(format!("non-finite result {value}")))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Total order used for sort keys: null, booleans, numbers, strings, then
/// arrays and objects by their JSON text.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ if rank(left) != rank(right) => rank(left).cmp(&rank(right)),
        _ => left.to_string().cmp(&right.to_string()),
    }
}
