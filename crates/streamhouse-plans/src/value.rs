//! Typed values and the comparison/coercion rules applied to them

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::expr::BinaryOp;
use crate::Result;

/// A dynamically typed scalar carried by a message field or produced by
/// evaluating an expression.
///
/// Serialized untagged. Times are written as RFC 3339 strings and read back
/// as [`Value::String`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Time(DateTime<Utc>),
    Null,
}

impl Value {
    /// Lowercase primitive type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int64",
            Value::Float(_) => "float64",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Time(_) => "time",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view of the value, promoting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Nested arrays and objects are kept as their
    /// JSON text.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    /// Evaluate `self <op> other` for a comparison operator.
    ///
    /// Defined pairs: int/int, float/float, int/float (the int is promoted),
    /// string/string, bool/bool (`=` and `!=` only) and time/time. A null
    /// operand never fails: `=` holds when both sides are null, `!=` when
    /// exactly one is, and ordering operators are false. Every other pairing
    /// is an [`PlanError::InvalidOperation`].
    pub fn compare(&self, op: BinaryOp, other: &Value) -> Result<bool> {
        if !op.is_comparison() {
            return Err(self.invalid_operation(op, other));
        }
        let ordering = match (self, other) {
            (Value::Null, _) | (_, Value::Null) => {
                let both = self.is_null() && other.is_null();
                return Ok(match op {
                    BinaryOp::Eq => both,
                    BinaryOp::NotEq => !both,
                    _ => false,
                });
            }
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) => {
                Some(a.cmp(b))
            }
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => return Err(self.invalid_operation(op, other)),
        };
        Ok(op.holds(ordering))
    }

    /// Evaluate `self <op> other` for an arithmetic operator.
    ///
    /// Integer arithmetic wraps on overflow. Mixing an int with a float
    /// yields a float, `+` concatenates strings, and a null operand makes
    /// the result null.
    pub fn arithmetic(&self, op: BinaryOp, other: &Value) -> Result<Value> {
        if !op.is_arithmetic() {
            return Err(self.invalid_operation(op, other));
        }
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => int_arithmetic(*a, op, *b).map(Value::Int),
            (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
                Ok(Value::String(format!("{a}{b}")))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => float_arithmetic(a, op, b).map(Value::Float),
                _ => Err(self.invalid_operation(op, other)),
            },
        }
    }

    pub(crate) fn invalid_operation(&self, op: BinaryOp, other: &Value) -> PlanError {
        PlanError::InvalidOperation {
            left: self.clone(),
            op,
            right: other.clone(),
        }
    }
}

fn int_arithmetic(a: i64, op: BinaryOp, b: i64) -> Result<i64> {
    match op {
        BinaryOp::Add => Ok(a.wrapping_add(b)),
        BinaryOp::Sub => Ok(a.wrapping_sub(b)),
        BinaryOp::Mul => Ok(a.wrapping_mul(b)),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => Err(PlanError::DivisionByZero),
        BinaryOp::Div => Ok(a.wrapping_div(b)),
        BinaryOp::Mod => Ok(a.wrapping_rem(b)),
        _ => Err(Value::Int(a).invalid_operation(op, &Value::Int(b))),
    }
}

fn float_arithmetic(a: f64, op: BinaryOp, b: f64) -> Result<f64> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => Err(PlanError::DivisionByZero),
        BinaryOp::Div => Ok(a / b),
        BinaryOp::Mod => Ok(a % b),
        _ => Err(Value::Float(a).invalid_operation(op, &Value::Float(b))),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Time(t) => f.write_str(&t.to_rfc3339()),
            Value::Null => f.write_str("null"),
        }
    }
}

/// Shortest round-trip text for a float. The exponent form (`1e+06`,
/// `1.5e-07`) is used when the decimal exponent is below -4 or at least 6,
/// as the engine's error messages have always rendered floats.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let sci = format!("{v:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return format!("{v}");
    };
    match exp.parse::<i32>() {
        Ok(exp) if v != 0.0 && !(-4..6).contains(&exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        _ => format!("{v}"),
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl BinaryOp {
    /// Whether an ordering satisfies this comparison. An undefined
    /// ordering (NaN) only satisfies `!=`.
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match ordering {
            None => self == BinaryOp::NotEq,
            Some(ord) => match self {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::NotEq => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::LtEq => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::GtEq => ord != Ordering::Less,
                _ => false,
            },
        }
    }
}
