//! Aggregate reducers and scalar functions callable from conditions

use crate::error::PlanError;
use crate::expr::BinaryOp;
use crate::value::Value;
use crate::Result;

const SCALAR_FUNCTIONS: &[&str] = &[
    "abs", "round", "ceil", "floor", "lower", "upper", "length", "concat",
];

/// Whether `name` (lowercase) is an aggregate function.
pub fn is_aggregate(name: &str) -> bool {
    AggregateFunction::from_name(name).is_some()
}

/// Whether `name` (lowercase) is any known function.
pub fn is_known(name: &str) -> bool {
    is_aggregate(name) || SCALAR_FUNCTIONS.contains(&name)
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Single-argument reducers over an aggregation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    /// Operator used to fold one more value into the running result.
    fn operator(self) -> BinaryOp {
        match self {
            AggregateFunction::Count | AggregateFunction::Sum | AggregateFunction::Avg => {
                BinaryOp::Add
            }
            AggregateFunction::Min => BinaryOp::Lt,
            AggregateFunction::Max => BinaryOp::Gt,
        }
    }
}

/// Left-to-right reduction state for one aggregate call.
///
/// Nulls are skipped. Integer inputs keep an integer result (`avg` divides
/// with truncation); a float anywhere promotes the result to float.
#[derive(Debug, Clone)]
pub struct Accumulator {
    function: AggregateFunction,
    acc: Option<Value>,
    rows: i64,
    count: i64,
}

impl Accumulator {
    pub fn new(function: AggregateFunction) -> Self {
        Self {
            function,
            acc: None,
            rows: 0,
            count: 0,
        }
    }

    /// Fold one row's argument value.
    pub fn update(&mut self, value: Value) -> Result<()> {
        self.rows += 1;
        if self.function == AggregateFunction::Count || value.is_null() {
            return Ok(());
        }
        if !value.is_numeric() {
            let left = match (&self.acc, self.function) {
                (Some(current), _) => current.clone(),
                (None, AggregateFunction::Sum | AggregateFunction::Avg) => Value::Int(0),
                (None, _) => Value::Null,
            };
            return Err(left.invalid_operation(self.function.operator(), &value));
        }
        self.count += 1;
        self.acc = Some(match self.acc.take() {
            None => value,
            Some(current) => self.fold(current, value)?,
        });
        Ok(())
    }

    fn fold(&self, current: Value, value: Value) -> Result<Value> {
        match self.function {
            AggregateFunction::Sum | AggregateFunction::Avg => {
                current.arithmetic(BinaryOp::Add, &value)
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let promote = matches!(current, Value::Float(_)) || matches!(value, Value::Float(_));
                let chosen = if value.compare(self.function.operator(), &current)? {
                    value
                } else {
                    current
                };
                Ok(match (promote, chosen.as_f64()) {
                    (true, Some(f)) => Value::Float(f),
                    _ => chosen,
                })
            }
            AggregateFunction::Count => Ok(current),
        }
    }

    /// Final result. An aggregate that saw no values is null, except
    /// `count` which reports the number of rows.
    pub fn finish(self) -> Result<Value> {
        if self.function == AggregateFunction::Count {
            return Ok(Value::Int(self.rows));
        }
        let Some(acc) = self.acc else {
            return Ok(Value::Null);
        };
        match (self.function, acc) {
            (AggregateFunction::Avg, Value::Int(sum)) => Ok(Value::Int(sum / self.count)),
            (AggregateFunction::Avg, Value::Float(sum)) => Ok(Value::Float(sum / self.count as f64)),
            (_, acc) => Ok(acc),
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar functions
// ---------------------------------------------------------------------------

/// Call a scalar function with already evaluated arguments.
pub fn call_scalar(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "abs" => numeric_unary(name, args, i64::wrapping_abs, f64::abs),
        "round" => numeric_unary(name, args, |i| i, f64::round),
        "ceil" => numeric_unary(name, args, |i| i, f64::ceil),
        "floor" => numeric_unary(name, args, |i| i, f64::floor),
        "lower" => string_unary(name, args, |s| Value::String(s.to_lowercase())),
        "upper" => string_unary(name, args, |s| Value::String(s.to_uppercase())),
        "length" => string_unary(name, args, |s| Value::Int(s.chars().count() as i64)),
        "concat" => {
            if args.is_empty() {
                return Err(PlanError::invalid_argument(name, "expects at least 1 argument"));
            }
            Ok(Value::String(
                args.iter()
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_string())
                    .collect(),
            ))
        }
        _ => Err(PlanError::UnknownFunction(name.to_string())),
    }
}

fn single<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value> {
    match args {
        [arg] => Ok(arg),
        _ => Err(PlanError::invalid_argument(
            name,
            format!("expects 1 argument, got {}", args.len()),
        )),
    }
}

fn numeric_unary(
    name: &str,
    args: &[Value],
    on_int: impl Fn(i64) -> i64,
    on_float: impl Fn(f64) -> f64,
) -> Result<Value> {
    match single(name, args)? {
        Value::Int(i) => Ok(Value::Int(on_int(*i))),
        Value::Float(f) => Ok(Value::Float(on_float(*f))),
        Value::Null => Ok(Value::Null),
        other => Err(PlanError::invalid_argument(
            name,
            format!("expects a number, got {}({})", other.type_name(), other),
        )),
    }
}

fn string_unary(name: &str, args: &[Value], f: impl Fn(&str) -> Value) -> Result<Value> {
    match single(name, args)? {
        Value::String(s) => Ok(f(s)),
        Value::Null => Ok(Value::Null),
        other => Err(PlanError::invalid_argument(
            name,
            format!("expects a string, got {}({})", other.type_name(), other),
        )),
    }
}
