//! Recursive evaluation of condition trees to typed values
//!
//! Evaluation is fail-fast: the first error anywhere in the tree aborts the
//! evaluation of the current element and is returned as is.

use crate::error::PlanError;
use crate::expr::{BinaryOp, Expr};
use crate::functions::{self, AggregateFunction};
use crate::types::Row;
use crate::valuer::AggregateScope;
use crate::value::Value;
use crate::Result;

/// Evaluates expressions against one aggregation scope.
pub struct Evaluator<'s, 'a, R> {
    scope: &'s AggregateScope<'a, R>,
}

impl<'s, 'a, R: Row> Evaluator<'s, 'a, R> {
    pub fn new(scope: &'s AggregateScope<'a, R>) -> Self {
        Self { scope }
    }

    /// Evaluate a condition to a boolean. A null result is false; any other
    /// non-boolean result is an error.
    pub fn eval_condition(&self, expr: &Expr) -> Result<bool> {
        self.eval_bool(expr)
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(field) => Ok(self.scope.resolve_field(field)),
            Expr::Wildcard => Err(PlanError::invalid_argument(
                "*",
                "wildcard is only allowed as the argument of count",
            )),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Not(inner) => match self.eval(inner)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Null => Ok(Value::Null),
                other => Err(PlanError::NotBoolean(other)),
            },
            Expr::Negate(inner) => match self.eval(inner)? {
                Value::Null => Ok(Value::Null),
                value => Value::Int(0).arithmetic(BinaryOp::Sub, &value),
            },
            Expr::Call { name, args } => self.eval_call(name, args),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
        match op {
            BinaryOp::And => {
                if !self.eval_bool(left)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            BinaryOp::Or => {
                if self.eval_bool(left)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            op if op.is_comparison() => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                lhs.compare(op, &rhs).map(Value::Bool)
            }
            op => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                lhs.arithmetic(op, &rhs)
            }
        }
    }

    fn eval_bool(&self, expr: &Expr) -> Result<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(PlanError::NotBoolean(other)),
        }
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> Result<Value> {
        if let Some(function) = AggregateFunction::from_name(name) {
            return self.scope.resolve_aggregate(function, args);
        }
        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>>>()?;
        functions::call_scalar(name, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JoinTuple, Message, Tuple};

    fn tuples(rows: &[serde_json::Value]) -> Vec<Tuple> {
        rows.iter()
            .map(|json| Tuple::new("src1", Message::from_json(json).unwrap()))
            .collect()
    }

    fn eval(rows: &[Tuple], expr: &Expr) -> Result<Value> {
        let scope = AggregateScope::new(rows.iter().collect());
        Evaluator::new(&scope).eval(expr)
    }

    fn gt(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Gt, left, right)
    }

    #[test]
    fn test_literal_and_field() {
        let rows = tuples(&[serde_json::json!({"f1": "v1"})]);
        assert_eq!(eval(&rows, &Expr::literal(3)).unwrap(), Value::Int(3));
        assert_eq!(eval(&rows, &Expr::field("f1")).unwrap(), Value::from("v1"));
        assert_eq!(eval(&rows, &Expr::field("nope")).unwrap(), Value::Null);
    }

    #[test]
    fn test_aggregate_comparison() {
        let rows = tuples(&[
            serde_json::json!({"id1": 1}),
            serde_json::json!({"id1": 2}),
            serde_json::json!({"id1": 5}),
        ]);
        let expr = gt(Expr::call("avg", vec![Expr::field("id1")]), Expr::literal(1));
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Bool(true));

        let expr = gt(Expr::call("avg", vec![Expr::field("id1")]), Expr::literal("str"));
        let err = eval(&rows, &expr).unwrap_err();
        assert_eq!(err.to_string(), "invalid operation int64(2) > string(str)");
    }

    #[test]
    fn test_and_short_circuits() {
        let rows = tuples(&[serde_json::json!({"a": 1})]);
        // The right side would fail, but is never evaluated.
        let failing = gt(Expr::field("a"), Expr::literal("x"));
        let expr = Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::Eq, Expr::field("a"), Expr::literal(2)),
            failing.clone(),
        );
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Bool(false));

        let expr = Expr::binary(
            BinaryOp::Or,
            Expr::binary(BinaryOp::Eq, Expr::field("a"), Expr::literal(1)),
            failing.clone(),
        );
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Bool(true));

        let expr = Expr::binary(
            BinaryOp::Or,
            Expr::binary(BinaryOp::Eq, Expr::field("a"), Expr::literal(2)),
            failing,
        );
        assert!(matches!(
            eval(&rows, &expr),
            Err(PlanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_logical_operand_must_be_bool() {
        let rows = tuples(&[serde_json::json!({"a": 1})]);
        let expr = Expr::binary(BinaryOp::And, Expr::field("a"), Expr::literal(true));
        assert_eq!(
            eval(&rows, &expr).unwrap_err(),
            PlanError::NotBoolean(Value::Int(1))
        );
        let expr = Expr::Not(Box::new(Expr::literal("x")));
        assert_eq!(
            eval(&rows, &expr).unwrap_err(),
            PlanError::NotBoolean(Value::from("x"))
        );
    }

    #[test]
    fn test_condition_result() {
        let rows = tuples(&[serde_json::json!({"a": 1, "flag": true})]);
        let scope = AggregateScope::new(rows.iter().collect());
        let evaluator = Evaluator::new(&scope);
        assert!(evaluator.eval_condition(&Expr::field("flag")).unwrap());
        assert!(!evaluator.eval_condition(&Expr::field("missing")).unwrap());
        assert!(evaluator.eval_condition(&Expr::field("a")).is_err());
        // NOT null stays null, which filters like false.
        assert!(!evaluator
            .eval_condition(&Expr::Not(Box::new(Expr::field("missing"))))
            .unwrap());
    }

    #[test]
    fn test_arithmetic_and_scalar_calls() {
        let rows = tuples(&[
            serde_json::json!({"price": 10, "qty": 3, "name": "Widget"}),
            serde_json::json!({"price": 20, "qty": 1, "name": "Gadget"}),
        ]);
        let expr = Expr::binary(
            BinaryOp::GtEq,
            Expr::binary(BinaryOp::Mul, Expr::field("price"), Expr::field("qty")),
            Expr::literal(30),
        );
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Bool(true));

        let expr = Expr::binary(
            BinaryOp::Eq,
            Expr::call("upper", vec![Expr::field("name")]),
            Expr::literal("WIDGET"),
        );
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Bool(true));

        let expr = Expr::Negate(Box::new(Expr::call("sum", vec![Expr::field("qty")])));
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Int(-4));
    }

    #[test]
    fn test_aggregate_over_expression() {
        let rows = tuples(&[
            serde_json::json!({"price": 10, "qty": 3}),
            serde_json::json!({"price": 20, "qty": 1}),
        ]);
        let revenue = Expr::call(
            "sum",
            vec![Expr::binary(BinaryOp::Mul, Expr::field("price"), Expr::field("qty"))],
        );
        assert_eq!(eval(&rows, &revenue).unwrap(), Value::Int(50));
    }

    #[test]
    fn test_wildcard_outside_count() {
        let rows = tuples(&[serde_json::json!({"a": 1})]);
        let expr = Expr::call("sum", vec![Expr::Wildcard]);
        assert!(matches!(
            eval(&rows, &expr),
            Err(PlanError::InvalidArgument { .. })
        ));
        let expr = Expr::call("count", vec![Expr::Wildcard]);
        assert_eq!(eval(&rows, &expr).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_join_rows() {
        let rows = vec![JoinTuple::new(vec![
            Tuple::new("test", [("id", 1)].into_iter().collect()),
            Tuple::new("src2", [("id", 9)].into_iter().collect()),
        ])];
        let scope = AggregateScope::new(rows.iter().collect());
        let evaluator = Evaluator::new(&scope);
        assert_eq!(evaluator.eval(&Expr::field("id")).unwrap(), Value::Int(1));
        assert_eq!(
            evaluator.eval(&Expr::qualified("src2", "id")).unwrap(),
            Value::Int(9)
        );
    }
}
