//! Field and aggregate resolution against an aggregation context

use std::cell::{Cell, RefCell};

use crate::error::PlanError;
use crate::evaluator::Evaluator;
use crate::expr::{Expr, FieldRef};
use crate::functions::{Accumulator, AggregateFunction};
use crate::types::Row;
use crate::value::Value;
use crate::Result;

/// The rows an aggregate call reduces over, plus the representative row
/// that plain field references resolve against.
///
/// The scope always covers the whole top-level element being filtered: the
/// full window set, the full join set, or one complete group.
///
/// Aggregate results do not depend on the representative row, so each
/// distinct aggregate call is reduced once per scope and then served from
/// a cache, however often the representative changes.
#[derive(Debug)]
pub struct AggregateScope<'a, R> {
    rows: Vec<&'a R>,
    representative: Option<&'a R>,
    cache: RefCell<Vec<(AggregateFunction, Vec<Expr>, Value)>>,
    reductions: Cell<usize>,
}

impl<'a, R: Row> AggregateScope<'a, R> {
    /// Scope over `rows`, represented by the first row.
    pub fn new(rows: Vec<&'a R>) -> Self {
        let representative = rows.first().copied();
        Self {
            rows,
            representative,
            cache: RefCell::new(Vec::new()),
            reductions: Cell::new(0),
        }
    }

    /// Scope holding a single row.
    pub fn single(row: &'a R) -> Self {
        Self::new(vec![row])
    }

    /// Use `row` for plain field lookups instead of the first row.
    pub fn set_representative(&mut self, row: &'a R) {
        self.representative = Some(row);
    }

    pub fn rows(&self) -> &[&'a R] {
        &self.rows
    }

    pub fn representative(&self) -> Option<&'a R> {
        self.representative
    }

    /// Number of aggregate reductions performed over the rows so far.
    pub fn reductions(&self) -> usize {
        self.reductions.get()
    }

    /// Resolve a plain field reference. Absent fields, and every field of an
    /// empty scope, resolve to null.
    pub fn resolve_field(&self, field: &FieldRef) -> Value {
        self.representative
            .and_then(|row| row.value(field))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Reduce `function(args)` over every row of the scope, in order.
    ///
    /// The argument is evaluated with each row as its own single-row scope.
    /// `count` reports the number of rows without evaluating its argument.
    /// Aggregates cannot be nested inside an aggregate argument.
    pub fn resolve_aggregate(&self, function: AggregateFunction, args: &[Expr]) -> Result<Value> {
        let [arg] = args else {
            return Err(PlanError::invalid_argument(
                function.name(),
                format!("expects 1 argument, got {}", args.len()),
            ));
        };
        if arg.is_aggregate() {
            return Err(PlanError::invalid_argument(
                function.name(),
                "aggregate calls cannot be nested",
            ));
        }

        let cached = self
            .cache
            .borrow()
            .iter()
            .find(|(f, a, _)| *f == function && a.as_slice() == args)
            .map(|(_, _, value)| value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }

        let mut acc = Accumulator::new(function);
        for row in &self.rows {
            let value = if function == AggregateFunction::Count {
                Value::Null
            } else {
                let row_scope = AggregateScope::single(*row);
                Evaluator::new(&row_scope).eval(arg)?
            };
            acc.update(value)?;
        }
        let value = acc.finish()?;
        self.reductions.set(self.reductions.get() + 1);
        self.cache
            .borrow_mut()
            .push((function, args.to_vec(), value.clone()));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JoinTuple, Message, Tuple};

    fn tuple(json: serde_json::Value) -> Tuple {
        Tuple::new("src1", Message::from_json(&json).unwrap())
    }

    #[test]
    fn test_field_resolves_against_first_row() {
        let rows = vec![
            tuple(serde_json::json!({"f1": "v1"})),
            tuple(serde_json::json!({"f1": "v2"})),
        ];
        let scope = AggregateScope::new(rows.iter().collect());
        assert_eq!(scope.resolve_field(&FieldRef::new("f1")), Value::from("v1"));
        assert_eq!(scope.resolve_field(&FieldRef::new("missing")), Value::Null);
    }

    #[test]
    fn test_representative_override() {
        let rows = vec![
            tuple(serde_json::json!({"a": 1})),
            tuple(serde_json::json!({"a": 2})),
        ];
        let mut scope = AggregateScope::new(rows.iter().collect());
        scope.set_representative(&rows[1]);
        assert_eq!(scope.resolve_field(&FieldRef::new("a")), Value::Int(2));
        assert_eq!(scope.rows().len(), 2);
    }

    #[test]
    fn test_empty_scope_is_null() {
        let scope: AggregateScope<'_, Tuple> = AggregateScope::new(vec![]);
        assert!(scope.representative().is_none());
        assert_eq!(scope.resolve_field(&FieldRef::new("a")), Value::Null);
        assert_eq!(
            scope
                .resolve_aggregate(AggregateFunction::Count, &[Expr::Wildcard])
                .unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_aggregate_over_all_rows() {
        let rows = vec![
            tuple(serde_json::json!({"id1": 1})),
            tuple(serde_json::json!({"id1": 2})),
            tuple(serde_json::json!({"id1": 5})),
        ];
        let scope = AggregateScope::new(rows.iter().collect());
        let sum = scope
            .resolve_aggregate(AggregateFunction::Sum, &[Expr::field("id1")])
            .unwrap();
        assert_eq!(sum, Value::Int(8));
        let count = scope
            .resolve_aggregate(AggregateFunction::Count, &[Expr::Wildcard])
            .unwrap();
        assert_eq!(count, Value::Int(3));
    }

    #[test]
    fn test_aggregate_over_join_rows() {
        let row = |a: f64, color: &str| {
            JoinTuple::new(vec![
                Tuple::new("test", [("a", a)].into_iter().collect()),
                Tuple::new("src2", [("color", color)].into_iter().collect()),
            ])
        };
        let rows = vec![row(122.33, "w2"), row(177.51, "w2")];
        let scope = AggregateScope::new(rows.iter().collect());
        let max = scope
            .resolve_aggregate(AggregateFunction::Max, &[Expr::qualified("test", "a")])
            .unwrap();
        assert_eq!(max, Value::Float(177.51));
    }

    #[test]
    fn test_aggregate_arity() {
        let rows = vec![tuple(serde_json::json!({"a": 1}))];
        let scope = AggregateScope::new(rows.iter().collect());
        let err = scope
            .resolve_aggregate(AggregateFunction::Sum, &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid argument for sum: expects 1 argument, got 0");
    }

    #[test]
    fn test_aggregate_reduced_once_per_scope() {
        let rows: Vec<Tuple> = (1..=50)
            .map(|a| tuple(serde_json::json!({ "a": a })))
            .collect();
        let mut scope = AggregateScope::new(rows.iter().collect());
        let sum = [Expr::field("a")];
        for row in &rows {
            scope.set_representative(row);
            assert_eq!(
                scope.resolve_aggregate(AggregateFunction::Sum, &sum).unwrap(),
                Value::Int(1275)
            );
        }
        assert_eq!(scope.reductions(), 1);

        // A different argument or function is a separate reduction.
        scope
            .resolve_aggregate(AggregateFunction::Max, &sum)
            .unwrap();
        scope
            .resolve_aggregate(AggregateFunction::Sum, &[Expr::qualified("src1", "a")])
            .unwrap();
        assert_eq!(scope.reductions(), 3);
    }

    #[test]
    fn test_nested_aggregate_rejected() {
        let rows = vec![tuple(serde_json::json!({"a": 1}))];
        let scope = AggregateScope::new(rows.iter().collect());
        let err = scope
            .resolve_aggregate(
                AggregateFunction::Sum,
                &[Expr::call("count", vec![Expr::Wildcard])],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument for sum: aggregate calls cannot be nested"
        );
    }
}
