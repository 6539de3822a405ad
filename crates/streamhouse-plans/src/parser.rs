//! SQL parser for HAVING conditions
//!
//! Only the HAVING clause is converted; the rest of the statement (window
//! functions in GROUP BY, joins, projections) is parsed by `sqlparser` and
//! ignored here.

use sqlparser::ast::{
    BinaryOperator, Expr as SqlExpr, Function, FunctionArg, FunctionArgExpr, Ident, SetExpr,
    Statement, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::PlanError;
use crate::expr::{BinaryOp, Expr};
use crate::functions;
use crate::value::Value;
use crate::Result;

/// Parse a `SELECT` statement and return its HAVING condition, if any.
pub fn parse_having(sql: &str) -> Result<Option<Expr>> {
    let dialect = GenericDialect {};
    let ast = Parser::parse_sql(&dialect, sql.trim())
        .map_err(|e| PlanError::ParseError(e.to_string()))?;

    let statement = ast
        .first()
        .ok_or_else(|| PlanError::ParseError("Empty query".to_string()))?;

    let query = match statement {
        Statement::Query(query) => query,
        _ => {
            return Err(PlanError::ParseError(
                "Only SELECT queries are supported".to_string(),
            ))
        }
    };

    let select = match &*query.body {
        SetExpr::Select(select) => select,
        _ => {
            return Err(PlanError::ParseError(
                "Only simple SELECT queries are supported".to_string(),
            ))
        }
    };

    select.having.as_ref().map(convert_expr).transpose()
}

/// Parse a bare condition such as `count(*) > 1 AND color = 'w2'`.
pub fn parse_condition(text: &str) -> Result<Expr> {
    let dialect = GenericDialect {};
    let expr = Parser::new(&dialect)
        .try_with_sql(text)
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|e| PlanError::ParseError(e.to_string()))?;
    convert_expr(&expr)
}

fn convert_expr(expr: &SqlExpr) -> Result<Expr> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(convert_ident(ident)),
        SqlExpr::CompoundIdentifier(parts) => match parts.as_slice() {
            [name] => Ok(convert_ident(name)),
            [stream, name] => Ok(Expr::qualified(&stream.value, &name.value)),
            _ => Err(PlanError::ParseError(format!(
                "Invalid column reference: {}",
                expr
            ))),
        },
        SqlExpr::Value(value) => convert_value(value).map(Expr::Literal),
        SqlExpr::Nested(inner) => convert_expr(inner),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::binary(
            convert_operator(op)?,
            convert_expr(left)?,
            convert_expr(right)?,
        )),
        SqlExpr::UnaryOp { op, expr: inner } => {
            let inner = convert_expr(inner)?;
            match op {
                UnaryOperator::Not => Ok(Expr::Not(Box::new(inner))),
                UnaryOperator::Minus => Ok(Expr::Negate(Box::new(inner))),
                UnaryOperator::Plus => Ok(inner),
                other => Err(PlanError::ParseError(format!(
                    "Unsupported unary operator: {}",
                    other
                ))),
            }
        }
        SqlExpr::IsNull(inner) => Ok(Expr::binary(
            BinaryOp::Eq,
            convert_expr(inner)?,
            Expr::literal(Value::Null),
        )),
        SqlExpr::IsNotNull(inner) => Ok(Expr::binary(
            BinaryOp::NotEq,
            convert_expr(inner)?,
            Expr::literal(Value::Null),
        )),
        SqlExpr::Function(func) => convert_function(func),
        other => Err(PlanError::ParseError(format!(
            "Unsupported expression in HAVING: {}",
            other
        ))),
    }
}

/// Double-quoted tokens are string literals in the streaming dialect.
fn convert_ident(ident: &Ident) -> Expr {
    match ident.quote_style {
        Some('"') => Expr::literal(ident.value.as_str()),
        _ => Expr::field(&ident.value),
    }
}

fn convert_value(value: &SqlValue) -> Result<Value> {
    match value {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Int(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| PlanError::ParseError(format!("Invalid number: {}", n)))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::String(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(PlanError::ParseError(format!(
            "Unsupported literal: {}",
            other
        ))),
    }
}

fn convert_operator(op: &BinaryOperator) -> Result<BinaryOp> {
    Ok(match op {
        BinaryOperator::And => BinaryOp::And,
        BinaryOperator::Or => BinaryOp::Or,
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::Lt => BinaryOp::Lt,
        BinaryOperator::LtEq => BinaryOp::LtEq,
        BinaryOperator::Gt => BinaryOp::Gt,
        BinaryOperator::GtEq => BinaryOp::GtEq,
        BinaryOperator::Plus => BinaryOp::Add,
        BinaryOperator::Minus => BinaryOp::Sub,
        BinaryOperator::Multiply => BinaryOp::Mul,
        BinaryOperator::Divide => BinaryOp::Div,
        BinaryOperator::Modulo => BinaryOp::Mod,
        other => {
            return Err(PlanError::ParseError(format!(
                "Unsupported operator: {}",
                other
            )))
        }
    })
}

fn convert_function(func: &Function) -> Result<Expr> {
    let name = func.name.to_string().to_lowercase();
    if !functions::is_known(&name) {
        return Err(PlanError::UnknownFunction(name));
    }
    if func.distinct {
        return Err(PlanError::ParseError(format!(
            "DISTINCT is not supported in {}",
            name
        )));
    }

    let args = func
        .args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => convert_expr(expr),
            FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => Ok(Expr::Wildcard),
            _ => Err(PlanError::ParseError(format!(
                "Unsupported argument in {}: {}",
                name, arg
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    if functions::is_aggregate(&name) && args.iter().any(Expr::is_aggregate) {
        return Err(PlanError::ParseError(format!(
            "Aggregate calls cannot be nested in {}",
            name
        )));
    }

    Ok(Expr::call(name, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_having_aggregate() {
        let expr = parse_having("SELECT id1 FROM src1 HAVING avg(id1) > 1")
            .unwrap()
            .unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Gt,
                Expr::call("avg", vec![Expr::field("id1")]),
                Expr::literal(1)
            )
        );
        assert!(expr.is_aggregate());
    }

    #[test]
    fn test_no_having_clause() {
        assert_eq!(parse_having("SELECT id1 FROM src1").unwrap(), None);
    }

    #[test]
    fn test_window_group_by_is_accepted() {
        let expr = parse_having(
            r#"SELECT id1 FROM src1 GROUP BY TUMBLINGWINDOW(ss, 10), f1 having f1 = "v2""#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Eq, Expr::field("f1"), Expr::literal("v2"))
        );
    }

    #[test]
    fn test_join_statement() {
        let expr = parse_having(
            "SELECT count(*) as c, round(a) as r FROM test Inner Join test1 on test.id = test1.id \
             GROUP BY TumblingWindow(ss, 10), test1.color having a > 100",
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Gt, Expr::field("a"), Expr::literal(100))
        );
    }

    #[test]
    fn test_parse_condition_shapes() {
        let expr = parse_condition("test.color = 'w2' AND count(*) >= 2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::And,
                Expr::binary(BinaryOp::Eq, Expr::qualified("test", "color"), Expr::literal("w2")),
                Expr::binary(
                    BinaryOp::GtEq,
                    Expr::call("count", vec![Expr::Wildcard]),
                    Expr::literal(2)
                ),
            )
        );

        let expr = parse_condition("NOT (a % 2.5 <> 0)").unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::binary(
                BinaryOp::NotEq,
                Expr::binary(BinaryOp::Mod, Expr::field("a"), Expr::literal(2.5)),
                Expr::literal(0)
            )))
        );

        let expr = parse_condition("-a > 1").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Gt,
                Expr::Negate(Box::new(Expr::field("a"))),
                Expr::literal(1)
            )
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_condition("true").unwrap(), Expr::literal(true));
        assert_eq!(parse_condition("NULL").unwrap(), Expr::literal(Value::Null));
        assert_eq!(parse_condition("1.5").unwrap(), Expr::literal(1.5));
        assert_eq!(
            parse_condition("a IS NULL").unwrap(),
            Expr::binary(BinaryOp::Eq, Expr::field("a"), Expr::literal(Value::Null))
        );
    }

    #[test]
    fn test_function_names_are_case_insensitive() {
        let expr = parse_condition("MAX(id1) = 1").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Eq,
                Expr::call("max", vec![Expr::field("id1")]),
                Expr::literal(1)
            )
        );
    }

    #[test]
    fn test_nested_aggregate_rejected() {
        let err = parse_having("SELECT a FROM s HAVING sum(count(*)) > 1").unwrap_err();
        assert_eq!(
            err,
            PlanError::ParseError("Aggregate calls cannot be nested in sum".to_string())
        );
        // Scalars may wrap aggregates and aggregates may wrap scalars.
        assert!(parse_condition("abs(sum(a)) > 1").is_ok());
        assert!(parse_condition("sum(abs(a)) > 1").is_ok());
    }

    #[test]
    fn test_unknown_function() {
        let err = parse_having("SELECT a FROM s HAVING median(a) > 1").unwrap_err();
        assert_eq!(err, PlanError::UnknownFunction("median".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_having("SELECT * FROM t HAVING"),
            Err(PlanError::ParseError(_))
        ));
        assert!(matches!(
            parse_having("INSERT INTO t VALUES (1)"),
            Err(PlanError::ParseError(_))
        ));
        assert!(matches!(
            parse_condition("a LIKE 'x%'"),
            Err(PlanError::ParseError(_))
        ));
    }
}
