//! Expression evaluation.

use std::cmp::Ordering;

use super::error::{ExecuteError, ExecuteResult};
use crate::catalog::Value;
use crate::sql::{BinaryOperator, Expr, UnaryOperator};

/// Evaluate an expression against a row.
pub fn evaluate(expr: &Expr, row: &[Value]) -> ExecuteResult<Value> {
    match expr {
        Expr::Column(idx) => row
            .get(*idx)
            .cloned()
            .ok_or_else(|| ExecuteError::ColumnNotFound(format!("#{} (row has {} columns)", idx, row.len()))),

        Expr::Literal(value) => Ok(value.clone()),

        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, row)?;
            // short circuit before touching the right side
            match op {
                BinaryOperator::And if !l.is_truthy() => return Ok(Value::Bool(false)),
                BinaryOperator::Or if l.is_truthy() => return Ok(Value::Bool(true)),
                _ => {}
            }
            let r = evaluate(right, row)?;
            eval_binary_op(&l, *op, &r)
        }

        Expr::UnaryOp { op, expr } => {
            let v = evaluate(expr, row)?;
            eval_unary_op(*op, &v)
        }

        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, row)?.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }

        Expr::InList { expr, list, negated } => {
            let v = evaluate(expr, row)?;
            let mut in_list = false;
            for item in list {
                if values_equal(&v, &evaluate(item, row)?) {
                    in_list = true;
                    break;
                }
            }
            Ok(Value::Bool(if *negated { !in_list } else { in_list }))
        }

        Expr::Between { expr, low, high, negated } => {
            let v = evaluate(expr, row)?;
            let l = evaluate(low, row)?;
            let h = evaluate(high, row)?;
            let in_range = matches!(v.compare(&l), Some(Ordering::Greater | Ordering::Equal))
                && matches!(v.compare(&h), Some(Ordering::Less | Ordering::Equal));
            Ok(Value::Bool(if *negated { !in_range } else { in_range }))
        }

        Expr::Like { expr, pattern, negated } => {
            let v = evaluate(expr, row)?;
            let matches = match &v {
                Value::Null => false,
                other => like_match(&value_to_string(other), pattern),
            };
            Ok(Value::Bool(if *negated { !matches } else { matches }))
        }

        Expr::Function { name, args } => {
            let evaluated: Vec<Value> = args
                .iter()
                .map(|a| evaluate(a, row))
                .collect::<ExecuteResult<_>>()?;
            eval_function(name, &evaluated)
        }

        Expr::Nested(inner) => evaluate(inner, row),
    }
}

/// Evaluate a filter, returning true if the row matches.
pub fn matches_where(expr: &Expr, row: &[Value]) -> ExecuteResult<bool> {
    Ok(evaluate(expr, row)?.is_truthy())
}

fn eval_binary_op(left: &Value, op: BinaryOperator, right: &Value) -> ExecuteResult<Value> {
    let cmp = || left.compare(right);
    match op {
        BinaryOperator::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::NotEq => Ok(Value::Bool(!left.is_null() && !right.is_null() && !values_equal(left, right))),
        BinaryOperator::Lt => Ok(Value::Bool(cmp() == Some(Ordering::Less))),
        BinaryOperator::LtEq => Ok(Value::Bool(matches!(cmp(), Some(Ordering::Less | Ordering::Equal)))),
        BinaryOperator::Gt => Ok(Value::Bool(cmp() == Some(Ordering::Greater))),
        BinaryOperator::GtEq => Ok(Value::Bool(matches!(cmp(), Some(Ordering::Greater | Ordering::Equal)))),

        BinaryOperator::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOperator::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),

        BinaryOperator::Plus => eval_arithmetic(left, right, i64::checked_add),
        BinaryOperator::Minus => eval_arithmetic(left, right, i64::checked_sub),
        BinaryOperator::Multiply => eval_arithmetic(left, right, i64::checked_mul),
        BinaryOperator::Divide => {
            if right.as_i64() == Some(0) {
                return Err(ExecuteError::InvalidExpression("division by zero".into()));
            }
            eval_arithmetic(left, right, i64::checked_div)
        }
        BinaryOperator::Modulo => {
            if right.as_i64() == Some(0) {
                return Err(ExecuteError::InvalidExpression("division by zero".into()));
            }
            eval_arithmetic(left, right, i64::checked_rem)
        }

        BinaryOperator::Concat => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Text(format!("{}{}", value_to_string(left), value_to_string(right))))
        }
    }
}

fn eval_unary_op(op: UnaryOperator, value: &Value) -> ExecuteResult<Value> {
    match op {
        UnaryOperator::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOperator::Minus => match value {
            Value::Null => Ok(Value::Null),
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ExecuteError::InvalidExpression("integer overflow".into())),
            other => Err(ExecuteError::InvalidExpression(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        UnaryOperator::Plus => Ok(value.clone()),
    }
}

fn eval_arithmetic<F>(left: &Value, right: &Value, f: F) -> ExecuteResult<Value>
where
    F: Fn(i64, i64) -> Option<i64>,
{
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(l), Value::Int(r)) => f(*l, *r)
            .map(Value::Int)
            .ok_or_else(|| ExecuteError::InvalidExpression("integer overflow".into())),
        (l, r) => Err(ExecuteError::InvalidExpression(format!(
            "arithmetic on {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn eval_function(name: &str, args: &[Value]) -> ExecuteResult<Value> {
    let lower_name = name.to_lowercase();
    match lower_name.as_str() {
        "lower" => Ok(map_text(args, |s| s.to_lowercase())),
        "upper" => Ok(map_text(args, |s| s.to_uppercase())),
        "length" | "len" => Ok(match args.first() {
            Some(Value::Null) | None => Value::Null,
            Some(Value::Blob(b)) => Value::Int(b.len() as i64),
            Some(Value::Array(a)) => Value::Int(a.len() as i64),
            Some(other) => Value::Int(value_to_string(other).chars().count() as i64),
        }),
        "coalesce" => Ok(args.iter().find(|a| !a.is_null()).cloned().unwrap_or(Value::Null)),
        "array_length" => Ok(match args.first() {
            Some(Value::Array(a)) => Value::Int(a.len() as i64),
            _ => Value::Null,
        }),
        _ => Err(ExecuteError::InvalidExpression(format!(
            "unknown function: {}",
            name
        ))),
    }
}

fn map_text(args: &[Value], f: impl Fn(&str) -> String) -> Value {
    match args.first() {
        Some(Value::Null) | None => Value::Null,
        Some(v) => Value::Text(f(&value_to_string(v))),
    }
}

/// SQL equality. NULL is never equal to anything.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => a.compare(b) == Some(Ordering::Equal),
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// LIKE pattern matching: `%` is any sequence, `_` any single character.
pub fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    // iterative wildcard matching with backtracking on the last `%`
    let (mut si, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while si < s.len() {
        if pi < p.len() && p[pi] == '%' {
            star = Some((pi, si));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '_' || p[pi] == s[si]) {
            si += 1;
            pi += 1;
        } else if let Some((star_pi, star_si)) = star {
            pi = star_pi + 1;
            si = star_si + 1;
            star = Some((star_pi, star_si + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row() -> Vec<Value> {
        vec![
            Value::from("repo"),
            Value::from("refs/heads/master"),
            Value::Int(3),
            Value::Null,
        ]
    }

    #[test]
    fn test_column_eval() {
        let row = make_row();
        assert_eq!(evaluate(&Expr::col(1), &row).unwrap(), Value::from("refs/heads/master"));
        assert!(matches!(
            evaluate(&Expr::col(9), &row),
            Err(ExecuteError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_comparison() {
        let row = make_row();
        let expr = Expr::binary(Expr::col(2), BinaryOperator::Gt, Expr::lit(2i64));
        assert!(matches_where(&expr, &row).unwrap());

        let eq_null = Expr::eq(Expr::col(3), Expr::Literal(Value::Null));
        assert!(!matches_where(&eq_null, &row).unwrap());
    }

    #[test]
    fn test_and_short_circuits() {
        let row = make_row();
        // the right side would fail with an unknown column
        let expr = Expr::and(Expr::lit(false), Expr::col(42));
        assert!(!matches_where(&expr, &row).unwrap());
    }

    #[test]
    fn test_like_pattern() {
        assert!(like_match("refs/heads/master", "refs/heads/%"));
        assert!(like_match("Alice", "%ice"));
        assert!(like_match("Alice", "%lic%"));
        assert!(like_match("Alice", "A____"));
        assert!(!like_match("Alice", "B%"));
        assert!(like_match("", "%"));
        assert!(!like_match("abc", "a_"));
    }

    #[test]
    fn test_arithmetic_and_functions() {
        let row = make_row();
        let expr = Expr::binary(Expr::col(2), BinaryOperator::Plus, Expr::lit(10i64));
        assert_eq!(evaluate(&expr, &row).unwrap(), Value::Int(13));

        let upper = Expr::Function {
            name: "UPPER".into(),
            args: vec![Expr::col(0)],
        };
        assert_eq!(evaluate(&upper, &row).unwrap(), Value::from("REPO"));

        let div = Expr::binary(Expr::col(2), BinaryOperator::Divide, Expr::lit(0i64));
        assert!(evaluate(&div, &row).is_err());
    }

    #[test]
    fn test_in_list() {
        let row = make_row();
        let expr = Expr::InList {
            expr: Box::new(Expr::col(0)),
            list: vec![Expr::lit("other"), Expr::lit("repo")],
            negated: false,
        };
        assert!(matches_where(&expr, &row).unwrap());
    }
}
