//! Filter expressions over positional rows.
//!
//! Column references are already resolved to row positions, so evaluation
//! never looks names up.

use crate::catalog::Value;

/// A filter or projection expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column at this position of the row.
    Column(usize),
    Literal(Value),
    /// `left op right`, comparisons and `AND`/`OR` included.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// `NOT x`, `-x`, `+x`
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// `x IS [NOT] NULL`
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// `x [NOT] IN (a, b, ...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `x [NOT] BETWEEN low AND high`, bounds inclusive.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// `x [NOT] LIKE 'pattern'` with `%` and `_` wildcards.
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
    /// Scalar function call, e.g. `lower(commit_message)`.
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Nested(Box<Expr>),
}

impl Expr {
    pub fn col(idx: usize) -> Self {
        Expr::Column(idx)
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// `left = right`
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Eq, right)
    }

    /// `left AND right`
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::And, right)
    }

    /// AND all expressions together. None when the list is empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(Expr::and)
    }

    /// Highest column position referenced, if any.
    pub fn max_column(&self) -> Option<usize> {
        let mut max = None;
        self.visit_columns(&mut |idx| max = Some(max.map_or(idx, |m: usize| m.max(idx))));
        max
    }

    fn visit_columns(&self, f: &mut impl FnMut(usize)) {
        match self {
            Expr::Column(idx) => f(*idx),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Expr::UnaryOp { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::Like { expr, .. }
            | Expr::Nested(expr) => expr.visit_columns(f),
            Expr::InList { expr, list, .. } => {
                expr.visit_columns(f);
                list.iter().for_each(|e| e.visit_columns(f));
            }
            Expr::Between { expr, low, high, .. } => {
                expr.visit_columns(f);
                low.visit_columns(f);
                high.visit_columns(f);
            }
            Expr::Function { args, .. } => args.iter().for_each(|e| e.visit_columns(f)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    /// `||`
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conjunction() {
        assert_eq!(Expr::conjunction(Vec::new()), None);

        let both = Expr::conjunction(vec![
            Expr::eq(Expr::col(0), Expr::lit("a")),
            Expr::eq(Expr::col(3), Expr::lit(1i64)),
        ])
        .unwrap();
        assert!(matches!(both, Expr::BinaryOp { op: BinaryOperator::And, .. }));
        assert_eq!(both.max_column(), Some(3));
    }

    #[test]
    fn test_max_column_of_literal() {
        assert_eq!(Expr::lit(true).max_column(), None);
    }
}
