//! Filter parser.
//!
//! Parses `WHERE`-style SQL text with sqlparser and converts it to an
//! [`Expr`] whose column references are resolved against a schema.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::ast::*;
use super::error::{ParseError, ParseResult};
use crate::catalog::{Schema, Value};

/// Parser for filter expressions.
pub struct Parser<'a> {
    schema: &'a Schema,
}

impl<'a> Parser<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Parse a filter against `schema`.
    pub fn parse_filter(sql: &str, schema: &Schema) -> ParseResult<Expr> {
        Parser::new(schema).parse(sql)
    }

    pub fn parse(&self, sql: &str) -> ParseResult<Expr> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ParseError::EmptyExpression);
        }

        let dialect = GenericDialect {};
        let expr = SqlParser::new(&dialect).try_with_sql(sql)?.parse_expr()?;
        self.convert_expr(&expr)
    }

    fn column(&self, name: &str) -> ParseResult<Expr> {
        self.schema
            .index_of(name)
            .map(Expr::Column)
            .ok_or_else(|| ParseError::ColumnNotFound(name.to_string()))
    }

    fn convert_expr(&self, expr: &sp::Expr) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(id) => self.column(&id.value),

            sp::Expr::CompoundIdentifier(parts) => {
                let name = parts
                    .iter()
                    .map(|p| p.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                if name.is_empty() {
                    return Err(ParseError::InvalidIdentifier("empty compound identifier".into()));
                }
                self.column(&name)
            }

            sp::Expr::Value(v) => Ok(Expr::Literal(Self::convert_value(v)?)),

            sp::Expr::BinaryOp { left, op, right } => {
                let l = self.convert_expr(left)?;
                let r = self.convert_expr(right)?;
                let o = Self::convert_binary_op(op)?;
                Ok(Expr::binary(l, o, r))
            }

            sp::Expr::UnaryOp { op, expr } => {
                let e = self.convert_expr(expr)?;
                let o = Self::convert_unary_op(op)?;
                Ok(Expr::UnaryOp {
                    op: o,
                    expr: Box::new(e),
                })
            }

            sp::Expr::IsNull(e) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(e)?),
                negated: false,
            }),

            sp::Expr::IsNotNull(e) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(e)?),
                negated: true,
            }),

            sp::Expr::InList { expr, list, negated } => {
                let e = self.convert_expr(expr)?;
                let items = list
                    .iter()
                    .map(|item| self.convert_expr(item))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Expr::InList {
                    expr: Box::new(e),
                    list: items,
                    negated: *negated,
                })
            }

            sp::Expr::Between { expr, low, high, negated } => Ok(Expr::Between {
                expr: Box::new(self.convert_expr(expr)?),
                low: Box::new(self.convert_expr(low)?),
                high: Box::new(self.convert_expr(high)?),
                negated: *negated,
            }),

            sp::Expr::Like { expr, pattern, negated, .. } => Ok(Expr::Like {
                expr: Box::new(self.convert_expr(expr)?),
                pattern: Self::extract_string(pattern)?,
                negated: *negated,
            }),

            sp::Expr::Function(f) => {
                let name = f.name.to_string();
                let args = match &f.args {
                    sp::FunctionArguments::List(list) => list
                        .args
                        .iter()
                        .map(|arg| match arg {
                            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => self.convert_expr(e),
                            other => Err(ParseError::UnsupportedExpression(format!(
                                "unsupported argument: {}",
                                other
                            ))),
                        })
                        .collect::<ParseResult<Vec<_>>>()?,
                    _ => vec![],
                };
                Ok(Expr::Function { name, args })
            }

            sp::Expr::Nested(inner) => Ok(Expr::Nested(Box::new(self.convert_expr(inner)?))),

            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_value(v: &sp::ValueWithSpan) -> ParseResult<Value> {
        match &v.value {
            sp::Value::Null => Ok(Value::Null),
            sp::Value::Boolean(b) => Ok(Value::Bool(*b)),
            sp::Value::Number(s, _) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ParseError::UnsupportedExpression(format!("invalid integer: {}", s))),
            sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => Ok(Value::Text(s.clone())),
            other => Err(ParseError::UnsupportedExpression(format!("unsupported value: {}", other))),
        }
    }

    fn extract_string(expr: &sp::Expr) -> ParseResult<String> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => Ok(s.clone()),
                _ => Err(ParseError::UnsupportedExpression("expected string".into())),
            },
            _ => Err(ParseError::UnsupportedExpression("expected string literal".into())),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOperator> {
        use sp::BinaryOperator as B;
        Ok(match op {
            B::Eq => BinaryOperator::Eq,
            B::NotEq => BinaryOperator::NotEq,
            B::Lt => BinaryOperator::Lt,
            B::LtEq => BinaryOperator::LtEq,
            B::Gt => BinaryOperator::Gt,
            B::GtEq => BinaryOperator::GtEq,
            B::And => BinaryOperator::And,
            B::Or => BinaryOperator::Or,
            B::Plus => BinaryOperator::Plus,
            B::Minus => BinaryOperator::Minus,
            B::Multiply => BinaryOperator::Multiply,
            B::Divide => BinaryOperator::Divide,
            B::Modulo => BinaryOperator::Modulo,
            B::StringConcat => BinaryOperator::Concat,
            other => return Err(ParseError::UnsupportedExpression(format!("operator {}", other))),
        })
    }

    fn convert_unary_op(op: &sp::UnaryOperator) -> ParseResult<UnaryOperator> {
        use sp::UnaryOperator as U;
        Ok(match op {
            U::Not => UnaryOperator::Not,
            U::Minus => UnaryOperator::Minus,
            U::Plus => UnaryOperator::Plus,
            other => return Err(ParseError::UnsupportedExpression(format!("unary operator {}", other))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{commits_schema, refs_schema};

    #[test]
    fn test_parse_equality() {
        let schema = refs_schema();
        let expr = Parser::parse_filter("ref_name = 'HEAD'", &schema).unwrap();
        assert_eq!(expr, Expr::eq(Expr::col(1), Expr::lit("HEAD")));
    }

    #[test]
    fn test_parse_qualified_column() {
        let schema = refs_schema().join(&commits_schema());
        let expr = Parser::parse_filter("commits.commit_hash IS NOT NULL", &schema).unwrap();
        assert_eq!(
            expr,
            Expr::IsNull {
                expr: Box::new(Expr::col(4)),
                negated: true
            }
        );
    }

    #[test]
    fn test_parse_compound() {
        let schema = commits_schema();
        let expr = Parser::parse_filter(
            "commit_author_name LIKE 'Test%' AND (commit_message IN ('a', 'b') OR NOT commit_hash = 'x')",
            &schema,
        )
        .unwrap();
        assert!(matches!(expr, Expr::BinaryOp { op: BinaryOperator::And, .. }));
        assert_eq!(expr.max_column(), Some(8));
    }

    #[test]
    fn test_unknown_column() {
        let schema = refs_schema();
        let err = Parser::parse_filter("nope = 1", &schema).unwrap_err();
        assert!(matches!(err, ParseError::ColumnNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_empty_and_invalid() {
        let schema = refs_schema();
        assert!(matches!(
            Parser::parse_filter("   ", &schema),
            Err(ParseError::EmptyExpression)
        ));
        assert!(matches!(
            Parser::parse_filter("ref_name = ", &schema),
            Err(ParseError::Syntax(_))
        ));
    }
}
