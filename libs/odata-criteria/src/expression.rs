use odata_core::ast::Value;
use odata_core::SortDir;

use crate::error::CriteriaResult;
use crate::metadata::FieldKind;
use crate::parameter::Parameter;
use crate::processor::SqlFunction;
use crate::query::CriteriaQuery;
use crate::writer::{literal, SqlConvertible, SqlWriter};

/// Column of a table alias in the FROM clause.
#[derive(Clone, Debug, PartialEq)]
pub struct PathExpr {
    pub table_alias: String,
    pub column: String,
    /// External path, used as the default tuple alias.
    pub alias: String,
    pub internal: String,
    pub kind: FieldKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlAggregation {
    Avg,
    Count,
    Sum,
}

impl SqlAggregation {
    pub fn keyword(self) -> &'static str {
        match self {
            SqlAggregation::Avg => "AVG",
            SqlAggregation::Count => "COUNT",
            SqlAggregation::Sum => "SUM",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Sum,
    Diff,
    Prod,
    Quot,
    Mod,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Sum => "+",
            ArithmeticOp::Diff => "-",
            ArithmeticOp::Prod => "*",
            ArithmeticOp::Quot => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expression {
    Path(PathExpr),
    Parameter(Parameter),
    /// Rendered inline, never bound.
    Literal(Value),
    Aggregate(SqlAggregation, Box<Expression>),
    Function(SqlFunction, Vec<Expression>),
    Arithmetic(Box<Expression>, ArithmeticOp, Box<Expression>),
    Subquery(Box<CriteriaQuery>),
}

impl Expression {
    /// Tuple alias derived from the expression, if it has one.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Expression::Path(p) => Some(&p.alias),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Expression::Path(p) => Some(p.kind),
            Expression::Aggregate(SqlAggregation::Count, _) => Some(FieldKind::I64),
            Expression::Aggregate(SqlAggregation::Avg, _) => Some(FieldKind::F64),
            Expression::Aggregate(SqlAggregation::Sum, inner) => inner.kind(),
            Expression::Function(
                SqlFunction::Lower
                | SqlFunction::Upper
                | SqlFunction::Concat
                | SqlFunction::Trim
                | SqlFunction::Substring,
                _,
            ) => Some(FieldKind::String),
            Expression::Function(SqlFunction::Length | SqlFunction::Locate, _) => {
                Some(FieldKind::I64)
            }
            Expression::Function(_, args) => args.first().and_then(Expression::kind),
            Expression::Arithmetic(l, _, _) => l.kind(),
            Expression::Parameter(_) | Expression::Literal(_) | Expression::Subquery(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathExpr> {
        match self {
            Expression::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl From<PathExpr> for Expression {
    fn from(p: PathExpr) -> Self {
        Expression::Path(p)
    }
}

impl From<Parameter> for Expression {
    fn from(p: Parameter) -> Self {
        Expression::Parameter(p)
    }
}

impl SqlConvertible for PathExpr {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        w.push_column(&self.table_alias, &self.column);
        Ok(())
    }
}

impl SqlConvertible for Expression {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        match self {
            Expression::Path(p) => p.as_sql(w)?,
            Expression::Parameter(p) => {
                w.push_parameter(p);
            }
            Expression::Literal(v) => {
                w.push(&literal(v));
            }
            Expression::Aggregate(agg, inner) => {
                w.push(agg.keyword()).push("(");
                inner.as_sql(w)?;
                w.push(")");
            }
            Expression::Function(f, args) => {
                let rendered = args
                    .iter()
                    .map(|a| w.render_to_string(a))
                    .collect::<CriteriaResult<Vec<_>>>()?;
                let call = w.processor().function(*f, &rendered)?;
                w.push(&call);
            }
            Expression::Arithmetic(l, op, r) => {
                w.push("(");
                l.as_sql(w)?;
                w.push(" ").push(op.symbol()).push(" ");
                r.as_sql(w)?;
                w.push(")");
            }
            Expression::Subquery(q) => {
                w.push("(");
                q.as_sql(w)?;
                w.push(")");
            }
        }
        Ok(())
    }
}

/// One ORDER BY item.
#[derive(Clone, Debug)]
pub struct Order {
    pub expression: Expression,
    pub dir: SortDir,
}

impl Order {
    pub fn is_ascending(&self) -> bool {
        self.dir == SortDir::Asc
    }

    /// The same item in the opposite direction.
    pub fn reverse(&self) -> Order {
        Order {
            expression: self.expression.clone(),
            dir: self.dir.reverse(),
        }
    }
}

impl SqlConvertible for Order {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        self.expression.as_sql(w)?;
        w.push(match self.dir {
            SortDir::Asc => " ASC",
            SortDir::Desc => " DESC",
        });
        Ok(())
    }
}
