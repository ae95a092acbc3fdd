use odata_core::ast::{CompareOperator, Value};

use crate::error::{CriteriaError, CriteriaResult};
use crate::expression::Expression;
use crate::parameter::{Parameter, ParameterBuffer};
use crate::query::CriteriaQuery;
use crate::writer::{SqlConvertible, SqlWriter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

impl ComparisonOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterEqual => ">=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessEqual => "<=",
        }
    }
}

impl From<CompareOperator> for ComparisonOperator {
    fn from(op: CompareOperator) -> Self {
        match op {
            CompareOperator::Eq => ComparisonOperator::Equal,
            CompareOperator::Ne => ComparisonOperator::NotEqual,
            CompareOperator::Gt => ComparisonOperator::GreaterThan,
            CompareOperator::Ge => ComparisonOperator::GreaterEqual,
            CompareOperator::Lt => ComparisonOperator::LessThan,
            CompareOperator::Le => ComparisonOperator::LessEqual,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullCheck {
    IsNull,
    IsNotNull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
}

impl BooleanOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            BooleanOperator::And => "AND",
            BooleanOperator::Or => "OR",
        }
    }
}

#[derive(Clone, Debug)]
enum InValues {
    Empty,
    Values(Vec<Parameter>),
    Expression(Box<Expression>),
}

/// `path IN (...)` over one or several paths. Values and a subquery
/// expression are mutually exclusive.
#[derive(Clone, Debug)]
pub struct InPredicate {
    paths: Vec<Expression>,
    values: InValues,
}

impl InPredicate {
    pub fn new(paths: Vec<Expression>) -> Self {
        Self {
            paths,
            values: InValues::Empty,
        }
    }

    /// Add a literal value, bound through `buffer`.
    pub fn value(
        &mut self,
        buffer: &mut ParameterBuffer,
        value: impl Into<Value>,
    ) -> CriteriaResult<&mut Self> {
        match &mut self.values {
            InValues::Expression(_) => Err(CriteriaError::state(
                "do not add a fixed value if an expression is already present",
            )),
            InValues::Values(list) => {
                list.push(buffer.add_value(value));
                Ok(self)
            }
            InValues::Empty => {
                self.values = InValues::Values(vec![buffer.add_value(value)]);
                Ok(self)
            }
        }
    }

    pub fn expression(&mut self, expression: Expression) -> CriteriaResult<&mut Self> {
        match self.values {
            InValues::Values(_) => Err(CriteriaError::state(
                "do not add an expression if a fixed value is already present",
            )),
            InValues::Expression(_) => Err(CriteriaError::NotImplemented(
                "IN with more than one expression",
            )),
            InValues::Empty => {
                self.values = InValues::Expression(Box::new(expression));
                Ok(self)
            }
        }
    }

    /// First compared path, if any.
    pub fn path(&self) -> Option<&Expression> {
        self.paths.first()
    }

    fn paths_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        if self.paths.len() == 1 {
            self.paths[0].as_sql(w)
        } else {
            w.push("(");
            w.render_list(&self.paths, ", ")?;
            w.push(")");
            Ok(())
        }
    }
}

impl SqlConvertible for InPredicate {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        if matches!(self.values, InValues::Empty) {
            return Err(CriteriaError::state("IN predicate without values"));
        }
        self.paths_sql(w)?;
        w.push(" IN (");
        match &self.values {
            InValues::Values(list) => {
                for (i, p) in list.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.push_parameter(p);
                }
            }
            InValues::Expression(e) => match e.as_ref() {
                // bare SELECT inside the IN brackets
                Expression::Subquery(q) => q.as_sql(w)?,
                other => other.as_sql(w)?,
            },
            InValues::Empty => {}
        }
        w.push(")");
        Ok(())
    }
}

/// Boolean condition of a WHERE, HAVING or ON clause.
#[derive(Clone, Debug)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare(Expression, ComparisonOperator, Expression),
    Between {
        attribute: Expression,
        low: Expression,
        high: Expression,
    },
    Like {
        column: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    },
    Null(Expression, NullCheck),
    In(InPredicate),
    Exists(Box<CriteriaQuery>),
}

impl Predicate {
    /// Left-associative AND chain; needs at least two restrictions.
    pub fn and<I>(restrictions: I) -> CriteriaResult<Predicate>
    where
        I: IntoIterator<Item = Predicate>,
    {
        Self::chain(restrictions, BooleanOperator::And)
    }

    /// Left-associative OR chain; needs at least two restrictions.
    pub fn or<I>(restrictions: I) -> CriteriaResult<Predicate>
    where
        I: IntoIterator<Item = Predicate>,
    {
        Self::chain(restrictions, BooleanOperator::Or)
    }

    fn chain<I>(restrictions: I, op: BooleanOperator) -> CriteriaResult<Predicate>
    where
        I: IntoIterator<Item = Predicate>,
    {
        let items: Vec<Predicate> = restrictions.into_iter().collect();
        let too_few =
            || CriteriaError::argument("parameter 'restrictions' has to have at least 2 elements");
        if items.len() < 2 {
            return Err(too_few());
        }
        Self::fold(items, op).ok_or_else(too_few)
    }

    fn fold(items: Vec<Predicate>, op: BooleanOperator) -> Option<Predicate> {
        items.into_iter().reduce(|acc, next| match op {
            BooleanOperator::And => Predicate::And(Box::new(acc), Box::new(next)),
            BooleanOperator::Or => Predicate::Or(Box::new(acc), Box::new(next)),
        })
    }

    /// AND of any number of restrictions: none yields `None`, one is
    /// returned as is.
    pub fn conjunction(items: Vec<Predicate>) -> Option<Predicate> {
        Self::fold(items, BooleanOperator::And)
    }

    /// OR of any number of restrictions.
    pub fn disjunction(items: Vec<Predicate>) -> Option<Predicate> {
        Self::fold(items, BooleanOperator::Or)
    }

    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    pub fn operator(&self) -> Option<BooleanOperator> {
        match self {
            Predicate::And(..) | Predicate::In(_) => Some(BooleanOperator::And),
            Predicate::Or(..) => Some(BooleanOperator::Or),
            _ => None,
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Predicate::Not(_))
    }
}

impl From<InPredicate> for Predicate {
    fn from(p: InPredicate) -> Self {
        Predicate::In(p)
    }
}

fn binary(
    w: &mut SqlWriter<'_>,
    l: &Predicate,
    op: BooleanOperator,
    r: &Predicate,
) -> CriteriaResult<()> {
    w.push("(");
    l.as_sql(w)?;
    w.push(" ").push(op.keyword()).push(" ");
    r.as_sql(w)?;
    w.push(")");
    Ok(())
}

impl SqlConvertible for Predicate {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        match self {
            Predicate::And(l, r) => binary(w, l, BooleanOperator::And, r)?,
            Predicate::Or(l, r) => binary(w, l, BooleanOperator::Or, r)?,
            Predicate::Not(p) => {
                w.push("(NOT ");
                p.as_sql(w)?;
                w.push(")");
            }
            Predicate::Compare(l, op, r) => {
                w.push("(");
                l.as_sql(w)?;
                w.push(" ").push(op.symbol()).push(" ");
                r.as_sql(w)?;
                w.push(")");
            }
            Predicate::Between {
                attribute,
                low,
                high,
            } => {
                w.push("(");
                attribute.as_sql(w)?;
                w.push(" BETWEEN ");
                low.as_sql(w)?;
                w.push(" AND ");
                high.as_sql(w)?;
                w.push(")");
            }
            Predicate::Like {
                column,
                pattern,
                escape,
            } => {
                w.push("(");
                column.as_sql(w)?;
                w.push(" LIKE ");
                pattern.as_sql(w)?;
                if let Some(escape) = escape {
                    w.push(" ESCAPE ");
                    escape.as_sql(w)?;
                }
                w.push(")");
            }
            Predicate::Null(e, check) => {
                w.push("(");
                e.as_sql(w)?;
                w.push(match check {
                    NullCheck::IsNull => " IS NULL)",
                    NullCheck::IsNotNull => " IS NOT NULL)",
                });
            }
            Predicate::In(p) => p.as_sql(w)?,
            Predicate::Exists(q) => {
                w.push("EXISTS (");
                q.as_sql(w)?;
                w.push(")");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::PathExpr;
    use crate::metadata::FieldKind;
    use crate::processor::DefaultProcessor;

    fn path(column: &str) -> Expression {
        Expression::Path(PathExpr {
            table_alias: "E0".into(),
            column: column.into(),
            alias: column.into(),
            internal: column.into(),
            kind: FieldKind::String,
        })
    }

    fn eq(buffer: &mut ParameterBuffer, column: &str, v: &str) -> Predicate {
        Predicate::Compare(
            path(column),
            ComparisonOperator::Equal,
            Expression::Parameter(buffer.add_value(v)),
        )
    }

    fn render(buffer: &mut ParameterBuffer, p: &Predicate) -> CriteriaResult<String> {
        let mut w = SqlWriter::new(buffer, &DefaultProcessor);
        p.as_sql(&mut w)?;
        Ok(w.finish())
    }

    #[test]
    fn and_of_n_restrictions_has_n_minus_one_operators() {
        let mut b = ParameterBuffer::new();
        let items = vec![eq(&mut b, "A", "1"), eq(&mut b, "B", "2"), eq(&mut b, "C", "3")];
        let p = Predicate::and(items).unwrap();
        assert_eq!(p.operator(), Some(BooleanOperator::And));
        let sql = render(&mut b, &p).unwrap();
        assert_eq!(sql.matches(" AND ").count(), 2);
        assert_eq!(
            sql,
            "(((E0.\"A\" = ?1) AND (E0.\"B\" = ?2)) AND (E0.\"C\" = ?3))"
        );
    }

    #[test]
    fn or_renders_or_keyword() {
        let mut b = ParameterBuffer::new();
        let items = vec![eq(&mut b, "A", "1"), eq(&mut b, "B", "2")];
        let p = Predicate::or(items).unwrap();
        assert_eq!(p.operator(), Some(BooleanOperator::Or));
        assert_eq!(
            render(&mut b, &p).unwrap(),
            "((E0.\"A\" = ?1) OR (E0.\"B\" = ?2))"
        );
    }

    #[test]
    fn fewer_than_two_restrictions_are_rejected() {
        let mut b = ParameterBuffer::new();
        assert!(matches!(
            Predicate::and(vec![eq(&mut b, "A", "1")]),
            Err(CriteriaError::IllegalArgument(_))
        ));
        assert!(matches!(
            Predicate::or(Vec::new()),
            Err(CriteriaError::IllegalArgument(_))
        ));
    }

    #[test]
    fn conjunction_unwraps_single_item() {
        let mut b = ParameterBuffer::new();
        assert!(Predicate::conjunction(Vec::new()).is_none());
        let single = Predicate::conjunction(vec![eq(&mut b, "A", "1")]).unwrap();
        assert!(matches!(single, Predicate::Compare(..)));
    }

    #[test]
    fn double_not_is_kept() {
        let mut b = ParameterBuffer::new();
        let p = eq(&mut b, "A", "1").not();
        assert!(p.is_negated());
        assert_eq!(p.operator(), None);
        let pp = p.not();
        assert!(pp.is_negated());
        assert_eq!(
            render(&mut b, &pp).unwrap(),
            "(NOT (NOT (E0.\"A\" = ?1)))"
        );
    }

    #[test]
    fn between_like_and_null() {
        let mut b = ParameterBuffer::new();
        let between = Predicate::Between {
            attribute: path("ID"),
            low: Expression::Parameter(b.add_value("1")),
            high: Expression::Parameter(b.add_value("5")),
        };
        assert_eq!(
            render(&mut b, &between).unwrap(),
            "(E0.\"ID\" BETWEEN ?1 AND ?2)"
        );
        let like = Predicate::Like {
            column: path("Name"),
            pattern: Expression::Parameter(b.add_value("%x%")),
            escape: Some(Expression::Parameter(b.add_value("\\"))),
        };
        assert_eq!(
            render(&mut b, &like).unwrap(),
            "(E0.\"Name\" LIKE ?3 ESCAPE ?4)"
        );
        let null = Predicate::Null(path("Name"), NullCheck::IsNotNull);
        assert_eq!(render(&mut b, &null).unwrap(), "(E0.\"Name\" IS NOT NULL)");
    }

    #[test]
    fn in_with_values() {
        let mut b = ParameterBuffer::new();
        let mut p = InPredicate::new(vec![path("ID")]);
        p.value(&mut b, "1").unwrap().value(&mut b, "2").unwrap();
        let p = Predicate::from(p);
        assert_eq!(p.operator(), Some(BooleanOperator::And));
        assert_eq!(render(&mut b, &p).unwrap(), "E0.\"ID\" IN (?1, ?2)");
    }

    #[test]
    fn in_over_compound_path() {
        let mut b = ParameterBuffer::new();
        let mut p = InPredicate::new(vec![path("A"), path("B")]);
        p.value(&mut b, "1").unwrap();
        assert_eq!(
            render(&mut b, &Predicate::from(p)).unwrap(),
            "(E0.\"A\", E0.\"B\") IN (?1)"
        );
    }

    #[test]
    fn in_rejects_mixing_values_and_expressions() {
        let mut b = ParameterBuffer::new();
        let mut p = InPredicate::new(vec![path("ID")]);
        p.value(&mut b, "1").unwrap();
        assert!(matches!(
            p.expression(path("X")),
            Err(CriteriaError::IllegalState(_))
        ));

        let mut p = InPredicate::new(vec![path("ID")]);
        p.expression(path("X")).unwrap();
        assert!(matches!(
            p.value(&mut b, "1"),
            Err(CriteriaError::IllegalState(_))
        ));
        assert!(matches!(
            p.expression(path("Y")),
            Err(CriteriaError::NotImplemented(_))
        ));
    }

    #[test]
    fn empty_in_does_not_render() {
        let mut b = ParameterBuffer::new();
        let p = Predicate::from(InPredicate::new(vec![path("ID")]));
        assert!(matches!(
            render(&mut b, &p),
            Err(CriteriaError::IllegalState(_))
        ));
    }
}
