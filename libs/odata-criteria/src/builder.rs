use std::sync::Arc;

use odata_core::ast::Value;
use odata_core::SortDir;

use crate::alias::AliasBuilder;
use crate::error::CriteriaResult;
use crate::expression::{ArithmeticOp, Expression, Order, SqlAggregation};
use crate::metadata::ServiceDocument;
use crate::parameter::{Parameter, ParameterBuffer};
use crate::predicate::{ComparisonOperator, InPredicate, NullCheck, Predicate};
use crate::processor::{DatabaseProcessor, SqlFunction};
use crate::query::CriteriaQuery;

/// Right-hand side of a comparison: an expression, or a plain value that
/// gets bound as parameter.
#[derive(Clone, Debug)]
pub enum Operand {
    Expression(Expression),
    Value(Value),
}

impl From<Expression> for Operand {
    fn from(e: Expression) -> Self {
        Operand::Expression(e)
    }
}

impl From<Parameter> for Operand {
    fn from(p: Parameter) -> Self {
        Operand::Expression(Expression::Parameter(p))
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl From<&Value> for Operand {
    fn from(v: &Value) -> Self {
        Operand::Value(v.clone())
    }
}

macro_rules! operand_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Operand {
            fn from(v: $t) -> Self {
                Operand::Value(Value::from(v))
            }
        })*
    };
}

operand_from_value!(i32, i64, bool, &str, String);

/// Factory and context of one statement: owns the alias counter and the
/// bind values, so every query, subquery and predicate built through the
/// same builder shares one numbering.
#[derive(Debug)]
pub struct CriteriaBuilder {
    aliases: AliasBuilder,
    parameters: ParameterBuffer,
    sd: Arc<ServiceDocument>,
    processor: Arc<dyn DatabaseProcessor>,
}

impl CriteriaBuilder {
    pub fn new(sd: Arc<ServiceDocument>, processor: Arc<dyn DatabaseProcessor>) -> Self {
        Self {
            aliases: AliasBuilder::default(),
            parameters: ParameterBuffer::new(),
            sd,
            processor,
        }
    }

    pub fn create_query(&self) -> CriteriaQuery {
        CriteriaQuery::new()
    }

    pub fn create_subquery(&self) -> CriteriaQuery {
        CriteriaQuery::new()
    }

    pub fn service_document(&self) -> &Arc<ServiceDocument> {
        &self.sd
    }

    pub fn processor(&self) -> &Arc<dyn DatabaseProcessor> {
        &self.processor
    }

    pub fn parameters(&self) -> &ParameterBuffer {
        &self.parameters
    }

    pub(crate) fn next_alias(&mut self) -> String {
        self.aliases.next_alias()
    }

    /// Bind `value` and return the parameter.
    pub fn bind(&mut self, value: impl Into<Value>) -> Parameter {
        self.parameters.add_value(value)
    }

    pub fn parameter(&mut self, value: impl Into<Value>) -> Expression {
        Expression::Parameter(self.bind(value))
    }

    /// Value rendered inline instead of bound.
    pub fn literal(&self, value: impl Into<Value>) -> Expression {
        Expression::Literal(value.into())
    }

    fn operand(&mut self, operand: impl Into<Operand>) -> Expression {
        match operand.into() {
            Operand::Expression(e) => e,
            Operand::Value(v) => self.parameter(v),
        }
    }

    fn compare(
        &mut self,
        x: impl Into<Operand>,
        op: ComparisonOperator,
        y: impl Into<Operand>,
    ) -> Predicate {
        let x = self.operand(x);
        let y = self.operand(y);
        Predicate::Compare(x, op, y)
    }

    pub fn equal(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Predicate {
        self.compare(x, ComparisonOperator::Equal, y)
    }

    pub fn not_equal(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Predicate {
        self.compare(x, ComparisonOperator::NotEqual, y)
    }

    pub fn gt(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Predicate {
        self.compare(x, ComparisonOperator::GreaterThan, y)
    }

    pub fn ge(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Predicate {
        self.compare(x, ComparisonOperator::GreaterEqual, y)
    }

    pub fn lt(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Predicate {
        self.compare(x, ComparisonOperator::LessThan, y)
    }

    pub fn le(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Predicate {
        self.compare(x, ComparisonOperator::LessEqual, y)
    }

    pub fn comparison(
        &mut self,
        x: impl Into<Operand>,
        op: ComparisonOperator,
        y: impl Into<Operand>,
    ) -> Predicate {
        self.compare(x, op, y)
    }

    pub fn between(
        &mut self,
        attribute: Expression,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Predicate {
        let low = self.operand(low);
        let high = self.operand(high);
        Predicate::Between {
            attribute,
            low,
            high,
        }
    }

    pub fn like(&mut self, column: Expression, pattern: impl Into<Operand>) -> Predicate {
        let pattern = self.operand(pattern);
        Predicate::Like {
            column,
            pattern,
            escape: None,
        }
    }

    pub fn like_escape(
        &mut self,
        column: Expression,
        pattern: impl Into<Operand>,
        escape: char,
    ) -> Predicate {
        let pattern = self.operand(pattern);
        let escape = self.parameter(escape.to_string());
        Predicate::Like {
            column,
            pattern,
            escape: Some(escape),
        }
    }

    pub fn is_null(&self, e: Expression) -> Predicate {
        Predicate::Null(e, NullCheck::IsNull)
    }

    pub fn is_not_null(&self, e: Expression) -> Predicate {
        Predicate::Null(e, NullCheck::IsNotNull)
    }

    /// Empty IN over one or more paths; fill it with [`CriteriaBuilder::in_value`]
    /// or [`InPredicate::expression`].
    pub fn in_(&self, paths: Vec<Expression>) -> InPredicate {
        InPredicate::new(paths)
    }

    pub fn in_value(
        &mut self,
        predicate: &mut InPredicate,
        value: impl Into<Value>,
    ) -> CriteriaResult<()> {
        predicate.value(&mut self.parameters, value)?;
        Ok(())
    }

    /// `path IN (v1, v2, ...)`
    pub fn in_values<I, V>(&mut self, path: Expression, values: I) -> CriteriaResult<Predicate>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut predicate = InPredicate::new(vec![path]);
        for value in values {
            predicate.value(&mut self.parameters, value)?;
        }
        Ok(Predicate::In(predicate))
    }

    pub fn exists(&self, subquery: CriteriaQuery) -> Predicate {
        Predicate::Exists(Box::new(subquery))
    }

    pub fn not_exists(&self, subquery: CriteriaQuery) -> Predicate {
        self.exists(subquery).not()
    }

    pub fn and(&self, x: Predicate, y: Predicate) -> Predicate {
        Predicate::And(Box::new(x), Box::new(y))
    }

    pub fn or(&self, x: Predicate, y: Predicate) -> Predicate {
        Predicate::Or(Box::new(x), Box::new(y))
    }

    pub fn and_all<I>(&self, restrictions: I) -> CriteriaResult<Predicate>
    where
        I: IntoIterator<Item = Predicate>,
    {
        Predicate::and(restrictions)
    }

    pub fn or_all<I>(&self, restrictions: I) -> CriteriaResult<Predicate>
    where
        I: IntoIterator<Item = Predicate>,
    {
        Predicate::or(restrictions)
    }

    pub fn not(&self, restriction: Predicate) -> Predicate {
        restriction.not()
    }

    pub fn count(&self, e: Expression) -> Expression {
        Expression::Aggregate(SqlAggregation::Count, Box::new(e))
    }

    pub fn sum(&self, e: Expression) -> Expression {
        Expression::Aggregate(SqlAggregation::Sum, Box::new(e))
    }

    pub fn avg(&self, e: Expression) -> Expression {
        Expression::Aggregate(SqlAggregation::Avg, Box::new(e))
    }

    fn arithmetic(
        &mut self,
        x: impl Into<Operand>,
        op: ArithmeticOp,
        y: impl Into<Operand>,
    ) -> Expression {
        let x = self.operand(x);
        let y = self.operand(y);
        Expression::Arithmetic(Box::new(x), op, Box::new(y))
    }

    pub fn plus(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Expression {
        self.arithmetic(x, ArithmeticOp::Sum, y)
    }

    pub fn diff(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Expression {
        self.arithmetic(x, ArithmeticOp::Diff, y)
    }

    pub fn prod(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Expression {
        self.arithmetic(x, ArithmeticOp::Prod, y)
    }

    pub fn quot(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Expression {
        self.arithmetic(x, ArithmeticOp::Quot, y)
    }

    pub fn modulo(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Expression {
        self.arithmetic(x, ArithmeticOp::Mod, y)
    }

    pub fn function(&mut self, function: SqlFunction, args: Vec<Operand>) -> Expression {
        let args = args.into_iter().map(|a| self.operand(a)).collect();
        Expression::Function(function, args)
    }

    pub fn lower(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Lower, vec![e])
    }

    pub fn upper(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Upper, vec![e])
    }

    pub fn length(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Length, vec![e])
    }

    pub fn trim(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Trim, vec![e])
    }

    pub fn concat(&mut self, x: impl Into<Operand>, y: impl Into<Operand>) -> Expression {
        let x = self.operand(x);
        let y = self.operand(y);
        Expression::Function(SqlFunction::Concat, vec![x, y])
    }

    /// `start` is 1-based.
    pub fn substring(
        &mut self,
        e: Expression,
        start: impl Into<Operand>,
        length: Option<Operand>,
    ) -> Expression {
        let mut args = vec![e, self.operand(start)];
        if let Some(length) = length {
            args.push(self.operand(length));
        }
        Expression::Function(SqlFunction::Substring, args)
    }

    /// 1-based position of `pattern` in `e`, 0 when absent.
    pub fn locate(&mut self, e: Expression, pattern: impl Into<Operand>) -> Expression {
        let pattern = self.operand(pattern);
        Expression::Function(SqlFunction::Locate, vec![pattern, e])
    }

    pub fn round(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Round, vec![e])
    }

    pub fn floor(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Floor, vec![e])
    }

    pub fn ceiling(&self, e: Expression) -> Expression {
        Expression::Function(SqlFunction::Ceiling, vec![e])
    }

    pub fn asc(&self, e: Expression) -> Order {
        Order {
            expression: e,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(&self, e: Expression) -> Order {
        Order {
            expression: e,
            dir: SortDir::Desc,
        }
    }
}
