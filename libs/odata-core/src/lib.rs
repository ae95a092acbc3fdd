//! Protocol-side building blocks shared by the criteria builder and the
//! expand engine: the `$filter` AST, request query options, the entity
//! collection result model and the unified OData error.

pub mod ast {
    use std::cmp::Ordering;
    use std::fmt;

    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Clone, Debug)]
    pub enum Expr {
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
        Not(Box<Expr>),
        Compare(Box<Expr>, CompareOperator, Box<Expr>),
        In(Box<Expr>, Vec<Expr>),
        Function(String, Vec<Expr>),
        Identifier(String),
        Value(Value),
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CompareOperator {
        Eq,
        Ne,
        Gt,
        Ge,
        Lt,
        Le,
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    #[serde(untagged)]
    pub enum Value {
        Null,
        Bool(bool),
        Number(BigDecimal),
        Uuid(Uuid),
        DateTime(DateTime<Utc>),
        Date(NaiveDate),
        Time(NaiveTime),
        String(String),
    }

    impl Value {
        pub fn is_null(&self) -> bool {
            matches!(self, Value::Null)
        }

        /// Short type name used in error messages.
        pub fn type_name(&self) -> &'static str {
            match self {
                Value::Null => "null",
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                Value::Uuid(_) => "uuid",
                Value::DateTime(_) => "datetime",
                Value::Date(_) => "date",
                Value::Time(_) => "time",
                Value::String(_) => "string",
            }
        }

        /// Orders two values of the same kind. Values of different kinds and
        /// nulls are incomparable.
        pub fn compare(&self, other: &Value) -> Option<Ordering> {
            match (self, other) {
                (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
                (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
                (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
                (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
                (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
                (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
        }
    }

    impl fmt::Display for Value {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Value::Null => f.write_str("null"),
                Value::Bool(b) => write!(f, "{b}"),
                Value::Number(n) => write!(f, "{}", n.normalized()),
                Value::Uuid(u) => write!(f, "{u}"),
                Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
                Value::Date(d) => write!(f, "{d}"),
                Value::Time(t) => write!(f, "{t}"),
                Value::String(s) => f.write_str(s),
            }
        }
    }

    impl From<i64> for Value {
        fn from(v: i64) -> Self {
            Value::Number(BigDecimal::from(v))
        }
    }

    impl From<i32> for Value {
        fn from(v: i32) -> Self {
            Value::Number(BigDecimal::from(v))
        }
    }

    impl From<bool> for Value {
        fn from(v: bool) -> Self {
            Value::Bool(v)
        }
    }

    impl From<&str> for Value {
        fn from(v: &str) -> Self {
            Value::String(v.to_string())
        }
    }

    impl From<String> for Value {
        fn from(v: String) -> Self {
            Value::String(v)
        }
    }

    impl From<Uuid> for Value {
        fn from(v: Uuid) -> Self {
            Value::Uuid(v)
        }
    }

    impl From<BigDecimal> for Value {
        fn from(v: BigDecimal) -> Self {
            Value::Number(v)
        }
    }
}

mod entity;
mod error;
mod options;

pub use entity::{Entity, EntityCollection, PropertyValue, ROOT_RESULT_KEY};
pub use error::{Error, ODataResult};
pub use options::{ExpandItem, FilterOption, ODataOrderBy, ODataQuery, OrderKey, SortDir};

#[cfg(feature = "with-odata-params")]
pub use convert_odata_params::parse_filter;

#[cfg(feature = "with-odata-params")]
mod convert_odata_params {
    use super::ast::*;
    use odata_params::filters as od;

    /// Parse a raw `$filter` string into the crate AST.
    pub fn parse_filter(raw: &str) -> Result<Expr, crate::Error> {
        od::parse_str(raw)
            .map(Expr::from)
            .map_err(|e| crate::Error::InvalidFilter(format!("{e:?}")))
    }

    impl From<od::CompareOperator> for CompareOperator {
        fn from(op: od::CompareOperator) -> Self {
            use od::CompareOperator::*;
            match op {
                Equal => CompareOperator::Eq,
                NotEqual => CompareOperator::Ne,
                GreaterThan => CompareOperator::Gt,
                GreaterOrEqual => CompareOperator::Ge,
                LessThan => CompareOperator::Lt,
                LessOrEqual => CompareOperator::Le,
            }
        }
    }

    impl From<od::Value> for Value {
        fn from(v: od::Value) -> Self {
            match v {
                od::Value::Null => Value::Null,
                od::Value::Bool(b) => Value::Bool(b),
                od::Value::Number(n) => Value::Number(n),
                od::Value::Uuid(u) => Value::Uuid(u),
                od::Value::DateTime(dt) => Value::DateTime(dt),
                od::Value::Date(d) => Value::Date(d),
                od::Value::Time(t) => Value::Time(t),
                od::Value::String(s) => Value::String(s),
            }
        }
    }

    impl From<od::Expr> for Expr {
        fn from(e: od::Expr) -> Self {
            use od::Expr::*;
            match e {
                And(a, b) => Expr::And(Box::new((*a).into()), Box::new((*b).into())),
                Or(a, b) => Expr::Or(Box::new((*a).into()), Box::new((*b).into())),
                Not(x) => Expr::Not(Box::new((*x).into())),
                Compare(l, op, r) => {
                    Expr::Compare(Box::new((*l).into()), op.into(), Box::new((*r).into()))
                }
                In(l, list) => Expr::In(
                    Box::new((*l).into()),
                    list.into_iter().map(|x| x.into()).collect(),
                ),
                Function(n, args) => {
                    Expr::Function(n, args.into_iter().map(|x| x.into()).collect())
                }
                Identifier(s) => Expr::Identifier(s),
                Value(v) => Expr::Value(v.into()),
            }
        }
    }
}
