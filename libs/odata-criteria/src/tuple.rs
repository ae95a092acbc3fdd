use std::sync::Arc;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use odata_core::ast::Value;
use uuid::Uuid;

use crate::error::{CriteriaError, CriteriaResult};
use crate::metadata::FieldKind;

/// Describes one column of a result row.
#[derive(Clone, Debug, PartialEq)]
pub struct TupleElement {
    pub alias: Option<String>,
    pub kind: Option<FieldKind>,
    pub position: usize,
}

/// Typed extraction of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for BigDecimal {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(n.clone()),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.to_i64().filter(|i| BigDecimal::from(*i) == *n),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.to_f64(),
            _ => None,
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One result row, addressable by position or alias.
#[derive(Clone, Debug)]
pub struct Tuple {
    elements: Arc<[TupleElement]>,
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(elements: Arc<[TupleElement]>, values: Vec<Value>) -> CriteriaResult<Self> {
        if elements.len() != values.len() {
            return Err(CriteriaError::argument(format!(
                "row has {} values but {} elements",
                values.len(),
                elements.len()
            )));
        }
        Ok(Self { elements, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`; negative or out of range indexes are rejected.
    pub fn get<I: TryInto<usize>>(&self, index: I) -> CriteriaResult<&Value> {
        let index: usize = index
            .try_into()
            .map_err(|_| CriteriaError::argument("tuple index must not be negative"))?;
        self.values.get(index).ok_or_else(|| {
            CriteriaError::argument(format!(
                "tuple index {index} out of range, tuple has {} elements",
                self.values.len()
            ))
        })
    }

    pub fn get_by_alias(&self, alias: &str) -> CriteriaResult<&Value> {
        self.elements
            .iter()
            .position(|e| e.alias.as_deref() == Some(alias))
            .map(|i| &self.values[i])
            .ok_or_else(|| CriteriaError::argument(format!("unknown tuple alias '{alias}'")))
    }

    pub fn get_as<T: FromValue, I: TryInto<usize>>(&self, index: I) -> CriteriaResult<T> {
        convert(self.get(index)?)
    }

    pub fn get_by_alias_as<T: FromValue>(&self, alias: &str) -> CriteriaResult<T> {
        convert(self.get_by_alias(alias)?)
    }

    pub fn elements(&self) -> &[TupleElement] {
        &self.elements
    }

    /// Copy of the row values; changing it leaves the tuple untouched.
    pub fn to_array(&self) -> Vec<Value> {
        self.values.clone()
    }
}

fn convert<T: FromValue>(value: &Value) -> CriteriaResult<T> {
    T::from_value(value).ok_or_else(|| {
        CriteriaError::argument(format!(
            "value of type {} cannot be converted to {}",
            value.type_name(),
            std::any::type_name::<T>()
        ))
    })
}
