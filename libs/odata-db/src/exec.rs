//! Statement execution: positional binding of [`Value`]s and decoding of
//! result columns by the [`FieldKind`] of their tuple element.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use odata_core::ast::Value;
use odata_core::ODataResult;
use odata_criteria::{FieldKind, Statement, Tuple, TupleElement};
use odata_query::QueryExecutor;
use sqlx::{ColumnIndex, Decode, Row, Type};

use crate::{DbError, DbHandle, DbPool, Result};

fn decode_error(element: &TupleElement, err: impl std::fmt::Display) -> DbError {
    DbError::Decode {
        position: element.position,
        alias: element.alias.clone().unwrap_or_else(|| "-".to_string()),
        message: err.to_string(),
    }
}

fn column<'r, R, T>(row: &'r R, element: &TupleElement) -> Result<Option<T>>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, usize>(element.position)
        .map_err(|e| decode_error(element, e))
}

fn nullable<T>(value: Option<T>, wrap: impl FnOnce(T) -> Value) -> Value {
    value.map_or(Value::Null, wrap)
}

fn from_f64(element: &TupleElement, value: Option<f64>) -> Result<Value> {
    match value {
        None => Ok(Value::Null),
        Some(f) => BigDecimal::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| decode_error(element, format!("{f} is not a finite number"))),
    }
}

/// Whole numbers that fit are bound as integers.
fn integral(n: &BigDecimal) -> Option<i64> {
    if n.is_integer() {
        n.to_i64()
    } else {
        None
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use sqlx::sqlite::{SqliteArguments, SqliteRow};
    use sqlx::{Sqlite, SqlitePool, TypeInfo, ValueRef};
    use uuid::Uuid;

    use super::*;

    type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

    /// UUIDs are stored as text.
    fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> Result<SqliteQuery<'q>> {
        Ok(match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match integral(n) {
                Some(i) => query.bind(i),
                None => query.bind(n.to_f64().ok_or(DbError::Bind("number"))?),
            },
            Value::Uuid(u) => query.bind(u.hyphenated().to_string()),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Date(d) => query.bind(*d),
            Value::Time(t) => query.bind(*t),
            Value::String(s) => query.bind(s.clone()),
        })
    }

    fn untyped(row: &SqliteRow, element: &TupleElement) -> Result<Value> {
        let raw = row
            .try_get_raw(element.position)
            .map_err(|e| decode_error(element, e))?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let type_name = raw.type_info().name().to_string();
        match type_name.as_str() {
            "INTEGER" => Ok(nullable(column::<_, i64>(row, element)?, Value::from)),
            "REAL" => from_f64(element, column(row, element)?),
            _ => Ok(nullable(column::<_, String>(row, element)?, Value::String)),
        }
    }

    fn decode(row: &SqliteRow, element: &TupleElement) -> Result<Value> {
        Ok(match element.kind {
            Some(FieldKind::String) => nullable(column::<_, String>(row, element)?, Value::String),
            Some(FieldKind::I64) => nullable(column::<_, i64>(row, element)?, Value::from),
            Some(FieldKind::F64 | FieldKind::Decimal) => from_f64(element, column(row, element)?)?,
            Some(FieldKind::Bool) => nullable(column::<_, bool>(row, element)?, Value::Bool),
            Some(FieldKind::Uuid) => match column::<_, String>(row, element)? {
                None => Value::Null,
                Some(s) => Value::Uuid(Uuid::parse_str(&s).map_err(|e| decode_error(element, e))?),
            },
            Some(FieldKind::DateTimeUtc) => {
                nullable(column::<_, DateTime<Utc>>(row, element)?, Value::DateTime)
            }
            Some(FieldKind::Date) => nullable(column::<_, NaiveDate>(row, element)?, Value::Date),
            Some(FieldKind::Time) => nullable(column::<_, NaiveTime>(row, element)?, Value::Time),
            None => untyped(row, element)?,
        })
    }

    pub(super) async fn fetch(pool: &SqlitePool, statement: &Statement) -> Result<Vec<Vec<Value>>> {
        let mut query = sqlx::query(&statement.sql);
        for value in &statement.parameters {
            query = bind(query, value)?;
        }
        let rows = query.fetch_all(pool).await?;
        rows.iter()
            .map(|row| {
                statement
                    .elements
                    .iter()
                    .map(|e| decode(row, e))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

#[cfg(feature = "pg")]
mod postgres {
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use sqlx::postgres::{PgArguments, PgRow};
    use sqlx::{PgPool, Postgres, TypeInfo, ValueRef};
    use uuid::Uuid;

    use super::*;

    type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

    fn bind<'q>(query: PgQuery<'q>, value: &Value) -> Result<PgQuery<'q>> {
        Ok(match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match integral(n) {
                Some(i) => query.bind(i),
                None => query.bind(n.clone()),
            },
            Value::Uuid(u) => query.bind(*u),
            Value::DateTime(dt) => query.bind(*dt),
            Value::Date(d) => query.bind(*d),
            Value::Time(t) => query.bind(*t),
            Value::String(s) => query.bind(s.clone()),
        })
    }

    /// Numeric columns are read with the width the server reports.
    fn number(row: &PgRow, element: &TupleElement) -> Result<Value> {
        let raw = row
            .try_get_raw(element.position)
            .map_err(|e| decode_error(element, e))?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let type_name = raw.type_info().name().to_string();
        match type_name.as_str() {
            "INT2" => Ok(nullable(column::<_, i16>(row, element)?, |i| Value::from(i64::from(i)))),
            "INT4" => Ok(nullable(column::<_, i32>(row, element)?, Value::from)),
            "INT8" => Ok(nullable(column::<_, i64>(row, element)?, Value::from)),
            "FLOAT4" => from_f64(element, column::<_, f32>(row, element)?.map(f64::from)),
            "FLOAT8" => from_f64(element, column(row, element)?),
            "NUMERIC" => Ok(nullable(column::<_, BigDecimal>(row, element)?, Value::Number)),
            "BOOL" => Ok(nullable(column::<_, bool>(row, element)?, Value::Bool)),
            _ => Ok(nullable(column::<_, String>(row, element)?, Value::String)),
        }
    }

    fn decode(row: &PgRow, element: &TupleElement) -> Result<Value> {
        Ok(match element.kind {
            Some(FieldKind::String) => nullable(column::<_, String>(row, element)?, Value::String),
            Some(FieldKind::I64 | FieldKind::F64 | FieldKind::Decimal) | None => {
                number(row, element)?
            }
            Some(FieldKind::Bool) => nullable(column::<_, bool>(row, element)?, Value::Bool),
            Some(FieldKind::Uuid) => nullable(column::<_, Uuid>(row, element)?, Value::Uuid),
            Some(FieldKind::DateTimeUtc) => {
                nullable(column::<_, DateTime<Utc>>(row, element)?, Value::DateTime)
            }
            Some(FieldKind::Date) => nullable(column::<_, NaiveDate>(row, element)?, Value::Date),
            Some(FieldKind::Time) => nullable(column::<_, NaiveTime>(row, element)?, Value::Time),
        })
    }

    pub(super) async fn fetch(pool: &PgPool, statement: &Statement) -> Result<Vec<Vec<Value>>> {
        let mut query = sqlx::query(&statement.sql);
        for value in &statement.parameters {
            query = bind(query, value)?;
        }
        let rows = query.fetch_all(pool).await?;
        rows.iter()
            .map(|row| {
                statement
                    .elements
                    .iter()
                    .map(|e| decode(row, e))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for DbHandle {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(engine = ?self.engine(), binds = statement.parameters.len())
    )]
    async fn fetch(&self, statement: &Statement) -> ODataResult<Vec<Tuple>> {
        let rows = match self.pool() {
            #[cfg(feature = "pg")]
            DbPool::Postgres(pool) => postgres::fetch(pool, statement).await?,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => sqlite::fetch(pool, statement).await?,
        };
        tracing::trace!(rows = rows.len(), "fetched rows");
        let mut tuples = Vec::with_capacity(rows.len());
        for values in rows {
            tuples.push(Tuple::new(statement.elements.clone(), values)?);
        }
        Ok(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_bind_as_integers() {
        assert_eq!(integral(&BigDecimal::from(42)), Some(42));
        assert_eq!(integral(&"4.5".parse::<BigDecimal>().unwrap()), None);
        assert_eq!(integral(&"1e30".parse::<BigDecimal>().unwrap()), None);
    }

    #[test]
    fn non_finite_floats_do_not_decode() {
        let element = TupleElement {
            alias: Some("Area".to_string()),
            kind: Some(FieldKind::F64),
            position: 3,
        };
        assert_eq!(from_f64(&element, None).unwrap(), Value::Null);
        assert!(matches!(
            from_f64(&element, Some(1.5)).unwrap(),
            Value::Number(_)
        ));
        let err = from_f64(&element, Some(f64::NAN)).unwrap_err();
        assert!(err.to_string().contains("(Area)"));
    }
}
