//! `$filter` AST → criteria predicate compiler.
//!
//! Parsing belongs to the caller (or [`odata_core::parse_filter`] for raw
//! filters); this module consumes `odata_core::ast::Expr` and resolves
//! identifiers against the paths of one FROM node.

use bigdecimal::ToPrimitive;
use odata_core::ast::{self, CompareOperator};
use odata_core::{Error, FilterOption};
use odata_criteria::{
    ComparisonOperator, CriteriaBuilder, Expression, FieldKind, FromRef, Predicate,
};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch: expected {expected:?}, got {got}")]
    TypeMismatch {
        expected: FieldKind,
        got: &'static str,
    },

    #[error("unsupported operator: {0:?}")]
    UnsupportedOp(CompareOperator),

    #[error("unsupported function or args: {0}()")]
    UnsupportedFn(String),

    #[error("IN() list supports only literals")]
    NonLiteralInList,

    #[error("bare identifier not allowed: {0}")]
    BareIdentifier(String),

    #[error("bare literal not allowed")]
    BareLiteral,

    #[error("{0}")]
    Other(&'static str),
}

pub type FilterResult<T> = Result<T, FilterError>;

impl From<FilterError> for Error {
    fn from(e: FilterError) -> Self {
        Error::InvalidFilter(e.to_string())
    }
}

/* ---------- coercion ---------- */

fn mismatch(expected: FieldKind, v: &ast::Value) -> FilterError {
    FilterError::TypeMismatch {
        expected,
        got: v.type_name(),
    }
}

/// Coerce a literal to the value kind of the column it is compared with.
pub fn coerce(kind: FieldKind, v: &ast::Value) -> FilterResult<ast::Value> {
    use ast::Value as V;
    Ok(match (kind, v) {
        (FieldKind::String, V::String(_)) => v.clone(),
        (FieldKind::I64, V::Number(n)) => {
            let i = n
                .to_i64()
                .filter(|i| bigdecimal::BigDecimal::from(*i) == *n)
                .ok_or_else(|| mismatch(kind, v))?;
            V::from(i)
        }
        (FieldKind::F64 | FieldKind::Decimal, V::Number(_)) => v.clone(),
        (FieldKind::Bool, V::Bool(_)) => v.clone(),
        (FieldKind::Uuid, V::Uuid(_)) => v.clone(),
        (FieldKind::Uuid, V::String(s)) => {
            V::Uuid(s.parse::<Uuid>().map_err(|_| mismatch(kind, v))?)
        }
        (FieldKind::DateTimeUtc, V::DateTime(_)) => v.clone(),
        (FieldKind::Date, V::Date(_)) => v.clone(),
        (FieldKind::Time, V::Time(_)) => v.clone(),
        (expected, other) => return Err(mismatch(expected, other)),
    })
}

/* ---------- LIKE helpers ---------- */

pub(crate) const LIKE_ESCAPE: char = '\\';

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push(LIKE_ESCAPE);
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

/* ---------- operands ---------- */

/// Resolve a selectable path of `from`; ignored attributes are unknown.
fn field(from: &FromRef, name: &str) -> FilterResult<Expression> {
    if !from.path_list().iter().any(|p| p.matches(name)) {
        return Err(FilterError::UnknownField(name.to_string()));
    }
    from.get(name)
        .map_err(|_| FilterError::UnknownField(name.to_string()))
}

/// Left side of a comparison: a property, optionally wrapped in a string
/// function.
fn operand(cb: &CriteriaBuilder, from: &FromRef, e: &ast::Expr) -> FilterResult<Expression> {
    use ast::Expr as X;
    match e {
        X::Identifier(name) => field(from, name),
        X::Function(fname, args) => {
            let n = fname.to_ascii_lowercase();
            let [arg] = args.as_slice() else {
                return Err(FilterError::UnsupportedFn(fname.clone()));
            };
            let inner = operand(cb, from, arg)?;
            let string_arg = || {
                if inner.kind() == Some(FieldKind::String) {
                    Ok(inner.clone())
                } else {
                    Err(FilterError::TypeMismatch {
                        expected: FieldKind::String,
                        got: "non-string field",
                    })
                }
            };
            Ok(match n.as_str() {
                "tolower" => cb.lower(string_arg()?),
                "toupper" => cb.upper(string_arg()?),
                "trim" => cb.trim(string_arg()?),
                "length" => cb.length(string_arg()?),
                _ => return Err(FilterError::UnsupportedFn(fname.clone())),
            })
        }
        X::Value(_) => Err(FilterError::Other("literal on both sides of a comparison")),
        _ => Err(FilterError::Other("unsupported comparison form")),
    }
}

fn flip(op: CompareOperator) -> CompareOperator {
    use CompareOperator as Op;
    match op {
        Op::Gt => Op::Lt,
        Op::Ge => Op::Le,
        Op::Lt => Op::Gt,
        Op::Le => Op::Ge,
        other => other,
    }
}

fn always_false(cb: &CriteriaBuilder) -> Predicate {
    Predicate::Compare(cb.literal(1), ComparisonOperator::Equal, cb.literal(0))
}

/* ---------- Expr (AST) -> Predicate ---------- */

pub fn expr_to_predicate(
    cb: &mut CriteriaBuilder,
    from: &FromRef,
    expr: &ast::Expr,
) -> FilterResult<Predicate> {
    use ast::CompareOperator as Op;
    use ast::Expr as X;

    Ok(match expr {
        X::And(a, b) => {
            let left = expr_to_predicate(cb, from, a)?;
            let right = expr_to_predicate(cb, from, b)?;
            cb.and(left, right)
        }
        X::Or(a, b) => {
            let left = expr_to_predicate(cb, from, a)?;
            let right = expr_to_predicate(cb, from, b)?;
            cb.or(left, right)
        }
        X::Not(x) => expr_to_predicate(cb, from, x)?.not(),

        X::Compare(l, op, r) => {
            let (lhs, op, rhs) = match (&**l, &**r) {
                (X::Identifier(_), X::Identifier(_)) => {
                    return Err(FilterError::Other(
                        "field-to-field comparison is not supported",
                    ))
                }
                (lhs, X::Value(v)) => (lhs, *op, v),
                (X::Value(v), rhs) => (rhs, flip(*op), v),
                _ => return Err(FilterError::Other("unsupported comparison form")),
            };
            let column = operand(cb, from, lhs)?;

            if rhs.is_null() {
                return Ok(match op {
                    Op::Eq => cb.is_null(column),
                    Op::Ne => cb.is_not_null(column),
                    _ => return Err(FilterError::UnsupportedOp(op)),
                });
            }

            let kind = column.kind().unwrap_or(FieldKind::String);
            let value = coerce(kind, rhs)?;
            cb.comparison(column, ComparisonOperator::from(op), value)
        }

        X::In(l, list) => {
            let column = operand(cb, from, l)?;
            let kind = column.kind().unwrap_or(FieldKind::String);
            let values = list
                .iter()
                .map(|e| match e {
                    X::Value(v) => coerce(kind, v),
                    _ => Err(FilterError::NonLiteralInList),
                })
                .collect::<FilterResult<Vec<_>>>()?;
            if values.is_empty() {
                always_false(cb)
            } else {
                cb.in_values(column, values)
                    .map_err(|_| FilterError::Other("invalid IN() list"))?
            }
        }

        X::Function(fname, args) => {
            let n = fname.to_ascii_lowercase();
            let (column, s) = match args.as_slice() {
                [lhs, X::Value(ast::Value::String(s))] => (operand(cb, from, lhs)?, s),
                _ => return Err(FilterError::UnsupportedFn(fname.clone())),
            };
            if column.kind() != Some(FieldKind::String) {
                return Err(FilterError::TypeMismatch {
                    expected: FieldKind::String,
                    got: "non-string field",
                });
            }
            let pattern = match n.as_str() {
                "contains" => format!("%{}%", like_escape(s)),
                "startswith" => format!("{}%", like_escape(s)),
                "endswith" => format!("%{}", like_escape(s)),
                _ => return Err(FilterError::UnsupportedFn(fname.clone())),
            };
            cb.like_escape(column, pattern, LIKE_ESCAPE)
        }

        X::Identifier(name) => return Err(FilterError::BareIdentifier(name.clone())),
        X::Value(_) => return Err(FilterError::BareLiteral),
    })
}

/// Compile a request `$filter`, parsing it first when it is still raw.
pub fn compile_filter(
    cb: &mut CriteriaBuilder,
    from: &FromRef,
    filter: &FilterOption,
) -> Result<Predicate, Error> {
    let parsed;
    let expr = match filter {
        FilterOption::Ast(expr) => expr,
        FilterOption::Raw(raw) => {
            parsed = odata_core::parse_filter(raw)?;
            &parsed
        }
    };
    Ok(expr_to_predicate(cb, from, expr)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_core::ast::{Expr as X, Value as V};
    use odata_criteria::{testing, CriteriaQuery, SqliteProcessor};
    use std::sync::Arc;

    fn ident(name: &str) -> Box<X> {
        Box::new(X::Identifier(name.into()))
    }

    fn val(v: impl Into<V>) -> Box<X> {
        Box::new(X::Value(v.into()))
    }

    fn render(
        entity: &str,
        build: impl FnOnce(&mut CriteriaBuilder, &FromRef) -> FilterResult<Predicate>,
    ) -> FilterResult<(String, Vec<V>)> {
        let sd = testing::service_document().unwrap();
        let mut cb = CriteriaBuilder::new(sd, Arc::new(SqliteProcessor));
        let mut q: CriteriaQuery = cb.create_query();
        let root = q.from(&mut cb, entity).unwrap();
        let predicate = build(&mut cb, &root)?;
        q.select(root.get("ID").unwrap()).where_(predicate);
        let st = q.to_statement(&cb).unwrap();
        Ok((st.sql, st.parameters))
    }

    #[test]
    fn comparison_binds_coerced_value() {
        let (sql, params) = render("BusinessPartner", |cb, from| {
            let e = X::Compare(ident("ETag"), CompareOperator::Ge, val(3));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert_eq!(
            sql,
            r#"SELECT E0."ID" FROM "OLINGO"."BusinessPartner" E0 WHERE (E0."ETag" >= ?1)"#
        );
        assert_eq!(params, vec![V::from(3)]);
    }

    #[test]
    fn literal_on_the_left_flips_the_operator() {
        let (sql, _) = render("BusinessPartner", |cb, from| {
            let e = X::Compare(val(3), CompareOperator::Lt, ident("ETag"));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(sql.ends_with(r#"WHERE (E0."ETag" > ?1)"#), "{sql}");
    }

    #[test]
    fn null_comparison_becomes_null_check() {
        let (sql, params) = render("BusinessPartner", |cb, from| {
            let e = X::Compare(ident("Country"), CompareOperator::Ne, val(V::Null));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(sql.ends_with(r#"WHERE (E0."Country" IS NOT NULL)"#), "{sql}");
        assert!(params.is_empty());
    }

    #[test]
    fn empty_in_list_is_always_false() {
        let (sql, _) = render("BusinessPartner", |cb, from| {
            let e = X::In(ident("ID"), vec![]);
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(sql.ends_with("WHERE (1 = 0)"), "{sql}");
    }

    #[test]
    fn in_list_binds_each_value() {
        let (sql, params) = render("BusinessPartner", |cb, from| {
            let e = X::In(
                ident("ID"),
                vec![X::Value(V::from("1")), X::Value(V::from("2"))],
            );
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(sql.ends_with(r#"WHERE E0."ID" IN (?1, ?2)"#), "{sql}");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn contains_escapes_like_wildcards() {
        let (sql, params) = render("BusinessPartner", |cb, from| {
            let e = X::Function(
                "contains".into(),
                vec![X::Identifier("Country".into()), X::Value(V::from("50%_off"))],
            );
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(
            sql.ends_with(r#"WHERE (E0."Country" LIKE ?1 ESCAPE ?2)"#),
            "{sql}"
        );
        assert_eq!(params[0], V::from(r"%50\%\_off%"));
        assert_eq!(params[1], V::from(r"\"));
    }

    #[test]
    fn string_function_on_the_left() {
        let (sql, _) = render("BusinessPartner", |cb, from| {
            let e = X::Compare(
                Box::new(X::Function(
                    "tolower".into(),
                    vec![X::Identifier("Country".into())],
                )),
                CompareOperator::Eq,
                val("deu"),
            );
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(sql.ends_with(r#"WHERE (LOWER(E0."Country") = ?1)"#), "{sql}");
    }

    #[test]
    fn complex_paths_resolve() {
        let (sql, _) = render("BusinessPartner", |cb, from| {
            let e = X::Compare(ident("Address/CityName"), CompareOperator::Eq, val("Berlin"));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap();
        assert!(sql.ends_with(r#"WHERE (E0."Address.CityName" = ?1)"#), "{sql}");
    }

    #[test]
    fn unknown_and_ignored_fields_are_rejected() {
        let err = render("BusinessPartner", |cb, from| {
            let e = X::Compare(ident("Nope"), CompareOperator::Eq, val("x"));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap_err();
        assert_eq!(err, FilterError::UnknownField("Nope".into()));

        let err = render("BusinessPartner", |cb, from| {
            let e = X::Compare(ident("CustomString1"), CompareOperator::Eq, val("x"));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap_err();
        assert_eq!(err, FilterError::UnknownField("CustomString1".into()));
    }

    #[test]
    fn type_mismatch_maps_to_bad_request() {
        let err = render("BusinessPartner", |cb, from| {
            let e = X::Compare(ident("ETag"), CompareOperator::Eq, val("abc"));
            expr_to_predicate(cb, from, &e)
        })
        .unwrap_err();
        assert!(matches!(err, FilterError::TypeMismatch { .. }));
        let protocol: Error = err.into();
        assert_eq!(protocol.status().as_u16(), 400);
    }

    #[test]
    fn bare_leaves_are_rejected() {
        let err = render("BusinessPartner", |cb, from| {
            expr_to_predicate(cb, from, &X::Identifier("ID".into()))
        })
        .unwrap_err();
        assert_eq!(err, FilterError::BareIdentifier("ID".into()));
    }

    #[test]
    fn coerce_uuid_from_string() {
        let u = Uuid::nil();
        assert_eq!(
            coerce(FieldKind::Uuid, &V::from(u.to_string())).unwrap(),
            V::Uuid(u)
        );
        assert!(coerce(FieldKind::I64, &V::Number("1.5".parse().unwrap())).is_err());
    }
}
