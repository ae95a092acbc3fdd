//! Key window of a paged top level collection. Queries of expanded and
//! collection properties are restricted to it, so they only read children
//! of the current page (and of rows whose keys fall in between).

use std::cmp::Ordering;

use odata_core::ast::Value;
use odata_core::ODataResult;
use odata_criteria::{AttributePath, CriteriaBuilder, FromRef, Predicate, Tuple};

#[derive(Clone, Debug, PartialEq)]
pub struct KeyBoundary {
    /// Key path aliases in key order.
    pub aliases: Vec<String>,
    pub min: Vec<Value>,
    pub max: Vec<Value>,
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.compare(y).unwrap_or(Ordering::Equal))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

impl KeyBoundary {
    /// Lexicographic min/max of the key tuples of `rows`. `None` without
    /// rows.
    pub fn from_rows(rows: &[Tuple], key: &[AttributePath]) -> ODataResult<Option<Self>> {
        let mut min: Option<Vec<Value>> = None;
        let mut max: Option<Vec<Value>> = None;
        for row in rows {
            let values = key
                .iter()
                .map(|p| row.get_by_alias(&p.alias).cloned())
                .collect::<Result<Vec<_>, _>>()?;
            if min
                .as_ref()
                .map_or(true, |m| compare_keys(&values, m).is_lt())
            {
                min = Some(values.clone());
            }
            if max
                .as_ref()
                .map_or(true, |m| compare_keys(&values, m).is_gt())
            {
                max = Some(values);
            }
        }
        Ok(min.zip(max).map(|(min, max)| Self {
            aliases: key.iter().map(|p| p.alias.clone()).collect(),
            min,
            max,
        }))
    }

    /// Restriction of `from` to the window. A single key renders as
    /// `k >= min AND k <= max` (`k = v` when both are equal); compound keys
    /// as lexicographic OR chains on both ends.
    pub fn to_predicate(&self, cb: &mut CriteriaBuilder, from: &FromRef) -> ODataResult<Predicate> {
        let columns = self
            .aliases
            .iter()
            .map(|a| from.get(a))
            .collect::<Result<Vec<_>, _>>()?;

        if self.min == self.max {
            let mut equalities = Vec::with_capacity(columns.len());
            for (column, value) in columns.into_iter().zip(&self.min) {
                equalities.push(cb.equal(column, value));
            }
            return conjunction(equalities);
        }

        if columns.len() == 1 {
            let lower = cb.ge(columns[0].clone(), &self.min[0]);
            let upper = cb.le(columns[0].clone(), &self.max[0]);
            return Ok(cb.and(lower, upper));
        }

        let lower = lexicographic(cb, &columns, &self.min, Bound::Lower)?;
        let upper = lexicographic(cb, &columns, &self.max, Bound::Upper)?;
        Ok(cb.and(lower, upper))
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}

fn conjunction(items: Vec<Predicate>) -> ODataResult<Predicate> {
    Predicate::conjunction(items)
        .ok_or_else(|| odata_core::Error::QueryPreparation("empty key boundary".to_string()))
}

/// Lower: (k0 > v0) OR (k0 = v0 AND k1 > v1) OR ... OR (k0 = v0 AND ... AND kn >= vn)
/// Upper: the same with `<` and `<=`.
fn lexicographic(
    cb: &mut CriteriaBuilder,
    columns: &[odata_criteria::Expression],
    values: &[Value],
    bound: Bound,
) -> ODataResult<Predicate> {
    let last = columns.len() - 1;
    let mut alternatives = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
        let mut prefix = Vec::with_capacity(i + 1);
        for (column, value) in columns.iter().zip(values).take(i) {
            prefix.push(cb.equal(column.clone(), value));
        }
        let column = columns[i].clone();
        let value = &values[i];
        prefix.push(match (bound, i == last) {
            (Bound::Lower, false) => cb.gt(column, value),
            (Bound::Lower, true) => cb.ge(column, value),
            (Bound::Upper, false) => cb.lt(column, value),
            (Bound::Upper, true) => cb.le(column, value),
        });
        alternatives.push(conjunction(prefix)?);
    }
    Predicate::disjunction(alternatives)
        .ok_or_else(|| odata_core::Error::QueryPreparation("empty key boundary".to_string()))
}
