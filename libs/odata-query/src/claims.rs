//! Row level protection. Claims are registered per claim name; every
//! protected attribute of a queried entity is restricted to the values its
//! claim grants.

use std::collections::HashMap;

use odata_core::ast::Value;
use odata_core::{Error, ODataResult};
use odata_criteria::{CriteriaBuilder, FromRef, Predicate};

/// One granted value or range. `max` turns the pair into a range.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimsPair {
    pub min: Value,
    pub max: Option<Value>,
}

impl ClaimsPair {
    pub fn value(v: impl Into<Value>) -> Self {
        Self {
            min: v.into(),
            max: None,
        }
    }

    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Self {
            min: min.into(),
            max: Some(max.into()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClaimsProvider {
    claims: HashMap<String, Vec<ClaimsPair>>,
    user: Option<String>,
}

impl ClaimsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn add(&mut self, claim: impl Into<String>, pair: ClaimsPair) -> &mut Self {
        self.claims.entry(claim.into()).or_default().push(pair);
        self
    }

    /// Pairs granted for `claim`; empty when nothing was granted.
    pub fn get(&self, claim: &str) -> &[ClaimsPair] {
        self.claims.get(claim).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

fn has_wildcard(v: &Value) -> bool {
    matches!(v, Value::String(s) if s.contains('*') || s.contains('%'))
}

fn pair_predicate(
    cb: &mut CriteriaBuilder,
    from: &FromRef,
    attribute: &str,
    wildcards: bool,
    pair: &ClaimsPair,
) -> ODataResult<Predicate> {
    let column = from.get(attribute)?;
    Ok(match (&pair.max, &pair.min) {
        (Some(max), min) => cb.between(column, min, max),
        (None, Value::String(s)) if wildcards && has_wildcard(&pair.min) => {
            cb.like(column, s.replace('*', "%"))
        }
        (None, min) => cb.equal(column, min),
    })
}

/// AND over the protected attributes of `from`, each an OR over its
/// granted pairs. `None` when the entity has no protected attribute.
pub fn claims_predicate(
    cb: &mut CriteriaBuilder,
    from: &FromRef,
    claims: &ClaimsProvider,
) -> ODataResult<Option<Predicate>> {
    let mut restrictions = Vec::new();
    for path in from.entity().protected_paths() {
        let Some(protection) = &path.protection else {
            continue;
        };
        let pairs = claims.get(&protection.claim);
        if pairs.is_empty() {
            tracing::debug!(
                attribute = %path.alias,
                claim = %protection.claim,
                user = claims.user().unwrap_or("-"),
                "protected attribute without claim"
            );
            return Err(Error::MissingClaim(format!(
                "{} ({})",
                path.alias, protection.claim
            )));
        }
        let mut alternatives = Vec::with_capacity(pairs.len());
        for pair in pairs {
            alternatives.push(pair_predicate(
                cb,
                from,
                &path.alias,
                protection.wildcards,
                pair,
            )?);
        }
        restrictions.extend(Predicate::disjunction(alternatives));
    }
    Ok(Predicate::conjunction(restrictions))
}
