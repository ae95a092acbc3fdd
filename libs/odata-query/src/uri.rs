//! Resource path of a request (`BusinessPartners('1')/Roles`) and its
//! resolution into the hop chain the queries join along.

use std::sync::Arc;

use odata_core::ast::Value;
use odata_core::{Error, FilterOption, ODataResult};
use odata_criteria::{EntityType, ServiceDocument};

use crate::filter::coerce;

/// `Property=value` inside a key segment; the property may be omitted for
/// single-key entities (`BusinessPartners('1')`).
#[derive(Clone, Debug, PartialEq)]
pub struct KeyPredicate {
    pub property: Option<String>,
    pub value: Value,
}

impl KeyPredicate {
    pub fn new(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            property: Some(property.into()),
            value: value.into(),
        }
    }

    pub fn unnamed(value: impl Into<Value>) -> Self {
        Self {
            property: None,
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UriSegment {
    /// Entity set for the first segment, navigation property otherwise.
    pub name: String,
    pub keys: Vec<KeyPredicate>,
}

impl UriSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: KeyPredicate) -> Self {
        self.keys.push(key);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UriPath {
    pub segments: Vec<UriSegment>,
}

impl UriPath {
    pub fn entity_set(name: impl Into<String>) -> Self {
        Self {
            segments: vec![UriSegment::new(name)],
        }
    }

    pub fn with_key(mut self, key: KeyPredicate) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.keys.push(key);
        }
        self
    }

    pub fn navigate(mut self, navigation: impl Into<String>) -> Self {
        self.segments.push(UriSegment::new(navigation));
        self
    }
}

/// One table of the join chain of a query level.
#[derive(Clone, Debug)]
pub(crate) struct Hop {
    pub(crate) entity: Arc<EntityType>,
    /// Navigation property leading here from the previous hop.
    pub(crate) navigation: Option<String>,
    /// Key restrictions as (path alias, coerced value).
    pub(crate) keys: Vec<(String, Value)>,
    pub(crate) filter: Option<FilterOption>,
}

impl Hop {
    pub(crate) fn navigate(
        entity: Arc<EntityType>,
        navigation: &str,
        filter: Option<FilterOption>,
    ) -> Self {
        Self {
            entity,
            navigation: Some(navigation.to_string()),
            keys: Vec::new(),
            filter,
        }
    }
}

fn resolve_keys(entity: &EntityType, keys: &[KeyPredicate]) -> ODataResult<Vec<(String, Value)>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let key_paths = entity.key_paths()?;
    if keys.len() != key_paths.len() {
        return Err(Error::InvalidKey(format!(
            "'{}' has {} key properties, {} given",
            entity.name,
            key_paths.len(),
            keys.len()
        )));
    }
    let mut resolved = Vec::with_capacity(keys.len());
    for key in keys {
        let path = match &key.property {
            Some(name) => key_paths
                .iter()
                .find(|p| p.matches(name))
                .ok_or_else(|| {
                    Error::InvalidKey(format!("'{name}' is not a key property of '{}'", entity.name))
                })?,
            None if key_paths.len() == 1 => &key_paths[0],
            None => {
                return Err(Error::InvalidKey(format!(
                    "compound key of '{}' needs named key properties",
                    entity.name
                )))
            }
        };
        if resolved.iter().any(|(alias, _)| *alias == path.alias) {
            return Err(Error::InvalidKey(format!("'{}' given twice", path.alias)));
        }
        let value = coerce(path.kind, &key.value)
            .map_err(|e| Error::InvalidKey(format!("{}: {e}", path.alias)))?;
        resolved.push((path.alias.clone(), value));
    }
    Ok(resolved)
}

/// Resolve the resource path into hops; the last hop is the addressed
/// collection.
pub(crate) fn resolve(sd: &ServiceDocument, path: &UriPath) -> ODataResult<Vec<Hop>> {
    let (first, rest) = path
        .segments
        .split_first()
        .ok_or_else(|| Error::UnknownResource("empty resource path".to_string()))?;
    let entity = sd
        .entity_set(&first.name)
        .map_err(|_| Error::UnknownResource(first.name.clone()))?;
    let mut current = entity.clone();
    let mut hops = vec![Hop {
        keys: resolve_keys(&entity, &first.keys)?,
        entity,
        navigation: None,
        filter: None,
    }];
    for segment in rest {
        let association = current
            .association(&segment.name)
            .map_err(|_| Error::UnknownResource(segment.name.clone()))?;
        let target = sd.target_of(association)?;
        let mut hop = Hop::navigate(target.clone(), &segment.name, None);
        hop.keys = resolve_keys(&target, &segment.keys)?;
        hops.push(hop);
        current = target;
    }
    Ok(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_criteria::testing;

    #[test]
    fn entity_set_with_key_and_navigation() {
        let sd = testing::service_document().unwrap();
        let path = UriPath::entity_set("Organizations")
            .with_key(KeyPredicate::unnamed("3"))
            .navigate("Roles");
        let hops = resolve(&sd, &path).unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].entity.name, "Organization");
        assert_eq!(hops[0].keys, vec![("ID".to_string(), Value::from("3"))]);
        assert_eq!(hops[1].entity.name, "BusinessPartnerRole");
        assert_eq!(hops[1].navigation.as_deref(), Some("Roles"));
    }

    #[test]
    fn unknown_set_or_navigation_is_not_found() {
        let sd = testing::service_document().unwrap();
        let err = resolve(&sd, &UriPath::entity_set("Nope")).unwrap_err();
        assert_eq!(err.status().as_u16(), 404);
        let err = resolve(&sd, &UriPath::entity_set("Organizations").navigate("Nope")).unwrap_err();
        assert!(matches!(err, Error::UnknownResource(_)));
    }

    #[test]
    fn compound_keys_need_all_named_properties() {
        let sd = testing::service_document().unwrap();
        let partial = UriPath::entity_set("AdministrativeDivisions")
            .with_key(KeyPredicate::new("CodePublisher", "Eurostat"));
        assert!(matches!(
            resolve(&sd, &partial).unwrap_err(),
            Error::InvalidKey(_)
        ));

        let unnamed = UriPath::entity_set("BusinessPartnerRoles")
            .with_key(KeyPredicate::unnamed("1"))
            .with_key(KeyPredicate::unnamed("A"));
        assert!(matches!(
            resolve(&sd, &unnamed).unwrap_err(),
            Error::InvalidKey(_)
        ));

        let full = UriPath::entity_set("BusinessPartnerRoles")
            .with_key(KeyPredicate::new("BusinessPartnerID", "1"))
            .with_key(KeyPredicate::new("RoleCategory", "A"));
        let hops = resolve(&sd, &full).unwrap();
        assert_eq!(hops[0].keys.len(), 2);
    }

    #[test]
    fn key_values_are_coerced() {
        let sd = testing::service_document().unwrap();
        let path = UriPath::entity_set("BusinessPartners").with_key(KeyPredicate::unnamed(3));
        let err = resolve(&sd, &path).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
        assert!(err.is_client_error());
    }
}
