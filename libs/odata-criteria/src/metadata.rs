//! Read-only descriptors of entity types, attributes and associations.
//!
//! Built once at startup through [`ServiceDocumentBuilder`] and shared as
//! `Arc<ServiceDocument>`; nothing in the query layer mutates them.

use std::sync::Arc;

use indexmap::IndexMap;
use odata_core::ast::Value;
use serde::{Deserialize, Serialize};

use crate::error::{CriteriaError, CriteriaResult};

/// Separator of complex property paths (`Address/CityName`).
pub const PATH_SEPARATOR: &str = "/";

/// Column value kind; drives literal coercion and row decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    I64,
    F64,
    Bool,
    Uuid,
    DateTimeUtc,
    Date,
    Time,
    Decimal,
}

/// Row-level protection: the attribute is filtered by the claims
/// registered under `claim`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Protection {
    pub claim: String,
    pub wildcards: bool,
}

#[derive(Clone, Debug)]
pub enum AttributeType {
    Simple { column: String, kind: FieldKind },
    Complex(Arc<StructuredType>),
}

#[derive(Clone, Debug)]
pub struct Attribute {
    /// Name used by the criteria API (`iD`).
    pub name: String,
    /// Name exposed to OData clients (`ID`).
    pub external_name: String,
    pub ty: AttributeType,
    pub ignore: bool,
    pub protection: Option<Protection>,
}

fn default_external_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Attribute {
    pub fn simple(name: impl Into<String>, column: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            external_name: default_external_name(&name),
            name,
            ty: AttributeType::Simple {
                column: column.into(),
                kind,
            },
            ignore: false,
            protection: None,
        }
    }

    pub fn complex(name: impl Into<String>, structured: Arc<StructuredType>) -> Self {
        let name = name.into();
        Self {
            external_name: default_external_name(&name),
            name,
            ty: AttributeType::Complex(structured),
            ignore: false,
            protection: None,
        }
    }

    pub fn with_external_name(mut self, external_name: impl Into<String>) -> Self {
        self.external_name = external_name.into();
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn protected_by(mut self, claim: impl Into<String>, wildcards: bool) -> Self {
        self.protection = Some(Protection {
            claim: claim.into(),
            wildcards,
        });
        self
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.ty, AttributeType::Complex(_))
    }
}

/// A leaf of the flattened attribute tree: one physical column.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributePath {
    /// External path, e.g. `Address/CityName`.
    pub alias: String,
    /// Internal path, e.g. `address/cityName`.
    pub internal: String,
    pub column: String,
    pub kind: FieldKind,
    pub ignore: bool,
    pub protection: Option<Protection>,
}

impl AttributePath {
    pub fn matches(&self, name: &str) -> bool {
        self.alias == name || self.internal == name
    }

    /// True when the path lives inside a complex attribute.
    pub fn is_nested(&self) -> bool {
        self.alias.contains(PATH_SEPARATOR)
    }
}

fn flatten_into(
    attributes: &[Attribute],
    alias_prefix: Option<&str>,
    internal_prefix: Option<&str>,
    parent_ignored: bool,
    out: &mut Vec<AttributePath>,
) {
    for attribute in attributes {
        let alias = match alias_prefix {
            Some(p) => format!("{p}{PATH_SEPARATOR}{}", attribute.external_name),
            None => attribute.external_name.clone(),
        };
        let internal = match internal_prefix {
            Some(p) => format!("{p}{PATH_SEPARATOR}{}", attribute.name),
            None => attribute.name.clone(),
        };
        let ignore = parent_ignored || attribute.ignore;
        match &attribute.ty {
            AttributeType::Simple { column, kind } => out.push(AttributePath {
                alias,
                internal,
                column: column.clone(),
                kind: *kind,
                ignore,
                protection: attribute.protection.clone(),
            }),
            AttributeType::Complex(st) => {
                flatten_into(&st.attributes, Some(&alias), Some(&internal), ignore, out)
            }
        }
    }
}

/// Complex (embeddable) type.
#[derive(Clone, Debug)]
pub struct StructuredType {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl StructuredType {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    pub fn path_list(&self) -> Vec<AttributePath> {
        let mut out = Vec::new();
        flatten_into(&self.attributes, None, None, false, &mut out);
        out
    }
}

#[derive(Clone, Debug)]
pub struct Discriminator {
    pub column: String,
    pub value: Value,
}

/// One column pair of an on-condition. `left` is a path alias of the
/// source side, `right` a path alias of the target side (or the raw column
/// of a join table).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinColumn {
    pub left: String,
    pub right: String,
}

impl JoinColumn {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Navigation between two entity types over foreign-key columns.
#[derive(Clone, Debug)]
pub struct AssociationPath {
    pub alias: String,
    pub source_type: String,
    pub target_type: String,
    pub join_columns: Vec<JoinColumn>,
    pub collection: bool,
}

impl AssociationPath {
    pub fn new(
        alias: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        join_columns: Vec<JoinColumn>,
    ) -> Self {
        Self {
            alias: alias.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            join_columns,
            collection: true,
        }
    }

    pub fn single_valued(mut self) -> Self {
        self.collection = false;
        self
    }

    /// Source-side path aliases in declared order.
    pub fn left_columns(&self) -> impl Iterator<Item = &str> {
        self.join_columns.iter().map(|c| c.left.as_str())
    }
}

/// Physical table backing a collection-valued attribute.
#[derive(Clone, Debug)]
pub struct JoinTable {
    pub schema: Option<String>,
    /// Physical name; a missing name surfaces when the join is rendered.
    pub table: Option<String>,
    /// `left`: owner path alias, `right`: join-table column.
    pub join_columns: Vec<JoinColumn>,
    /// Entity type stored in the join table, if any.
    pub entity_type: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CollectionElement {
    Simple { column: String, kind: FieldKind },
    Complex(Arc<StructuredType>),
}

#[derive(Clone, Debug)]
pub struct CollectionAttribute {
    pub name: String,
    pub external_name: String,
    pub element: CollectionElement,
    pub join_table: JoinTable,
}

impl CollectionAttribute {
    pub fn new(name: impl Into<String>, element: CollectionElement, join_table: JoinTable) -> Self {
        let name = name.into();
        Self {
            external_name: default_external_name(&name),
            name,
            element,
            join_table,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.element, CollectionElement::Complex(_))
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.external_name == name
    }

    /// Paths of one collection element; ignored paths are dropped.
    pub fn path_list(&self) -> Vec<AttributePath> {
        match &self.element {
            CollectionElement::Simple { column, kind } => vec![AttributePath {
                alias: self.external_name.clone(),
                internal: self.name.clone(),
                column: column.clone(),
                kind: *kind,
                ignore: false,
                protection: None,
            }],
            CollectionElement::Complex(st) => {
                st.path_list().into_iter().filter(|p| !p.ignore).collect()
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct EntityType {
    pub name: String,
    pub entity_set: String,
    pub schema: Option<String>,
    pub table: String,
    pub attributes: Vec<Attribute>,
    /// Internal attribute names in key order.
    pub key: Vec<String>,
    pub discriminator: Option<Discriminator>,
    pub associations: Vec<AssociationPath>,
    pub collections: Vec<CollectionAttribute>,
}

impl EntityType {
    pub fn new(
        name: impl Into<String>,
        entity_set: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_set: entity_set.into(),
            schema: None,
            table: table.into(),
            attributes: Vec::new(),
            key: Vec::new(),
            discriminator: None,
            associations: Vec::new(),
            collections: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_key<I, S>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = key.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_discriminator(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.discriminator = Some(Discriminator {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_association(mut self, association: AssociationPath) -> Self {
        self.associations.push(association);
        self
    }

    pub fn with_collection(mut self, collection: CollectionAttribute) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn path_list(&self) -> Vec<AttributePath> {
        let mut out = Vec::new();
        flatten_into(&self.attributes, None, None, false, &mut out);
        out
    }

    /// Resolve a leaf path by external alias or internal name.
    pub fn path(&self, name: &str) -> CriteriaResult<AttributePath> {
        self.path_list()
            .into_iter()
            .find(|p| p.matches(name))
            .ok_or_else(|| {
                CriteriaError::model(format!("unknown attribute '{name}' of '{}'", self.name))
            })
    }

    pub fn key_paths(&self) -> CriteriaResult<Vec<AttributePath>> {
        self.key.iter().map(|k| self.path(k)).collect()
    }

    pub fn association(&self, alias: &str) -> CriteriaResult<&AssociationPath> {
        self.associations
            .iter()
            .find(|a| a.alias == alias)
            .ok_or_else(|| {
                CriteriaError::model(format!(
                    "unknown navigation property '{alias}' of '{}'",
                    self.name
                ))
            })
    }

    pub fn collection_attribute(&self, name: &str) -> Option<&CollectionAttribute> {
        self.collections.iter().find(|c| c.matches(name))
    }

    pub fn has_collection_attributes(&self) -> bool {
        !self.collections.is_empty()
    }

    pub fn protected_paths(&self) -> Vec<AttributePath> {
        self.path_list()
            .into_iter()
            .filter(|p| p.protection.is_some())
            .collect()
    }
}

/// All entity types of one service.
#[derive(Debug, Default)]
pub struct ServiceDocument {
    types: IndexMap<String, Arc<EntityType>>,
}

impl ServiceDocument {
    pub fn builder() -> ServiceDocumentBuilder {
        ServiceDocumentBuilder::default()
    }

    pub fn entity_type(&self, name: &str) -> CriteriaResult<Arc<EntityType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| CriteriaError::model(format!("unknown entity type '{name}'")))
    }

    pub fn entity_set(&self, set: &str) -> CriteriaResult<Arc<EntityType>> {
        self.types
            .values()
            .find(|et| et.entity_set == set)
            .cloned()
            .ok_or_else(|| CriteriaError::model(format!("unknown entity set '{set}'")))
    }

    pub fn target_of(&self, association: &AssociationPath) -> CriteriaResult<Arc<EntityType>> {
        self.entity_type(&association.target_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.types.values()
    }
}

#[derive(Debug, Default)]
pub struct ServiceDocumentBuilder {
    types: Vec<EntityType>,
}

impl ServiceDocumentBuilder {
    pub fn entity_type(mut self, et: EntityType) -> Self {
        self.types.push(et);
        self
    }

    /// Validate cross references and freeze the document.
    pub fn build(self) -> CriteriaResult<Arc<ServiceDocument>> {
        let mut types = IndexMap::new();
        for et in self.types {
            if types.contains_key(&et.name) {
                return Err(CriteriaError::model(format!(
                    "entity type '{}' defined twice",
                    et.name
                )));
            }
            types.insert(et.name.clone(), Arc::new(et));
        }
        let sd = ServiceDocument { types };
        for et in sd.types.values() {
            if et.key.is_empty() {
                return Err(CriteriaError::model(format!(
                    "entity type '{}' has no key",
                    et.name
                )));
            }
            et.key_paths()?;
            for association in &et.associations {
                let target = sd.target_of(association)?;
                for column in &association.join_columns {
                    et.path(&column.left)?;
                    target.path(&column.right)?;
                }
            }
            for collection in &et.collections {
                for column in &collection.join_table.join_columns {
                    et.path(&column.left)?;
                }
                if let Some(name) = &collection.join_table.entity_type {
                    sd.entity_type(name)?;
                }
            }
        }
        Ok(Arc::new(sd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Arc<StructuredType> {
        Arc::new(StructuredType::new(
            "PostalAddressData",
            vec![
                Attribute::simple("cityName", "Address.CityName", FieldKind::String),
                Attribute::simple("country", "Address.Country", FieldKind::String)
                    .with_external_name("Country"),
                Attribute::simple("internal", "Address.Internal", FieldKind::String).ignored(),
            ],
        ))
    }

    #[test]
    fn external_names_default_to_capitalized_internal_names() {
        let a = Attribute::simple("aBCClass", "ABCClass", FieldKind::String);
        assert_eq!(a.external_name, "ABCClass");
        let a = Attribute::simple("iD", "ID", FieldKind::String);
        assert_eq!(a.external_name, "ID");
    }

    #[test]
    fn complex_attributes_flatten_into_slash_paths() {
        let et = EntityType::new("BusinessPartner", "BusinessPartners", "BusinessPartner")
            .with_attribute(Attribute::simple("iD", "ID", FieldKind::String))
            .with_attribute(Attribute::complex("address", address()))
            .with_key(["iD"]);
        let paths = et.path_list();
        let aliases: Vec<_> = paths.iter().map(|p| p.alias.as_str()).collect();
        assert_eq!(
            aliases,
            vec!["ID", "Address/CityName", "Address/Country", "Address/Internal"]
        );
        assert!(paths[3].ignore);
        assert!(paths[1].is_nested());
        assert_eq!(et.path("address/cityName").unwrap().column, "Address.CityName");
    }

    #[test]
    fn build_rejects_dangling_association() {
        let et = EntityType::new("A", "As", "A")
            .with_attribute(Attribute::simple("iD", "ID", FieldKind::String))
            .with_key(["iD"])
            .with_association(AssociationPath::new(
                "Bs",
                "A",
                "B",
                vec![JoinColumn::new("ID", "AID")],
            ));
        let err = ServiceDocument::builder().entity_type(et).build().unwrap_err();
        assert!(matches!(err, CriteriaError::Model(_)));
    }

    #[test]
    fn build_rejects_missing_key() {
        let et = EntityType::new("A", "As", "A")
            .with_attribute(Attribute::simple("iD", "ID", FieldKind::String));
        assert!(ServiceDocument::builder().entity_type(et).build().is_err());
    }

    #[test]
    fn lookup_by_set_and_name() {
        let sd = ServiceDocument::builder()
            .entity_type(
                EntityType::new("A", "As", "A")
                    .with_attribute(Attribute::simple("iD", "ID", FieldKind::String))
                    .with_key(["iD"]),
            )
            .build()
            .unwrap();
        assert_eq!(sd.entity_set("As").unwrap().name, "A");
        assert!(sd.entity_type("B").is_err());
    }
}
