use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::Value;

/// Result key of the top level collection of a request.
pub const ROOT_RESULT_KEY: &str = "root";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Primitive(Value),
    Complex(IndexMap<String, PropertyValue>),
    Collection(Vec<PropertyValue>),
}

impl From<Value> for PropertyValue {
    fn from(v: Value) -> Self {
        PropertyValue::Primitive(v)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Entity {
    pub properties: IndexMap<String, PropertyValue>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub navigation: IndexMap<String, EntityCollection>,
}

impl Entity {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Primitive value of a (possibly `/`-separated complex) property path.
    pub fn value(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('/');
        let mut current = self.properties.get(segments.next()?)?;
        for segment in segments {
            match current {
                PropertyValue::Complex(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        match current {
            PropertyValue::Primitive(v) => Some(v),
            _ => None,
        }
    }

    pub fn expanded(&self, navigation: &str) -> Option<&EntityCollection> {
        self.navigation.get(navigation)
    }
}

/// One page of entities as handed to the protocol serializer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EntityCollection {
    pub entities: Vec<Entity>,
    #[serde(rename = "@odata.count", skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(rename = "@odata.skiptoken", skip_serializing_if = "Option::is_none")]
    pub skip_token: Option<String>,
}

impl EntityCollection {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
