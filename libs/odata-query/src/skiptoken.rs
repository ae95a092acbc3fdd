use serde::Serialize;

/// One step of the expand path a skip token is requested for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageExpandInfo {
    pub navigation_property_name: String,
    /// Parent key the expanded collection belongs to.
    pub key_path: String,
}

impl PageExpandInfo {
    pub fn new(navigation_property_name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            navigation_property_name: navigation_property_name.into(),
            key_path: key_path.into(),
        }
    }
}

/// Supplies continuation tokens. The engine attaches them without looking
/// inside.
pub trait SkipTokenProvider: Send + Sync {
    /// `expand_path` is empty for the top level collection.
    fn get(&self, expand_path: &[PageExpandInfo]) -> Option<serde_json::Value>;
}

/// Strings are taken as they are, anything else is serialized.
pub fn token_to_string(token: serde_json::Value) -> String {
    match token {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
