use odata_core::ast::Value;

/// Placeholder bound to a 1-based position in the statement's parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    position: usize,
    value: Value,
}

impl Parameter {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Ordered bind values of one statement.
///
/// A value gets its position when it is first added; positions are never
/// renumbered, so the rendered `?N` markers and the bind list always agree.
#[derive(Debug, Clone, Default)]
pub struct ParameterBuffer {
    values: Vec<Value>,
}

impl ParameterBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, value: impl Into<Value>) -> Parameter {
        let value = value.into();
        self.values.push(value.clone());
        Parameter {
            position: self.values.len(),
            value,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bind values in position order (index 0 is `?1`).
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}
