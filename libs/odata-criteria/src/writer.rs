use odata_core::ast::Value;

use crate::error::CriteriaResult;
use crate::parameter::{Parameter, ParameterBuffer};
use crate::processor::DatabaseProcessor;

/// Anything that renders itself into a statement.
pub trait SqlConvertible {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()>;
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as an inline SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.normalized().to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Output buffer of one statement render.
pub struct SqlWriter<'a> {
    sql: String,
    parameters: &'a mut ParameterBuffer,
    processor: &'a dyn DatabaseProcessor,
}

impl<'a> SqlWriter<'a> {
    pub fn new(parameters: &'a mut ParameterBuffer, processor: &'a dyn DatabaseProcessor) -> Self {
        Self {
            sql: String::new(),
            parameters,
            processor,
        }
    }

    pub fn push(&mut self, s: &str) -> &mut Self {
        self.sql.push_str(s);
        self
    }

    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = quote_identifier(name);
        self.push(&quoted)
    }

    /// `alias."column"`
    pub fn push_column(&mut self, table_alias: &str, column: &str) -> &mut Self {
        self.sql.push_str(table_alias);
        self.sql.push('.');
        self.push_identifier(column)
    }

    /// `"schema"."table"` or `"table"`
    pub fn push_table(&mut self, schema: Option<&str>, table: &str) -> &mut Self {
        if let Some(schema) = schema {
            self.push_identifier(schema);
            self.sql.push('.');
        }
        self.push_identifier(table)
    }

    pub fn push_parameter(&mut self, parameter: &Parameter) -> &mut Self {
        let marker = self.processor.parameter_marker(parameter.position());
        self.push(&marker)
    }

    /// Register a bind value discovered while rendering and write its marker.
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        let parameter = self.parameters.add_value(value);
        self.push_parameter(&parameter)
    }

    pub fn render(&mut self, item: &dyn SqlConvertible) -> CriteriaResult<&mut Self> {
        item.as_sql(self)?;
        Ok(self)
    }

    /// Render `items` separated by `separator`.
    pub fn render_list<T: SqlConvertible>(
        &mut self,
        items: &[T],
        separator: &str,
    ) -> CriteriaResult<&mut Self> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            item.as_sql(self)?;
        }
        Ok(self)
    }

    /// Render into a detached string; bind values still land in the shared
    /// buffer so positions stay consistent.
    pub fn render_to_string(&mut self, item: &dyn SqlConvertible) -> CriteriaResult<String> {
        let saved = std::mem::take(&mut self.sql);
        let result = item.as_sql(self);
        let rendered = std::mem::replace(&mut self.sql, saved);
        result.map(|_| rendered)
    }

    pub fn processor(&self) -> &dyn DatabaseProcessor {
        self.processor
    }

    pub fn finish(self) -> String {
        self.sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{DefaultProcessor, PostgresProcessor};

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("ID"), "\"ID\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn literals() {
        assert_eq!(literal(&Value::from("O'Neil")), "'O''Neil'");
        assert_eq!(literal(&Value::from(3)), "3");
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::Bool(true)), "TRUE");
    }

    #[test]
    fn table_and_column() {
        let mut params = ParameterBuffer::new();
        let mut w = SqlWriter::new(&mut params, &DefaultProcessor);
        w.push_table(Some("OLINGO"), "BusinessPartner")
            .push(" E0 ")
            .push_column("E0", "ID");
        assert_eq!(w.finish(), "\"OLINGO\".\"BusinessPartner\" E0 E0.\"ID\"");
    }

    #[test]
    fn bind_uses_processor_marker() {
        let mut params = ParameterBuffer::new();
        params.add_value(1);
        let mut w = SqlWriter::new(&mut params, &PostgresProcessor);
        w.bind("x");
        assert_eq!(w.finish(), "$2");
        assert_eq!(params.len(), 2);
    }
}
