#![allow(dead_code)]
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use odata_core::ast::Value;
use odata_core::ODataResult;
use odata_criteria::{testing, SqliteProcessor, Statement, Tuple};
use odata_query::{QueryConfig, QueryExecutor, RequestProcessor};

pub type Row = Vec<(&'static str, Value)>;

/// Answers statements from canned rows. The first rule whose fragments all
/// occur in the SQL wins; columns missing from a canned row are NULL.
#[derive(Default)]
pub struct MockExecutor {
    rules: Vec<(Vec<&'static str>, Vec<Row>)>,
    seen: Mutex<Vec<Statement>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, fragments: &[&'static str], rows: Vec<Row>) -> Self {
        self.rules.push((fragments.to_vec(), rows));
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.seen.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn fetch(&self, statement: &Statement) -> ODataResult<Vec<Tuple>> {
        self.seen.lock().unwrap().push(statement.clone());
        let rows = self
            .rules
            .iter()
            .find(|(fragments, _)| fragments.iter().all(|f| statement.sql.contains(f)))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        rows.into_iter()
            .map(|row| {
                let values = statement
                    .elements
                    .iter()
                    .map(|e| {
                        e.alias
                            .as_deref()
                            .and_then(|alias| row.iter().find(|(name, _)| *name == alias))
                            .map(|(_, v)| v.clone())
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Ok(Tuple::new(statement.elements.clone(), values)?)
            })
            .collect()
    }
}

pub fn processor(executor: Arc<MockExecutor>, config: QueryConfig) -> RequestProcessor {
    RequestProcessor::new(
        testing::service_document().unwrap(),
        Arc::new(SqliteProcessor),
        executor,
        config,
    )
}

pub fn row(columns: &[(&'static str, &str)]) -> Row {
    columns.iter().map(|(k, v)| (*k, Value::from(*v))).collect()
}
