use async_trait::async_trait;
use odata_core::ODataResult;
use odata_criteria::{Statement, Tuple};

/// Runs rendered statements. Parameters must be bound by position; the
/// returned tuples follow `statement.elements`.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, statement: &Statement) -> ODataResult<Vec<Tuple>>;
}
