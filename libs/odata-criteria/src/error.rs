use thiserror::Error;

/// Errors raised while building or rendering a criteria query.
///
/// `IllegalArgument`, `IllegalState` and `NotImplemented` are contract
/// violations of the builder API; `Model` reports metadata that does not
/// describe what the query asks for.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CriteriaError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("model error: {0}")]
    Model(String),
}

pub type CriteriaResult<T> = Result<T, CriteriaError>;

impl CriteriaError {
    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        CriteriaError::IllegalArgument(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        CriteriaError::IllegalState(msg.into())
    }

    pub(crate) fn model(msg: impl Into<String>) -> Self {
        CriteriaError::Model(msg.into())
    }
}

impl From<CriteriaError> for odata_core::Error {
    fn from(e: CriteriaError) -> Self {
        match e {
            CriteriaError::Model(msg) => odata_core::Error::Model(msg),
            other => odata_core::Error::QueryPreparation(other.to_string()),
        }
    }
}
