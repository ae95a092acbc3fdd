use http::StatusCode;
use thiserror::Error;

/// Unified error of the OData query layer. Every variant knows the HTTP
/// status the protocol layer answers with.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid $filter: {0}")]
    InvalidFilter(String),

    #[error("unsupported $orderby field: {0}")]
    InvalidOrderByField(String),

    #[error("unsupported $select item: {0}")]
    InvalidSelect(String),

    #[error("unknown navigation property: {0}")]
    InvalidExpand(String),

    #[error("invalid key predicate: {0}")]
    InvalidKey(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("missing claim for protected attribute: {0}")]
    MissingClaim(String),

    #[error("metadata error: {0}")]
    Model(String),

    #[error("query preparation failed: {0}")]
    QueryPreparation(String),

    #[error("expand result already registered for: {0}")]
    DuplicateExpandResult(String),

    #[error("database error: {0}")]
    Db(String),
}

pub type ODataResult<T> = Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidFilter(_)
            | Error::InvalidOrderByField(_)
            | Error::InvalidSelect(_)
            | Error::InvalidExpand(_)
            | Error::InvalidKey(_) => StatusCode::BAD_REQUEST,
            Error::UnknownResource(_) => StatusCode::NOT_FOUND,
            Error::MissingClaim(_) => StatusCode::FORBIDDEN,
            Error::Model(_)
            | Error::QueryPreparation(_)
            | Error::DuplicateExpandResult(_)
            | Error::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}
