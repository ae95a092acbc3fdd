//! Expand and navigation query engine.
//!
//! [`RequestProcessor::read`] resolves a resource path into a chain of
//! joined tables, runs one query for the addressed collection and one per
//! expanded navigation or collection property, and assembles the grouped
//! rows into nested [`odata_core::EntityCollection`]s.
//!
//! Queries are rendered with `odata-criteria` and run through a
//! [`QueryExecutor`]; the engine itself never touches a connection.

pub mod boundary;
pub mod claims;
pub mod config;
pub mod executor;
pub mod filter;
pub mod processor;
pub mod result;
pub mod skiptoken;
pub mod uri;

pub use boundary::KeyBoundary;
pub use claims::{claims_predicate, ClaimsPair, ClaimsProvider};
pub use config::QueryConfig;
pub use executor::QueryExecutor;
pub use filter::{coerce, compile_filter, expr_to_predicate, FilterError, FilterResult};
pub use processor::{ReadResult, RequestContext, RequestProcessor, WhereEnhancement};
pub use result::{
    group_rows, key_string, ChildResult, CollectionQueryResult, ConversionState, ConvertedEntity,
    ExpandQueryResult, KEY_SEPARATOR,
};
pub use skiptoken::{token_to_string, PageExpandInfo, SkipTokenProvider};
pub use uri::{KeyPredicate, UriPath, UriSegment};
