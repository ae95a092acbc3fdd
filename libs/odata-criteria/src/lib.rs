//! SQL criteria builder over entity metadata.
//!
//! A [`CriteriaBuilder`] is the context of one statement. Queries,
//! subqueries, predicates and expressions created through it share its
//! table aliases and bind parameters; [`CriteriaQuery::to_statement`]
//! renders the result with the builder's [`DatabaseProcessor`].

pub mod alias;
pub mod builder;
pub mod error;
pub mod expression;
pub mod from;
pub mod metadata;
pub mod parameter;
pub mod predicate;
pub mod processor;
pub mod query;
pub mod tuple;
pub mod writer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use alias::AliasBuilder;
pub use builder::{CriteriaBuilder, Operand};
pub use error::{CriteriaError, CriteriaResult};
pub use expression::{ArithmeticOp, Expression, Order, PathExpr, SqlAggregation};
pub use from::{FromRef, JoinType};
pub use metadata::{
    AssociationPath, Attribute, AttributePath, AttributeType, CollectionAttribute,
    CollectionElement, Discriminator, EntityType, FieldKind, JoinColumn, JoinTable, Protection,
    ServiceDocument, ServiceDocumentBuilder, StructuredType, PATH_SEPARATOR,
};
pub use parameter::{Parameter, ParameterBuffer};
pub use predicate::{BooleanOperator, ComparisonOperator, InPredicate, NullCheck, Predicate};
pub use processor::{
    create_processor, DatabaseProcessor, DefaultProcessor, HsqldbProcessor, PostgresProcessor,
    SqlFunction, SqliteProcessor,
};
pub use query::{CriteriaQuery, SelectItem, Statement};
pub use tuple::{FromValue, Tuple, TupleElement};
