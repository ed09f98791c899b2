//! Fatal execution errors.
//!
//! Field-level failures never surface here; they are collected into the
//! result's `errors` array. This enum covers the cases where no result can
//! be produced at all: unusable type definitions and subscribe-time
//! failures.

use fragql_core::GraphQLError;
use thiserror::Error;

/// Error returned by the execution and subscription entry points.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The type-definition source failed to parse.
    #[error("invalid type definitions: {0}")]
    InvalidTypeDefs(String),

    /// No operation with the requested name exists in the document.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The document contains no operation.
    #[error("document contains no operation")]
    NoOperation,

    /// Several operations exist but no operation name was given.
    #[error("operation name required for a multi-operation document")]
    AmbiguousOperation,

    /// A subscription entry point was called with a query or mutation.
    #[error("operation is not a subscription")]
    NotSubscription,

    /// A subscription must select exactly one root field.
    #[error("subscription operations must select exactly one root field")]
    InvalidSubscriptionSelection,

    /// The subscription root field has no subscribe resolver.
    #[error("no subscribe resolver for subscription field: {0}")]
    MissingSubscribeResolver(String),

    /// The subscribe resolver failed before producing any event.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(GraphQLError),
}
