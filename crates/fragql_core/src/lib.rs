//! Core types for fragql.
//!
//! This crate provides the vocabulary shared by the schema-fragment and
//! runtime crates:
//! - `error`: field-level GraphQL errors
//! - `path`: immutable response paths
//! - `context`: request-scoped shared context
//! - `resolver`: resolver traits and the tagged resolver registry
//! - `definitions`: lightweight type descriptors

pub mod context;
pub mod definitions;
pub mod error;
pub mod path;
pub mod resolver;

pub use context::Context;
pub use definitions::{
    named_type, FieldDescriptor, InputValueDescriptor, InterfaceDescriptor, ObjectDescriptor,
    OperationTypes, SchemaDefinitions, TypeDescriptor, BUILTIN_SCALARS,
};
pub use error::GraphQLError;
pub use path::{Path, PathSegment};
pub use resolver::{
    AsyncFnResolver, EnumResolver, FieldResolver, FnResolver, FnSubscriber, InputObjectResolver,
    InterfaceResolver, ObjectResolver, ResolveFn, ResolveInfo, ResolverArgs, ResolverFuture,
    ResolverResult, Resolvers, ScalarResolver, SourceEventStream, SubscribeFn, TypeResolver,
    UnionResolver,
};
