//! Resolver traits and the tagged resolver registry.
//!
//! A [`TypeResolver`] carries everything the application supplies for one
//! named type: a field map for object types, a runtime-type discriminator
//! for abstract types, serialization hooks for scalars, or a value map for
//! enums. The kind is fixed at construction, so execution dispatches with
//! an exhaustive match instead of sniffing marker keys.

use crate::context::Context;
use crate::error::GraphQLError;
use crate::path::PathSegment;
use async_graphql_parser::types::{OperationType, Type};
use futures_util::stream::BoxStream;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Arguments passed to a resolver, already variable-resolved and coerced.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: HashMap<String, Value>,
}

impl ResolverArgs {
    /// Creates empty resolver args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from a list of (name, value) pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, GraphQLError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| GraphQLError::new(format!("Missing required argument: {name}")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| GraphQLError::new(format!("Failed to parse argument '{name}': {e}")))
    }

    /// Returns all arguments.
    pub fn all(&self) -> &HashMap<String, Value> {
        &self.args
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Sets an argument.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

/// Per-field context passed to resolver and hook calls.
///
/// Type information is carried as names and annotated [`Type`]s, never as
/// materialized schema objects.
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    /// The field name being resolved.
    pub field_name: String,

    /// The parent type name.
    pub parent_type_name: String,

    /// The annotated return type, when known.
    pub return_type: Option<Type>,

    /// Response path of this field.
    pub path: Vec<PathSegment>,

    /// Kind of the enclosing operation.
    pub operation_kind: OperationType,

    /// Variable values of the request.
    pub variables: Arc<HashMap<String, Value>>,
}

impl ResolveInfo {
    /// Creates new resolve info.
    pub fn new(field_name: impl Into<String>, parent_type_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            parent_type_name: parent_type_name.into(),
            return_type: None,
            path: Vec::new(),
            operation_kind: OperationType::Query,
            variables: Arc::new(HashMap::new()),
        }
    }

    /// Sets the return type.
    pub fn with_return_type(mut self, ty: Type) -> Self {
        self.return_type = Some(ty);
        self
    }

    /// Sets the path.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Sets the operation kind.
    pub fn with_operation_kind(mut self, kind: OperationType) -> Self {
        self.operation_kind = kind;
        self
    }

    /// Sets the variables.
    pub fn with_variables(mut self, variables: Arc<HashMap<String, Value>>) -> Self {
        self.variables = variables;
        self
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Value, GraphQLError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Trait for field resolvers.
pub trait ResolveFn: Send + Sync {
    /// Resolves a field value.
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolveInfo,
    ) -> ResolverFuture<'a>;
}

/// A sync resolver function.
pub type SyncResolverFn =
    Arc<dyn Fn(&Value, &ResolverArgs, &Context, &ResolveInfo) -> ResolverResult + Send + Sync>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
}

impl FnResolver {
    /// Creates a new function resolver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolveInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl ResolveFn for FnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolveInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// An async resolver function type.
pub type AsyncResolverFn =
    Arc<dyn Fn(Value, ResolverArgs, Context, ResolveInfo) -> ResolverFuture<'static> + Send + Sync>;

/// A wrapper for async resolver functions.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
}

impl AsyncFnResolver {
    /// Creates a new async function resolver.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolveInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |parent, args, ctx, info| Box::pin(f(parent, args, ctx, info))),
        }
    }
}

impl ResolveFn for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolveInfo,
    ) -> ResolverFuture<'a> {
        let parent = parent.clone();
        let args = args.clone();
        let ctx = ctx.clone();
        let info = info.clone();
        let func = Arc::clone(&self.func);
        Box::pin(async move { func(parent, args, ctx, info).await })
    }
}

/// The async sequence of source events produced by a subscribe resolver.
pub type SourceEventStream = BoxStream<'static, Value>;

/// Future type for subscribe resolvers.
pub type SubscribeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SourceEventStream, GraphQLError>> + Send + 'a>>;

/// Trait for subscription source resolvers.
pub trait SubscribeFn: Send + Sync {
    /// Produces the source event stream for a subscription field.
    fn subscribe<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolveInfo,
    ) -> SubscribeFuture<'a>;
}

/// A wrapper for subscribe functions producing a stream synchronously.
pub struct FnSubscriber {
    func: Arc<
        dyn Fn(
                &Value,
                &ResolverArgs,
                &Context,
                &ResolveInfo,
            ) -> Result<SourceEventStream, GraphQLError>
            + Send
            + Sync,
    >,
}

impl FnSubscriber {
    /// Creates a new subscriber from a function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolveInfo) -> Result<SourceEventStream, GraphQLError>
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl SubscribeFn for FnSubscriber {
    fn subscribe<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolveInfo,
    ) -> SubscribeFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// A field entry of an object type: a resolve function, a subscribe
/// function, or both.
#[derive(Clone, Default)]
pub struct FieldResolver {
    /// Resolves the field value.
    pub resolve: Option<Arc<dyn ResolveFn>>,
    /// Produces the source event stream (subscription root fields).
    pub subscribe: Option<Arc<dyn SubscribeFn>>,
}

impl FieldResolver {
    /// Wraps a resolver implementation.
    pub fn of<R: ResolveFn + 'static>(resolver: R) -> Self {
        Self {
            resolve: Some(Arc::new(resolver)),
            subscribe: None,
        }
    }

    /// Wraps a sync resolver function.
    pub fn of_fn<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolveInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self::of(FnResolver::new(f))
    }

    /// Wraps an async resolver function.
    pub fn of_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolveInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self::of(AsyncFnResolver::new(f))
    }

    /// Wraps a subscribe-only entry.
    pub fn subscriber<S: SubscribeFn + 'static>(subscriber: S) -> Self {
        Self {
            resolve: None,
            subscribe: Some(Arc::new(subscriber)),
        }
    }

    /// Adds a subscribe function to this entry.
    pub fn with_subscribe<S: SubscribeFn + 'static>(mut self, subscriber: S) -> Self {
        self.subscribe = Some(Arc::new(subscriber));
        self
    }
}

impl Debug for FieldResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldResolver")
            .field("resolve", &self.resolve.is_some())
            .field("subscribe", &self.subscribe.is_some())
            .finish()
    }
}

/// Resolves the concrete runtime type name of an abstract-typed value.
pub type ResolveTypeFn = dyn Fn(&Value, &Context, &ResolveInfo) -> Option<String> + Send + Sync;

/// Serializes a leaf value on the way out.
pub type SerializeFn = dyn Fn(&Value) -> ResolverResult + Send + Sync;

/// Parses an input value on the way in.
pub type ParseValueFn = dyn Fn(Value) -> ResolverResult + Send + Sync;

/// Field map of an object type.
#[derive(Clone, Default)]
pub struct ObjectResolver {
    /// Field resolvers keyed by field name.
    pub fields: IndexMap<String, FieldResolver>,
}

impl ObjectResolver {
    /// Creates an empty object resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field entry.
    pub fn field(mut self, name: impl Into<String>, resolver: FieldResolver) -> Self {
        self.fields.insert(name.into(), resolver);
        self
    }

    /// Gets a field entry.
    pub fn get(&self, name: &str) -> Option<&FieldResolver> {
        self.fields.get(name)
    }
}

/// Interface resolver: discriminator plus the known implementor set.
#[derive(Clone, Default)]
pub struct InterfaceResolver {
    /// Resolves the concrete runtime type of a value.
    pub resolve_type: Option<Arc<ResolveTypeFn>>,
    /// Concrete type names implementing the interface.
    pub implemented_by: Vec<String>,
}

/// Union resolver: discriminator plus the member set.
#[derive(Clone, Default)]
pub struct UnionResolver {
    /// Resolves the concrete runtime type of a value.
    pub resolve_type: Option<Arc<ResolveTypeFn>>,
    /// Concrete member type names.
    pub types: Vec<String>,
}

/// Scalar resolver: optional serialization hooks.
#[derive(Clone, Default)]
pub struct ScalarResolver {
    /// Serializes an internal value for the response.
    pub serialize: Option<Arc<SerializeFn>>,
    /// Parses an input value from variables or literals.
    pub parse_value: Option<Arc<ParseValueFn>>,
}

impl ScalarResolver {
    /// A scalar with no custom hooks; values pass through untouched.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Sets the serialize hook.
    pub fn with_serialize<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> ResolverResult + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(f));
        self
    }

    /// Sets the parse-value hook.
    pub fn with_parse_value<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> ResolverResult + Send + Sync + 'static,
    {
        self.parse_value = Some(Arc::new(f));
        self
    }
}

/// Enum resolver: external name to internal value.
#[derive(Clone, Default)]
pub struct EnumResolver {
    /// Internal values keyed by external enum value name.
    pub values: IndexMap<String, Value>,
}

impl EnumResolver {
    /// Builds an identity mapping from a list of value names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = names
            .into_iter()
            .map(|n| {
                let name = n.into();
                let value = Value::String(name.clone());
                (name, value)
            })
            .collect();
        Self { values }
    }

    /// Adds a value mapping.
    pub fn value(mut self, name: impl Into<String>, internal: Value) -> Self {
        self.values.insert(name.into(), internal);
        self
    }

    /// Looks up the internal value for an external name.
    pub fn internal_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Looks up the external name for an internal value.
    pub fn external_name(&self, internal: &Value) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == internal)
            .map(|(k, _)| k.as_str())
    }
}

/// Input object resolver: field types, resolved lazily through the
/// registry during input coercion.
#[derive(Clone, Default)]
pub struct InputObjectResolver {
    /// Field types keyed by input field name.
    pub fields: IndexMap<String, Type>,
}

/// A type resolver, tagged by kind.
#[derive(Clone)]
pub enum TypeResolver {
    Object(ObjectResolver),
    Interface(InterfaceResolver),
    Union(UnionResolver),
    Scalar(ScalarResolver),
    Enum(EnumResolver),
    InputObject(InputObjectResolver),
}

impl TypeResolver {
    /// Kind name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Interface(_) => "interface",
            Self::Union(_) => "union",
            Self::Scalar(_) => "scalar",
            Self::Enum(_) => "enum",
            Self::InputObject(_) => "input object",
        }
    }

    /// Returns the object resolver, if this is an object type.
    pub fn as_object(&self) -> Option<&ObjectResolver> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the scalar resolver, if this is a scalar type.
    pub fn as_scalar(&self) -> Option<&ScalarResolver> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the enum resolver, if this is an enum type.
    pub fn as_enum(&self) -> Option<&EnumResolver> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }
}

impl Debug for TypeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(o) => write!(f, "Object({} fields)", o.fields.len()),
            Self::Interface(i) => write!(f, "Interface({} implementors)", i.implemented_by.len()),
            Self::Union(u) => write!(f, "Union({} members)", u.types.len()),
            Self::Scalar(_) => write!(f, "Scalar"),
            Self::Enum(e) => write!(f, "Enum({} values)", e.values.len()),
            Self::InputObject(i) => write!(f, "InputObject({} fields)", i.fields.len()),
        }
    }
}

/// The per-type-name registry of resolvers supplied by the application.
#[derive(Clone, Default)]
pub struct Resolvers {
    types: IndexMap<String, TypeResolver>,
}

impl Resolvers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a type resolver, replacing any existing entry.
    pub fn insert(&mut self, type_name: impl Into<String>, resolver: TypeResolver) {
        self.types.insert(type_name.into(), resolver);
    }

    /// Builder-style insertion.
    pub fn with_type(mut self, type_name: impl Into<String>, resolver: TypeResolver) -> Self {
        self.insert(type_name, resolver);
        self
    }

    /// Gets a type resolver by name.
    pub fn get(&self, type_name: &str) -> Option<&TypeResolver> {
        self.types.get(type_name)
    }

    /// Gets a mutable type resolver by name.
    pub fn get_mut(&mut self, type_name: &str) -> Option<&mut TypeResolver> {
        self.types.get_mut(type_name)
    }

    /// Removes a type resolver.
    pub fn remove(&mut self, type_name: &str) -> Option<TypeResolver> {
        self.types.shift_remove(type_name)
    }

    /// Gets a field resolver under an object type.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldResolver> {
        self.get(type_name)?.as_object()?.get(field_name)
    }

    /// Iterates over all type entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypeResolver)> {
        self.types.iter()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns true if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Merges entries from `other` that are missing here.
    ///
    /// Append-only: existing type entries win, and object field maps gain
    /// only fields they did not already have.
    pub fn merge_missing(&mut self, other: Resolvers) {
        for (name, incoming) in other.types {
            match self.types.get_mut(&name) {
                None => {
                    self.types.insert(name, incoming);
                }
                Some(TypeResolver::Object(existing)) => {
                    if let TypeResolver::Object(incoming) = incoming {
                        for (field, resolver) in incoming.fields {
                            existing.fields.entry(field).or_insert(resolver);
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
}

impl Debug for Resolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolvers")
            .field("type_count", &self.types.len())
            .finish()
    }
}
