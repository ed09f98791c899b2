//! The execution engine.
//!
//! Executes an operation against a [`SchemaFragment`], a partial view of
//! a schema, consulting a [`SchemaFragmentLoader`] whenever it meets a
//! type or field the fragment does not yet know. Resolution follows the
//! reference executor: fields of one selection set start eagerly in
//! selection order and join at the set boundary, resolver errors bubble to
//! the nearest nullable ancestor, and `@defer`/`@stream` selections are
//! handed to the incremental delivery queue.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock};

use async_graphql_parser::types::{
    BaseType, DocumentOperations, ExecutableDocument, Field, OperationDefinition, OperationType,
    SelectionSet, Type, VariableDefinition,
};
use async_graphql_parser::{parse_schema, Positioned};
use async_graphql_value::{ConstValue, Value as AstValue};
use fragql_core::{
    Context, FieldDescriptor, GraphQLError, Path, ResolveFn, ResolveInfo, ResolverArgs, Resolvers,
    SubscribeFn, TypeDescriptor,
};
use fragql_schema::{definitions_from_sdl, FragmentRequest, SchemaFragment, SchemaFragmentLoader};
use futures_util::future::join_all;
use rustc_hash::FxHashSet;
use serde_json::Value;
use tokio::sync::{Mutex as TokioMutex, RwLock as TokioRwLock};

use crate::collect::{collect_fields, CollectedFields, FieldGroup, StreamDirective};
use crate::error::ExecutionError;
use crate::hooks::{ExecutionHooks, NoopHooks};
use crate::incremental::{self, PendingWork};
use crate::result::{ExecutionResult, TotalExecutionResult};

/// Everything one execution needs besides the schema fragment.
pub struct ExecutionRequest {
    /// The parsed document.
    pub document: ExecutableDocument,
    /// Operation to execute, when the document holds several.
    pub operation_name: Option<String>,
    /// The root value handed to root-field resolvers.
    pub root_value: Value,
    /// Request-scoped shared context.
    pub context: Context,
    /// Variable values.
    pub variables: HashMap<String, Value>,
    /// Execution hooks.
    pub hooks: Arc<dyn ExecutionHooks>,
}

impl ExecutionRequest {
    /// Creates a request with default root value, context and variables.
    pub fn new(document: ExecutableDocument) -> Self {
        Self {
            document,
            operation_name: None,
            root_value: Value::Null,
            context: Context::new(),
            variables: HashMap::new(),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Selects the operation by name.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets the root value.
    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    /// Sets the context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Sets the variable values.
    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Installs execution hooks.
    pub fn with_hooks(mut self, hooks: impl ExecutionHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }
}

/// Parses the SDL, derives definitions and operation types, and executes
/// through the fragment path.
pub async fn execute_with_schema(
    type_defs: &str,
    resolvers: Resolvers,
    request: ExecutionRequest,
) -> Result<ExecutionResult, ExecutionError> {
    let fragment = fragment_from_sdl(type_defs, resolvers)?;
    execute_without_schema(fragment, None, request).await
}

/// Executes an operation against a schema fragment, extending it through
/// `loader` when the document touches unknown types or fields.
pub async fn execute_without_schema(
    fragment: SchemaFragment,
    loader: Option<Arc<dyn SchemaFragmentLoader>>,
    request: ExecutionRequest,
) -> Result<ExecutionResult, ExecutionError> {
    let ExecutionRequest {
        document,
        operation_name,
        root_value,
        context,
        mut variables,
        hooks,
    } = request;

    let (kind, selection_set) = match select_operation(&document, operation_name.as_deref()) {
        Ok((_, operation)) => {
            apply_variable_defaults(&mut variables, &operation.variable_definitions);
            (operation.ty, operation.selection_set.node.clone())
        }
        Err(error) => {
            return Ok(ExecutionResult::Total(TotalExecutionResult::from_errors(
                vec![GraphQLError::new(error.to_string())],
            )));
        }
    };
    if kind == OperationType::Subscription {
        return Ok(ExecutionResult::Total(TotalExecutionResult::from_errors(
            vec![GraphQLError::new(
                "subscription operations must be executed through subscribe",
            )],
        )));
    }

    let root_type = fragment.operation_types.root_for(kind).to_string();
    let state = ExecState::new(document, fragment, loader, context, variables, hooks, false);

    tracing::debug!(operation = ?kind, root_type = %root_type, "executing operation");
    let errors = ErrorSink::default();
    let data = match state
        .execute_selection_set(
            kind,
            &root_type,
            &root_value,
            &selection_set,
            None,
            &errors,
            kind == OperationType::Mutation,
        )
        .await
    {
        Ok(value) => value,
        Err(Bubble(_)) => {
            state.discard_pending_under(None);
            Value::Null
        }
    };
    let initial = TotalExecutionResult::new(data).with_errors(errors.take());

    if state.has_pending() {
        Ok(ExecutionResult::Incremental(incremental::into_incremental(
            state, initial,
        )))
    } else {
        Ok(ExecutionResult::Total(initial))
    }
}

pub(crate) fn fragment_from_sdl(
    type_defs: &str,
    resolvers: Resolvers,
) -> Result<SchemaFragment, ExecutionError> {
    let sdl = parse_schema(type_defs)
        .map_err(|e| ExecutionError::InvalidTypeDefs(e.to_string()))?;
    let (definitions, operation_types) = definitions_from_sdl(&sdl);
    Ok(SchemaFragment::new("schema")
        .with_definitions(definitions)
        .with_resolvers(resolvers)
        .with_operation_types(operation_types))
}

/// Picks the operation to execute.
pub(crate) fn select_operation<'a>(
    document: &'a ExecutableDocument,
    name: Option<&'a str>,
) -> Result<(Option<&'a str>, &'a OperationDefinition), ExecutionError> {
    match (&document.operations, name) {
        (DocumentOperations::Single(operation), None) => Ok((None, &operation.node)),
        (DocumentOperations::Single(_), Some(requested)) => {
            Err(ExecutionError::UnknownOperation(requested.to_string()))
        }
        (DocumentOperations::Multiple(operations), Some(requested)) => operations
            .get(requested)
            .map(|operation| (Some(requested), &operation.node))
            .ok_or_else(|| ExecutionError::UnknownOperation(requested.to_string())),
        (DocumentOperations::Multiple(operations), None) => {
            if operations.is_empty() {
                Err(ExecutionError::NoOperation)
            } else if operations.len() == 1 {
                let (op_name, operation) = operations
                    .iter()
                    .next()
                    .map(|(n, op)| (n.as_str(), &op.node))
                    .ok_or(ExecutionError::NoOperation)?;
                Ok((Some(op_name), operation))
            } else {
                Err(ExecutionError::AmbiguousOperation)
            }
        }
    }
}

/// Fills in declared variable defaults the caller did not provide.
pub(crate) fn apply_variable_defaults(
    variables: &mut HashMap<String, Value>,
    definitions: &[Positioned<VariableDefinition>],
) {
    for definition in definitions {
        let name = definition.node.name.node.as_str();
        if variables.contains_key(name) {
            continue;
        }
        if let Some(default) = &definition.node.default_value {
            if let Ok(value) = serde_json::to_value(&default.node) {
                variables.insert(name.to_string(), value);
            }
        }
    }
}

/// Signal that a non-null position failed; it climbs until a nullable
/// position absorbs it as `null`. The error it carries was already
/// recorded where it was raised.
pub(crate) struct Bubble(pub(crate) GraphQLError);

type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, Bubble>> + Send + 'a>>;

/// Collects field errors across concurrently-running siblings.
#[derive(Default)]
pub(crate) struct ErrorSink(StdMutex<Vec<GraphQLError>>);

impl ErrorSink {
    pub(crate) fn push(&self, error: GraphQLError) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    pub(crate) fn take(&self) -> Vec<GraphQLError> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Shared state of one execution (or of one subscription's event loop).
pub(crate) struct ExecState {
    pub(crate) document: ExecutableDocument,
    fragment: TokioRwLock<SchemaFragment>,
    loader: Option<Arc<dyn SchemaFragmentLoader>>,
    /// Serializes loader round trips so merges are totally ordered.
    load_gate: TokioMutex<()>,
    /// Request keys already answered by the loader; first writer wins.
    satisfied: StdMutex<FxHashSet<String>>,
    context: StdRwLock<Context>,
    variables: Arc<HashMap<String, Value>>,
    hooks: Arc<dyn ExecutionHooks>,
    pending: StdMutex<VecDeque<PendingWork>>,
    /// Execute defer/stream selections inline instead of enqueueing
    /// (subscription events are always total results).
    inline_increments: bool,
}

impl ExecState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        document: ExecutableDocument,
        fragment: SchemaFragment,
        loader: Option<Arc<dyn SchemaFragmentLoader>>,
        context: Context,
        variables: HashMap<String, Value>,
        hooks: Arc<dyn ExecutionHooks>,
        inline_increments: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            document,
            fragment: TokioRwLock::new(fragment),
            loader,
            load_gate: TokioMutex::new(()),
            satisfied: StdMutex::new(FxHashSet::default()),
            context: StdRwLock::new(context),
            variables: Arc::new(variables),
            hooks,
            pending: StdMutex::new(VecDeque::new()),
            inline_increments,
        })
    }

    pub(crate) fn current_context(&self) -> Context {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub(crate) fn pop_pending(&self) -> Option<PendingWork> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn enqueue(&self, work: PendingWork) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(work);
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn truncate_pending(&self, len: usize) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(len);
    }

    /// Drops pending work addressed at or under `path`; the value it
    /// would have patched was nulled out of the response.
    pub(crate) fn discard_pending_under(&self, path: Option<&Arc<Path>>) {
        let prefix = Path::segments_of(path);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|work| !work.is_addressed_under(&prefix));
    }

    pub(crate) async fn collect(
        &self,
        runtime_type: &str,
        selection_set: &SelectionSet,
    ) -> CollectedFields {
        let fragment = self.fragment.read().await;
        collect_fields(
            &fragment.definitions,
            &self.document.fragments,
            runtime_type,
            selection_set,
            &self.variables,
        )
    }

    /// Issues a loader request unless the same key was already answered.
    /// Returns `Ok` without loading when no loader is configured.
    pub(crate) async fn request_missing(
        &self,
        request: &FragmentRequest,
    ) -> Result<(), GraphQLError> {
        let Some(loader) = self.loader.clone() else {
            return Ok(());
        };
        let _gate = self.load_gate.lock().await;
        {
            let satisfied = self.satisfied.lock().unwrap_or_else(PoisonError::into_inner);
            if satisfied.contains(&request.key()) {
                return Ok(());
            }
        }
        let snapshot = self.fragment.read().await.clone();
        let context = self.current_context();
        tracing::debug!(request = %request, "loading schema fragment");
        let loaded = loader.load(&snapshot, &context, request).await?;
        {
            let mut fragment = self.fragment.write().await;
            fragment.merge(loaded.fragment);
        }
        if let Some(merged_context) = loaded.context {
            *self
                .context
                .write()
                .unwrap_or_else(PoisonError::into_inner) = merged_context;
        }
        self.satisfied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.key());
        Ok(())
    }

    /// Looks up a field descriptor, falling back to the parent's declared
    /// interfaces.
    pub(crate) async fn field_descriptor(
        &self,
        parent_type: &str,
        field_name: &str,
    ) -> Option<FieldDescriptor> {
        let fragment = self.fragment.read().await;
        if let Some(descriptor) = fragment.definitions.field(parent_type, field_name) {
            return Some(descriptor.clone());
        }
        if let Some(TypeDescriptor::Object(object)) = fragment.definitions.get(parent_type) {
            for interface in &object.implements {
                if let Some(descriptor) = fragment.definitions.field(interface, field_name) {
                    return Some(descriptor.clone());
                }
            }
        }
        None
    }

    pub(crate) fn variables(&self) -> Arc<HashMap<String, Value>> {
        Arc::clone(&self.variables)
    }

    /// Coerces a field's arguments against the current fragment.
    pub(crate) async fn coerce_field_arguments(
        &self,
        descriptor: Option<&FieldDescriptor>,
        field: &Field,
    ) -> Result<ResolverArgs, GraphQLError> {
        let fragment = self.fragment.read().await;
        coerce_arguments(&fragment, descriptor, field, &self.variables)
    }

    /// Looks up a subscribe function on an object type field.
    pub(crate) async fn subscribe_resolver(
        &self,
        parent_type: &str,
        field_name: &str,
    ) -> Option<Arc<dyn SubscribeFn>> {
        let fragment = self.fragment.read().await;
        fragment
            .resolvers
            .field(parent_type, field_name)
            .and_then(|field| field.subscribe.clone())
    }

    /// Looks up a resolve function, falling back to the parent's declared
    /// interfaces.
    async fn field_resolver(
        &self,
        parent_type: &str,
        field_name: &str,
    ) -> Option<Arc<dyn ResolveFn>> {
        let fragment = self.fragment.read().await;
        if let Some(field) = fragment.resolvers.field(parent_type, field_name) {
            return field.resolve.clone();
        }
        if let Some(TypeDescriptor::Object(object)) = fragment.definitions.get(parent_type) {
            for interface in &object.implements {
                if let Some(field) = fragment.resolvers.field(interface, field_name) {
                    return field.resolve.clone();
                }
            }
        }
        None
    }

    /// Executes one selection set against a value of `runtime_type`.
    ///
    /// Sibling fields start eagerly in selection order and are joined at
    /// the boundary; mutations run their root fields serially.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn execute_selection_set<'a>(
        self: &'a Arc<Self>,
        kind: OperationType,
        runtime_type: &'a str,
        source: &'a Value,
        selection_set: &'a SelectionSet,
        path: Option<Arc<Path>>,
        errors: &'a ErrorSink,
        serial: bool,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            let mut collected = self.collect(runtime_type, selection_set).await;
            if !collected.unknown_conditions.is_empty() && self.loader.is_some() {
                for condition in std::mem::take(&mut collected.unknown_conditions) {
                    let request = FragmentRequest::RuntimeType {
                        abstract_type_name: condition,
                        runtime_type_name: runtime_type.to_string(),
                    };
                    if let Err(error) = self.request_missing(&request).await {
                        errors.push(error.with_path(Path::segments_of(path.as_ref())));
                    }
                }
                collected = self.collect(runtime_type, selection_set).await;
            }

            let results: Vec<(String, Result<Value, Bubble>)> = if serial {
                let mut results = Vec::with_capacity(collected.fields.len());
                for group in collected.fields.values() {
                    results.push(
                        self.execute_field_group(
                            kind,
                            runtime_type,
                            source,
                            group,
                            path.clone(),
                            errors,
                        )
                        .await,
                    );
                }
                results
            } else {
                join_all(collected.fields.values().map(|group| {
                    self.execute_field_group(kind, runtime_type, source, group, path.clone(), errors)
                }))
                .await
            };

            let mut map = serde_json::Map::with_capacity(results.len());
            let mut bubble = None;
            for (key, result) in results {
                match result {
                    Ok(value) => {
                        map.insert(key, value);
                    }
                    Err(b) => {
                        if bubble.is_none() {
                            bubble = Some(b);
                        }
                    }
                }
            }
            if let Some(b) = bubble {
                return Err(b);
            }

            for deferred in collected.deferred {
                if self.inline_increments {
                    let value = self
                        .execute_selection_set(
                            kind,
                            runtime_type,
                            source,
                            &deferred.selection_set,
                            path.clone(),
                            errors,
                            false,
                        )
                        .await?;
                    if let Value::Object(extra) = value {
                        for (key, value) in extra {
                            map.insert(key, value);
                        }
                    }
                } else {
                    tracing::trace!(label = ?deferred.label, "scheduling deferred fragment");
                    self.enqueue(PendingWork::Defer {
                        kind,
                        parent_type: runtime_type.to_string(),
                        source: source.clone(),
                        selection_set: deferred.selection_set,
                        path: path.clone(),
                        label: deferred.label,
                    });
                }
            }

            Ok(Value::Object(map))
        })
    }

    async fn execute_field_group(
        self: &Arc<Self>,
        kind: OperationType,
        parent_type: &str,
        source: &Value,
        group: &FieldGroup,
        parent_path: Option<Arc<Path>>,
        errors: &ErrorSink,
    ) -> (String, Result<Value, Bubble>) {
        let path = Path::extend(parent_path.as_ref(), group.response_key.as_str());
        let result = self
            .resolve_and_complete(kind, parent_type, source, group, &path, errors)
            .await;
        (group.response_key.clone(), result)
    }

    async fn resolve_and_complete(
        self: &Arc<Self>,
        kind: OperationType,
        parent_type: &str,
        source: &Value,
        group: &FieldGroup,
        path: &Arc<Path>,
        errors: &ErrorSink,
    ) -> Result<Value, Bubble> {
        if group.field_name == "__typename" {
            return Ok(Value::String(parent_type.to_string()));
        }

        let mut descriptor = self.field_descriptor(parent_type, &group.field_name).await;
        if descriptor.is_none() {
            let request = FragmentRequest::ReturnType {
                parent_type_name: parent_type.to_string(),
                field_name: group.field_name.clone(),
            };
            match self.request_missing(&request).await {
                Ok(()) => {
                    descriptor = self.field_descriptor(parent_type, &group.field_name).await;
                }
                Err(error) => {
                    errors.push(error.with_path(path.to_segments()));
                    return Ok(Value::Null);
                }
            }
        }
        let Some(descriptor) = descriptor else {
            errors.push(
                GraphQLError::new(format!(
                    "Cannot resolve the type of field {parent_type}.{}",
                    group.field_name
                ))
                .with_path(path.to_segments()),
            );
            return Ok(Value::Null);
        };

        let info = ResolveInfo::new(&group.field_name, parent_type)
            .with_return_type(descriptor.ty.clone())
            .with_path(path.to_segments())
            .with_operation_kind(kind)
            .with_variables(Arc::clone(&self.variables));

        let args = {
            let fragment = self.fragment.read().await;
            coerce_arguments(&fragment, Some(&descriptor), &group.fields[0], &self.variables)
        };
        let args = match args {
            Ok(args) => args,
            Err(error) => {
                let error = error.with_path(path.to_segments());
                errors.push(error.clone());
                return if descriptor.ty.nullable {
                    Ok(Value::Null)
                } else {
                    Err(Bubble(error))
                };
            }
        };

        let context = self.current_context();
        let hook_context = self.hooks.before_field_resolve(&context, &info);

        let resolved = match self.field_resolver(parent_type, &group.field_name).await {
            Some(resolver) => resolver.resolve(source, &args, &context, &info).await,
            None => Ok(default_resolve(source, &group.field_name)),
        };
        let hook_context =
            self.hooks
                .after_field_resolve(&context, &info, hook_context, resolved.as_ref());

        match resolved {
            Err(error) => {
                let error = if error.path.is_none() {
                    error.with_path(path.to_segments())
                } else {
                    error
                };
                self.hooks
                    .after_field_complete(&context, &info, hook_context, Err(&error));
                errors.push(error.clone());
                if descriptor.ty.nullable {
                    Ok(Value::Null)
                } else {
                    Err(Bubble(error))
                }
            }
            Ok(value) => {
                let selections = group.merged_selection_set();
                let completed = self
                    .complete_value(
                        kind,
                        &descriptor.ty,
                        value,
                        &selections,
                        path,
                        errors,
                        group.stream.as_ref(),
                        &info,
                        &context,
                    )
                    .await;
                match &completed {
                    Ok(value) => {
                        self.hooks
                            .after_field_complete(&context, &info, hook_context, Ok(value));
                    }
                    Err(Bubble(error)) => {
                        self.hooks
                            .after_field_complete(&context, &info, hook_context, Err(error));
                    }
                }
                completed
            }
        }
    }

    /// Completes a resolved value against its annotated type, applying the
    /// non-null rule at this position.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn complete_value<'a>(
        self: &'a Arc<Self>,
        kind: OperationType,
        ty: &'a Type,
        value: Value,
        selections: &'a SelectionSet,
        path: &'a Arc<Path>,
        errors: &'a ErrorSink,
        stream: Option<&'a StreamDirective>,
        info: &'a ResolveInfo,
        context: &'a Context,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            if ty.nullable {
                match self
                    .complete_base(kind, &ty.base, value, selections, path, errors, stream, info, context)
                    .await
                {
                    Ok(value) => Ok(value),
                    // The error was recorded where it was raised; this
                    // nullable position absorbs the bubble. Pending work
                    // under the nulled position has nothing left to patch.
                    Err(Bubble(_)) => {
                        self.discard_pending_under(Some(path));
                        Ok(Value::Null)
                    }
                }
            } else {
                let value = self
                    .complete_base(kind, &ty.base, value, selections, path, errors, stream, info, context)
                    .await?;
                if value.is_null() {
                    let error = GraphQLError::new(format!(
                        "Cannot return null for non-nullable field {}.{}",
                        info.parent_type_name, info.field_name
                    ))
                    .with_path(path.to_segments());
                    errors.push(error.clone());
                    Err(Bubble(error))
                } else {
                    Ok(value)
                }
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_base(
        self: &Arc<Self>,
        kind: OperationType,
        base: &BaseType,
        value: Value,
        selections: &SelectionSet,
        path: &Arc<Path>,
        errors: &ErrorSink,
        stream: Option<&StreamDirective>,
        info: &ResolveInfo,
        context: &Context,
    ) -> Result<Value, Bubble> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match base {
            BaseType::List(inner) => {
                let Value::Array(mut items) = value else {
                    let error = GraphQLError::new(format!(
                        "Expected a list for field {}.{}",
                        info.parent_type_name, info.field_name
                    ))
                    .with_path(path.to_segments());
                    errors.push(error.clone());
                    return Err(Bubble(error));
                };

                let streamed = match stream {
                    Some(directive) if !self.inline_increments => {
                        let split_at = directive.initial_count.min(items.len());
                        let rest = items.split_off(split_at);
                        if rest.is_empty() {
                            None
                        } else {
                            Some((directive, rest, split_at))
                        }
                    }
                    _ => None,
                };

                let mut completed = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let item_path = path.child(index);
                    completed.push(
                        self.complete_value(
                            kind, inner, item, selections, &item_path, errors, None, info,
                            context,
                        )
                        .await?,
                    );
                }

                if let Some((directive, rest, start_index)) = streamed {
                    tracing::trace!(
                        label = ?directive.label,
                        items = rest.len(),
                        "scheduling streamed items"
                    );
                    self.enqueue(PendingWork::Stream {
                        kind,
                        item_type: (**inner).clone(),
                        items: rest,
                        start_index,
                        path: Arc::clone(path),
                        label: directive.label.clone(),
                        selections: selections.clone(),
                        info: info.clone(),
                        context: context.clone(),
                    });
                }

                Ok(Value::Array(completed))
            }
            BaseType::Named(name) => {
                self.complete_named(
                    kind,
                    name.as_str(),
                    value,
                    selections,
                    path,
                    errors,
                    info,
                    context,
                )
                .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_named(
        self: &Arc<Self>,
        kind: OperationType,
        type_name: &str,
        value: Value,
        selections: &SelectionSet,
        path: &Arc<Path>,
        errors: &ErrorSink,
        info: &ResolveInfo,
        context: &Context,
    ) -> Result<Value, Bubble> {
        let descriptor = {
            let fragment = self.fragment.read().await;
            fragment.definitions.get(type_name).cloned()
        };
        match descriptor {
            Some(TypeDescriptor::Scalar) => {
                let serialize = {
                    let fragment = self.fragment.read().await;
                    fragment
                        .resolvers
                        .get(type_name)
                        .and_then(|r| r.as_scalar())
                        .and_then(|s| s.serialize.clone())
                };
                match serialize {
                    Some(serialize) => match serialize(&value) {
                        Ok(value) => Ok(value),
                        Err(error) => {
                            let error = error.with_path(path.to_segments());
                            errors.push(error.clone());
                            Err(Bubble(error))
                        }
                    },
                    None => Ok(value),
                }
            }
            Some(TypeDescriptor::Enum { .. }) => {
                let resolver = {
                    let fragment = self.fragment.read().await;
                    fragment
                        .resolvers
                        .get(type_name)
                        .and_then(|r| r.as_enum())
                        .cloned()
                };
                match resolver {
                    Some(resolver) => match resolver.external_name(&value) {
                        Some(name) => Ok(Value::String(name.to_string())),
                        None => {
                            let error = GraphQLError::new(format!(
                                "Invalid internal value for enum {type_name}"
                            ))
                            .with_path(path.to_segments());
                            errors.push(error.clone());
                            Err(Bubble(error))
                        }
                    },
                    None => Ok(value),
                }
            }
            Some(TypeDescriptor::Object(_)) => {
                self.execute_selection_set(
                    kind,
                    type_name,
                    &value,
                    selections,
                    Some(Arc::clone(path)),
                    errors,
                    false,
                )
                .await
            }
            Some(TypeDescriptor::Interface(_)) | Some(TypeDescriptor::Union { .. }) => {
                self.complete_abstract(
                    kind, type_name, value, selections, path, errors, info, context,
                )
                .await
            }
            // Unknown or non-output types: a sub-selection treats the
            // value as an object of the named type; a leaf passes through.
            _ => {
                if selections.items.is_empty() {
                    Ok(value)
                } else {
                    self.execute_selection_set(
                        kind,
                        type_name,
                        &value,
                        selections,
                        Some(Arc::clone(path)),
                        errors,
                        false,
                    )
                    .await
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_abstract(
        self: &Arc<Self>,
        kind: OperationType,
        abstract_type: &str,
        value: Value,
        selections: &SelectionSet,
        path: &Arc<Path>,
        errors: &ErrorSink,
        info: &ResolveInfo,
        context: &Context,
    ) -> Result<Value, Bubble> {
        let resolve_type = {
            let fragment = self.fragment.read().await;
            match fragment.resolvers.get(abstract_type) {
                Some(fragql_core::TypeResolver::Interface(i)) => i.resolve_type.clone(),
                Some(fragql_core::TypeResolver::Union(u)) => u.resolve_type.clone(),
                _ => None,
            }
        };
        let runtime_type = resolve_type
            .and_then(|f| f(&value, context, info))
            .or_else(|| {
                value
                    .get("__typename")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
        let Some(runtime_type) = runtime_type else {
            let error = GraphQLError::new(format!(
                "Cannot resolve the runtime type of abstract type {abstract_type}"
            ))
            .with_path(path.to_segments());
            errors.push(error.clone());
            return Err(Bubble(error));
        };

        let mut known = self.is_known_member(abstract_type, &runtime_type).await;
        if !known {
            let request = FragmentRequest::RuntimeType {
                abstract_type_name: abstract_type.to_string(),
                runtime_type_name: runtime_type.clone(),
            };
            match self.request_missing(&request).await {
                Ok(()) => known = self.is_known_member(abstract_type, &runtime_type).await,
                Err(error) => {
                    let error = error.with_path(path.to_segments());
                    errors.push(error.clone());
                    return Err(Bubble(error));
                }
            }
        }
        if !known {
            let error = GraphQLError::new(format!(
                "{runtime_type} is not a known subtype of {abstract_type}"
            ))
            .with_path(path.to_segments());
            errors.push(error.clone());
            return Err(Bubble(error));
        }

        self.execute_selection_set(
            kind,
            &runtime_type,
            &value,
            selections,
            Some(Arc::clone(path)),
            errors,
            false,
        )
        .await
    }

    async fn is_known_member(&self, abstract_type: &str, runtime_type: &str) -> bool {
        let fragment = self.fragment.read().await;
        if fragment.definitions.is_sub_type(abstract_type, runtime_type) {
            return true;
        }
        match fragment.resolvers.get(abstract_type) {
            Some(fragql_core::TypeResolver::Interface(i)) => {
                i.implemented_by.iter().any(|t| t == runtime_type)
            }
            Some(fragql_core::TypeResolver::Union(u)) => {
                u.types.iter().any(|t| t == runtime_type)
            }
            _ => false,
        }
    }
}

/// The default resolver: property access on the parent value.
fn default_resolve(source: &Value, field_name: &str) -> Value {
    source.get(field_name).cloned().unwrap_or(Value::Null)
}

/// Resolves variables inside an argument literal and converts it to a
/// runtime value.
fn resolve_ast_value(
    value: &AstValue,
    variables: &HashMap<String, Value>,
) -> Result<Value, GraphQLError> {
    let const_value = value.clone().into_const_with(|name| {
        let json = variables.get(name.as_str()).cloned().unwrap_or(Value::Null);
        serde_json::from_value::<ConstValue>(json).map_err(|e| {
            GraphQLError::new(format!("Invalid value for variable ${name}: {e}"))
        })
    })?;
    serde_json::to_value(&const_value)
        .map_err(|e| GraphQLError::new(format!("Failed to convert argument value: {e}")))
}

/// Coerces a field's argument literals against its argument descriptors.
///
/// Without a descriptor the resolved values pass through raw; arguments
/// the descriptor does not declare also pass through, so partially-known
/// fragments never drop caller input.
pub(crate) fn coerce_arguments(
    fragment: &SchemaFragment,
    descriptor: Option<&FieldDescriptor>,
    field: &Field,
    variables: &HashMap<String, Value>,
) -> Result<ResolverArgs, GraphQLError> {
    let mut provided: Vec<(String, Value)> = Vec::with_capacity(field.arguments.len());
    for (name, value) in &field.arguments {
        provided.push((
            name.node.to_string(),
            resolve_ast_value(&value.node, variables)?,
        ));
    }

    let Some(descriptor) = descriptor else {
        return Ok(ResolverArgs::from_pairs(provided));
    };

    let mut args = ResolverArgs::new();
    for (name, input) in &descriptor.arguments {
        let position = provided.iter().position(|(n, _)| n == name);
        match position.map(|i| provided.remove(i).1) {
            Some(value) if !value.is_null() => {
                args.set(name, coerce_input(fragment, &input.ty, value)?);
            }
            Some(value) => {
                if let Some(default) = &input.default {
                    args.set(name, default.clone());
                } else if input.ty.nullable {
                    args.set(name, value);
                } else {
                    return Err(GraphQLError::new(format!(
                        "Received null for non-null argument {name}"
                    )));
                }
            }
            None => {
                if let Some(default) = &input.default {
                    args.set(name, default.clone());
                } else if !input.ty.nullable {
                    return Err(GraphQLError::new(format!(
                        "Missing required argument {name}"
                    )));
                }
            }
        }
    }
    for (name, value) in provided {
        args.set(name, value);
    }
    Ok(args)
}

/// Coerces one input value against its annotated type.
fn coerce_input(
    fragment: &SchemaFragment,
    ty: &Type,
    value: Value,
) -> Result<Value, GraphQLError> {
    if value.is_null() {
        return if ty.nullable {
            Ok(Value::Null)
        } else {
            Err(GraphQLError::new("Received null for non-null input type"))
        };
    }
    match &ty.base {
        BaseType::List(inner) => {
            // A single value coerces to a one-element list.
            let items = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            items
                .into_iter()
                .map(|item| coerce_input(fragment, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        BaseType::Named(name) => coerce_named_input(fragment, name.as_str(), value),
    }
}

fn coerce_named_input(
    fragment: &SchemaFragment,
    type_name: &str,
    value: Value,
) -> Result<Value, GraphQLError> {
    if let Some(fragql_core::TypeResolver::Enum(resolver)) = fragment.resolvers.get(type_name) {
        let Some(name) = value.as_str() else {
            return Err(GraphQLError::new(format!(
                "Expected an enum value for {type_name}"
            )));
        };
        return resolver.internal_value(name).cloned().ok_or_else(|| {
            GraphQLError::new(format!("Invalid value {name:?} for enum {type_name}"))
        });
    }
    if let Some(fragql_core::TypeResolver::Scalar(resolver)) = fragment.resolvers.get(type_name) {
        if let Some(parse_value) = &resolver.parse_value {
            return parse_value(value);
        }
        return Ok(value);
    }

    match fragment.definitions.get(type_name) {
        Some(TypeDescriptor::Enum { values }) => {
            let Some(name) = value.as_str() else {
                return Err(GraphQLError::new(format!(
                    "Expected an enum value for {type_name}"
                )));
            };
            if values.iter().any(|v| v == name) {
                Ok(value)
            } else {
                Err(GraphQLError::new(format!(
                    "Invalid value {name:?} for enum {type_name}"
                )))
            }
        }
        Some(TypeDescriptor::InputObject { fields }) => {
            let Value::Object(mut map) = value else {
                return Err(GraphQLError::new(format!(
                    "Expected an input object for {type_name}"
                )));
            };
            let mut out = serde_json::Map::with_capacity(fields.len());
            for (name, input) in fields {
                match map.remove(name) {
                    Some(value) if !value.is_null() => {
                        out.insert(name.clone(), coerce_input(fragment, &input.ty, value)?);
                    }
                    Some(value) => {
                        if !input.ty.nullable {
                            return Err(GraphQLError::new(format!(
                                "Received null for non-null input field {type_name}.{name}"
                            )));
                        }
                        out.insert(name.clone(), value);
                    }
                    None => {
                        if let Some(default) = &input.default {
                            out.insert(name.clone(), default.clone());
                        } else if !input.ty.nullable {
                            return Err(GraphQLError::new(format!(
                                "Missing required input field {type_name}.{name}"
                            )));
                        }
                    }
                }
            }
            for (name, value) in map {
                out.insert(name, value);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_query;
    use fragql_core::{InputValueDescriptor, ObjectDescriptor, SchemaDefinitions};

    fn ty(s: &str) -> Type {
        Type::new(s).unwrap()
    }

    #[test]
    fn test_select_operation() {
        let single = parse_query("{ a }").unwrap();
        assert!(select_operation(&single, None).is_ok());
        assert!(matches!(
            select_operation(&single, Some("Q")),
            Err(ExecutionError::UnknownOperation(_))
        ));

        let multiple = parse_query("query A { a } query B { b }").unwrap();
        assert!(matches!(
            select_operation(&multiple, None),
            Err(ExecutionError::AmbiguousOperation)
        ));
        let (name, _) = select_operation(&multiple, Some("B")).unwrap();
        assert_eq!(name, Some("B"));
    }

    #[test]
    fn test_apply_variable_defaults() {
        let document = parse_query(r#"query($n: Int = 3, $m: Int = 4) { a }"#).unwrap();
        let DocumentOperations::Single(operation) = &document.operations else {
            panic!("expected a single operation");
        };
        let mut variables = HashMap::from([("m".to_string(), serde_json::json!(9))]);

        apply_variable_defaults(&mut variables, &operation.node.variable_definitions);

        assert_eq!(variables.get("n"), Some(&serde_json::json!(3)));
        assert_eq!(variables.get("m"), Some(&serde_json::json!(9)));
    }

    #[test]
    fn test_coerce_input_wraps_single_list_item() {
        let fragment = SchemaFragment::new("t");
        let coerced = coerce_input(&fragment, &ty("[Int]"), serde_json::json!(7)).unwrap();
        assert_eq!(coerced, serde_json::json!([7]));
    }

    #[test]
    fn test_coerce_input_enum_membership() {
        let mut definitions = SchemaDefinitions::new();
        definitions.insert(
            "Episode",
            TypeDescriptor::Enum {
                values: vec!["NEWHOPE".to_string(), "EMPIRE".to_string()],
            },
        );
        let fragment = SchemaFragment::new("t").with_definitions(definitions);

        assert!(coerce_input(&fragment, &ty("Episode"), serde_json::json!("EMPIRE")).is_ok());
        assert!(coerce_input(&fragment, &ty("Episode"), serde_json::json!("JEDI")).is_err());
    }

    #[test]
    fn test_coerce_arguments_defaults_and_required() {
        let descriptor = FieldDescriptor::new(ty("Film"))
            .argument("id", InputValueDescriptor::new(ty("ID!")))
            .argument(
                "language",
                InputValueDescriptor::new(ty("String")).with_default(serde_json::json!("en")),
            );
        let mut definitions = SchemaDefinitions::new();
        let mut object = ObjectDescriptor::default();
        object.fields.insert("film".to_string(), descriptor.clone());
        definitions.insert("Query", TypeDescriptor::Object(object));
        let fragment = SchemaFragment::new("t").with_definitions(definitions);

        let document = parse_query(r#"{ film(id: "42") { title } }"#).unwrap();
        let DocumentOperations::Single(operation) = &document.operations else {
            panic!("expected a single operation");
        };
        let Some(async_graphql_parser::types::Selection::Field(field)) =
            operation.node.selection_set.node.items.first().map(|s| &s.node)
        else {
            panic!("expected a field");
        };

        let args =
            coerce_arguments(&fragment, Some(&descriptor), &field.node, &HashMap::new()).unwrap();
        assert_eq!(args.get("id"), Some(&serde_json::json!("42")));
        assert_eq!(args.get("language"), Some(&serde_json::json!("en")));

        let missing = FieldDescriptor::new(ty("Film"))
            .argument("id", InputValueDescriptor::new(ty("ID!")));
        let document = parse_query("{ film { title } }").unwrap();
        let DocumentOperations::Single(operation) = &document.operations else {
            panic!("expected a single operation");
        };
        let Some(async_graphql_parser::types::Selection::Field(field)) =
            operation.node.selection_set.node.items.first().map(|s| &s.node)
        else {
            panic!("expected a field");
        };
        assert!(
            coerce_arguments(&fragment, Some(&missing), &field.node, &HashMap::new()).is_err()
        );
    }

    #[test]
    fn test_default_resolve() {
        let source = serde_json::json!({"title": "A New Hope"});
        assert_eq!(
            default_resolve(&source, "title"),
            serde_json::json!("A New Hope")
        );
        assert_eq!(default_resolve(&source, "missing"), Value::Null);
        assert_eq!(default_resolve(&Value::Null, "title"), Value::Null);
    }
}
