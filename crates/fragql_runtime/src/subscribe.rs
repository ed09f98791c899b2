//! The subscription engine.
//!
//! Resolves the subscription root field's `subscribe` function to obtain a
//! source event stream, then runs the execution engine once per event with
//! the event as root value. Failures before the first event are fatal;
//! errors inside one event stay inside that event's result.

use std::sync::Arc;

use async_graphql_parser::types::OperationType;
use fragql_core::{Path, ResolveInfo, Resolvers};
use fragql_schema::{SchemaFragment, SchemaFragmentLoader};
use futures_util::StreamExt;
use serde_json::Value;

use crate::executor::{
    apply_variable_defaults, fragment_from_sdl, select_operation, Bubble, ErrorSink, ExecState,
    ExecutionRequest,
};
use crate::result::{SubscriptionExecutionResult, TotalExecutionResult};
use crate::ExecutionError;

/// Parses the SDL and subscribes through the fragment path.
pub async fn subscribe_with_schema(
    type_defs: &str,
    resolvers: Resolvers,
    request: ExecutionRequest,
) -> Result<SubscriptionExecutionResult, ExecutionError> {
    let fragment = fragment_from_sdl(type_defs, resolvers)?;
    subscribe_without_schema(fragment, None, request).await
}

/// Subscribes against a schema fragment.
///
/// Unlike execution, request-level failures here reject the whole call:
/// there is no result object to carry them in before the first event.
pub async fn subscribe_without_schema(
    fragment: SchemaFragment,
    loader: Option<Arc<dyn SchemaFragmentLoader>>,
    request: ExecutionRequest,
) -> Result<SubscriptionExecutionResult, ExecutionError> {
    let ExecutionRequest {
        document,
        operation_name,
        root_value,
        context,
        mut variables,
        hooks,
    } = request;

    let (kind, selection_set) = {
        let (_, operation) = select_operation(&document, operation_name.as_deref())?;
        apply_variable_defaults(&mut variables, &operation.variable_definitions);
        (operation.ty, operation.selection_set.node.clone())
    };
    if kind != OperationType::Subscription {
        return Err(ExecutionError::NotSubscription);
    }

    let root_type = fragment
        .operation_types
        .root_for(OperationType::Subscription)
        .to_string();
    let state = ExecState::new(document, fragment, loader, context, variables, hooks, true);

    let collected = state.collect(&root_type, &selection_set).await;
    if collected.fields.len() != 1 {
        return Err(ExecutionError::InvalidSubscriptionSelection);
    }
    let group = collected
        .fields
        .values()
        .next()
        .cloned()
        .ok_or(ExecutionError::InvalidSubscriptionSelection)?;

    let subscriber = state
        .subscribe_resolver(&root_type, &group.field_name)
        .await
        .ok_or_else(|| ExecutionError::MissingSubscribeResolver(group.field_name.clone()))?;

    let descriptor = state.field_descriptor(&root_type, &group.field_name).await;
    let path = Path::root(group.response_key.as_str());
    let args = state
        .coerce_field_arguments(descriptor.as_ref(), &group.fields[0])
        .await
        .map_err(ExecutionError::SubscribeFailed)?;
    let mut info = ResolveInfo::new(&group.field_name, root_type.as_str())
        .with_path(path.to_segments())
        .with_operation_kind(OperationType::Subscription)
        .with_variables(state.variables());
    if let Some(descriptor) = &descriptor {
        info.return_type = Some(descriptor.ty.clone());
    }
    let event_context = state.current_context();

    tracing::debug!(field = %group.field_name, "starting subscription");
    let mut source = subscriber
        .subscribe(&root_value, &args, &event_context, &info)
        .await
        .map_err(ExecutionError::SubscribeFailed)?;

    let events = Box::pin(async_stream::stream! {
        while let Some(event) = source.next().await {
            yield execute_event(&state, &root_type, &selection_set, event).await;
        }
        tracing::debug!("subscription source ended");
    });

    Ok(SubscriptionExecutionResult { events })
}

/// Runs one source event through the engine as a query-style execution.
async fn execute_event(
    state: &Arc<ExecState>,
    root_type: &str,
    selection_set: &async_graphql_parser::types::SelectionSet,
    event: Value,
) -> TotalExecutionResult {
    let errors = ErrorSink::default();
    let data = match state
        .execute_selection_set(
            OperationType::Subscription,
            root_type,
            &event,
            selection_set,
            None,
            &errors,
            false,
        )
        .await
    {
        Ok(value) => value,
        Err(Bubble(_)) => Value::Null,
    };
    TotalExecutionResult::new(data).with_errors(errors.take())
}
