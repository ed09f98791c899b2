//! Incremental delivery.
//!
//! Deferred fragments and streamed list remainders are enqueued during the
//! initial walk; every unit captures its parent's already-resolved source
//! value, so a patch can never precede the data it decorates. The patch
//! stream drains the queue lazily: dropping it abandons all outstanding
//! work, the engine's only cancellation point.

use std::sync::Arc;

use async_graphql_parser::types::{OperationType, SelectionSet, Type};
use fragql_core::{Context, Path, PathSegment, ResolveInfo};
use serde_json::Value;

use crate::executor::{Bubble, ErrorSink, ExecState};
use crate::result::{
    IncrementalDeferResult, IncrementalExecutionResult, IncrementalResult, IncrementalStreamResult,
    TotalExecutionResult,
};

/// One unit of incremental work, scheduled after the initial payload.
pub(crate) enum PendingWork {
    /// A `@defer`red fragment on an already-resolved object.
    Defer {
        kind: OperationType,
        parent_type: String,
        source: Value,
        selection_set: SelectionSet,
        path: Option<Arc<Path>>,
        label: Option<String>,
    },
    /// The remainder of a `@stream`ed list, one patch per item.
    Stream {
        kind: OperationType,
        item_type: Type,
        items: Vec<Value>,
        start_index: usize,
        path: Arc<Path>,
        label: Option<String>,
        selections: SelectionSet,
        info: ResolveInfo,
        context: Context,
    },
}

impl PendingWork {
    /// Whether this unit would patch a position at or under `prefix`.
    pub(crate) fn is_addressed_under(&self, prefix: &[PathSegment]) -> bool {
        let target = match self {
            Self::Defer { path, .. } => Path::segments_of(path.as_ref()),
            Self::Stream { path, .. } => path.to_segments(),
        };
        target.len() >= prefix.len() && target[..prefix.len()] == *prefix
    }
}

/// Wraps the initial payload with the lazy patch stream draining the
/// pending queue.
pub(crate) fn into_incremental(
    state: Arc<ExecState>,
    initial: TotalExecutionResult,
) -> IncrementalExecutionResult {
    let subsequent = Box::pin(async_stream::stream! {
        loop {
            let Some(work) = state.pop_pending() else {
                break;
            };
            match work {
                PendingWork::Defer {
                    kind,
                    parent_type,
                    source,
                    selection_set,
                    path,
                    label,
                } => {
                    let errors = ErrorSink::default();
                    let baseline = state.pending_len();
                    let data = match state
                        .execute_selection_set(
                            kind,
                            &parent_type,
                            &source,
                            &selection_set,
                            path.clone(),
                            &errors,
                            false,
                        )
                        .await
                    {
                        Ok(value) => value,
                        Err(Bubble(_)) => {
                            // Anything this unit scheduled points into
                            // data that will never be delivered.
                            state.truncate_pending(baseline);
                            Value::Null
                        }
                    };
                    let has_next = state.has_pending();
                    tracing::trace!(label = ?label, has_next, "emitting deferred patch");
                    yield IncrementalResult::Defer(IncrementalDeferResult {
                        data,
                        errors: errors.take(),
                        path: Path::segments_of(path.as_ref()),
                        label,
                        has_next,
                    });
                }
                PendingWork::Stream {
                    kind,
                    item_type,
                    items,
                    start_index,
                    path,
                    label,
                    selections,
                    info,
                    context,
                } => {
                    let total = items.len();
                    for (offset, item) in items.into_iter().enumerate() {
                        let item_path = path.child(start_index + offset);
                        let errors = ErrorSink::default();
                        let baseline = state.pending_len();
                        let value = match state
                            .complete_value(
                                kind, &item_type, item, &selections, &item_path, &errors,
                                None, &info, &context,
                            )
                            .await
                        {
                            Ok(value) => value,
                            Err(Bubble(_)) => {
                                state.truncate_pending(baseline);
                                Value::Null
                            }
                        };
                        let has_next = offset + 1 < total || state.has_pending();
                        tracing::trace!(label = ?label, has_next, "emitting streamed item");
                        yield IncrementalResult::Stream(IncrementalStreamResult {
                            items: vec![value],
                            errors: errors.take(),
                            path: item_path.to_segments(),
                            label: label.clone(),
                            has_next,
                        });
                    }
                }
            }
        }
    });

    IncrementalExecutionResult {
        initial_result: initial,
        has_next: true,
        subsequent_results: subsequent,
    }
}
