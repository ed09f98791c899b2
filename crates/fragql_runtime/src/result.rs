//! Execution result types.

use fragql_core::{GraphQLError, PathSegment};
use futures_util::stream::BoxStream;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// A complete query or mutation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TotalExecutionResult {
    /// The response data. `None` when the request failed before execution
    /// started; `Some(Value::Null)` when a non-null error bubbled to the
    /// root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Field errors collected during execution.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Response extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, Value>>,
}

impl TotalExecutionResult {
    /// Creates a result carrying only data.
    pub fn new(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            extensions: None,
        }
    }

    /// Creates a data-less result from request-level errors.
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors,
            extensions: None,
        }
    }

    /// Adds collected field errors.
    pub fn with_errors(mut self, errors: Vec<GraphQLError>) -> Self {
        self.errors = errors;
        self
    }
}

/// One incremental patch: a deferred fragment's data or a streamed item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IncrementalResult {
    Defer(IncrementalDeferResult),
    Stream(IncrementalStreamResult),
}

impl IncrementalResult {
    /// Whether more patches follow this one.
    pub fn has_next(&self) -> bool {
        match self {
            Self::Defer(d) => d.has_next,
            Self::Stream(s) => s.has_next,
        }
    }

    /// The response path this patch is addressed to.
    pub fn path(&self) -> &[PathSegment] {
        match self {
            Self::Defer(d) => &d.path,
            Self::Stream(s) => &s.path,
        }
    }

    /// The directive label, when one was given.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Defer(d) => d.label.as_deref(),
            Self::Stream(s) => s.label.as_deref(),
        }
    }
}

/// Patch produced by a `@defer` fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncrementalDeferResult {
    /// The deferred fragment's data, `Value::Null` if a non-null error
    /// consumed the whole fragment.
    pub data: Value,

    /// Errors raised inside the deferred fragment.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Path of the object the fragment decorates.
    pub path: Vec<PathSegment>,

    /// The directive label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Whether more patches follow.
    pub has_next: bool,
}

/// Patch produced by one item of a `@stream`ed list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncrementalStreamResult {
    /// The completed items, one per patch.
    pub items: Vec<Value>,

    /// Errors raised while completing the items.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Path of the item inside the streamed list.
    pub path: Vec<PathSegment>,

    /// The directive label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Whether more patches follow.
    pub has_next: bool,
}

/// An initial payload plus an async sequence of patches.
pub struct IncrementalExecutionResult {
    /// The synchronous selection's payload.
    pub initial_result: TotalExecutionResult,

    /// Always `true`: an incremental result is only produced when at least
    /// one patch is pending.
    pub has_next: bool,

    /// The pending patches, in dependency order. Dropping this stream
    /// abandons all outstanding deferred and streamed work.
    pub subsequent_results: BoxStream<'static, IncrementalResult>,
}

impl std::fmt::Debug for IncrementalExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalExecutionResult")
            .field("initial_result", &self.initial_result)
            .field("has_next", &self.has_next)
            .finish()
    }
}

/// An async sequence of total results, one per source event.
pub struct SubscriptionExecutionResult {
    /// The event results. Dropping this stream ends the subscription.
    pub events: BoxStream<'static, TotalExecutionResult>,
}

impl std::fmt::Debug for SubscriptionExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionExecutionResult").finish()
    }
}

/// The result of one execution: total, or initial payload plus patches.
///
/// Exactly one variant is produced per call, decided by the presence of
/// live `@defer`/`@stream` directives in the executed operation.
#[derive(Debug)]
pub enum ExecutionResult {
    Total(TotalExecutionResult),
    Incremental(IncrementalExecutionResult),
}

impl ExecutionResult {
    /// Returns the total result, if this is one.
    pub fn as_total(&self) -> Option<&TotalExecutionResult> {
        match self {
            Self::Total(t) => Some(t),
            Self::Incremental(_) => None,
        }
    }

    /// Unwraps into the total result, panicking on an incremental one.
    /// Intended for callers that know no defer/stream was requested.
    pub fn into_total(self) -> TotalExecutionResult {
        match self {
            Self::Total(t) => t,
            Self::Incremental(_) => panic!("expected a total result, got an incremental one"),
        }
    }

    /// Unwraps into the incremental result, panicking on a total one.
    pub fn into_incremental(self) -> IncrementalExecutionResult {
        match self {
            Self::Total(_) => panic!("expected an incremental result, got a total one"),
            Self::Incremental(i) => i,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_serialization_skips_empty() {
        let result = TotalExecutionResult::new(serde_json::json!({"film": {"title": "A"}}));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"data": {"film": {"title": "A"}}}));
    }

    #[test]
    fn test_request_error_has_no_data_key() {
        let result = TotalExecutionResult::from_errors(vec![GraphQLError::new("bad operation")]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"errors": [{"message": "bad operation"}]})
        );
    }

    #[test]
    fn test_incremental_patch_serialization() {
        let patch = IncrementalResult::Stream(IncrementalStreamResult {
            items: vec![serde_json::json!("A New Hope")],
            errors: Vec::new(),
            path: vec![PathSegment::from("films"), PathSegment::from(2usize)],
            label: Some("more".to_string()),
            has_next: false,
        });
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "items": ["A New Hope"],
                "path": ["films", 2],
                "label": "more",
                "has_next": false,
            })
        );
    }
}
