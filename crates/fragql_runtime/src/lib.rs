//! Query execution for fragql.
//!
//! The interpreter core: executes parsed documents against schema
//! fragments instead of a materialized schema.
//! - `collect`: field collection with fragment and directive handling
//! - `executor`: the execution engine and its entry points
//! - `incremental`: `@defer`/`@stream` patch delivery
//! - `subscribe`: the subscription engine
//! - `hooks`: per-field execution hooks
//! - `result`: execution result types

pub mod collect;
pub mod error;
pub mod executor;
pub mod hooks;
mod incremental;
pub mod result;
pub mod subscribe;

pub use collect::{collect_fields, CollectedFields, DeferredGroup, FieldGroup, StreamDirective};
pub use error::ExecutionError;
pub use executor::{execute_with_schema, execute_without_schema, ExecutionRequest};
pub use hooks::{ExecutionHooks, HookContext, NoopHooks};
pub use result::{
    ExecutionResult, IncrementalDeferResult, IncrementalExecutionResult, IncrementalResult,
    IncrementalStreamResult, SubscriptionExecutionResult, TotalExecutionResult,
};
pub use subscribe::{subscribe_with_schema, subscribe_without_schema};
