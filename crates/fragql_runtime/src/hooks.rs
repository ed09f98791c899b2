//! Execution hooks.
//!
//! Hooks observe every field of an execution. The hook context returned by
//! `before_field_resolve` flows linearly through `after_field_resolve` into
//! `after_field_complete` for that one field; the engine threads it
//! explicitly and never stores it anywhere ambient.

use fragql_core::{Context, GraphQLError, ResolveInfo};
use serde_json::Value;
use std::any::Any;

/// Opaque per-field state carried between hook calls.
pub type HookContext = Box<dyn Any + Send + Sync>;

/// Observer of field resolution and completion.
///
/// All methods are optional; the default implementation observes nothing.
/// Call order per field is `before_field_resolve` → `after_field_resolve` →
/// `after_field_complete`, identically for sync and async resolvers.
pub trait ExecutionHooks: Send + Sync {
    /// Called before the field's resolver runs.
    fn before_field_resolve(
        &self,
        _context: &Context,
        _info: &ResolveInfo,
    ) -> Option<HookContext> {
        None
    }

    /// Called with the resolver's raw result, before value completion.
    fn after_field_resolve(
        &self,
        _context: &Context,
        _info: &ResolveInfo,
        hook_context: Option<HookContext>,
        _result: Result<&Value, &GraphQLError>,
    ) -> Option<HookContext> {
        hook_context
    }

    /// Called once the field's value, including any nested selection, has
    /// been completed.
    fn after_field_complete(
        &self,
        _context: &Context,
        _info: &ResolveInfo,
        _hook_context: Option<HookContext>,
        _result: Result<&Value, &GraphQLError>,
    ) {
    }
}

/// The default hooks: observe nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ExecutionHooks for NoopHooks {}
