//! Schema fragments for fragql.
//!
//! This crate owns everything that stands in for a materialized schema:
//! - `fragment`: schema fragments and the on-demand fragment loader
//! - `annotate`: pairing documents with minimal descriptor closures
//! - `extract`: implicit type resolvers from type-definition ASTs
//! - `compose`: resolver-map merge and subtract

pub mod annotate;
pub mod compose;
pub mod extract;
pub mod fragment;

pub use annotate::{annotate_document, definitions_from_sdl, AnnotatedDocument, AnnotateError};
pub use compose::{merge_resolvers, subtract_resolvers};
pub use extract::{extract_implicit_types, ExtractError};
pub use fragment::{FragmentLoadResult, FragmentRequest, SchemaFragment, SchemaFragmentLoader};
