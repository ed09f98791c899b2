//! Field collection.
//!
//! Walks a selection set against a concrete runtime type, expanding
//! fragment spreads by type-condition compatibility, applying `@skip` and
//! `@include`, merging duplicate response keys, and partitioning `@defer`
//! and `@stream` selections out of the synchronous set.

use async_graphql_parser::types::{
    Directive, Field, FragmentDefinition, Selection, SelectionSet,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{Name, Value as AstValue};
use fragql_core::SchemaDefinitions;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::collections::HashMap;

/// `@stream` parameters captured on a field group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDirective {
    /// The directive label, echoed on every patch.
    pub label: Option<String>,
    /// Number of items completed in the initial payload.
    pub initial_count: usize,
}

/// All selections of one response key, merged across fragments.
#[derive(Debug, Clone, Default)]
pub struct FieldGroup {
    /// The response key (alias or field name).
    pub response_key: String,
    /// The schema field name.
    pub field_name: String,
    /// Every AST node selecting this key, in document order.
    pub fields: Vec<Field>,
    /// Stream parameters, when the first node carries a live `@stream`.
    pub stream: Option<StreamDirective>,
}

impl FieldGroup {
    /// Concatenates the sub-selections of every merged node.
    pub fn merged_selection_set(&self) -> SelectionSet {
        let mut items = Vec::new();
        for field in &self.fields {
            items.extend(field.selection_set.node.items.iter().cloned());
        }
        SelectionSet { items }
    }
}

/// A fragment partitioned out of the synchronous set by `@defer`.
#[derive(Debug, Clone)]
pub struct DeferredGroup {
    /// The directive label, echoed on the patch.
    pub label: Option<String>,
    /// The fragment's selection set, collected again when the deferred
    /// unit runs.
    pub selection_set: SelectionSet,
}

/// The outcome of collecting one selection set.
#[derive(Debug, Clone, Default)]
pub struct CollectedFields {
    /// Synchronous field groups, in selection order.
    pub fields: IndexMap<String, FieldGroup>,
    /// Deferred fragments, in document order.
    pub deferred: Vec<DeferredGroup>,
    /// Type-condition names the current definitions cannot judge; the
    /// caller may extend its fragment and collect again.
    pub unknown_conditions: Vec<String>,
}

/// Collects the fields of `selection_set` for a value of `runtime_type`.
pub fn collect_fields(
    definitions: &SchemaDefinitions,
    fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
    runtime_type: &str,
    selection_set: &SelectionSet,
    variables: &HashMap<String, Value>,
) -> CollectedFields {
    let mut collected = CollectedFields::default();
    let mut visited = FxHashSet::default();
    walk(
        definitions,
        fragments,
        runtime_type,
        selection_set,
        variables,
        &mut collected,
        &mut visited,
    );
    collected
}

fn walk(
    definitions: &SchemaDefinitions,
    fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
    runtime_type: &str,
    selection_set: &SelectionSet,
    variables: &HashMap<String, Value>,
    collected: &mut CollectedFields,
    visited: &mut FxHashSet<String>,
) {
    for selection in &selection_set.items {
        match &selection.node {
            Selection::Field(field) => {
                if !should_include(&field.node.directives, variables) {
                    continue;
                }
                let response_key = field
                    .node
                    .alias
                    .as_ref()
                    .map(|a| a.node.to_string())
                    .unwrap_or_else(|| field.node.name.node.to_string());
                let stream = stream_directive(&field.node.directives, variables);
                let group = collected
                    .fields
                    .entry(response_key.clone())
                    .or_insert_with(|| FieldGroup {
                        response_key,
                        field_name: field.node.name.node.to_string(),
                        ..FieldGroup::default()
                    });
                if group.stream.is_none() {
                    group.stream = stream;
                }
                group.fields.push(field.node.clone());
            }
            Selection::FragmentSpread(spread) => {
                if !should_include(&spread.node.directives, variables) {
                    continue;
                }
                let name = spread.node.fragment_name.node.as_str();
                let Some(fragment) = fragments.get(name) else {
                    continue;
                };
                let condition = fragment.node.type_condition.node.on.node.as_str();
                match condition_matches(definitions, condition, runtime_type) {
                    ConditionMatch::No => continue,
                    ConditionMatch::Unknown => {
                        collected.unknown_conditions.push(condition.to_string());
                        continue;
                    }
                    ConditionMatch::Yes => {}
                }
                if let Some(label) = defer_directive(&spread.node.directives, variables) {
                    collected.deferred.push(DeferredGroup {
                        label,
                        selection_set: fragment.node.selection_set.node.clone(),
                    });
                    continue;
                }
                if visited.insert(name.to_string()) {
                    walk(
                        definitions,
                        fragments,
                        runtime_type,
                        &fragment.node.selection_set.node,
                        variables,
                        collected,
                        visited,
                    );
                }
            }
            Selection::InlineFragment(inline) => {
                if !should_include(&inline.node.directives, variables) {
                    continue;
                }
                if let Some(condition) = &inline.node.type_condition {
                    match condition_matches(
                        definitions,
                        condition.node.on.node.as_str(),
                        runtime_type,
                    ) {
                        ConditionMatch::No => continue,
                        ConditionMatch::Unknown => {
                            collected
                                .unknown_conditions
                                .push(condition.node.on.node.to_string());
                            continue;
                        }
                        ConditionMatch::Yes => {}
                    }
                }
                if let Some(label) = defer_directive(&inline.node.directives, variables) {
                    collected.deferred.push(DeferredGroup {
                        label,
                        selection_set: inline.node.selection_set.node.clone(),
                    });
                    continue;
                }
                walk(
                    definitions,
                    fragments,
                    runtime_type,
                    &inline.node.selection_set.node,
                    variables,
                    collected,
                    visited,
                );
            }
        }
    }
}

enum ConditionMatch {
    Yes,
    No,
    Unknown,
}

fn condition_matches(
    definitions: &SchemaDefinitions,
    condition: &str,
    runtime_type: &str,
) -> ConditionMatch {
    if condition == runtime_type || definitions.is_sub_type(condition, runtime_type) {
        ConditionMatch::Yes
    } else if definitions.contains(condition) {
        ConditionMatch::No
    } else {
        ConditionMatch::Unknown
    }
}

/// Evaluates `@skip`/`@include`, resolving `if:` through variables.
fn should_include(directives: &[Positioned<Directive>], variables: &HashMap<String, Value>) -> bool {
    for directive in directives {
        match directive.node.name.node.as_str() {
            "skip" => {
                if bool_argument(&directive.node, "if", variables).unwrap_or(false) {
                    return false;
                }
            }
            "include" => {
                if !bool_argument(&directive.node, "if", variables).unwrap_or(true) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// Returns the label of a live `@defer`; `if: false` disables it.
fn defer_directive(
    directives: &[Positioned<Directive>],
    variables: &HashMap<String, Value>,
) -> Option<Option<String>> {
    let directive = directives.iter().find(|d| d.node.name.node.as_str() == "defer")?;
    if !bool_argument(&directive.node, "if", variables).unwrap_or(true) {
        return None;
    }
    Some(string_argument(&directive.node, "label", variables))
}

/// Returns the parameters of a live `@stream`; `if: false` disables it.
fn stream_directive(
    directives: &[Positioned<Directive>],
    variables: &HashMap<String, Value>,
) -> Option<StreamDirective> {
    let directive = directives.iter().find(|d| d.node.name.node.as_str() == "stream")?;
    if !bool_argument(&directive.node, "if", variables).unwrap_or(true) {
        return None;
    }
    Some(StreamDirective {
        label: string_argument(&directive.node, "label", variables),
        initial_count: int_argument(&directive.node, "initialCount", variables).unwrap_or(0),
    })
}

fn bool_argument(
    directive: &Directive,
    name: &str,
    variables: &HashMap<String, Value>,
) -> Option<bool> {
    match &directive.get_argument(name)?.node {
        AstValue::Boolean(b) => Some(*b),
        AstValue::Variable(var) => variables.get(var.as_str())?.as_bool(),
        _ => None,
    }
}

fn string_argument(
    directive: &Directive,
    name: &str,
    variables: &HashMap<String, Value>,
) -> Option<String> {
    match &directive.get_argument(name)?.node {
        AstValue::String(s) => Some(s.clone()),
        AstValue::Variable(var) => variables
            .get(var.as_str())
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn int_argument(
    directive: &Directive,
    name: &str,
    variables: &HashMap<String, Value>,
) -> Option<usize> {
    match &directive.get_argument(name)?.node {
        AstValue::Number(n) => n.as_u64().map(|n| n as usize),
        AstValue::Variable(var) => variables
            .get(var.as_str())
            .and_then(|v| v.as_u64())
            .map(|n| n as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::types::{DocumentOperations, ExecutableDocument};
    use async_graphql_parser::{parse_query, parse_schema};
    use fragql_schema::definitions_from_sdl;

    const SDL: &str = r#"
        type Query { node: Node films: [Film] }
        interface Node { id: ID! }
        type Film implements Node { id: ID! title: String }
        type Person implements Node { id: ID! name: String }
    "#;

    fn collect(query: &str, variables: HashMap<String, Value>) -> CollectedFields {
        let (definitions, _) = definitions_from_sdl(&parse_schema(SDL).unwrap());
        let document = parse_query(query).unwrap();
        let selection_set = root_selection(&document);
        collect_fields(
            &definitions,
            &document.fragments,
            "Query",
            &selection_set,
            &variables,
        )
    }

    fn root_selection(document: &ExecutableDocument) -> SelectionSet {
        match &document.operations {
            DocumentOperations::Single(op) => op.node.selection_set.node.clone(),
            DocumentOperations::Multiple(_) => panic!("expected a single operation"),
        }
    }

    #[test]
    fn test_skip_and_include() {
        let collected = collect(
            r#"query($yes: Boolean!) {
                a: films @skip(if: true) { title }
                b: films @include(if: $yes) { title }
                c: films @include(if: false) { title }
            }"#,
            HashMap::from([("yes".to_string(), Value::Bool(true))]),
        );

        let keys: Vec<&String> = collected.fields.keys().collect();
        assert_eq!(keys, vec!["b"]);
    }

    #[test]
    fn test_duplicate_keys_are_merged() {
        let collected = collect(
            "{ films { title } films { __typename } }",
            HashMap::new(),
        );

        assert_eq!(collected.fields.len(), 1);
        let group = collected.fields.get("films").unwrap();
        assert_eq!(group.fields.len(), 2);
        assert_eq!(group.merged_selection_set().items.len(), 2);
    }

    #[test]
    fn test_defer_partitions_fragment_out() {
        let collected = collect(
            r#"{
                films { title }
                ... on Query @defer(label: "late") { node { id } }
            }"#,
            HashMap::new(),
        );

        assert_eq!(collected.fields.len(), 1);
        assert_eq!(collected.deferred.len(), 1);
        assert_eq!(collected.deferred[0].label.as_deref(), Some("late"));
    }

    #[test]
    fn test_defer_if_false_degrades_to_inline() {
        let collected = collect(
            "{ ... on Query @defer(if: false) { films { title } } }",
            HashMap::new(),
        );

        assert!(collected.deferred.is_empty());
        assert!(collected.fields.contains_key("films"));
    }

    #[test]
    fn test_stream_captured_on_field_group() {
        let collected = collect(
            r#"{ films @stream(label: "rest", initialCount: 2) { title } }"#,
            HashMap::new(),
        );

        let group = collected.fields.get("films").unwrap();
        assert_eq!(
            group.stream,
            Some(StreamDirective {
                label: Some("rest".to_string()),
                initial_count: 2,
            })
        );
    }

    #[test]
    fn test_condition_against_runtime_type() {
        let (definitions, _) = definitions_from_sdl(&parse_schema(SDL).unwrap());
        let document = parse_query(
            "{ ... on Film { title } ... on Person { name } }",
        )
        .unwrap();
        let selection_set = root_selection(&document);

        let collected = collect_fields(
            &definitions,
            &document.fragments,
            "Film",
            &selection_set,
            &HashMap::new(),
        );

        assert!(collected.fields.contains_key("title"));
        assert!(!collected.fields.contains_key("name"));
    }

    #[test]
    fn test_unknown_condition_is_reported() {
        let (definitions, _) = definitions_from_sdl(&parse_schema(SDL).unwrap());
        let document = parse_query("{ ... on Droid { serial } }").unwrap();
        let selection_set = root_selection(&document);

        let collected = collect_fields(
            &definitions,
            &document.fragments,
            "Film",
            &selection_set,
            &HashMap::new(),
        );

        assert!(collected.fields.is_empty());
        assert_eq!(collected.unknown_conditions, vec!["Droid"]);
    }
}
