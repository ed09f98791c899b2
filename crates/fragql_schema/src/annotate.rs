//! Document annotation against type definitions.
//!
//! [`annotate_document`] pairs an executable document with the smallest
//! set of type descriptors needed to execute it. The output travels with
//! the document, so the executor never needs the full SDL: hosts ship
//! annotated documents to clients that hold resolvers but no schema.

use std::collections::HashMap;

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, FragmentDefinition, OperationDefinition, Selection,
    SelectionSet, ServiceDocument, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_graphql_parser::Positioned;
use async_graphql_value::Name;
use fragql_core::{
    named_type, FieldDescriptor, InputValueDescriptor, InterfaceDescriptor, ObjectDescriptor,
    OperationTypes, Resolvers, SchemaDefinitions, TypeDescriptor,
};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::fragment::SchemaFragment;

/// Error raised while annotating a document.
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// A named type referenced by the document is not defined.
    #[error("unknown type: {0}")]
    UnknownType(String),
    /// A selected field is not defined on its parent type.
    #[error("unknown field: {parent_type}.{field_name}")]
    UnknownField {
        parent_type: String,
        field_name: String,
    },
    /// A fragment spread references an undefined fragment.
    #[error("unknown fragment: {0}")]
    UnknownFragment(String),
}

/// Builds the complete descriptor registry for a type-definition AST.
///
/// Type extensions merge into their base definition; interface
/// implementor lists are back-filled after the whole document is scanned.
pub fn definitions_from_sdl(document: &ServiceDocument) -> (SchemaDefinitions, OperationTypes) {
    let mut definitions = SchemaDefinitions::new();
    let mut operation_types = OperationTypes::new();
    let mut implementations: Vec<(String, Vec<String>)> = Vec::new();

    for definition in &document.definitions {
        match definition {
            TypeSystemDefinition::Schema(schema) => {
                if let Some(query) = &schema.node.query {
                    operation_types.query = Some(query.node.to_string());
                }
                if let Some(mutation) = &schema.node.mutation {
                    operation_types.mutation = Some(mutation.node.to_string());
                }
                if let Some(subscription) = &schema.node.subscription {
                    operation_types.subscription = Some(subscription.node.to_string());
                }
            }
            TypeSystemDefinition::Type(ty) => {
                let name = ty.node.name.node.to_string();
                let descriptor = descriptor_from_definition(&ty.node, &mut implementations);
                if ty.node.extend && definitions.contains(&name) {
                    definitions.merge(SchemaDefinitions::new().with_type(name, descriptor));
                } else {
                    definitions.insert(name, descriptor);
                }
            }
            TypeSystemDefinition::Directive(_) => {}
        }
    }

    for (object_name, implements) in implementations {
        for interface_name in implements {
            if let Some(TypeDescriptor::Interface(interface)) =
                definitions.get_mut(&interface_name)
            {
                if !interface.implemented_by.contains(&object_name) {
                    interface.implemented_by.push(object_name.clone());
                }
            }
        }
    }

    (definitions, operation_types)
}

fn descriptor_from_definition(
    definition: &TypeDefinition,
    implementations: &mut Vec<(String, Vec<String>)>,
) -> TypeDescriptor {
    match &definition.kind {
        TypeKind::Scalar => TypeDescriptor::Scalar,
        TypeKind::Enum(e) => TypeDescriptor::Enum {
            values: e
                .values
                .iter()
                .map(|v| v.node.value.node.to_string())
                .collect(),
        },
        TypeKind::Union(u) => TypeDescriptor::Union {
            members: u.members.iter().map(|m| m.node.to_string()).collect(),
        },
        TypeKind::Object(o) => {
            let implements: Vec<String> = o.implements.iter().map(|i| i.node.to_string()).collect();
            implementations.push((definition.name.node.to_string(), implements.clone()));
            let mut descriptor = ObjectDescriptor {
                fields: IndexMap::new(),
                implements,
            };
            for field in &o.fields {
                descriptor.fields.insert(
                    field.node.name.node.to_string(),
                    field_descriptor(&field.node),
                );
            }
            TypeDescriptor::Object(descriptor)
        }
        TypeKind::Interface(i) => {
            let mut descriptor = InterfaceDescriptor::default();
            for field in &i.fields {
                descriptor.fields.insert(
                    field.node.name.node.to_string(),
                    field_descriptor(&field.node),
                );
            }
            TypeDescriptor::Interface(descriptor)
        }
        TypeKind::InputObject(io) => {
            let mut fields = IndexMap::new();
            for field in &io.fields {
                fields.insert(
                    field.node.name.node.to_string(),
                    input_value_descriptor(&field.node),
                );
            }
            TypeDescriptor::InputObject { fields }
        }
    }
}

fn field_descriptor(field: &async_graphql_parser::types::FieldDefinition) -> FieldDescriptor {
    let mut descriptor = FieldDescriptor::new(field.ty.node.clone());
    for argument in &field.arguments {
        descriptor.arguments.insert(
            argument.node.name.node.to_string(),
            input_value_descriptor(&argument.node),
        );
    }
    descriptor
}

fn input_value_descriptor(
    value: &async_graphql_parser::types::InputValueDefinition,
) -> InputValueDescriptor {
    let mut descriptor = InputValueDescriptor::new(value.ty.node.clone());
    if let Some(default) = &value.default_value {
        descriptor.default = serde_json::to_value(&default.node).ok();
    }
    descriptor
}

/// A document plus the minimal descriptor registries needed to execute it.
#[derive(Debug, Clone)]
pub struct AnnotatedDocument {
    /// The executable document.
    pub document: ExecutableDocument,
    /// Per-operation descriptor closures; the anonymous operation is
    /// keyed by the empty string.
    pub operation_definitions: IndexMap<String, SchemaDefinitions>,
    /// Per-fragment descriptor closures, keyed by fragment name.
    pub fragment_definitions: IndexMap<String, SchemaDefinitions>,
    /// Operation root type names.
    pub operation_types: OperationTypes,
}

impl AnnotatedDocument {
    /// Merges every per-operation and per-fragment closure into one
    /// registry.
    pub fn merged_definitions(&self) -> SchemaDefinitions {
        let mut merged = SchemaDefinitions::new();
        for (_, definitions) in &self.operation_definitions {
            merged.merge(definitions.clone());
        }
        for (_, definitions) in &self.fragment_definitions {
            merged.merge(definitions.clone());
        }
        merged
    }

    /// Builds a schema fragment pairing the merged descriptor closure
    /// with a resolver map.
    pub fn to_fragment(&self, schema_id: impl Into<String>, resolvers: Resolvers) -> SchemaFragment {
        SchemaFragment::new(schema_id)
            .with_definitions(self.merged_definitions())
            .with_resolvers(resolvers)
            .with_operation_types(self.operation_types.clone())
    }
}

/// Annotates a document with the minimal descriptor closure per
/// operation and per fragment.
///
/// The closure of an operation covers every field it can touch: the
/// transitive selection sets (through fragment spreads), the input type
/// graphs of every argument and variable, and the membership lists of
/// every abstract type crossed.
pub fn annotate_document(
    type_definitions: &ServiceDocument,
    document: ExecutableDocument,
) -> Result<AnnotatedDocument, AnnotateError> {
    let (full, operation_types) = definitions_from_sdl(type_definitions);
    let annotator = Annotator {
        full: &full,
        fragments: &document.fragments,
    };

    let mut fragment_definitions = IndexMap::new();
    for (name, fragment) in &document.fragments {
        let mut out = SchemaDefinitions::new();
        let mut visited = FxHashSet::default();
        visited.insert(name.to_string());
        annotator.walk_fragment(&mut out, &fragment.node, &mut visited)?;
        fragment_definitions.insert(name.to_string(), out);
    }

    let mut operation_definitions = IndexMap::new();
    match &document.operations {
        DocumentOperations::Single(operation) => {
            let out = annotator.walk_operation(&operation.node, &operation_types)?;
            operation_definitions.insert(String::new(), out);
        }
        DocumentOperations::Multiple(operations) => {
            for (name, operation) in operations {
                let out = annotator.walk_operation(&operation.node, &operation_types)?;
                operation_definitions.insert(name.to_string(), out);
            }
        }
    }

    Ok(AnnotatedDocument {
        document,
        operation_definitions,
        fragment_definitions,
        operation_types,
    })
}

struct Annotator<'a> {
    full: &'a SchemaDefinitions,
    fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
}

impl Annotator<'_> {
    fn walk_operation(
        &self,
        operation: &OperationDefinition,
        operation_types: &OperationTypes,
    ) -> Result<SchemaDefinitions, AnnotateError> {
        let mut out = SchemaDefinitions::new();
        for variable in &operation.variable_definitions {
            self.add_input_type(&mut out, named_type(&variable.node.var_type.node))?;
        }
        let root = operation_types.root_for(operation.ty).to_string();
        self.ensure_type(&mut out, &root)?;
        let mut visited = FxHashSet::default();
        self.walk_selection_set(&mut out, &root, &operation.selection_set.node, &mut visited)?;
        Ok(out)
    }

    fn walk_fragment(
        &self,
        out: &mut SchemaDefinitions,
        fragment: &FragmentDefinition,
        visited: &mut FxHashSet<String>,
    ) -> Result<(), AnnotateError> {
        let condition = fragment.type_condition.node.on.node.to_string();
        self.ensure_type(out, &condition)?;
        self.walk_selection_set(out, &condition, &fragment.selection_set.node, visited)
    }

    fn walk_selection_set(
        &self,
        out: &mut SchemaDefinitions,
        parent: &str,
        selection_set: &SelectionSet,
        visited: &mut FxHashSet<String>,
    ) -> Result<(), AnnotateError> {
        for selection in &selection_set.items {
            match &selection.node {
                Selection::Field(field) => {
                    let field_name = field.node.name.node.as_str();
                    if field_name == "__typename" {
                        continue;
                    }
                    let Some(descriptor) = self.full.field(parent, field_name) else {
                        return Err(AnnotateError::UnknownField {
                            parent_type: parent.to_string(),
                            field_name: field_name.to_string(),
                        });
                    };
                    let descriptor = descriptor.clone();
                    for argument in descriptor.arguments.values() {
                        self.add_input_type(out, named_type(&argument.ty))?;
                    }
                    let return_type = named_type(&descriptor.ty).to_string();
                    self.insert_field(out, parent, field_name, descriptor)?;
                    self.ensure_type(out, &return_type)?;
                    if !field.node.selection_set.node.items.is_empty() {
                        self.walk_selection_set(
                            out,
                            &return_type,
                            &field.node.selection_set.node,
                            visited,
                        )?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.node.fragment_name.node.as_str();
                    let Some(fragment) = self.fragments.get(name) else {
                        return Err(AnnotateError::UnknownFragment(name.to_string()));
                    };
                    if visited.insert(name.to_string()) {
                        self.walk_fragment(out, &fragment.node, visited)?;
                    }
                }
                Selection::InlineFragment(inline) => {
                    let condition = inline
                        .node
                        .type_condition
                        .as_ref()
                        .map(|c| c.node.on.node.to_string());
                    let target = condition.as_deref().unwrap_or(parent);
                    self.ensure_type(out, target)?;
                    self.walk_selection_set(
                        out,
                        target,
                        &inline.node.selection_set.node,
                        visited,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Inserts a type shell: membership lists without fields. Field
    /// descriptors are only added for fields the document selects.
    fn ensure_type(&self, out: &mut SchemaDefinitions, name: &str) -> Result<(), AnnotateError> {
        if out.contains(name) {
            return Ok(());
        }
        let Some(descriptor) = self.full.get(name) else {
            return Err(AnnotateError::UnknownType(name.to_string()));
        };
        let shell = match descriptor {
            TypeDescriptor::Object(o) => TypeDescriptor::Object(ObjectDescriptor {
                fields: IndexMap::new(),
                implements: o.implements.clone(),
            }),
            TypeDescriptor::Interface(i) => TypeDescriptor::Interface(InterfaceDescriptor {
                fields: IndexMap::new(),
                implemented_by: i.implemented_by.clone(),
            }),
            other => other.clone(),
        };
        out.insert(name, shell);
        // Union members must be resolvable at runtime even when the
        // document never names them in a type condition.
        if let TypeDescriptor::Union { members } = descriptor {
            for member in members.clone() {
                self.ensure_type(out, &member)?;
            }
        }
        Ok(())
    }

    fn insert_field(
        &self,
        out: &mut SchemaDefinitions,
        parent: &str,
        field_name: &str,
        descriptor: FieldDescriptor,
    ) -> Result<(), AnnotateError> {
        self.ensure_type(out, parent)?;
        match out.get_mut(parent) {
            Some(TypeDescriptor::Object(o)) => {
                o.fields.insert(field_name.to_string(), descriptor);
            }
            Some(TypeDescriptor::Interface(i)) => {
                i.fields.insert(field_name.to_string(), descriptor);
            }
            _ => {
                return Err(AnnotateError::UnknownField {
                    parent_type: parent.to_string(),
                    field_name: field_name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Clones an input type and its transitive field types into `out`.
    fn add_input_type(&self, out: &mut SchemaDefinitions, name: &str) -> Result<(), AnnotateError> {
        if out.contains(name) {
            return Ok(());
        }
        let Some(descriptor) = self.full.get(name) else {
            return Err(AnnotateError::UnknownType(name.to_string()));
        };
        out.insert(name, descriptor.clone());
        if let Some(TypeDescriptor::InputObject { fields }) = out.get(name) {
            let field_types: Vec<String> = fields
                .values()
                .map(|f| named_type(&f.ty).to_string())
                .collect();
            for field_type in field_types {
                self.add_input_type(out, &field_type)?;
            }
        }
        Ok(())
    }
}
