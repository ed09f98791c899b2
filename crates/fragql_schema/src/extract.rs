//! Implicit type extraction from type-definition ASTs.
//!
//! Turns scalar/enum/input/interface/union/object definitions into a
//! resolver registry the engine can execute against, without building a
//! schema. Object definitions only produce empty placeholders; their
//! field maps come from user resolvers.

use async_graphql_parser::types::{ServiceDocument, TypeKind, TypeSystemDefinition};
use fragql_core::{
    named_type, EnumResolver, InputObjectResolver, InterfaceResolver, ObjectResolver, Resolvers,
    ScalarResolver, TypeResolver, UnionResolver, BUILTIN_SCALARS,
};
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Error raised during implicit type extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A type name is defined twice in the same document.
    #[error("duplicate type definition: {0}")]
    DuplicateType(String),
}

/// Extracts lightweight type resolvers from a type-definition AST.
///
/// `get_type_by_name` resolves named types referenced by input object
/// fields but not defined in `document` (for example scalars shared
/// across fragments); anything it returns is inserted into the output
/// registry so input coercion can find it later.
///
/// Interface implementor lists are complete only once the whole document
/// has been scanned: an explicit two-phase build (collect, then resolve)
/// makes the result independent of definition order.
pub fn extract_implicit_types<F>(
    document: &ServiceDocument,
    get_type_by_name: F,
) -> Result<Resolvers, ExtractError>
where
    F: Fn(&str) -> Option<TypeResolver>,
{
    let mut declared: FxHashSet<&str> = BUILTIN_SCALARS.iter().copied().collect();
    for definition in &document.definitions {
        if let TypeSystemDefinition::Type(ty) = definition {
            declared.insert(ty.node.name.node.as_str());
        }
    }

    let mut resolvers = Resolvers::new();
    let mut implementations: Vec<(String, Vec<String>)> = Vec::new();

    // Phase 1: collect one resolver per definition.
    for definition in &document.definitions {
        let TypeSystemDefinition::Type(ty) = definition else {
            continue;
        };
        let type_def = &ty.node;
        let name = type_def.name.node.to_string();
        if resolvers.contains(&name) && !type_def.extend {
            return Err(ExtractError::DuplicateType(name));
        }

        match &type_def.kind {
            TypeKind::Scalar => {
                resolvers.insert(name, TypeResolver::Scalar(ScalarResolver::passthrough()));
            }
            TypeKind::Enum(enum_type) => {
                let values = enum_type
                    .values
                    .iter()
                    .map(|v| v.node.value.node.to_string());
                resolvers.insert(name, TypeResolver::Enum(EnumResolver::from_names(values)));
            }
            TypeKind::Union(union_type) => {
                let types = union_type
                    .members
                    .iter()
                    .map(|m| m.node.to_string())
                    .collect();
                resolvers.insert(
                    name,
                    TypeResolver::Union(UnionResolver {
                        resolve_type: None,
                        types,
                    }),
                );
            }
            TypeKind::Interface(_) => {
                resolvers.insert(
                    name,
                    TypeResolver::Interface(InterfaceResolver {
                        resolve_type: None,
                        implemented_by: Vec::new(),
                    }),
                );
            }
            TypeKind::Object(object_type) => {
                let implements = object_type
                    .implements
                    .iter()
                    .map(|i| i.node.to_string())
                    .collect();
                implementations.push((name.clone(), implements));
                resolvers.insert(name, TypeResolver::Object(ObjectResolver::new()));
            }
            TypeKind::InputObject(input_type) => {
                let mut input = InputObjectResolver::default();
                for field in &input_type.fields {
                    let field_ty = field.node.ty.node.clone();
                    let inner = named_type(&field_ty).to_string();
                    if !declared.contains(inner.as_str()) && !resolvers.contains(&inner) {
                        if let Some(external) = get_type_by_name(&inner) {
                            resolvers.insert(inner, external);
                        }
                    }
                    input
                        .fields
                        .insert(field.node.name.node.to_string(), field_ty);
                }
                resolvers.insert(name, TypeResolver::InputObject(input));
            }
        }
    }

    // Phase 2: back-fill interface implementor lists.
    for (object_name, implements) in implementations {
        for interface_name in implements {
            if let Some(TypeResolver::Interface(interface)) = resolvers.get_mut(&interface_name) {
                if !interface.implemented_by.contains(&object_name) {
                    interface.implemented_by.push(object_name.clone());
                }
            }
        }
    }

    Ok(resolvers)
}
