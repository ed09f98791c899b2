//! Lightweight type descriptors.
//!
//! A [`SchemaDefinitions`] is the partial, possibly-lazily-extended view of
//! a schema that execution runs against: just enough per-type information
//! (field return types, abstract membership, enum values) to interpret a
//! document, never a materialized schema object.

use async_graphql_parser::types::{BaseType, OperationType, Type};
use indexmap::IndexMap;
use serde_json::Value;

/// Names of the built-in scalars seeded into every definition set.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Descriptor of one output field: annotated return type plus argument
/// descriptors.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// The annotated return type.
    pub ty: Type,
    /// Argument descriptors keyed by argument name.
    pub arguments: IndexMap<String, InputValueDescriptor>,
}

impl FieldDescriptor {
    /// Creates a descriptor with no arguments.
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            arguments: IndexMap::new(),
        }
    }

    /// Adds an argument descriptor.
    pub fn argument(mut self, name: impl Into<String>, descriptor: InputValueDescriptor) -> Self {
        self.arguments.insert(name.into(), descriptor);
        self
    }
}

/// Descriptor of one input value (argument or input object field).
#[derive(Debug, Clone)]
pub struct InputValueDescriptor {
    /// The annotated input type.
    pub ty: Type,
    /// Default value, when declared.
    pub default: Option<Value>,
}

impl InputValueDescriptor {
    /// Creates a descriptor without a default.
    pub fn new(ty: Type) -> Self {
        Self { ty, default: None }
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Descriptor of an object type.
#[derive(Debug, Clone, Default)]
pub struct ObjectDescriptor {
    /// Output fields keyed by field name.
    pub fields: IndexMap<String, FieldDescriptor>,
    /// Interfaces the type declares.
    pub implements: Vec<String>,
}

/// Descriptor of an interface type.
#[derive(Debug, Clone, Default)]
pub struct InterfaceDescriptor {
    /// Output fields keyed by field name.
    pub fields: IndexMap<String, FieldDescriptor>,
    /// Concrete type names known to implement the interface.
    pub implemented_by: Vec<String>,
}

/// A lightweight type descriptor, tagged by kind.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Scalar,
    Enum { values: Vec<String> },
    Object(ObjectDescriptor),
    Interface(InterfaceDescriptor),
    Union { members: Vec<String> },
    InputObject { fields: IndexMap<String, InputValueDescriptor> },
}

impl TypeDescriptor {
    /// Kind name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Enum { .. } => "enum",
            Self::Object(_) => "object",
            Self::Interface(_) => "interface",
            Self::Union { .. } => "union",
            Self::InputObject { .. } => "input object",
        }
    }

    /// Returns true for interface and union descriptors.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union { .. })
    }
}

/// The registry of type descriptors available to one execution.
#[derive(Debug, Clone)]
pub struct SchemaDefinitions {
    types: IndexMap<String, TypeDescriptor>,
}

impl Default for SchemaDefinitions {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaDefinitions {
    /// Creates a registry seeded with the built-in scalars.
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        for name in BUILTIN_SCALARS {
            types.insert(name.to_string(), TypeDescriptor::Scalar);
        }
        Self { types }
    }

    /// Inserts a descriptor, replacing any existing entry.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: TypeDescriptor) {
        self.types.insert(name.into(), descriptor);
    }

    /// Builder-style insertion.
    pub fn with_type(mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Gets a descriptor by type name.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Gets a mutable descriptor by type name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDescriptor> {
        self.types.get_mut(name)
    }

    /// Returns true if the type is known.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Looks up an output field on an object or interface type.
    pub fn field(&self, parent_type: &str, field_name: &str) -> Option<&FieldDescriptor> {
        match self.types.get(parent_type)? {
            TypeDescriptor::Object(o) => o.fields.get(field_name),
            TypeDescriptor::Interface(i) => i.fields.get(field_name),
            _ => None,
        }
    }

    /// Iterates over all descriptors.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypeDescriptor)> {
        self.types.iter()
    }

    /// Number of known types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if only nothing is known (built-ins excluded).
    pub fn is_empty(&self) -> bool {
        self.types.len() <= BUILTIN_SCALARS.len()
    }

    /// Returns true if `concrete` is a possible runtime type of the
    /// abstract type `abstract_name`.
    pub fn is_sub_type(&self, abstract_name: &str, concrete: &str) -> bool {
        match self.types.get(abstract_name) {
            Some(TypeDescriptor::Interface(i)) if i.implemented_by.iter().any(|t| t == concrete) => {
                return true;
            }
            Some(TypeDescriptor::Union { members }) if members.iter().any(|t| t == concrete) => {
                return true;
            }
            _ => {}
        }
        // The object side may know about the interface even when the
        // interface descriptor's implementor list is partial.
        matches!(
            self.types.get(concrete),
            Some(TypeDescriptor::Object(o)) if o.implements.iter().any(|t| t == abstract_name)
        )
    }

    /// Returns true if a fragment with type condition `condition` applies
    /// to a value of runtime type `runtime_type`.
    pub fn type_applies(&self, condition: &str, runtime_type: &str) -> bool {
        condition == runtime_type || self.is_sub_type(condition, runtime_type)
    }

    /// Merges another registry in, append-only.
    ///
    /// Existing descriptors win; object and interface descriptors gain
    /// missing fields, and membership lists take the union.
    pub fn merge(&mut self, other: SchemaDefinitions) {
        for (name, incoming) in other.types {
            match self.types.get_mut(&name) {
                None => {
                    self.types.insert(name, incoming);
                }
                Some(TypeDescriptor::Object(existing)) => {
                    if let TypeDescriptor::Object(incoming) = incoming {
                        for (field, descriptor) in incoming.fields {
                            existing.fields.entry(field).or_insert(descriptor);
                        }
                        for iface in incoming.implements {
                            if !existing.implements.contains(&iface) {
                                existing.implements.push(iface);
                            }
                        }
                    }
                }
                Some(TypeDescriptor::Interface(existing)) => {
                    if let TypeDescriptor::Interface(incoming) = incoming {
                        for (field, descriptor) in incoming.fields {
                            existing.fields.entry(field).or_insert(descriptor);
                        }
                        for ty in incoming.implemented_by {
                            if !existing.implemented_by.contains(&ty) {
                                existing.implemented_by.push(ty);
                            }
                        }
                    }
                }
                Some(TypeDescriptor::Union { members: existing }) => {
                    if let TypeDescriptor::Union { members } = incoming {
                        for member in members {
                            if !existing.contains(&member) {
                                existing.push(member);
                            }
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
}

/// Innermost named type of a wrapped type.
pub fn named_type(ty: &Type) -> &str {
    match &ty.base {
        BaseType::Named(name) => name.as_str(),
        BaseType::List(inner) => named_type(inner),
    }
}

/// The operation root type names of a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationTypes {
    /// Query root type name.
    pub query: Option<String>,
    /// Mutation root type name.
    pub mutation: Option<String>,
    /// Subscription root type name.
    pub subscription: Option<String>,
}

impl OperationTypes {
    /// Creates operation types using the conventional defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the query root type.
    pub fn with_query(mut self, name: impl Into<String>) -> Self {
        self.query = Some(name.into());
        self
    }

    /// Sets the mutation root type.
    pub fn with_mutation(mut self, name: impl Into<String>) -> Self {
        self.mutation = Some(name.into());
        self
    }

    /// Sets the subscription root type.
    pub fn with_subscription(mut self, name: impl Into<String>) -> Self {
        self.subscription = Some(name.into());
        self
    }

    /// The root type name for an operation kind, falling back to the
    /// conventional names.
    pub fn root_for(&self, operation: OperationType) -> &str {
        match operation {
            OperationType::Query => self.query.as_deref().unwrap_or("Query"),
            OperationType::Mutation => self.mutation.as_deref().unwrap_or("Mutation"),
            OperationType::Subscription => self.subscription.as_deref().unwrap_or("Subscription"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> Type {
        Type::new(s).unwrap()
    }

    #[test]
    fn test_builtin_scalars_seeded() {
        let defs = SchemaDefinitions::new();
        for name in BUILTIN_SCALARS {
            assert!(matches!(defs.get(name), Some(TypeDescriptor::Scalar)));
        }
        assert!(defs.is_empty());
    }

    #[test]
    fn test_field_lookup() {
        let mut defs = SchemaDefinitions::new();
        let mut object = ObjectDescriptor::default();
        object
            .fields
            .insert("title".to_string(), FieldDescriptor::new(ty("String!")));
        defs.insert("Film", TypeDescriptor::Object(object));

        assert!(defs.field("Film", "title").is_some());
        assert!(defs.field("Film", "missing").is_none());
        assert!(defs.field("String", "title").is_none());
    }

    #[test]
    fn test_is_sub_type_via_object_implements() {
        let mut defs = SchemaDefinitions::new();
        defs.insert(
            "Node",
            TypeDescriptor::Interface(InterfaceDescriptor::default()),
        );
        defs.insert(
            "Film",
            TypeDescriptor::Object(ObjectDescriptor {
                fields: IndexMap::new(),
                implements: vec!["Node".to_string()],
            }),
        );

        assert!(defs.is_sub_type("Node", "Film"));
        assert!(defs.type_applies("Node", "Film"));
        assert!(defs.type_applies("Film", "Film"));
        assert!(!defs.type_applies("Node", "String"));
    }

    #[test]
    fn test_merge_is_append_only() {
        let mut base = SchemaDefinitions::new();
        let mut object = ObjectDescriptor::default();
        object
            .fields
            .insert("a".to_string(), FieldDescriptor::new(ty("Int!")));
        base.insert("Thing", TypeDescriptor::Object(object));

        let mut incoming = SchemaDefinitions::new();
        let mut object = ObjectDescriptor::default();
        object
            .fields
            .insert("a".to_string(), FieldDescriptor::new(ty("String")));
        object
            .fields
            .insert("b".to_string(), FieldDescriptor::new(ty("String")));
        incoming.insert("Thing", TypeDescriptor::Object(object));
        incoming.insert("Other", TypeDescriptor::Scalar);

        base.merge(incoming);

        let descriptor = base.field("Thing", "a").unwrap();
        // Existing field kept its original type.
        assert!(!descriptor.ty.nullable);
        assert!(base.field("Thing", "b").is_some());
        assert!(base.contains("Other"));
    }

    #[test]
    fn test_named_type() {
        assert_eq!(named_type(&ty("[[Film!]!]!")), "Film");
        assert_eq!(named_type(&ty("String")), "String");
    }

    #[test]
    fn test_operation_type_defaults() {
        let types = OperationTypes::new().with_query("Root");
        assert_eq!(types.root_for(OperationType::Query), "Root");
        assert_eq!(types.root_for(OperationType::Mutation), "Mutation");
    }
}
