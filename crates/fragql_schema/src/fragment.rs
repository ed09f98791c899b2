//! Schema fragments and on-demand fragment loading.

use async_trait::async_trait;
use fragql_core::{Context, GraphQLError, OperationTypes, Resolvers, SchemaDefinitions};

/// A partial, self-consistent view of a schema: just enough type
/// descriptors and resolvers to execute part of a query.
///
/// Fragments with different `schema_id`s may be merged into one during a
/// single execution; merges are append-only.
#[derive(Debug, Clone)]
pub struct SchemaFragment {
    /// Identifier of the schema this fragment was derived from.
    pub schema_id: String,
    /// Type descriptors known to this fragment.
    pub definitions: SchemaDefinitions,
    /// User resolvers known to this fragment.
    pub resolvers: Resolvers,
    /// Operation root type names.
    pub operation_types: OperationTypes,
}

impl SchemaFragment {
    /// Creates an empty fragment.
    pub fn new(schema_id: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            definitions: SchemaDefinitions::new(),
            resolvers: Resolvers::new(),
            operation_types: OperationTypes::new(),
        }
    }

    /// Sets the definitions.
    pub fn with_definitions(mut self, definitions: SchemaDefinitions) -> Self {
        self.definitions = definitions;
        self
    }

    /// Sets the resolvers.
    pub fn with_resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Sets the operation root type names.
    pub fn with_operation_types(mut self, operation_types: OperationTypes) -> Self {
        self.operation_types = operation_types;
        self
    }

    /// Merges another fragment in, append-only.
    ///
    /// Existing definitions, resolvers and operation types always win;
    /// the incoming fragment only fills gaps. The fragment keeps its own
    /// `schema_id`.
    pub fn merge(&mut self, other: SchemaFragment) {
        self.definitions.merge(other.definitions);
        self.resolvers.merge_missing(other.resolvers);
        if self.operation_types.query.is_none() {
            self.operation_types.query = other.operation_types.query;
        }
        if self.operation_types.mutation.is_none() {
            self.operation_types.mutation = other.operation_types.mutation;
        }
        if self.operation_types.subscription.is_none() {
            self.operation_types.subscription = other.operation_types.subscription;
        }
    }
}

/// A request for type information the current fragment cannot answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentRequest {
    /// The return type of `parent_type_name.field_name` is unknown.
    ReturnType {
        parent_type_name: String,
        field_name: String,
    },
    /// `runtime_type_name` is not a known member of the abstract type.
    RuntimeType {
        abstract_type_name: String,
        runtime_type_name: String,
    },
}

impl FragmentRequest {
    /// De-duplication key for this request.
    pub fn key(&self) -> String {
        match self {
            Self::ReturnType {
                parent_type_name,
                field_name,
            } => format!("return-type:{parent_type_name}.{field_name}"),
            Self::RuntimeType {
                abstract_type_name,
                runtime_type_name,
            } => format!("runtime-type:{abstract_type_name}.{runtime_type_name}"),
        }
    }
}

impl std::fmt::Display for FragmentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Result of a successful fragment load.
pub struct FragmentLoadResult {
    /// The fragment to merge into the current one.
    pub fragment: SchemaFragment,
    /// Replacement context value, when the loader produced one.
    pub context: Option<Context>,
}

impl FragmentLoadResult {
    /// Creates a result carrying only a fragment.
    pub fn new(fragment: SchemaFragment) -> Self {
        Self {
            fragment,
            context: None,
        }
    }

    /// Attaches a merged context value.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}

/// Extends a schema fragment on demand when execution encounters a type
/// or field it does not yet know.
#[async_trait]
pub trait SchemaFragmentLoader: Send + Sync {
    /// Loads the fragment answering `request`.
    ///
    /// A rejection is treated as a structural error for the field that
    /// triggered the request, never as a fatal execution error.
    async fn load(
        &self,
        current: &SchemaFragment,
        context: &Context,
        request: &FragmentRequest,
    ) -> Result<FragmentLoadResult, GraphQLError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::types::Type;
    use fragql_core::{FieldDescriptor, ObjectDescriptor, TypeDescriptor};

    fn fragment_with_field(id: &str, ty: &str, field: &str, field_ty: &str) -> SchemaFragment {
        let mut defs = SchemaDefinitions::new();
        let mut object = ObjectDescriptor::default();
        object.fields.insert(
            field.to_string(),
            FieldDescriptor::new(Type::new(field_ty).unwrap()),
        );
        defs.insert(ty, TypeDescriptor::Object(object));
        SchemaFragment::new(id).with_definitions(defs)
    }

    #[test]
    fn test_merge_keeps_existing_definitions() {
        let mut base = fragment_with_field("a", "Query", "film", "Film");
        let incoming = fragment_with_field("b", "Query", "person", "Person");

        base.merge(incoming);

        assert_eq!(base.schema_id, "a");
        assert!(base.definitions.field("Query", "film").is_some());
        assert!(base.definitions.field("Query", "person").is_some());
    }

    #[test]
    fn test_merge_fills_missing_operation_types() {
        let mut base = SchemaFragment::new("a")
            .with_operation_types(OperationTypes::new().with_query("Root"));
        let incoming = SchemaFragment::new("b").with_operation_types(
            OperationTypes::new().with_query("Other").with_mutation("Mut"),
        );

        base.merge(incoming);

        assert_eq!(base.operation_types.query.as_deref(), Some("Root"));
        assert_eq!(base.operation_types.mutation.as_deref(), Some("Mut"));
    }

    #[test]
    fn test_request_keys() {
        let a = FragmentRequest::ReturnType {
            parent_type_name: "Query".to_string(),
            field_name: "film".to_string(),
        };
        let b = FragmentRequest::RuntimeType {
            abstract_type_name: "Node".to_string(),
            runtime_type_name: "Film".to_string(),
        };
        assert_eq!(a.key(), "return-type:Query.film");
        assert_eq!(b.key(), "runtime-type:Node.Film");
        assert_ne!(a.key(), b.key());
    }
}
