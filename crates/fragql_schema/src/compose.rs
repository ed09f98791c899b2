//! Resolver-map composition utilities.
//!
//! Used to assemble or split resolver bundles without the engine caring
//! where the split boundaries are. Both operations are pure: the inputs
//! are never mutated, and field resolvers are shared, not copied.

use fragql_core::{ObjectResolver, Resolvers, TypeResolver};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

/// Merges two resolver maps.
///
/// Per type name: when both sides are object types, the field maps are
/// shallow-merged with the overlay winning on key collisions; any other
/// pairing lets the overlay replace the base entry wholesale.
pub fn merge_resolvers(base: &Resolvers, overlay: &Resolvers) -> Resolvers {
    let mut merged = base.clone();
    for (type_name, overlay_resolver) in overlay.iter() {
        let entry = match (base.get(type_name), overlay_resolver) {
            (Some(TypeResolver::Object(b)), TypeResolver::Object(o)) => {
                let mut fields = b.fields.clone();
                for (field, resolver) in &o.fields {
                    fields.insert(field.clone(), resolver.clone());
                }
                TypeResolver::Object(ObjectResolver { fields })
            }
            _ => overlay_resolver.clone(),
        };
        merged.insert(type_name.clone(), entry);
    }
    merged
}

/// Subtracts resolver field sets from a resolver map.
///
/// For each object type in `minuend`, every field whose key (not
/// implementation) appears under the same type name in any subtrahend is
/// removed; types whose field set becomes empty are dropped entirely.
/// Non-object minuend entries are dropped whenever a subtrahend names the
/// same type. Subtracting a map from itself therefore yields an empty
/// registry.
pub fn subtract_resolvers<'a, I>(minuend: &Resolvers, subtrahends: I) -> Resolvers
where
    I: IntoIterator<Item = &'a Resolvers>,
{
    let mut removed: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();
    let mut named: FxHashSet<&str> = FxHashSet::default();
    for subtrahend in subtrahends {
        for (type_name, resolver) in subtrahend.iter() {
            named.insert(type_name.as_str());
            if let TypeResolver::Object(object) = resolver {
                removed
                    .entry(type_name.as_str())
                    .or_default()
                    .extend(object.fields.keys().map(String::as_str));
            }
        }
    }

    let mut result = Resolvers::new();
    for (type_name, resolver) in minuend.iter() {
        match resolver {
            TypeResolver::Object(object) => {
                let dropped = removed.get(type_name.as_str());
                let fields: IndexMap<_, _> = object
                    .fields
                    .iter()
                    .filter(|(field, _)| !dropped.is_some_and(|set| set.contains(field.as_str())))
                    .map(|(field, resolver)| (field.clone(), resolver.clone()))
                    .collect();
                if !fields.is_empty() {
                    result.insert(type_name.clone(), TypeResolver::Object(ObjectResolver { fields }));
                }
            }
            other => {
                if !named.contains(type_name.as_str()) {
                    result.insert(type_name.clone(), other.clone());
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragql_core::{FieldResolver, ScalarResolver};
    use serde_json::Value;

    fn object(fields: &[&str]) -> TypeResolver {
        let mut object = ObjectResolver::new();
        for field in fields {
            object = object.field(
                *field,
                FieldResolver::of_fn(|_, _, _, _| Ok(Value::Null)),
            );
        }
        TypeResolver::Object(object)
    }

    fn field_names(resolvers: &Resolvers, type_name: &str) -> Vec<String> {
        resolvers
            .get(type_name)
            .and_then(TypeResolver::as_object)
            .map(|o| o.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_merge_object_fields() {
        let base = Resolvers::new().with_type("Query", object(&["film", "person"]));
        let overlay = Resolvers::new().with_type("Query", object(&["person", "planet"]));

        let merged = merge_resolvers(&base, &overlay);

        assert_eq!(field_names(&merged, "Query"), vec!["film", "person", "planet"]);
    }

    #[test]
    fn test_merge_overlay_replaces_non_objects() {
        let base = Resolvers::new().with_type("Date", TypeResolver::Scalar(ScalarResolver::passthrough()));
        let overlay = Resolvers::new().with_type("Date", object(&["unused"]));

        let merged = merge_resolvers(&base, &overlay);

        assert!(merged.get("Date").unwrap().as_object().is_some());
    }

    #[test]
    fn test_subtract_drops_matching_keys() {
        let a = Resolvers::new().with_type("Query", object(&["film"]));
        let b = Resolvers::new().with_type("Query", object(&["person"]));
        let merged = merge_resolvers(&a, &b);

        let difference = subtract_resolvers(&merged, [&b]);

        assert_eq!(field_names(&difference, "Query"), vec!["film"]);
    }

    #[test]
    fn test_subtract_empty_is_identity() {
        let a = Resolvers::new().with_type("Query", object(&["film", "person"]));
        let empty = Resolvers::new();

        let difference = subtract_resolvers(&a, [&empty]);

        assert_eq!(field_names(&difference, "Query"), vec!["film", "person"]);
    }

    #[test]
    fn test_subtract_equal_inputs_is_empty() {
        let a = Resolvers::new()
            .with_type("Query", object(&["film"]))
            .with_type("Film", object(&["title"]))
            .with_type("Date", TypeResolver::Scalar(ScalarResolver::passthrough()));

        let difference = subtract_resolvers(&a, [&a]);

        assert!(difference.is_empty());
    }

    #[test]
    fn test_subtract_multiple_subtrahends() {
        let minuend = Resolvers::new().with_type("Query", object(&["a", "b", "c"]));
        let first = Resolvers::new().with_type("Query", object(&["a"]));
        let second = Resolvers::new().with_type("Query", object(&["c"]));

        let difference = subtract_resolvers(&minuend, [&first, &second]);

        assert_eq!(field_names(&difference, "Query"), vec!["b"]);
    }

    #[test]
    fn test_subtract_ignores_non_object_subtrahends() {
        let minuend = Resolvers::new().with_type("Query", object(&["a"]));
        let scalar =
            Resolvers::new().with_type("Query", TypeResolver::Scalar(ScalarResolver::passthrough()));

        let difference = subtract_resolvers(&minuend, [&scalar]);

        assert_eq!(field_names(&difference, "Query"), vec!["a"]);
    }
}
