//! Incremental delivery and subscription tests: `@defer` and `@stream`
//! patch ordering, and per-event subscription execution.

use std::sync::Arc;

use async_graphql_parser::parse_query;
use fragql_core::{
    FieldResolver, FnSubscriber, GraphQLError, ObjectResolver, PathSegment, Resolvers,
    TypeResolver,
};
use fragql_runtime::{
    execute_with_schema, subscribe_with_schema, ExecutionError, ExecutionRequest,
    IncrementalResult, TotalExecutionResult,
};
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

const SDL: &str = r#"
    schema { query: Query subscription: Subscription }
    type Query {
        film(id: ID!): Film
        films: [Film!]
        featured: Film!
    }
    type Subscription {
        filmAdded: Film
    }
    type Film {
        id: ID!
        title: String!
        director: Person
    }
    type Person { id: ID! name: String }
"#;

fn film(n: usize) -> Value {
    json!({
        "id": n.to_string(),
        "title": format!("Episode {n}"),
        "director": {"id": format!("p{n}"), "name": "George Lucas"},
    })
}

fn resolvers() -> Resolvers {
    Resolvers::new().with_type(
        "Query",
        TypeResolver::Object(
            ObjectResolver::new()
                .field("film", FieldResolver::of_fn(|_, _, _, _| Ok(film(4))))
                .field(
                    "films",
                    FieldResolver::of_fn(|_, _, _, _| Ok(json!([film(4), film(5), film(6)]))),
                ),
        ),
    )
}

#[tokio::test]
async fn test_defer_excludes_fragment_from_initial_payload() {
    let request = ExecutionRequest::new(
        parse_query(
            r#"{
                film(id: "4") {
                    title
                    ... @defer(label: "slow") { director { name } }
                }
            }"#,
        )
        .unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers(), request)
        .await
        .unwrap()
        .into_incremental();

    assert_eq!(
        result.initial_result.data,
        Some(json!({"film": {"title": "Episode 4"}}))
    );
    assert!(result.has_next);

    let patches: Vec<IncrementalResult> = result.subsequent_results.collect().await;
    assert_eq!(patches.len(), 1);
    let IncrementalResult::Defer(patch) = &patches[0] else {
        panic!("expected a defer patch, got {patches:?}");
    };
    assert_eq!(patch.data, json!({"director": {"name": "George Lucas"}}));
    assert_eq!(patch.path, vec![PathSegment::from("film")]);
    assert_eq!(patch.label.as_deref(), Some("slow"));
    assert!(!patch.has_next);
}

#[tokio::test]
async fn test_defer_if_false_stays_inline() {
    let request = ExecutionRequest::new(
        parse_query(r#"{ film(id: "4") { title ... @defer(if: false) { id } } }"#).unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers(), request)
        .await
        .unwrap()
        .into_total();

    assert_eq!(
        result.data,
        Some(json!({"film": {"title": "Episode 4", "id": "4"}}))
    );
}

#[tokio::test]
async fn test_stream_emits_remaining_items_in_index_order() {
    let request = ExecutionRequest::new(
        parse_query(r#"{ films @stream(initialCount: 1, label: "rest") { title } }"#).unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers(), request)
        .await
        .unwrap()
        .into_incremental();

    assert_eq!(
        result.initial_result.data,
        Some(json!({"films": [{"title": "Episode 4"}]}))
    );

    let patches: Vec<IncrementalResult> = result.subsequent_results.collect().await;
    assert_eq!(patches.len(), 2);
    for (offset, patch) in patches.iter().enumerate() {
        let IncrementalResult::Stream(patch) = patch else {
            panic!("expected stream patches, got {patches:?}");
        };
        assert_eq!(
            patch.items,
            vec![json!({"title": format!("Episode {}", 5 + offset)})]
        );
        assert_eq!(
            patch.path,
            vec![PathSegment::from("films"), PathSegment::from(1 + offset)]
        );
        assert_eq!(patch.label.as_deref(), Some("rest"));
    }
    assert!(patches[0].has_next());
    assert!(!patches[1].has_next());
}

#[tokio::test]
async fn test_stream_covering_the_whole_list_is_a_total_result() {
    let request = ExecutionRequest::new(
        parse_query("{ films @stream(initialCount: 5) { title } }").unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers(), request)
        .await
        .unwrap()
        .into_total();

    assert!(result.errors.is_empty());
    assert_eq!(
        result.data,
        Some(json!({
            "films": [
                {"title": "Episode 4"},
                {"title": "Episode 5"},
                {"title": "Episode 6"},
            ]
        }))
    );
}

#[tokio::test]
async fn test_root_bubble_discards_deferred_work() {
    // featured is Film! and fails, nulling the whole response; the
    // already-scheduled defer under film must not surface as a patch.
    let resolvers = resolvers().with_type(
        "Query",
        TypeResolver::Object(
            ObjectResolver::new()
                .field("film", FieldResolver::of_fn(|_, _, _, _| Ok(film(4))))
                .field(
                    "featured",
                    FieldResolver::of_fn(|_, _, _, _| Err(GraphQLError::new("unavailable"))),
                ),
        ),
    );
    let request = ExecutionRequest::new(
        parse_query(
            r#"{
                film(id: "4") { title ... @defer { director { name } } }
                featured { id }
            }"#,
        )
        .unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers, request)
        .await
        .unwrap()
        .into_total();

    assert_eq!(result.data, Some(Value::Null));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, Some(vec![PathSegment::from("featured")]));
}

#[tokio::test]
async fn test_nulled_object_discards_deferred_work_beneath_it() {
    // The director subtree schedules a defer, then the sibling title
    // (String!) fails and nulls film; the defer's target is gone.
    let resolvers = resolvers().with_type(
        "Film",
        TypeResolver::Object(ObjectResolver::new().field(
            "title",
            FieldResolver::of_fn(|_, _, _, _| Err(GraphQLError::new("boom"))),
        )),
    );
    let request = ExecutionRequest::new(
        parse_query(
            r#"{
                film(id: "4") {
                    director { name ... @defer { id } }
                    title
                }
            }"#,
        )
        .unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers, request)
        .await
        .unwrap()
        .into_total();

    assert_eq!(result.data, Some(json!({"film": null})));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].path,
        Some(vec![PathSegment::from("film"), PathSegment::from("title")])
    );
}

#[tokio::test]
async fn test_stream_item_error_stays_in_its_patch() {
    let resolvers = resolvers().with_type(
        "Film",
        TypeResolver::Object(ObjectResolver::new().field(
            "title",
            FieldResolver::of_fn(|parent, _, _, _| {
                if parent.get("id") == Some(&json!("5")) {
                    Err(GraphQLError::new("unavailable"))
                } else {
                    Ok(parent.get("title").cloned().unwrap_or(Value::Null))
                }
            }),
        )),
    );
    let request = ExecutionRequest::new(
        parse_query("{ films @stream(initialCount: 1) { title } }").unwrap(),
    );
    let result = execute_with_schema(SDL, resolvers, request)
        .await
        .unwrap()
        .into_incremental();

    assert!(result.initial_result.errors.is_empty());
    let patches: Vec<IncrementalResult> = result.subsequent_results.collect().await;
    assert_eq!(patches.len(), 2);

    // The failing non-null item nulls its own patch only.
    let IncrementalResult::Stream(failed) = &patches[0] else {
        panic!("expected stream patches");
    };
    assert_eq!(failed.items, vec![Value::Null]);
    assert_eq!(failed.errors.len(), 1);
    assert_eq!(
        failed.errors[0].path,
        Some(vec![
            PathSegment::from("films"),
            PathSegment::from(1usize),
            PathSegment::from("title"),
        ])
    );
    let IncrementalResult::Stream(ok) = &patches[1] else {
        panic!("expected stream patches");
    };
    assert_eq!(ok.items, vec![json!({"title": "Episode 6"})]);
    assert!(ok.errors.is_empty());
}

fn subscription_resolvers(events: Vec<Value>) -> Resolvers {
    let events = Arc::new(std::sync::Mutex::new(Some(events)));
    Resolvers::new().with_type(
        "Subscription",
        TypeResolver::Object(ObjectResolver::new().field(
            "filmAdded",
            FieldResolver::subscriber(FnSubscriber::new(move |_, _, _, _| {
                let taken = events
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or_else(|| GraphQLError::new("already subscribed"))?;
                Ok(stream::iter(taken).boxed())
            })),
        )),
    )
}

#[tokio::test]
async fn test_subscription_executes_selection_per_event() {
    let resolvers = subscription_resolvers(vec![
        json!({"filmAdded": film(4)}),
        json!({"filmAdded": film(5)}),
    ]);
    let request =
        ExecutionRequest::new(parse_query("subscription { filmAdded { title } }").unwrap());
    let result = subscribe_with_schema(SDL, resolvers, request).await.unwrap();

    let events: Vec<TotalExecutionResult> = result.events.collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].data,
        Some(json!({"filmAdded": {"title": "Episode 4"}}))
    );
    assert_eq!(
        events[1].data,
        Some(json!({"filmAdded": {"title": "Episode 5"}}))
    );
}

#[tokio::test]
async fn test_subscription_event_errors_stay_in_their_event() {
    let resolvers = subscription_resolvers(vec![
        json!({"filmAdded": {"id": "4", "title": null}}),
        json!({"filmAdded": film(5)}),
    ]);
    let request =
        ExecutionRequest::new(parse_query("subscription { filmAdded { title } }").unwrap());
    let result = subscribe_with_schema(SDL, resolvers, request).await.unwrap();

    let events: Vec<TotalExecutionResult> = result.events.collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].data, Some(json!({"filmAdded": null})));
    assert_eq!(events[0].errors.len(), 1);
    assert!(events[1].errors.is_empty());
}

#[tokio::test]
async fn test_subscription_defer_is_delivered_inline() {
    let resolvers = subscription_resolvers(vec![json!({"filmAdded": film(4)})]);
    let request = ExecutionRequest::new(
        parse_query(
            r#"subscription {
                filmAdded { title ... @defer { director { name } } }
            }"#,
        )
        .unwrap(),
    );
    let result = subscribe_with_schema(SDL, resolvers, request).await.unwrap();

    let events: Vec<TotalExecutionResult> = result.events.collect().await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].data,
        Some(json!({
            "filmAdded": {"title": "Episode 4", "director": {"name": "George Lucas"}}
        }))
    );
}

#[tokio::test]
async fn test_subscription_without_subscribe_resolver_is_rejected() {
    let request =
        ExecutionRequest::new(parse_query("subscription { filmAdded { title } }").unwrap());
    let error = subscribe_with_schema(SDL, resolvers(), request)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        error,
        ExecutionError::MissingSubscribeResolver(field) if field == "filmAdded"
    ));
}

#[tokio::test]
async fn test_execute_rejects_subscription_operations() {
    let request =
        ExecutionRequest::new(parse_query("subscription { filmAdded { title } }").unwrap());
    let result = execute_with_schema(SDL, resolvers(), request)
        .await
        .unwrap()
        .into_total();

    assert!(result.data.is_none());
    assert_eq!(result.errors.len(), 1);
}
