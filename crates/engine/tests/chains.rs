use std::sync::Arc;

use nodeflow_engine::{Engine, EvaluationContext, FieldDescriptor, FieldKind, MemoryStore, Record, RecordSchema, TypeRegistry};
use nodeflow_types::Model;
use serde_json::{Value, json};

fn blog_store() -> MemoryStore {
    let store = MemoryStore::new("Blog").with_collection(
        "Posts",
        RecordSchema::new("Post", "id").with_fields([
            FieldDescriptor::new("id", FieldKind::Long),
            FieldDescriptor::new("title", FieldKind::Text),
            FieldDescriptor::new("views", FieldKind::Int),
        ]),
    );
    store
        .seed("Posts", [post(1, "Zeta", 5), post(2, "Alpha", 50), post(3, "Mid", 500)])
        .expect("seed posts");
    store
}

fn post(id: i64, title: &str, views: i64) -> Record {
    json!({"id": id, "title": title, "views": views})
        .as_object()
        .cloned()
        .expect("record is an object")
}

fn load_model(environment: Option<&str>) -> Model {
    let mut model = Model::from_json_str(include_str!("data/blog_model.json")).expect("fixture model loads");
    if let Some(environment) = environment {
        assert!(model.set_environment(environment), "unknown environment {environment}");
    }
    model
}

fn engine(store: &MemoryStore, environment: Option<&str>) -> Engine {
    let mut builder = TypeRegistry::builder().with_builtins();
    builder.register_entity_provider(Arc::new(store.clone()));
    Engine::new(Arc::new(builder.build()), Arc::new(load_model(environment)))
}

fn context_with(key: &str, value: Value) -> EvaluationContext {
    let mut context = EvaluationContext::new();
    context.insert(key, value);
    context
}

fn state_value(context: &EvaluationContext, key: &str) -> Option<Value> {
    context.state().and_then(|state| state.get(key)).cloned()
}

fn titles(value: &Option<Value>) -> Vec<String> {
    value
        .as_ref()
        .and_then(Value::as_array)
        .map(|posts| {
            posts
                .iter()
                .filter_map(|post| post["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn stack_actions_publish_results_and_follow_next_action() {
    let engine = engine(&blog_store(), None);
    let mut context = context_with("query", json!({"name": "Ada"}));

    let result = engine.run("greet", &mut context);

    assert!(result.success);
    assert_eq!(state_value(&context, "greeting"), Some(json!("Hello, Ada!")));
    // The second action returned the state map itself; it is not stored inside itself.
    assert_eq!(result.return_data, Some(json!({"greeting": "Hello, Ada!"})));
    assert!(state_value(&context, "value").is_none());
}

#[test]
fn active_environment_feeds_env_bindings() {
    let engine = engine(&blog_store(), Some("Dev"));
    let mut context = context_with("query", json!({"name": "Ada"}));
    let result = engine.run("greet", &mut context);
    assert_eq!(state_value(&context, "greeting"), Some(json!("Hi, Ada!")));
    assert!(result.success);
}

#[test]
fn nested_placeholders_resolve_innermost_first() {
    let engine = engine(&blog_store(), None);
    let mut context = context_with("state", json!({"created": {"id": 9}}));
    let result = engine.run("pick-from-state", &mut context);
    assert_eq!(result.return_data, Some(json!({"id": 9})));
}

#[test]
fn unresolved_inner_placeholder_folds_to_literal_null() {
    let engine = engine(&blog_store(), None);
    let mut context = context_with("state", json!({"null": "quirk"}));
    let result = engine.run("pick-missing", &mut context);
    assert_eq!(result.return_data, Some(json!("quirk")));
}

#[test]
fn branch_checks_primary_condition_then_or_link() {
    let engine = engine(&blog_store(), None);

    let mut popular = context_with("query", json!({"views": 250}));
    assert!(engine.run("classify", &mut popular).success);
    assert_eq!(state_value(&popular, "label"), Some(json!("popular")));

    let mut quiet = context_with("query", json!({"views": 3}));
    engine.run("classify", &mut quiet);
    assert_eq!(state_value(&quiet, "label"), Some(json!("quiet")));

    let mut featured = context_with("query", json!({"views": 3, "featured": true}));
    engine.run("classify", &mut featured);
    assert_eq!(state_value(&featured, "label"), Some(json!("popular")));
}

#[test]
fn switch_picks_case_then_default_and_fails_without_either() {
    let engine = engine(&blog_store(), None);

    let mut blog = context_with("query", json!({"kind": "blog"}));
    assert_eq!(engine.run("route-by-kind", &mut blog).return_data, Some(json!("blog team")));

    let mut other = context_with("query", json!({"kind": "podcast"}));
    assert_eq!(engine.run("route-by-kind", &mut other).return_data, Some(json!("front desk")));

    let mut strict = context_with("query", json!({"kind": "podcast"}));
    assert!(!engine.run("strict-switch", &mut strict).success);
}

#[test]
fn foreach_runs_body_per_element_and_clears_binding() {
    let engine = engine(&blog_store(), None);
    let mut context = context_with("body", json!({"items": [1, 2, 3]}));

    let result = engine.run("echo-items", &mut context);

    assert!(result.success);
    assert_eq!(state_value(&context, "last"), Some(json!(3)));
    assert!(!context.contains_key("item"));
}

#[test]
fn foreach_stops_at_first_failure_and_keeps_binding() {
    let engine = engine(&blog_store(), None);
    let mut context = context_with("body", json!({"items": [1, null, 3]}));

    let result = engine.run("echo-items", &mut context);

    assert!(!result.success);
    assert_eq!(state_value(&context, "last"), Some(json!(1)));
    assert_eq!(context.value("item"), Some(&Value::Null));
}

#[test]
fn create_stores_record_and_chains_into_count() {
    let store = blog_store();
    let engine = engine(&store, None);
    let mut context = context_with("body", json!({"title": "Fresh", "views": 7}));

    let result = engine.run("create-post", &mut context);

    assert!(result.success, "create chain failed: {:?}", result.return_data);
    assert_eq!(result.return_data, Some(json!(4)));
    assert_eq!(state_value(&context, "created"), Some(json!({"id": 4, "title": "Fresh", "views": 7})));
    assert_eq!(store.snapshot("Posts").len(), 4);
}

#[test]
fn read_applies_filters_sorts_and_pages() {
    let engine = engine(&blog_store(), None);

    let mut filtered = context_with("query", json!({"minViews": 10}));
    let result = engine.run("list-posts", &mut filtered);
    assert_eq!(titles(&result.return_data), vec!["Alpha", "Mid"]);

    let mut paged = context_with("query", json!({"page": 2, "pageSize": 2}));
    let result = engine.run("list-posts", &mut paged);
    assert_eq!(titles(&result.return_data), vec!["Zeta"]);

    let mut everything = EvaluationContext::new();
    let result = engine.run("list-posts", &mut everything);
    assert_eq!(titles(&result.return_data), vec!["Alpha", "Mid", "Zeta"]);
}

#[test]
fn count_skips_filters_with_empty_values() {
    let engine = engine(&blog_store(), None);
    let mut unfiltered = EvaluationContext::new();
    assert_eq!(engine.run("count-posts", &mut unfiltered).return_data, Some(json!(3)));

    let mut filtered = context_with("query", json!({"minViews": 50}));
    assert_eq!(engine.run("count-posts", &mut filtered).return_data, Some(json!(2)));
}

#[test]
fn read_first_update_and_delete_by_id() {
    let store = blog_store();
    let engine = engine(&store, None);

    let mut read = context_with("path", json!({"id": "2"}));
    let result = engine.run("get-post", &mut read);
    assert_eq!(result.return_data, Some(json!({"id": 2, "title": "Alpha", "views": 50})));

    let mut update = context_with("path", json!({"id": "2"}));
    update.insert("body", json!({"title": "Beta"}));
    let result = engine.run("update-post", &mut update);
    assert!(result.success);
    assert_eq!(result.return_data, Some(json!({"id": 2, "title": "Beta", "views": 50})));
    assert!(store.snapshot("Posts").contains(&post(2, "Beta", 50)));

    let mut delete = context_with("path", json!({"id": "2"}));
    let result = engine.run("delete-post", &mut delete);
    assert!(result.success);
    assert_eq!(store.snapshot("Posts").len(), 2);

    let mut missing = context_with("path", json!({"id": "2"}));
    let result = engine.run("get-post", &mut missing);
    assert!(!result.success);
}

#[test]
fn unknown_nodes_and_types_fail_the_chain() {
    let engine = engine(&blog_store(), None);
    let mut context = EvaluationContext::new();
    let result = engine.run("does-not-exist", &mut context);
    assert!(!result.success);
    assert_eq!(result.return_data, Some(json!("action 'does-not-exist' is not defined")));

    let model = Model::from_value(&json!({
        "actions": [
            {
                "_id": "greet",
                "_type": "JsonAction",
                "properties": {"json": "hi", "returnName": "greeting"},
                "actions": {"nextAction": "mystery"}
            },
            {"_id": "mystery", "_type": "NoSuchAction", "properties": {}}
        ]
    }))
    .expect("model loads");
    let engine = Engine::new(Arc::new(TypeRegistry::with_builtins()), Arc::new(model));
    let mut context = EvaluationContext::new();
    let result = engine.run("greet", &mut context);
    assert!(!result.success);
    assert_eq!(result.return_data, Some(json!("no action type named 'NoSuchAction' is registered")));
    assert_eq!(state_value(&context, "greeting"), Some(json!("hi")));
}

#[test]
fn registry_lists_provider_entities() {
    let engine = engine(&blog_store(), None);
    assert_eq!(engine.registry().list_entity_names(), vec!["Blog.Posts".to_string()]);
    let description = engine.registry().describe();
    assert_eq!(description["entities"]["Blog.Posts"]["primaryKey"], json!("id"));
}
