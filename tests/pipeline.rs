mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{count, counting_post, counting_pre, FixtureEngine, SCHEMA};
use fieldgate::{
    CompileError, Context, DeclarationTable, EngineError, FailureKind, Pipeline, PipelineConfig,
    PipelineError, Request, RuleFault, RuleRegistryBuilder, RuleResult, Schema, Stage, Verdict,
};
use serde_json::{json, Value};

fn schema() -> Schema {
    Schema::parse(SCHEMA).unwrap()
}

fn fixture() -> Value {
    json!({
        "user": {
            "id": "u1",
            "name": "Ada",
            "email": "ada@example.com",
            "comments": [
                { "id": "c1", "body": "first", "ownerId": "u1" },
                { "id": "c2", "body": "second", "ownerId": "u2" }
            ],
            "posts": [{ "id": "p1", "title": "Notes", "comments": [] }]
        },
        "users": [
            { "id": "u1", "name": "Ada" },
            { "id": "u2", "name": "Grace" },
            null
        ]
    })
}

// ---------------------------------------------------------------------------
// Pre-execution rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pre_rule_sees_resolved_arguments() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let registry = RuleRegistryBuilder::new()
        .pre_sync("RecordArgs", move |inv| {
            sink.lock()
                .unwrap()
                .push(Value::Object((*inv.arguments).clone()));
            Ok(Verdict::allow())
        })
        .build()
        .unwrap();
    let declarations = DeclarationTable::new()
        .bind_field("Query", "user", ["RecordArgs"])
        .bind_field("User", "comments", ["RecordArgs"]);
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(declarations)
        .build()
        .unwrap();

    let request = Request::parse("query Q($id: ID) { user(id: $id) { comments { id } } }")
        .unwrap()
        .variable("id", "u1");
    let (outcome, report) = pipeline.execute_detailed(request).await;
    outcome.unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by_key(|args| args.to_string());
    assert_eq!(seen, vec![json!({ "first": 10 }), json!({ "id": "u1" })]);
    assert_eq!(report.pre_evaluations(), 2);
    assert_eq!(report.post_evaluations(), 0);
}

#[tokio::test]
async fn pre_denial_reads_context_and_skips_engine() {
    let registry = RuleRegistryBuilder::new()
        .pre_sync("IsAdmin", |inv| {
            Ok(Verdict::from(inv.context.get_str("user.role") == Some("admin")))
        })
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_field("User", "email", ["IsAdmin"]))
        .build()
        .unwrap();

    let guest = Request::parse(r#"{ user(id: "u1") { email } }"#)
        .unwrap()
        .context(Context::new().set("user.role", "guest"));
    let (outcome, report) = pipeline.execute_detailed(guest).await;
    let Err(PipelineError::Unauthorized(failure)) = outcome else {
        panic!("guest must be rejected");
    };
    assert_eq!(failure.first().unwrap().path, "user.email");
    assert_eq!(report.final_stage(), Some(Stage::Aborted));
    assert_eq!(pipeline.engine().calls(), 0);

    let admin = Request::parse(r#"{ user(id: "u1") { email } }"#)
        .unwrap()
        .context(Context::new().set("user.role", "admin"));
    let response = pipeline.execute(admin).await.unwrap();
    assert_eq!(
        response.data,
        Some(json!({ "user": { "email": "ada@example.com" } }))
    );
    assert_eq!(pipeline.engine().calls(), 1);
}

#[tokio::test]
async fn skipped_field_runs_no_rules() {
    let (calls, rule) = counting_pre(false);
    let registry = RuleRegistryBuilder::new()
        .pre_sync("Never", rule)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_field("User", "email", ["Never"]))
        .build()
        .unwrap();

    let request = Request::parse(
        r#"query($hide: Boolean!) { user(id: "u1") { name email @skip(if: $hide) } }"#,
    )
    .unwrap()
    .variable("hide", true);
    let response = pipeline.execute(request).await.unwrap();

    assert_eq!(count(&calls), 0);
    assert_eq!(response.data, Some(json!({ "user": { "name": "Ada" } })));
}

#[tokio::test]
async fn rules_read_roles_and_subject_from_claims() {
    let registry = RuleRegistryBuilder::new()
        .pre_sync("Staff", |inv| {
            Ok(Verdict::from(inv.context.includes("user.roles", "staff")))
        })
        .post_sync_requiring("OwnComment", "{ ownerId }", |inv| {
            let subject = inv.context.get("user").cloned().unwrap_or(Value::Null);
            Ok(Verdict::from(
                subject.get("id").is_some() && subject.get("id") == inv.object.get("ownerId"),
            ))
        })
        .build()
        .unwrap();
    let declarations = DeclarationTable::new()
        .bind_field("Query", "user", ["Staff"])
        .bind_type("Comment", ["OwnComment"]);
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(declarations)
        .build()
        .unwrap();
    let text = r#"{ user(id: "u1") { comments { body } } }"#;
    let claims = |roles: Value| -> Context {
        serde_json::from_value(json!({ "user": { "id": "u1", "roles": roles } })).unwrap()
    };

    let guest = pipeline
        .execute(Request::parse(text).unwrap().context(claims(json!(["reader"]))))
        .await;
    assert!(matches!(guest, Err(PipelineError::Unauthorized(_))));
    assert_eq!(pipeline.engine().calls(), 0);

    // Staff get through the pre check; u1 still does not own c2.
    let staff = pipeline
        .execute(
            Request::parse(text)
                .unwrap()
                .context(claims(json!(["reader", "staff"]))),
        )
        .await
        .unwrap_err();
    let PipelineError::Unauthorized(failure) = staff else {
        panic!("expected an authorization failure");
    };
    assert_eq!(failure.rules(), vec!["OwnComment"]);
    assert_eq!(failure.first().unwrap().path, "user.comments.1");
}

// ---------------------------------------------------------------------------
// Binding sources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schema_annotations_bind_rules() {
    let sdl = r#"
        type Query { user(id: ID): User }
        type User @authz(rules: [Visible]) {
            id: ID!
            name: String
            email: String @authz(rules: [Private])
        }
    "#;
    let (visible, visible_rule) = counting_post(true);
    let (private, private_rule) = counting_pre(false);
    let registry = RuleRegistryBuilder::new()
        .post_sync("Visible", visible_rule)
        .pre_sync("Private", private_rule)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(
        Schema::parse(sdl).unwrap(),
        registry,
        FixtureEngine::new(fixture()),
    )
    .build()
    .unwrap();

    let response = pipeline
        .execute(Request::parse(r#"{ user(id: "u1") { name } }"#).unwrap())
        .await
        .unwrap();
    assert_eq!(response.data, Some(json!({ "user": { "name": "Ada" } })));
    assert_eq!(count(&visible), 1);

    let err = pipeline
        .execute(Request::parse(r#"{ user(id: "u1") { email } }"#).unwrap())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "pre-execution authorization failed: rule 'Private' denied at 'user.email'"
    );
    assert_eq!(count(&private), 1);
}

#[tokio::test]
async fn custom_directive_name() {
    let sdl = r#"
        type Query { user(id: ID): User }
        type User @guard(rules: [Deny]) @authz(rules: [Ignored]) { id: ID! }
    "#;
    let (calls, rule) = counting_post(false);
    let registry = RuleRegistryBuilder::new()
        .post_sync("Deny", rule)
        .build()
        .unwrap();
    let config = PipelineConfig {
        directive: "guard".to_owned(),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::builder(
        Schema::parse(sdl).unwrap(),
        registry,
        FixtureEngine::new(fixture()),
    )
    .config(config)
    .build()
    .unwrap();

    let err = pipeline
        .execute(Request::parse(r#"{ user(id: "u1") { id } }"#).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Unauthorized(_)));
    assert_eq!(count(&calls), 1);
}

#[tokio::test]
async fn json_declarations_bind_types_and_fields() {
    let declarations = DeclarationTable::from_json(
        r#"{
            "User": {
                "__authz": { "rules": ["SeeUser"] },
                "comments": { "__authz": { "rules": ["SeeComments"] } }
            }
        }"#,
    )
    .unwrap();
    let (users, see_user) = counting_post(true);
    let (lists, see_comments) = counting_post(true);
    let registry = RuleRegistryBuilder::new()
        .post_sync("SeeUser", see_user)
        .post_sync("SeeComments", see_comments)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(declarations)
        .build()
        .unwrap();

    pipeline
        .execute(Request::parse(r#"{ user(id: "u1") { comments { id } } }"#).unwrap())
        .await
        .unwrap();

    assert_eq!(count(&users), 1);
    // Field rules on a list field run once per element.
    assert_eq!(count(&lists), 2);
}

#[tokio::test]
async fn unknown_rule_fails_build() {
    let registry = RuleRegistryBuilder::new().build().unwrap();
    let err = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("User", ["Missing"]))
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown rule 'Missing' bound to 'User'");
}

// ---------------------------------------------------------------------------
// Post-execution rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn field_post_rule_checks_each_element_value() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let registry = RuleRegistryBuilder::new()
        .post_sync("Inspect", move |inv| {
            sink.lock().unwrap().push(inv.object.clone());
            Ok(Verdict::allow())
        })
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_field("Query", "users", ["Inspect"]))
        .build()
        .unwrap();

    let response = pipeline
        .execute(Request::parse("{ users { name } }").unwrap())
        .await
        .unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by_key(|v| v.to_string());
    assert_eq!(seen, vec![json!({ "name": "Ada" }), json!({ "name": "Grace" })]);
    assert_eq!(
        response.data,
        Some(json!({ "users": [{ "name": "Ada" }, { "name": "Grace" }, null] }))
    );
}

#[tokio::test]
async fn ownership_check_with_injected_field() {
    let registry = RuleRegistryBuilder::new()
        .post_sync_requiring("IsOwner", "{ ownerId }", |inv| {
            let owner = inv.object.get("ownerId").and_then(Value::as_str);
            Ok(match owner {
                Some(owner) if Some(owner) == inv.context.get_str("user.id") => Verdict::allow(),
                _ => Verdict::deny("not the owner"),
            })
        })
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("Comment", ["IsOwner"]))
        .build()
        .unwrap();

    let err = pipeline
        .execute(
            Request::parse(r#"{ user(id: "u1") { comments { body } } }"#)
                .unwrap()
                .context(Context::new().set("user.id", "u1")),
        )
        .await
        .unwrap_err();
    let PipelineError::Unauthorized(failure) = err else {
        panic!("expected an authorization failure");
    };
    assert_eq!(failure.failures.len(), 1);
    let first = failure.first().unwrap();
    assert_eq!(first.path, "user.comments.1");
    assert_eq!(first.kind, FailureKind::Denied(Some("not the owner".to_owned())));
    assert_eq!(
        pipeline.engine().queries(),
        vec![r#"query { user(id: "u1") { comments { body ownerId } } }"#.to_owned()]
    );
}

#[tokio::test]
async fn rule_fault_is_a_failure() {
    let registry = RuleRegistryBuilder::new()
        .post("Lookup", |_| async {
            RuleResult::Err(RuleFault::new("directory unavailable"))
        })
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("User", ["Lookup"]))
        .build()
        .unwrap();

    let err = pipeline
        .execute(Request::parse(r#"{ user(id: "u1") { id } }"#).unwrap())
        .await
        .unwrap_err();
    let PipelineError::Unauthorized(failure) = err else {
        panic!("expected an authorization failure");
    };
    assert!(failure.first().unwrap().is_fault());
    assert_eq!(
        failure.first().unwrap().kind,
        FailureKind::Fault("directory unavailable".to_owned())
    );
}

#[tokio::test]
async fn every_failure_is_reported_in_order() {
    let registry = RuleRegistryBuilder::new()
        .post_sync("DenyComment", |inv| {
            let id = inv.object.get("id").and_then(Value::as_str).unwrap_or("?");
            Ok(Verdict::deny(id.to_owned()))
        })
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("Comment", ["DenyComment"]))
        .build()
        .unwrap();

    let err = pipeline
        .execute(Request::parse(r#"{ user(id: "u1") { comments { id } } }"#).unwrap())
        .await
        .unwrap_err();
    let PipelineError::Unauthorized(failure) = err else {
        panic!("expected an authorization failure");
    };
    let paths: Vec<_> = failure.failures.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["user.comments.0", "user.comments.1"]);
}

#[tokio::test]
async fn cancel_on_failure_stops_slow_siblings() {
    let registry = RuleRegistryBuilder::new()
        .post("SlowUnlessFirst", |inv| async move {
            if inv.object.get("id").and_then(Value::as_str) == Some("c1") {
                return RuleResult::Ok(Verdict::deny("first"));
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
            RuleResult::Ok(Verdict::allow())
        })
        .build()
        .unwrap();
    let data = json!({
        "comments": [{ "id": "c1" }, { "id": "c2" }, { "id": "c3" }]
    });
    let config = PipelineConfig {
        cancel_on_failure: true,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(data))
        .declarations(DeclarationTable::new().bind_type("Comment", ["SlowUnlessFirst"]))
        .config(config)
        .build()
        .unwrap();

    let (outcome, report) = tokio::time::timeout(
        Duration::from_secs(10),
        pipeline.execute_detailed(Request::parse("{ comments { id } }").unwrap()),
    )
    .await
    .expect("cancellation should not wait for slow rules");

    assert!(matches!(outcome, Err(PipelineError::Unauthorized(_))));
    assert_eq!(report.post_evaluations(), 1);
    assert_eq!(report.cancelled(), 2);
}

// ---------------------------------------------------------------------------
// Operations without rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unbound_operation_passes_through() {
    let engine = FixtureEngine::new(fixture())
        .with_errors(vec![EngineError::new("partial outage")]);
    let registry = RuleRegistryBuilder::new().build().unwrap();
    let pipeline = Pipeline::builder(schema(), registry, engine).build().unwrap();

    let (outcome, report) = pipeline
        .execute_detailed(Request::parse(r#"{ user(id: "u1") { name } }"#).unwrap())
        .await;
    let response = outcome.unwrap();

    assert_eq!(response.data, Some(json!({ "user": { "name": "Ada" } })));
    assert_eq!(response.errors, vec![EngineError::new("partial outage")]);
    assert_eq!(
        report.stages(),
        &[
            Stage::Compiling,
            Stage::Augmenting,
            Stage::PreChecking,
            Stage::Executing,
            Stage::PostChecking,
            Stage::Completed,
        ]
    );
    assert_eq!(report.injected_fields(), 0);
}

// ---------------------------------------------------------------------------
// Operation selection, fragments and aliases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn named_operation_is_selected() {
    let (calls, rule) = counting_post(true);
    let registry = RuleRegistryBuilder::new()
        .post_sync("SeeComment", rule)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("Comment", ["SeeComment"]))
        .build()
        .unwrap();
    let text = r#"
        query Names { users { name } }
        query Comments { user(id: "u1") { comments { id } } }
    "#;

    let ambiguous = pipeline.execute(Request::parse(text).unwrap()).await;
    assert!(matches!(
        ambiguous,
        Err(PipelineError::Compile(CompileError::AmbiguousOperation { count: 2 }))
    ));

    let unknown = pipeline
        .execute(Request::parse(text).unwrap().operation_name("Missing"))
        .await;
    assert!(matches!(
        unknown,
        Err(PipelineError::Compile(CompileError::UnknownOperation { .. }))
    ));

    pipeline
        .execute(Request::parse(text).unwrap().operation_name("Names"))
        .await
        .unwrap();
    assert_eq!(count(&calls), 0);

    pipeline
        .execute(Request::parse(text).unwrap().operation_name("Comments"))
        .await
        .unwrap();
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn rules_reach_through_fragments() {
    let (calls, rule) = counting_post(false);
    let registry = RuleRegistryBuilder::new()
        .post_sync("Deny", rule)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("Comment", ["Deny"]))
        .build()
        .unwrap();

    let request = Request::parse(
        r#"
        query { user(id: "u1") { ...UserParts } }
        fragment UserParts on User { posts { title } ...Talk }
        fragment Talk on User { comments { body } }
        "#,
    )
    .unwrap();
    let err = pipeline.execute(request).await.unwrap_err();

    assert!(matches!(err, PipelineError::Unauthorized(_)));
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn aliases_are_evaluated_and_pruned_independently() {
    let (calls, rule) = counting_post(true);
    let registry = RuleRegistryBuilder::new()
        .post_sync_requiring("Owned", "{ ownerId }", rule)
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("Comment", ["Owned"]))
        .build()
        .unwrap();

    let request = Request::parse(
        r#"{ user(id: "u1") { a: comments { id } b: comments { body ownerId } } }"#,
    )
    .unwrap();
    let (outcome, report) = pipeline.execute_detailed(request).await;
    let response = outcome.unwrap();

    assert_eq!(count(&calls), 4);
    assert_eq!(report.injected_fields(), 1);
    assert_eq!(
        response.data,
        Some(json!({
            "user": {
                "a": [{ "id": "c1" }, { "id": "c2" }],
                "b": [
                    { "body": "first", "ownerId": "u1" },
                    { "body": "second", "ownerId": "u2" }
                ]
            }
        }))
    );
}

#[tokio::test]
async fn conflicting_alias_is_a_compile_error() {
    let registry = RuleRegistryBuilder::new()
        .post_sync_requiring("Owned", "{ ownerId }", |_| Ok(Verdict::allow()))
        .build()
        .unwrap();
    let pipeline = Pipeline::builder(schema(), registry, FixtureEngine::new(fixture()))
        .declarations(DeclarationTable::new().bind_type("Comment", ["Owned"]))
        .build()
        .unwrap();

    let (outcome, report) = pipeline
        .execute_detailed(Request::parse("{ comments { ownerId: body } }").unwrap())
        .await;

    assert!(matches!(
        outcome,
        Err(PipelineError::Compile(CompileError::ConflictingSelection { .. }))
    ));
    assert_eq!(report.final_stage(), Some(Stage::Aborted));
    assert_eq!(pipeline.engine().calls(), 0);
}
