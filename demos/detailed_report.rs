use async_trait::async_trait;
use fieldgate::{
    Context, DeclarationTable, Engine, EngineRequest, Pipeline, Request, Response,
    RuleRegistryBuilder, Schema, Verdict,
};
use serde_json::{json, Value};

const SDL: &str = r#"
    interface Node { id: ID! }
    type Doc implements Node { id: ID! title: String ownerId: ID }
    type Photo implements Node { id: ID! url: String }
    type Query { feed: [Node] }
"#;

struct Feed(Value);

#[async_trait]
impl Engine for Feed {
    async fn execute(&self, _: EngineRequest<'_>) -> Response {
        Response {
            data: Some(self.0.clone()),
            errors: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    let registry = RuleRegistryBuilder::new()
        .post_sync_requiring("OwnDoc", "{ ownerId }", |inv| {
            let owner = inv.object.get("ownerId").and_then(Value::as_str);
            Ok(Verdict::from(owner == inv.context.get_str("user.id")))
        })
        .build()
        .expect("failed to build registry");

    let declarations = DeclarationTable::from_json(
        r#"{ "Doc": { "__authz": { "rules": ["OwnDoc"] } } }"#,
    )
    .expect("invalid declarations");

    let engine = Feed(json!({
        "feed": [
            { "__typename": "Doc", "title": "Plan", "ownerId": "u1" },
            { "__typename": "Photo", "url": "https://img/1" },
            { "__typename": "Doc", "title": "Draft", "ownerId": "u1" }
        ]
    }));
    let pipeline = Pipeline::builder(
        Schema::parse(SDL).expect("invalid schema"),
        registry,
        engine,
    )
    .declarations(declarations)
    .build()
    .expect("failed to bind rules");

    let request = Request::parse("{ feed { ... on Doc { title } ... on Photo { url } } }")
        .expect("invalid query")
        .context(Context::new().set("user.id", "u1"));
    let (outcome, report) = pipeline.execute_detailed(request).await;

    println!("{report}");
    println!();
    println!("Stages: {:?}", report.stages());
    println!("Post evaluations: {}", report.post_evaluations());
    println!("Injected fields: {}", report.injected_fields());
    println!("Duration: {:?}", report.duration());
    match outcome {
        Ok(response) => println!("Data: {}", response.data.unwrap_or_default()),
        Err(err) => println!("Error: {err}"),
    }
}
