use async_trait::async_trait;
use fieldgate::{
    Context, Engine, EngineRequest, Pipeline, Request, Response, RuleRegistryBuilder, Schema,
    Verdict,
};
use serde_json::{json, Value};

const SDL: &str = r#"
    type Query {
        me: User @authz(rules: [SignedIn])
    }
    type User {
        id: ID!
        name: String
        comments: [Comment]
    }
    type Comment @authz(rules: [IsOwner]) {
        id: ID!
        body: String
        ownerId: ID
    }
"#;

/// Answers every operation with the same data.
struct Fixed(Value);

#[async_trait]
impl Engine for Fixed {
    async fn execute(&self, request: EngineRequest<'_>) -> Response {
        let operation = request
            .document
            .operation(request.operation_name)
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("engine received: {operation}");
        Response {
            data: Some(self.0.clone()),
            errors: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    let registry = RuleRegistryBuilder::new()
        .pre_sync("SignedIn", |inv| {
            Ok(Verdict::from(inv.context.get("user.id").is_some()))
        })
        .post_sync_requiring("IsOwner", "{ ownerId }", |inv| {
            let owner = inv.object.get("ownerId").and_then(Value::as_str);
            Ok(Verdict::from(owner.is_some() && owner == inv.context.get_str("user.id")))
        })
        .build()
        .expect("failed to build registry");

    let engine = Fixed(json!({
        "me": {
            "name": "Ada",
            "comments": [{ "body": "hello", "ownerId": "u1" }]
        }
    }));
    let pipeline = Pipeline::builder(
        Schema::parse(SDL).expect("invalid schema"),
        registry,
        engine,
    )
    .build()
    .expect("failed to bind rules");

    let query = "{ me { name comments { body } } }";

    let anonymous = pipeline
        .execute(Request::parse(query).expect("invalid query"))
        .await;
    match anonymous {
        Ok(response) => println!("anonymous: {:?}", response.data),
        Err(err) => println!("anonymous: {err}"),
    }

    let signed_in = pipeline
        .execute(
            Request::parse(query)
                .expect("invalid query")
                .context(Context::new().set("user.id", "u1")),
        )
        .await;
    match signed_in {
        Ok(response) => println!("u1: {}", response.data.unwrap_or_default()),
        Err(err) => println!("u1: {err}"),
    }
}
