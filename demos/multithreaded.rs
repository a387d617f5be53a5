use std::sync::Arc;

use async_trait::async_trait;
use fieldgate::{
    Context, DeclarationTable, Engine, EngineRequest, Pipeline, Request, Response,
    RuleRegistryBuilder, Schema, Verdict,
};
use serde_json::{json, Value};

const SDL: &str = r#"
    type Query { comments: [Comment] }
    type Comment { id: ID! body: String ownerId: ID }
"#;

struct Comments(Value);

#[async_trait]
impl Engine for Comments {
    async fn execute(&self, _: EngineRequest<'_>) -> Response {
        Response {
            data: Some(self.0.clone()),
            errors: Vec::new(),
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let registry = RuleRegistryBuilder::new()
        .post_requiring("IsOwner", "{ ownerId }", |inv| async move {
            // Stands in for a lookup against an ownership service.
            tokio::task::yield_now().await;
            let owner = inv.object.get("ownerId").and_then(Value::as_str);
            fieldgate::RuleResult::Ok(Verdict::from(owner == inv.context.get_str("user.id")))
        })
        .build()
        .expect("failed to build registry");

    let pipeline = Arc::new(
        Pipeline::builder(
            Schema::parse(SDL).expect("invalid schema"),
            registry,
            Comments(json!({
                "comments": [
                    { "id": "c1", "body": "one", "ownerId": "u1" },
                    { "id": "c2", "body": "two", "ownerId": "u1" }
                ]
            })),
        )
        .declarations(DeclarationTable::new().bind_type("Comment", ["IsOwner"]))
        .build()
        .expect("failed to bind rules"),
    );

    let handles: Vec<_> = ["u1", "u2", "u1", "u3"]
        .into_iter()
        .enumerate()
        .map(|(i, user)| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let request = Request::parse("{ comments { body } }")
                    .expect("invalid query")
                    .context(Context::new().set("user.id", user));
                let allowed = pipeline.execute(request).await.is_ok();
                println!("task {i}: {user} -> {}", if allowed { "allowed" } else { "denied" });
                allowed
            })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.expect("task panicked") {
            allowed += 1;
        }
    }
    println!("{allowed} of 4 requests allowed");
}
