//! Directive-driven authorization around a GraphQL-style execution engine.
//!
//! Rules are registered by name, bound to schema types and fields through
//! `@authz(rules: [...])` annotations or a declaration table, and compiled per
//! operation into a plan. Pre rules run before the engine is called; post
//! rules run against every non-null value they are bound to in the result.
//! Fields a post rule needs are added to the outgoing operation and removed
//! from the result again. Any denial fails the whole operation.
//!
//! ```
//! use async_trait::async_trait;
//! use fieldgate::{
//!     Engine, EngineRequest, Pipeline, Request, Response, RuleRegistryBuilder, Schema, Verdict,
//! };
//! use serde_json::json;
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl Engine for Fixed {
//!     async fn execute(&self, _: EngineRequest<'_>) -> Response {
//!         Response { data: Some(json!({ "me": { "name": "Ada", "ownerId": "u1" } })), errors: vec![] }
//!     }
//! }
//!
//! # tokio_test_block(async {
//! let schema = Schema::parse(
//!     "type Query { me: User } type User @authz(rules: [IsOwner]) { name: String ownerId: ID }",
//! )?;
//! let registry = RuleRegistryBuilder::new()
//!     .post_sync_requiring("IsOwner", "ownerId", |inv| {
//!         let owner = inv.object.get("ownerId").and_then(|v| v.as_str());
//!         Ok(Verdict::from(owner.is_some() && owner == inv.context.get_str("user.id")))
//!     })
//!     .build()?;
//! let pipeline = Pipeline::builder(schema, registry, Fixed).build()?;
//!
//! let request = Request::parse("{ me { name } }")?
//!     .context(fieldgate::Context::new().set("user.id", "u1"));
//! let response = pipeline.execute(request).await?;
//! assert_eq!(response.data, Some(json!({ "me": { "name": "Ada" } })));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future<Output = Result<(), Box<dyn std::error::Error>>>>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f).unwrap();
//! # }
//! ```

mod augment;
mod bind;
mod compile;
mod error;
mod evaluate;
pub mod parse;
mod pipeline;
mod prune;
#[cfg(feature = "binary-cache")]
pub mod serial;
mod types;

pub use augment::AugmentedOperation;
pub use error::FieldgateError;
pub use parse::{parse_document, parse_schema, parse_selection_set, ParseError};
pub use pipeline::{
    Engine, EngineError, EngineRequest, ErrorPolicy, Pipeline, PipelineBuilder, PipelineConfig,
    PipelineError, PreparedOperation, Request, Response, DEFAULT_DIRECTIVE,
};
pub use prune::prune_result;
pub use types::{
    Arguments, AuthorizationFailure, BindError, BindingTarget, CompileError, CompiledRulePlan,
    Context, DeclarationTable, Directive, Document, ExecutionReport, FailureKind, Field,
    FieldDefinition, FragmentDefinition, FragmentSpread, InlineFragment, InputValue,
    InputValueDefinition, OperationDefinition, OperationKind, PathStep, Phase, PostInstance,
    PostInvocation, PostRule, PreInstance, PreInvocation, PreRule, RuleBindings, RuleDefinition,
    RuleFailure, RuleFault, RuleKind, RuleRegistry, RuleRegistryBuilder, RuleResult, Schema,
    Selection, SelectionPath, SelectionSet, Stage, TypeDefinition, TypeKind, TypeRef,
    VariableDefinition, Variables, Verdict, DECLARATION_KEY,
};
