use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::context::Context;
use super::document::SelectionSet;
use super::verdict::RuleResult;

/// Field arguments after variables and schema defaults have been applied.
pub type Arguments = Map<String, Value>;

/// Input to a rule that decides before any data is fetched.
#[derive(Debug, Clone)]
pub struct PreInvocation {
    pub context: Arc<Context>,
    pub arguments: Arc<Arguments>,
}

/// Input to a rule that decides against fetched data.
#[derive(Debug, Clone)]
pub struct PostInvocation {
    pub context: Arc<Context>,
    pub arguments: Arc<Arguments>,
    /// The concrete value at this occurrence. Never `null`.
    pub object: Value,
    /// The whole `data` tree returned by the engine.
    pub result: Arc<Value>,
}

/// A rule evaluated once per field location before the engine runs.
#[async_trait]
pub trait PreRule: Send + Sync {
    async fn evaluate(&self, invocation: PreInvocation) -> RuleResult;
}

/// A rule evaluated once per non-null occurrence in the result.
#[async_trait]
pub trait PostRule: Send + Sync {
    async fn evaluate(&self, invocation: PostInvocation) -> RuleResult;
}

/// How a registered rule is evaluated. Each variant carries exactly what its
/// phase needs.
#[derive(Clone)]
pub enum RuleKind {
    Pre(Arc<dyn PreRule>),
    Post {
        rule: Arc<dyn PostRule>,
        /// Fields the rule needs fetched, relative to the bound location.
        requires: Option<SelectionSet>,
    },
}

/// A named rule, immutable once registered.
#[derive(Clone)]
pub struct RuleDefinition {
    pub(crate) name: String,
    pub(crate) kind: RuleKind,
}

impl RuleDefinition {
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    #[must_use]
    pub fn is_pre(&self) -> bool {
        matches!(self.kind, RuleKind::Pre(_))
    }

    /// The extra selection of a post rule, if it declares one.
    #[must_use]
    pub fn requires(&self) -> Option<&SelectionSet> {
        match &self.kind {
            RuleKind::Post { requires, .. } => requires.as_ref(),
            RuleKind::Pre(_) => None,
        }
    }
}

impl fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            RuleKind::Pre(_) => "pre",
            RuleKind::Post { .. } => "post",
        };
        f.debug_struct("RuleDefinition")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("requires", &self.requires().map(ToString::to_string))
            .finish()
    }
}

/// Adapts an async closure to [`PreRule`] / [`PostRule`].
pub(crate) struct AsyncFnRule<F>(pub(crate) F);

#[async_trait]
impl<F, Fut> PreRule for AsyncFnRule<F>
where
    F: Fn(PreInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = RuleResult> + Send + 'static,
{
    async fn evaluate(&self, invocation: PreInvocation) -> RuleResult {
        (self.0)(invocation).await
    }
}

#[async_trait]
impl<F, Fut> PostRule for AsyncFnRule<F>
where
    F: Fn(PostInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = RuleResult> + Send + 'static,
{
    async fn evaluate(&self, invocation: PostInvocation) -> RuleResult {
        (self.0)(invocation).await
    }
}

/// Adapts a plain closure to [`PreRule`] / [`PostRule`].
pub(crate) struct SyncFnRule<F>(pub(crate) F);

#[async_trait]
impl<F> PreRule for SyncFnRule<F>
where
    F: Fn(&PreInvocation) -> RuleResult + Send + Sync,
{
    async fn evaluate(&self, invocation: PreInvocation) -> RuleResult {
        (self.0)(&invocation)
    }
}

#[async_trait]
impl<F> PostRule for SyncFnRule<F>
where
    F: Fn(&PostInvocation) -> RuleResult + Send + Sync,
{
    async fn evaluate(&self, invocation: PostInvocation) -> RuleResult {
        (self.0)(&invocation)
    }
}
