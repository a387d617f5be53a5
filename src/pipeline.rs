use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;

use crate::augment::{augment, AugmentedOperation};
use crate::bind;
use crate::compile::{coerce_variables, compile};
use crate::evaluate::{evaluate_post, evaluate_pre, PhaseOutcome};
use crate::parse::{parse_document, ParseError};
use crate::prune::prune_result;
use crate::types::{
    AuthorizationFailure, BindError, CompileError, CompiledRulePlan, Context, DeclarationTable,
    Document, ExecutionReport, OperationDefinition, Phase, RuleBindings, RuleRegistry, Schema,
    Stage, Variables,
};

/// Annotation directive used when none is configured.
pub const DEFAULT_DIRECTIVE: &str = "authz";

/// Pipeline settings. Every field has a default, so a partial document
/// deserializes.
///
/// ```
/// let config: fieldgate::PipelineConfig =
///     serde_json::from_str(r#"{ "max_concurrency": 16 }"#).unwrap();
/// assert_eq!(config.directive, "authz");
/// assert!(!config.cancel_on_failure);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the schema directive carrying rule lists, as in
    /// `@authz(rules: [IsOwner])`.
    pub directive: String,
    /// Abort in-flight evaluations of a phase once one of them fails.
    pub cancel_on_failure: bool,
    /// Upper bound on evaluations running at once within a phase.
    pub max_concurrency: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_owned(),
            cancel_on_failure: false,
            max_concurrency: None,
        }
    }
}

/// An error reported by the engine itself, passed through untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the engine returns and, after authorization, what the caller gets.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Response {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EngineError>,
}

/// Everything the engine needs to run one operation.
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    pub document: &'a Document,
    pub operation_name: Option<&'a str>,
    pub schema: &'a Schema,
    pub context: &'a Context,
    pub variables: &'a Variables,
}

/// The query-execution engine the pipeline wraps.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn execute(&self, request: EngineRequest<'_>) -> Response;
}

/// Receives every authorization failure and must turn it into an error.
///
/// Returning `Ok(())` is a misconfiguration and ends the operation with
/// [`PipelineError::PolicyMisconfigured`].
pub type ErrorPolicy =
    Arc<dyn Fn(AuthorizationFailure) -> Result<(), PipelineError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Unauthorized(#[from] AuthorizationFailure),

    /// Raised by a custom [`ErrorPolicy`].
    #[error("{0}")]
    Rejected(String),

    #[error("authorization error policy returned without raising an error")]
    PolicyMisconfigured,
}

/// One client operation.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub document: Document,
    pub operation_name: Option<String>,
    pub variables: Variables,
    pub context: Arc<Context>,
}

impl Request {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    /// Parse query text into a request.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if `query` is not a valid document.
    pub fn parse(query: &str) -> Result<Self, ParseError> {
        parse_document(query).map(Self::new)
    }

    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = Arc::new(context);
        self
    }
}

/// A compiled and augmented operation, ready to be sent.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    plan: CompiledRulePlan,
    augmented: AugmentedOperation,
    variables: Variables,
}

impl PreparedOperation {
    #[must_use]
    pub fn plan(&self) -> &CompiledRulePlan {
        &self.plan
    }

    #[must_use]
    pub fn augmented(&self) -> &AugmentedOperation {
        &self.augmented
    }

    /// Variables after operation defaults were applied.
    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// The document the engine receives: the augmented operation alone, with
    /// fragments already inlined.
    #[must_use]
    pub fn document(&self) -> Document {
        Document {
            operations: vec![self.augmented.operation.clone()],
            fragments: Vec::new(),
        }
    }
}

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder<E> {
    schema: Schema,
    registry: RuleRegistry,
    engine: E,
    declarations: DeclarationTable,
    bindings: Option<RuleBindings>,
    config: PipelineConfig,
    error_policy: Option<ErrorPolicy>,
}

impl<E: Engine> PipelineBuilder<E> {
    pub fn new(schema: Schema, registry: RuleRegistry, engine: E) -> Self {
        Self {
            schema,
            registry,
            engine,
            declarations: DeclarationTable::new(),
            bindings: None,
            config: PipelineConfig::default(),
            error_policy: None,
        }
    }

    /// Rule lists for schemas that cannot carry annotations. Merged after the
    /// annotations.
    #[must_use]
    pub fn declarations(mut self, declarations: DeclarationTable) -> Self {
        self.declarations = declarations;
        self
    }

    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use already bound tables, e.g. loaded from a cache, instead of
    /// binding the schema. They are still validated.
    #[must_use]
    pub fn bindings(mut self, bindings: RuleBindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    #[must_use]
    pub fn error_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(AuthorizationFailure) -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        self.error_policy = Some(Arc::new(policy));
        self
    }

    /// Bind rules to the schema and freeze the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] for unknown rules, types or fields, malformed
    /// annotations and extra selections that do not fit their type.
    pub fn build(self) -> Result<Pipeline<E>, BindError> {
        let bindings = match self.bindings {
            Some(bindings) => {
                bind::validate(&bindings, &self.schema, &self.registry)?;
                bindings
            }
            None => bind::bind(
                &self.schema,
                &self.registry,
                &self.declarations,
                &self.config.directive,
            )?,
        };
        let error_policy = self
            .error_policy
            .unwrap_or_else(|| Arc::new(|failure| Err(PipelineError::Unauthorized(failure))));

        Ok(Pipeline {
            schema: self.schema,
            registry: self.registry,
            bindings,
            engine: self.engine,
            config: self.config,
            error_policy,
        })
    }
}

/// Runs authorization rules around an [`Engine`].
///
/// Built once and shared; nothing in it changes while operations run.
pub struct Pipeline<E> {
    schema: Schema,
    registry: RuleRegistry,
    bindings: RuleBindings,
    engine: E,
    config: PipelineConfig,
    error_policy: ErrorPolicy,
}

impl<E> fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("rules", &self.registry.len())
            .field("bindings", &self.bindings)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Engine> Pipeline<E> {
    pub fn builder(schema: Schema, registry: RuleRegistry, engine: E) -> PipelineBuilder<E> {
        PipelineBuilder::new(schema, registry, engine)
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    #[must_use]
    pub fn bindings(&self) -> &RuleBindings {
        &self.bindings
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Compile and augment `request` without running anything.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when the operation cannot be selected or
    /// expanded, references unknown fields or conflicts with a rule's extra
    /// selection.
    pub fn prepare(&self, request: &Request) -> Result<PreparedOperation, CompileError> {
        let (operation, variables, plan) = self.compile(request)?;
        let augmented = augment(&operation, &plan, &self.schema, &variables)?;
        Ok(PreparedOperation {
            plan,
            augmented,
            variables,
        })
    }

    /// Authorize and run one operation.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Compile`] for operations that cannot be
    /// planned, and whatever the error policy raises when a rule denies or
    /// faults.
    pub async fn execute(&self, request: Request) -> Result<Response, PipelineError> {
        self.execute_detailed(request).await.0
    }

    /// [`execute`](Self::execute), plus a report of what happened.
    pub async fn execute_detailed(
        &self,
        request: Request,
    ) -> (Result<Response, PipelineError>, ExecutionReport) {
        let started = Instant::now();
        let mut report = ExecutionReport::default();
        let span = tracing::debug_span!(
            "authorize",
            operation = request.operation_name.as_deref().unwrap_or("<anonymous>")
        );
        let outcome = self.run(&request, &mut report).instrument(span).await;
        report.duration = started.elapsed();
        (outcome, report)
    }

    fn compile(
        &self,
        request: &Request,
    ) -> Result<(OperationDefinition, Variables, CompiledRulePlan), CompileError> {
        let operation = request
            .document
            .expand_operation(request.operation_name.as_deref())?;
        let variables = coerce_variables(&operation, &request.variables);
        let plan = compile(
            &operation,
            &self.schema,
            &self.bindings,
            &self.registry,
            &variables,
        )?;
        Ok((operation, variables, plan))
    }

    async fn run(
        &self,
        request: &Request,
        report: &mut ExecutionReport,
    ) -> Result<Response, PipelineError> {
        report.enter(Stage::Compiling);
        let compiled = self.compile(request).and_then(|(operation, variables, plan)| {
            report.enter(Stage::Augmenting);
            let augmented = augment(&operation, &plan, &self.schema, &variables)?;
            Ok((variables, plan, augmented))
        });
        let (variables, plan, augmented) = match compiled {
            Ok(compiled) => compiled,
            Err(err) => {
                report.enter(Stage::Aborted);
                return Err(err.into());
            }
        };
        report.injected_fields = augmented.injected;

        report.enter(Stage::PreChecking);
        let pre = evaluate_pre(&plan, &request.context, &self.config).await;
        if let Some(failure) = record(report, pre, Phase::Pre) {
            report.enter(Stage::Aborted);
            return Err(self.reject(failure));
        }

        report.enter(Stage::Executing);
        let (document, operation_name) = if augmented.is_unchanged() {
            (
                Cow::Borrowed(&request.document),
                request.operation_name.as_deref(),
            )
        } else {
            let document = Document {
                operations: vec![augmented.operation.clone()],
                fragments: Vec::new(),
            };
            (Cow::Owned(document), augmented.operation.name.as_deref())
        };
        let Response { data, errors } = self
            .engine
            .execute(EngineRequest {
                document: &document,
                operation_name,
                schema: &self.schema,
                context: &request.context,
                variables: &request.variables,
            })
            .await;

        let Some(data) = data else {
            tracing::debug!(errors = errors.len(), "engine returned no data");
            report.enter(Stage::Completed);
            return Ok(Response { data: None, errors });
        };

        report.enter(Stage::PostChecking);
        let data = Arc::new(data);
        let post = evaluate_post(&plan, &request.context, &data, &self.config).await;
        if let Some(failure) = record(report, post, Phase::Post) {
            report.enter(Stage::Failed);
            return Err(self.reject(failure));
        }

        let mut data = Arc::try_unwrap(data).unwrap_or_else(|shared| (*shared).clone());
        if !augmented.is_unchanged() {
            report.enter(Stage::Pruning);
            prune_result(
                &mut data,
                &augmented.operation.selection_set,
                &self.schema,
                &variables,
            );
        }

        report.enter(Stage::Completed);
        Ok(Response {
            data: Some(data),
            errors,
        })
    }

    fn reject(&self, failure: AuthorizationFailure) -> PipelineError {
        match (self.error_policy)(failure) {
            Err(err) => err,
            Ok(()) => {
                tracing::error!("authorization error policy returned without raising an error");
                PipelineError::PolicyMisconfigured
            }
        }
    }
}

/// Add a phase's counts to the report and hand back its failure, if any.
fn record(
    report: &mut ExecutionReport,
    outcome: PhaseOutcome,
    phase: Phase,
) -> Option<AuthorizationFailure> {
    match phase {
        Phase::Pre => report.pre_evaluations += outcome.evaluated,
        Phase::Post => report.post_evaluations += outcome.evaluated,
    }
    report.cancelled += outcome.cancelled;
    outcome.failure
}
