use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::pipeline::PipelineConfig;
use crate::types::{
    AuthorizationFailure, CompiledRulePlan, Context, FailureKind, Phase, PostInvocation,
    PreInvocation, RuleFailure, RuleKind, RuleResult, SelectionPath, Verdict,
};

/// What one phase did: how many evaluations settled, how many were aborted
/// and, if anything failed, every failure in report order.
#[derive(Debug, Default)]
pub(crate) struct PhaseOutcome {
    pub(crate) evaluated: usize,
    pub(crate) cancelled: usize,
    pub(crate) failure: Option<AuthorizationFailure>,
}

/// One scheduled evaluation. `order` is (instance index, occurrence index).
struct Job {
    order: (usize, usize),
    rule: String,
    path: String,
    run: BoxFuture<'static, RuleResult>,
}

/// Evaluate every pre instance with the caller context and its arguments.
pub(crate) async fn evaluate_pre(
    plan: &CompiledRulePlan,
    context: &Arc<Context>,
    config: &PipelineConfig,
) -> PhaseOutcome {
    let mut jobs = Vec::with_capacity(plan.pre.len());
    for (index, instance) in plan.pre.iter().enumerate() {
        let RuleKind::Pre(rule) = instance.rule.kind() else {
            continue;
        };
        let rule = Arc::clone(rule);
        let invocation = PreInvocation {
            context: Arc::clone(context),
            arguments: Arc::clone(&instance.arguments),
        };
        jobs.push(Job {
            order: (index, 0),
            rule: instance.rule.name().to_owned(),
            path: instance.path.to_string(),
            run: async move { rule.evaluate(invocation).await }.boxed(),
        });
    }
    run_phase(Phase::Pre, jobs, config).await
}

/// Evaluate every post instance once per non-null value found at its path in
/// `data`, skipping values of other types for type-restricted instances.
pub(crate) async fn evaluate_post(
    plan: &CompiledRulePlan,
    context: &Arc<Context>,
    data: &Arc<Value>,
    config: &PipelineConfig,
) -> PhaseOutcome {
    let mut jobs = Vec::new();
    for (index, instance) in plan.post.iter().enumerate() {
        let RuleKind::Post { rule, .. } = instance.rule.kind() else {
            continue;
        };
        let found = occurrences(data, &instance.path)
            .into_iter()
            .filter(|(object, _)| instance.matches(object));
        for (occurrence, (object, path)) in found.enumerate() {
            let rule = Arc::clone(rule);
            let invocation = PostInvocation {
                context: Arc::clone(context),
                arguments: Arc::clone(&instance.arguments),
                object: object.clone(),
                result: Arc::clone(data),
            };
            jobs.push(Job {
                order: (index, occurrence),
                rule: instance.rule.name().to_owned(),
                path,
                run: async move { rule.evaluate(invocation).await }.boxed(),
            });
        }
    }
    run_phase(Phase::Post, jobs, config).await
}

/// Every non-null value at `path` in `data`, with its concrete location such
/// as `user.comments.0`. Lists are flattened at any depth; nulls, missing
/// keys and empty lists contribute nothing.
pub(crate) fn occurrences<'a>(data: &'a Value, path: &SelectionPath) -> Vec<(&'a Value, String)> {
    let steps = path.steps();
    let mut found = Vec::new();
    let mut stack: Vec<(&Value, usize, String)> = vec![(data, 0, String::new())];

    while let Some((value, depth, at)) = stack.pop() {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push((item, depth, join(&at, &i.to_string())));
                }
            }
            _ if depth == steps.len() => {
                let at = if at.is_empty() { path.to_string() } else { at };
                found.push((value, at));
            }
            Value::Object(map) => {
                let key = &steps[depth].key;
                if let Some(child) = map.get(key) {
                    stack.push((child, depth + 1, join(&at, key)));
                }
            }
            _ => {}
        }
    }
    found
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// Spawn every job, then wait until all of them settle. Failures are sorted
/// by `order` so the report does not depend on completion order.
async fn run_phase(phase: Phase, jobs: Vec<Job>, config: &PipelineConfig) -> PhaseOutcome {
    let limit = config
        .max_concurrency
        .map(|permits| Arc::new(Semaphore::new(permits.max(1))));

    let mut tasks = JoinSet::new();
    for job in jobs {
        let limit = limit.clone();
        tasks.spawn(async move {
            let _permit = match limit {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let outcome = AssertUnwindSafe(job.run).catch_unwind().await;
            (job.order, job.rule, job.path, outcome)
        });
    }

    let mut outcome = PhaseOutcome::default();
    let mut failures: Vec<((usize, usize), RuleFailure)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (order, rule, path, result) = match joined {
            Ok(settled) => settled,
            Err(err) if err.is_cancelled() => {
                outcome.cancelled += 1;
                continue;
            }
            Err(err) => {
                // The wrapper itself never panics; keep the task accounted for.
                tracing::error!(error = %err, "rule task failed");
                failures.push((
                    (usize::MAX, 0),
                    RuleFailure {
                        rule: "<unknown>".to_owned(),
                        path: String::new(),
                        kind: FailureKind::Fault(err.to_string()),
                    },
                ));
                continue;
            }
        };
        outcome.evaluated += 1;

        let kind = match result {
            Ok(Ok(Verdict::Allow)) => continue,
            Ok(Ok(Verdict::Deny { reason })) => FailureKind::Denied(reason),
            Ok(Err(fault)) => FailureKind::Fault(fault.message().to_owned()),
            Err(payload) => FailureKind::Fault(panic_message(&*payload)),
        };
        let failure = RuleFailure { rule, path, kind };
        tracing::warn!(%phase, rule = %failure.rule, path = %failure.path, "{failure}");
        failures.push((order, failure));

        if config.cancel_on_failure {
            tasks.abort_all();
        }
    }

    if !failures.is_empty() {
        failures.sort_by_key(|(order, _)| *order);
        outcome.failure = Some(AuthorizationFailure {
            phase,
            failures: failures.into_iter().map(|(_, failure)| failure).collect(),
        });
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("rule panicked: {detail}"),
        None => "rule panicked".to_owned(),
    }
}
