use std::fmt;
use std::time::Duration;

/// States one execution moves through. `Aborted` and `Failed` end in an
/// error, `Completed` in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compiling,
    Augmenting,
    PreChecking,
    Aborted,
    Executing,
    PostChecking,
    Failed,
    Pruning,
    Completed,
}

impl Stage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Aborted | Stage::Failed | Stage::Completed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Compiling => "compiling",
            Stage::Augmenting => "augmenting",
            Stage::PreChecking => "pre-checking",
            Stage::Aborted => "aborted",
            Stage::Executing => "executing",
            Stage::PostChecking => "post-checking",
            Stage::Failed => "failed",
            Stage::Pruning => "pruning",
            Stage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Diagnostics for one execution, returned by
/// [`Pipeline::execute_detailed()`](crate::Pipeline::execute_detailed).
///
/// Records the stages traversed, how many rule evaluations each phase ran,
/// how many were cancelled, how many fields were injected and the
/// wall-clock duration.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct ExecutionReport {
    pub(crate) stages: Vec<Stage>,
    pub(crate) pre_evaluations: usize,
    pub(crate) post_evaluations: usize,
    pub(crate) cancelled: usize,
    pub(crate) injected_fields: usize,
    pub(crate) duration: Duration,
}

impl ExecutionReport {
    pub(crate) fn enter(&mut self, stage: Stage) {
        tracing::debug!(%stage, "authorization stage");
        self.stages.push(stage);
    }

    /// Stages in the order they were entered.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The last stage entered.
    #[must_use]
    pub fn final_stage(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    /// Pre-execution evaluations that ran to completion.
    #[must_use]
    pub fn pre_evaluations(&self) -> usize {
        self.pre_evaluations
    }

    /// Post-execution evaluations that ran to completion.
    #[must_use]
    pub fn post_evaluations(&self) -> usize {
        self.post_evaluations
    }

    /// Evaluations aborted after a sibling failed.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }

    /// Fields added to the outgoing operation for rule requirements.
    #[must_use]
    pub fn injected_fields(&self) -> usize {
        self.injected_fields
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.final_stage() {
            Some(stage) => write!(f, "stage: {stage}")?,
            None => write!(f, "stage: none")?,
        }
        write!(
            f,
            ", evaluations: {} pre / {} post",
            self.pre_evaluations, self.post_evaluations
        )?;
        if self.cancelled > 0 {
            write!(f, ", cancelled: {}", self.cancelled)?;
        }
        write!(f, ", injected: {}", self.injected_fields)?;
        write!(f, ", duration: {:?}", self.duration)?;
        Ok(())
    }
}
