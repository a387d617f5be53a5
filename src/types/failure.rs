use std::fmt;

use thiserror::Error;

/// Which evaluation phase produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the engine was called; no data was fetched.
    Pre,
    /// After the engine returned; fetched data was discarded.
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pre => write!(f, "pre-execution"),
            Phase::Post => write!(f, "post-execution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The rule ran and rejected.
    Denied(Option<String>),
    /// The rule returned an error or panicked.
    Fault(String),
}

/// One failed evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule: String,
    /// Concrete location, e.g. `user.comments.0` (post) or the selection
    /// path (pre).
    pub path: String,
    pub kind: FailureKind,
}

impl RuleFailure {
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self.kind, FailureKind::Fault(_))
    }
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Denied(None) => write!(f, "rule '{}' denied at '{}'", self.rule, self.path),
            FailureKind::Denied(Some(reason)) => write!(
                f,
                "rule '{}' denied at '{}': {reason}",
                self.rule, self.path
            ),
            FailureKind::Fault(message) => write!(
                f,
                "rule '{}' failed at '{}': {message}",
                self.rule, self.path
            ),
        }
    }
}

/// Every failed evaluation of one phase, ordered by compiled instance then by
/// occurrence in the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase} authorization failed: {}", summary(.failures))]
pub struct AuthorizationFailure {
    pub phase: Phase,
    pub failures: Vec<RuleFailure>,
}

impl AuthorizationFailure {
    /// The failure reported first.
    #[must_use]
    pub fn first(&self) -> Option<&RuleFailure> {
        self.failures.first()
    }

    /// Names of the rules that failed, without repeats, in report order.
    #[must_use]
    pub fn rules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for failure in &self.failures {
            if !names.contains(&failure.rule.as_str()) {
                names.push(&failure.rule);
            }
        }
        names
    }
}

fn summary(failures: &[RuleFailure]) -> String {
    match failures {
        [] => "no failures recorded".to_owned(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(rule: &str, path: &str) -> RuleFailure {
        RuleFailure {
            rule: rule.into(),
            path: path.into(),
            kind: FailureKind::Denied(None),
        }
    }

    #[test]
    fn single_failure_message() {
        let failure = AuthorizationFailure {
            phase: Phase::Post,
            failures: vec![denied("IsOwner", "user.comments.0")],
        };
        assert_eq!(
            failure.to_string(),
            "post-execution authorization failed: rule 'IsOwner' denied at 'user.comments.0'"
        );
    }

    #[test]
    fn many_failures_are_summarised() {
        let failure = AuthorizationFailure {
            phase: Phase::Pre,
            failures: vec![
                denied("A", "user"),
                RuleFailure {
                    rule: "B".into(),
                    path: "post".into(),
                    kind: FailureKind::Fault("timeout".into()),
                },
                denied("A", "comment"),
            ],
        };
        assert_eq!(
            failure.to_string(),
            "pre-execution authorization failed: rule 'A' denied at 'user' (and 2 more)"
        );
        assert_eq!(failure.rules(), vec!["A", "B"]);
        assert!(failure.failures[1].is_fault());
    }

    #[test]
    fn denial_reason_is_shown() {
        let failure = RuleFailure {
            rule: "IsAdmin".into(),
            path: "secrets".into(),
            kind: FailureKind::Denied(Some("admins only".into())),
        };
        assert_eq!(
            failure.to_string(),
            "rule 'IsAdmin' denied at 'secrets': admins only"
        );
    }
}
