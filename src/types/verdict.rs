use std::fmt;

/// Outcome of a single rule evaluation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Verdict {
    Allow,
    Deny { reason: Option<String> },
}

/// What a rule body returns. `Err` marks an unexpected fault rather than a
/// deliberate denial; both fail the operation.
pub type RuleResult = Result<Verdict, RuleFault>;

impl Verdict {
    pub fn allow() -> Self {
        Verdict::Allow
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Verdict::Deny {
            reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl From<bool> for Verdict {
    fn from(allowed: bool) -> Self {
        if allowed {
            Verdict::Allow
        } else {
            Verdict::Deny { reason: None }
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Deny { reason: Some(reason) } => write!(f, "deny: {reason}"),
            Verdict::Deny { reason: None } => write!(f, "deny"),
        }
    }
}

/// An error raised from inside a rule body.
///
/// Converts from any [`std::error::Error`], so rules can use `?` on their own
/// fallible calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFault {
    message: String,
}

impl RuleFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<E: std::error::Error> From<E> for RuleFault {
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}

impl fmt::Display for RuleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
