//! Error taxonomy shared by activities and workflows
//!
//! Every failure crossing an activity boundary is classified into one of
//! five kinds. Workflows branch on the kind and never see raw provider
//! errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Non-retryable: bad spec, permission denial, unrecoverable rejection
    Fatal,
    /// Retryable: throttling, timeout, transient network failure
    Transient,
    /// Idempotency short-circuit: the resource already exists and matches
    AlreadySatisfied,
    /// A bounded wait elapsed without reaching the goal state
    TimedOut,
    /// Caller-initiated abort
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::AlreadySatisfied => write!(f, "already-satisfied"),
            ErrorKind::TimedOut => write!(f, "timed-out"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A classified step failure with diagnostic context
///
/// Carries which step failed and against which resource, so an operator
/// can diagnose a partially-provisioned cluster from the terminal state
/// alone.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{step}: {message} ({kind})")]
pub struct StepError {
    pub kind: ErrorKind,
    /// Name of the step (activity) that produced the failure
    pub step: String,
    /// Resource the step was operating on, when known
    pub resource: Option<String>,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            step: step.into(),
            resource: None,
            message: message.into(),
        }
    }

    pub fn fatal(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, step, message)
    }

    pub fn transient(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, step, message)
    }

    pub fn already_satisfied(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadySatisfied, step, message)
    }

    pub fn timed_out(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimedOut, step, message)
    }

    pub fn cancelled(step: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, step, "cancelled by caller")
    }

    /// Attach the resource identifier the step was working against
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Re-attribute the error to a different step name
    ///
    /// Used when a seam (session factory, template provider) classifies
    /// an error before the owning activity is known.
    pub fn for_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    /// Whether the durable runtime should retry this failure
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, StepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StepError::transient("CreateNetwork", "throttled").is_retryable());
        assert!(!StepError::fatal("CreateNetwork", "bad template").is_retryable());
        assert!(!StepError::timed_out("CreateNodeGroup", "no capacity").is_retryable());
        assert!(!StepError::cancelled("CreateNodeGroup").is_retryable());
    }

    #[test]
    fn test_display_includes_step_and_kind() {
        let err = StepError::fatal("CreateIamRoles", "access denied")
            .with_resource("demo-cluster-iam");
        let text = err.to_string();
        assert!(text.contains("CreateIamRoles"));
        assert!(text.contains("fatal"));
    }

    #[test]
    fn test_round_trips_as_json() {
        let err = StepError::transient("DescribeSubnets", "rate exceeded");
        let json = serde_json::to_string(&err).unwrap();
        let back: StepError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ErrorKind::Transient);
        assert_eq!(back.step, "DescribeSubnets");
    }
}
