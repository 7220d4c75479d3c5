//! Step-level error type.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::contract::ContractViolation;

/// Classification of a step failure.
///
/// Callers match on the kind instead of inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// The context snapshot did not satisfy the step's input contract.
    InvalidInput,
    /// The step produced a value violating its own output contract.
    InvalidOutput,
    /// An external collaborator (network, generation, storage) failed.
    CollaboratorFailure,
    /// A deadline elapsed before the step settled.
    Timeout,
    /// Any fault the step did not classify itself, panics included.
    Unexpected,
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "invalid_input"),
            Self::InvalidOutput => write!(f, "invalid_output"),
            Self::CollaboratorFailure => write!(f, "collaborator_failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Error returned by a step's `run` method.
///
/// A step body builds the error without knowing its own id; the engine's
/// execution wrapper stamps the id of the step that actually ran before the
/// error is recorded.
#[derive(Debug, Error)]
#[error("step '{step_id}' failed ({kind}): {message}")]
pub struct StepError {
    step_id: String,
    kind: StepErrorKind,
    message: String,
    #[source]
    cause: Option<anyhow::Error>,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            step_id: String::new(),
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::InvalidInput, message)
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::InvalidOutput, message)
    }

    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::CollaboratorFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Timeout, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Unexpected, message)
    }

    /// Attach the underlying error.
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Set the id of the step this error belongs to.
    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = step_id.into();
        self
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn kind(&self) -> StepErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }
}

impl From<ContractViolation> for StepError {
    fn from(violation: ContractViolation) -> Self {
        let message = violation.to_string();
        Self::invalid_input(message).with_cause(violation)
    }
}
