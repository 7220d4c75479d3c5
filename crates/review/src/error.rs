//! Errors raised by the review collaborators and configuration loading.

use std::path::PathBuf;

use steps::{StepError, StepErrorKind};
use thiserror::Error;

/// Failure of the changeset fetcher.
///
/// The variants are distinguishable so the fetch step can decide whether a
/// retry is worthwhile: only [`FetchError::Transient`] is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not a pull request reference: {0}")]
    InvalidReference(String),

    #[error("pull request not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient failure: {0}")]
    Transient(String),

    /// The service refused a well-formed request, e.g. a diff too large to render.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> StepErrorKind {
        match self {
            Self::InvalidReference(_) => StepErrorKind::InvalidInput,
            Self::Timeout(_) => StepErrorKind::Timeout,
            Self::NotFound(_) | Self::Unauthorized(_) | Self::Transient(_) | Self::Rejected(_) => {
                StepErrorKind::CollaboratorFailure
            }
        }
    }
}

impl From<FetchError> for StepError {
    fn from(e: FetchError) -> Self {
        StepError::new(e.kind(), e.to_string()).with_cause(e)
    }
}

/// Failure of the review generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation response was malformed: {0}")]
    Malformed(String),

    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<GenerationError> for StepError {
    fn from(e: GenerationError) -> Self {
        let kind = match e {
            GenerationError::Timeout(_) => StepErrorKind::Timeout,
            _ => StepErrorKind::CollaboratorFailure,
        };
        StepError::new(kind, e.to_string()).with_cause(e)
    }
}

/// Failure of the report sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report sink timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<SinkError> for StepError {
    fn from(e: SinkError) -> Self {
        let kind = match e {
            SinkError::Timeout(_) => StepErrorKind::Timeout,
            SinkError::Io { .. } => StepErrorKind::CollaboratorFailure,
        };
        StepError::new(kind, e.to_string()).with_cause(e)
    }
}

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GITHUB_TOKEN is not set")]
    MissingToken,

    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
