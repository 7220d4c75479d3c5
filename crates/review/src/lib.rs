//! `review` crate: the pull request review workflow.
//!
//! One fetch step loads the changeset, six role reviews run concurrently
//! against it, and a report step joins them into an org-mode document that
//! is handed to a [`ReportSink`].

pub mod collaborators;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gemini;
pub mod github;
pub mod mock;
pub mod model;
pub mod prompt;
pub mod roles;
pub mod sink;
pub mod stages;
pub mod template;
pub mod workflow;

pub use collaborators::{ChangesetFetcher, Collaborators, ReportSink, ReviewGenerator};
pub use config::ReviewConfig;
pub use error::{ConfigError, FetchError, GenerationError, SinkError};
pub use model::{Changeset, FileDelta, GeneratedReport, PullRequestRef, Review, Trigger};
pub use roles::Role;
pub use stages::{role_to_step, RetryPolicy, FETCH_CHANGESET, GENERATE_REPORT};
pub use workflow::{build_review_graph, plan, report_location, ReviewWorkflow, WorkflowSettings};
