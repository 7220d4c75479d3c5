//! The external services the review workflow talks to.
//!
//! Steps hold these as trait objects so tests can swap in the stubs from
//! [`crate::mock`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{FetchError, GenerationError, SinkError};
use crate::model::{Changeset, Review};

/// Loads a pull request's metadata, file list and diff.
#[async_trait]
pub trait ChangesetFetcher: Send + Sync {
    async fn fetch_changeset(&self, url: &str) -> Result<Changeset, FetchError>;
}

/// Produces review text for a changeset from a role's point of view.
#[async_trait]
pub trait ReviewGenerator: Send + Sync {
    async fn generate_review(
        &self,
        instructions: &str,
        changeset: &Changeset,
    ) -> Result<Review, GenerationError>;
}

/// Stores a rendered report and says where it went.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn persist(&self, document: &str) -> Result<String, SinkError>;
}

/// The full set of collaborators one workflow needs.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn ChangesetFetcher>,
    pub generator: Arc<dyn ReviewGenerator>,
    pub sink: Arc<dyn ReportSink>,
}
