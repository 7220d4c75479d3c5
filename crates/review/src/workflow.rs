//! Assembly of the pull request review graph and its outward `run` surface.
//!
//! ```text
//! level 0   fetch_changeset
//!               │
//! level 1   review_summary  review_architecture  review_code_quality
//!           review_performance  review_security  review_testing
//!               │
//! level 2   generate_report
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine::{
    BuildError, ExecutorConfig, Graph, GraphBuilder, WorkflowExecutor, WorkflowOutcome,
    WorkflowOutput,
};
use serde_json::{json, Value};
use tracing::info;

use crate::collaborators::{ChangesetFetcher, Collaborators, ReportSink, ReviewGenerator};
use crate::contracts;
use crate::error::{FetchError, GenerationError, SinkError};
use crate::model::{Changeset, GeneratedReport, Review};
use crate::roles::Role;
use crate::stages::{fetch_step, report_step, role_to_step, RetryPolicy, GENERATE_REPORT};

/// Per-step limits and retry behaviour.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub review_timeout: Duration,
    pub persist_timeout: Duration,
    pub executor: ExecutorConfig,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(30),
            review_timeout: Duration::from_secs(120),
            persist_timeout: Duration::from_secs(10),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Build the review graph over `collaborators`.
pub fn build_review_graph(
    collaborators: &Collaborators,
    settings: &WorkflowSettings,
) -> Result<Graph, BuildError> {
    let builder = GraphBuilder::new()
        .trigger_contract(contracts::trigger())
        .add_step(fetch_step(
            collaborators.fetcher.clone(),
            settings.retry.clone(),
            settings.fetch_timeout,
        ))?;

    let builder = Role::ALL.into_iter().try_fold(builder, |builder, role| {
        builder.add_step(role_to_step(
            role,
            collaborators.generator.clone(),
            settings.review_timeout,
        ))
    })?;

    builder
        .add_step(report_step(
            collaborators.sink.clone(),
            settings.persist_timeout,
        ))?
        .build()
}

/// A built review graph and the executor that runs it.
pub struct ReviewWorkflow {
    graph: Graph,
    executor: WorkflowExecutor,
}

impl ReviewWorkflow {
    pub fn new(
        collaborators: &Collaborators,
        settings: &WorkflowSettings,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            graph: build_review_graph(collaborators, settings)?,
            executor: WorkflowExecutor::new(settings.executor.clone()),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run one review for `trigger`, which must look like `{ "url": ... }`.
    pub async fn run(&self, trigger: Value) -> WorkflowOutcome {
        self.executor.execute(&self.graph, trigger).await
    }

    /// Run one review of the pull request at `url`.
    pub async fn review(&self, url: &str) -> WorkflowOutcome {
        info!(url, "reviewing pull request");
        self.run(json!({ "url": url })).await
    }
}

/// Collaborators for a graph that is only inspected, never run.
struct Inert;

#[async_trait]
impl ChangesetFetcher for Inert {
    async fn fetch_changeset(&self, url: &str) -> Result<Changeset, FetchError> {
        Err(FetchError::InvalidReference(format!("planning only: {url}")))
    }
}

#[async_trait]
impl ReviewGenerator for Inert {
    async fn generate_review(&self, _: &str, _: &Changeset) -> Result<Review, GenerationError> {
        Err(GenerationError::Request("planning only".into()))
    }
}

#[async_trait]
impl ReportSink for Inert {
    async fn persist(&self, _: &str) -> Result<String, SinkError> {
        Err(SinkError::Io {
            path: "planning only".into(),
            source: std::io::Error::other("planning only"),
        })
    }
}

/// The review graph without any credentials, for inspecting its levels.
pub fn plan(settings: &WorkflowSettings) -> Result<Graph, BuildError> {
    let inert = Arc::new(Inert);
    let collaborators = Collaborators {
        fetcher: inert.clone(),
        generator: inert.clone(),
        sink: inert,
    };
    build_review_graph(&collaborators, settings)
}

/// Storage location of the report produced by a successful run.
pub fn report_location(output: &WorkflowOutput) -> Option<String> {
    output
        .get::<GeneratedReport>(GENERATE_REPORT)
        .map(|report| report.location)
}
