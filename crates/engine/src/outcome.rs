//! What an execution hands back to its caller.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use steps::{StepError, StepErrorKind};
use uuid::Uuid;

use crate::WorkflowError;

/// Result of running a full workflow.
pub type WorkflowOutcome = Result<WorkflowOutput, WorkflowError>;

/// How a step settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// Duration and outcome of one step invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step_id: String,
    pub level: usize,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Every step succeeded.
#[derive(Debug)]
pub struct WorkflowOutput {
    pub execution_id: Uuid,
    /// Output of every step, keyed by step id.
    pub outputs: BTreeMap<String, Value>,
    pub records: Vec<StepRecord>,
}

impl WorkflowOutput {
    pub fn value(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    /// Typed output of `step_id`, if present and of the expected shape.
    pub fn get<T: DeserializeOwned>(&self, step_id: &str) -> Option<T> {
        self.outputs
            .get(step_id)
            .and_then(|v| T::deserialize(v).ok())
    }
}

/// `{ step_id, kind, message }` line of a failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub step_id: String,
    pub kind: StepErrorKind,
    pub message: String,
}

/// A level failed, so the workflow stopped there.
#[derive(Debug)]
pub struct FailedWorkflow {
    pub execution_id: Uuid,
    /// Index of the level whose steps failed.
    pub level: usize,
    /// Every failure from that level, ordered by step id.
    pub errors: Vec<StepError>,
    /// Outputs of every step that did succeed, including siblings of the
    /// failed steps. Kept for diagnostics only.
    pub completed: BTreeMap<String, Value>,
    pub records: Vec<StepRecord>,
}

impl FailedWorkflow {
    pub fn failed_step_ids(&self) -> Vec<&str> {
        self.errors.iter().map(StepError::step_id).collect()
    }

    pub fn failures(&self) -> Vec<FailureSummary> {
        self.errors
            .iter()
            .map(|e| FailureSummary {
                step_id: e.step_id().to_owned(),
                kind: e.kind(),
                message: e.message().to_owned(),
            })
            .collect()
    }
}

impl fmt::Display for FailedWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workflow stopped at level {}: {} step(s) failed ({})",
            self.level,
            self.errors.len(),
            self.failed_step_ids().join(", ")
        )
    }
}
