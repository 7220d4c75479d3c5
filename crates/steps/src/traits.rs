//! The `ExecutableStep` trait and the read view a step runs against.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::StepError;

/// Context key under which the workflow's trigger input is stored.
pub const TRIGGER: &str = "trigger";

/// Read-only view of the execution context handed to a single step.
///
/// Only the trigger entry and the outputs of the step's declared
/// dependencies are visible. Reading anything else is a contract violation
/// reported as [`StepErrorKind::InvalidInput`](crate::StepErrorKind).
///
/// Defined here (in the steps crate) so both the engine and individual step
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct StepContext {
    step_id: String,
    execution_id: uuid::Uuid,
    declared: BTreeSet<String>,
    entries: HashMap<String, Arc<Value>>,
}

impl StepContext {
    /// Build a view for `step_id` that exposes `entries` under the ids in
    /// `declared` (the trigger is always readable).
    pub fn new(
        step_id: impl Into<String>,
        execution_id: uuid::Uuid,
        declared: BTreeSet<String>,
        entries: HashMap<String, Arc<Value>>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            execution_id,
            declared,
            entries,
        }
    }

    /// Id of the step this view was built for.
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    /// Id of the current execution run.
    pub fn execution_id(&self) -> uuid::Uuid {
        self.execution_id
    }

    /// Ids this step may read, trigger excluded.
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    /// Ids whose entries are actually present in this view.
    pub fn visible_keys(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Raw JSON output of dependency `id`.
    pub fn value(&self, id: &str) -> Result<&Value, StepError> {
        if id != TRIGGER && !self.declared.contains(id) {
            return Err(StepError::invalid_input(format!(
                "step '{}' read '{id}' without declaring a dependency on it",
                self.step_id
            )));
        }
        self.entries
            .get(id)
            .map(Arc::as_ref)
            .ok_or_else(|| {
                StepError::invalid_input(format!(
                    "no output recorded for '{id}' when '{}' started",
                    self.step_id
                ))
            })
    }

    /// Typed output of dependency `id`.
    pub fn get<T: DeserializeOwned>(&self, id: &str) -> Result<T, StepError> {
        let value = self.value(id)?;
        T::deserialize(value).map_err(|e| {
            StepError::invalid_input(format!("output of '{id}' has an unexpected shape: {e}"))
                .with_cause(e)
        })
    }

    /// Typed trigger input.
    pub fn trigger<T: DeserializeOwned>(&self) -> Result<T, StepError> {
        self.get(TRIGGER)
    }
}

/// Serialize a step's typed output into the JSON value the engine records.
pub fn to_output<T: Serialize>(output: &T) -> Result<Value, StepError> {
    serde_json::to_value(output).map_err(|e| {
        StepError::invalid_output(format!("output could not be serialized: {e}")).with_cause(e)
    })
}

/// The core step trait.
///
/// A step is invoked at most once per workflow execution. It may perform
/// side effects against external collaborators but never writes context
/// entries itself: the engine records the returned value under the step's id.
#[async_trait]
pub trait ExecutableStep: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> Result<Value, StepError>;
}
