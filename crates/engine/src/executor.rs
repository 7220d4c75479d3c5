//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the trigger input against the graph's trigger contract.
//! 2. Walks the graph level by level, running every step of a level
//!    concurrently and waiting for all of them to settle.
//! 3. Records each successful output in the shared context under its step id,
//!    so later levels can read it.
//! 4. Stops after the first level that has any failure, reporting every
//!    failure from that level.
//!
//! Each step runs inside an execution wrapper that checks input contracts,
//! enforces the optional deadline, catches panics, checks the output
//! contract, and records duration and status. The wrapper never retries.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use steps::{StepContext, StepError};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::context::SharedContext;
use crate::outcome::{FailedWorkflow, StepRecord, StepStatus, WorkflowOutcome, WorkflowOutput};
use crate::{Graph, StepDefinition, WorkflowError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Deadline applied to steps that don't set their own. `None` leaves
    /// bounding collaborator calls to the steps themselves.
    pub step_timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

struct StepRun {
    record: StepRecord,
    result: Result<Value, StepError>,
}

/// Stateless orchestrator; one instance can run any number of executions.
#[derive(Debug, Clone, Default)]
pub struct WorkflowExecutor {
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Run `graph` once for `trigger`.
    ///
    /// # Errors
    /// - [`WorkflowError::InvalidTrigger`] before any step runs.
    /// - [`WorkflowError::Failed`] with every failure of the first failing
    ///   level; no later level is started.
    #[instrument(skip_all, fields(execution_id = tracing::field::Empty, steps = graph.len()))]
    pub async fn execute(&self, graph: &Graph, trigger: Value) -> WorkflowOutcome {
        let execution_id = Uuid::new_v4();
        tracing::Span::current().record("execution_id", tracing::field::display(execution_id));

        // ------------------------------------------------------------------
        // Reject malformed trigger input up front.
        // ------------------------------------------------------------------
        if let Err(violation) = graph.trigger_contract().validate(&trigger) {
            warn!(%violation, "trigger rejected");
            return Err(WorkflowError::InvalidTrigger(violation));
        }

        let mut context = SharedContext::new(trigger);
        let mut records: Vec<StepRecord> = Vec::with_capacity(graph.len());

        // ------------------------------------------------------------------
        // Execute levels in order; steps within a level concurrently.
        // ------------------------------------------------------------------
        for (index, level) in graph.levels().iter().enumerate() {
            info!(level = index, steps = ?level, "dispatching level");

            let runs = join_all(level.iter().filter_map(|id| graph.step(id)).map(|def| {
                let view = context.scoped(def.id(), execution_id, def.depends_on());
                self.run_step(def, view, index)
            }))
            .await;

            let mut failures: Vec<StepError> = Vec::new();
            for run in runs {
                let step_id = run.record.step_id.clone();
                records.push(run.record);
                match run.result {
                    Ok(output) => {
                        if let Err(e) = context.insert(step_id.as_str(), output) {
                            failures.push(StepError::unexpected(e.to_string()).for_step(step_id));
                        }
                    }
                    Err(e) => failures.push(e),
                }
            }

            if !failures.is_empty() {
                let failed = FailedWorkflow {
                    execution_id,
                    level: index,
                    errors: failures,
                    completed: context.into_outputs(),
                    records,
                };
                error!(level = index, failed = ?failed.failed_step_ids(), "workflow failed");
                return Err(WorkflowError::Failed(failed));
            }
        }

        info!(%execution_id, "workflow succeeded");

        Ok(WorkflowOutput {
            execution_id,
            outputs: context.into_outputs(),
            records,
        })
    }

    // -----------------------------------------------------------------------
    // Internal: the step execution wrapper.
    // -----------------------------------------------------------------------

    async fn run_step(&self, def: &StepDefinition, ctx: StepContext, level: usize) -> StepRun {
        let started_at = Utc::now();
        let start = Instant::now();
        debug!(step_id = def.id(), level, "step started");

        let result = self
            .invoke(def, ctx)
            .await
            .and_then(|output| match def.output_contract().validate(&output) {
                Ok(()) => Ok(output),
                Err(violation) => Err(StepError::invalid_output(format!(
                    "output violates contract: {violation}"
                ))
                .with_cause(violation)),
            })
            .map_err(|e| e.for_step(def.id()));

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let status = match &result {
            Ok(_) => {
                info!(step_id = def.id(), level, elapsed_ms, "step succeeded");
                StepStatus::Succeeded
            }
            Err(e) => {
                error!(
                    step_id = def.id(),
                    level,
                    elapsed_ms,
                    kind = %e.kind(),
                    error = e.message(),
                    "step failed"
                );
                StepStatus::Failed
            }
        };

        StepRun {
            record: StepRecord {
                step_id: def.id().to_owned(),
                level,
                status,
                started_at,
                elapsed,
            },
            result,
        }
    }

    async fn invoke(&self, def: &StepDefinition, ctx: StepContext) -> Result<Value, StepError> {
        for (dependency, contract) in def.inputs() {
            let value = ctx.value(dependency)?;
            if let Err(violation) = contract.validate(value) {
                return Err(StepError::invalid_input(format!(
                    "input '{dependency}' violates contract: {violation}"
                ))
                .with_cause(violation));
            }
        }

        // The body runs on its own task so steps of a level proceed in
        // parallel and a panic stays contained.
        let step = Arc::clone(def.step());
        let mut handle = tokio::spawn(async move { step.run(&ctx).await });

        let joined = match def.step_timeout().or(self.config.step_timeout) {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(StepError::timeout(format!(
                        "step did not settle within {limit:?}"
                    )));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => Err(StepError::unexpected(format!(
                "step panicked: {}",
                panic_message(join_error.into_panic())
            ))),
            Err(join_error) => Err(StepError::unexpected(format!(
                "step task did not complete: {join_error}"
            ))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
