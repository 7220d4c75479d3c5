//! Engine-level error types.

use steps::ContractViolation;
use thiserror::Error;

use crate::outcome::FailedWorkflow;

/// Errors raised while assembling a graph, before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Two steps share the same id.
    #[error("duplicate step id: '{0}'")]
    DuplicateStepId(String),

    /// A step tried to register under the id reserved for the trigger entry.
    #[error("step id '{0}' is reserved for the trigger input")]
    ReservedStepId(String),

    /// A step depends on an id that was never registered.
    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: String, dependency: String },

    /// The dependency relation is not acyclic. `steps` lists every step
    /// that could not be leveled.
    #[error("dependency cycle among steps: {}", steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    /// An input contract names an id that is not among the step's
    /// dependencies.
    #[error("step '{step_id}' declares an input contract for '{dependency}' without depending on it")]
    UndeclaredInput { step_id: String, dependency: String },

    /// A step's input contract cannot be satisfied by what its producer
    /// declares it outputs.
    #[error("step '{step_id}' expects {expected} from '{dependency}', which produces {produced}")]
    ContractMismatch {
        step_id: String,
        dependency: String,
        expected: String,
        produced: String,
    },
}

/// The context already holds an entry for this id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("context entry '{0}' was already written")]
pub struct AlreadyWritten(pub String);

/// Terminal failure of a workflow execution.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The trigger input violated the graph's trigger contract. No step ran.
    #[error("invalid trigger: {0}")]
    InvalidTrigger(#[source] ContractViolation),

    /// One or more steps of a level failed; later levels never started.
    #[error("{0}")]
    Failed(FailedWorkflow),
}
