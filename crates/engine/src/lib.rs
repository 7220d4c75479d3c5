//! `engine` crate: step graph assembly, leveling, and the level-by-level
//! execution engine.

pub mod context;
pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod outcome;

pub use context::SharedContext;
pub use dag::{compute_levels, Graph, GraphBuilder, Level};
pub use error::{AlreadyWritten, BuildError, WorkflowError};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use models::StepDefinition;
pub use outcome::{
    FailedWorkflow, FailureSummary, StepRecord, StepStatus, WorkflowOutcome, WorkflowOutput,
};
