//! Step definitions: what a graph is assembled from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use steps::{Contract, ExecutableStep};

/// A single step in the workflow graph.
///
/// Pairs an [`ExecutableStep`] body with its id, dependency edges, and the
/// contracts enforced at its boundaries.
#[derive(Clone)]
pub struct StepDefinition {
    id: String,
    depends_on: BTreeSet<String>,
    inputs: BTreeMap<String, Contract>,
    output: Contract,
    timeout: Option<Duration>,
    step: Arc<dyn ExecutableStep>,
}

impl StepDefinition {
    pub fn new(id: impl Into<String>, step: impl ExecutableStep + 'static) -> Self {
        Self::from_arc(id, Arc::new(step))
    }

    /// Use an already shared step body, e.g. a mock kept by a test.
    pub fn from_arc(id: impl Into<String>, step: Arc<dyn ExecutableStep>) -> Self {
        Self {
            id: id.into(),
            depends_on: BTreeSet::new(),
            inputs: BTreeMap::new(),
            output: Contract::Any,
            timeout: None,
            step,
        }
    }

    /// Declare steps that must complete before this one may run.
    pub fn after<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Declare the contract this step requires of `dependency`'s output.
    /// `dependency` must be a declared dependency or the trigger.
    pub fn expects(mut self, dependency: impl Into<String>, contract: Contract) -> Self {
        self.inputs.insert(dependency.into(), contract);
        self
    }

    /// Declare the contract of this step's own output.
    pub fn produces(mut self, contract: Contract) -> Self {
        self.output = contract;
        self
    }

    /// Deadline for this step, overriding the executor default.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    pub fn inputs(&self) -> &BTreeMap<String, Contract> {
        &self.inputs
    }

    pub fn output_contract(&self) -> &Contract {
        &self.output
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn step(&self) -> &Arc<dyn ExecutableStep> {
        &self.step
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
