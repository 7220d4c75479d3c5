//! Graph assembly and validation: run this before executing a workflow.
//!
//! Rules enforced by [`GraphBuilder::build`]:
//! 1. Step IDs must be unique, and none may shadow the trigger entry.
//! 2. Every dependency must reference a registered step.
//! 3. Input contracts may only name declared dependencies (or the trigger),
//!    and must be satisfiable by the producer's declared output contract.
//! 4. The dependency relation must be acyclic (leveling must drain).
//!
//! On success the graph carries its level partition: every step in level
//! `k` depends only on steps in levels `< k`.

use std::collections::{BTreeSet, HashMap};

use steps::{Contract, TRIGGER};

use crate::{BuildError, StepDefinition};

/// A set of steps that become runnable at the same time.
pub type Level = BTreeSet<String>;

// ---------------------------------------------------------------------------
// Leveling
// ---------------------------------------------------------------------------

/// Partition steps into levels with Kahn's algorithm.
///
/// `dependencies` maps each step id to the ids it depends on; every
/// dependency must itself be a key. Each wave is the set of steps whose
/// remaining in-degree is zero, so a step lands in the level right after its
/// deepest dependency. The result does not depend on map iteration order.
///
/// # Errors
/// [`BuildError::CyclicDependency`] if some steps can never be leveled.
pub fn compute_levels(
    dependencies: &HashMap<&str, &BTreeSet<String>>,
) -> Result<Vec<Level>, BuildError> {
    // Build the reverse adjacency list and the in-degree map.
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for (&id, deps) in dependencies {
        in_degree.insert(id, deps.len());
        for dep in deps.iter() {
            dependents.entry(dep.as_str()).or_default().push(id);
        }
    }

    // Seed the first wave with steps that have no dependencies.
    let mut wave: Level = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id.to_owned())
        .collect();

    let mut levels: Vec<Level> = Vec::new();
    let mut leveled = 0usize;

    while !wave.is_empty() {
        let mut next = Level::new();
        for id in &wave {
            for &dependent in dependents.get(id.as_str()).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.insert(dependent.to_owned());
                    }
                }
            }
        }
        leveled += wave.len();
        levels.push(std::mem::replace(&mut wave, next));
    }

    // If we didn't level every step the graph contains a cycle.
    if leveled != dependencies.len() {
        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id.to_owned())
            .collect();
        stuck.sort();
        return Err(BuildError::CyclicDependency { steps: stuck });
    }

    Ok(levels)
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A validated, immutable step graph.
///
/// Built once per workflow definition; may be executed any number of times.
#[derive(Debug)]
pub struct Graph {
    trigger: Contract,
    steps: HashMap<String, StepDefinition>,
    levels: Vec<Level>,
}

impl Graph {
    /// Contract the trigger input must satisfy before any step runs.
    pub fn trigger_contract(&self) -> &Contract {
        &self.trigger
    }

    /// Level partition, in execution order.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    /// Index of the level `id` runs in.
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(id))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

/// Assembles step definitions into a [`Graph`].
///
/// ```
/// use engine::{GraphBuilder, StepDefinition};
/// use steps::mock::MockStep;
/// use serde_json::json;
///
/// let graph = GraphBuilder::new()
///     .add_step(StepDefinition::new("fetch", MockStep::returning("fetch", json!({}))))?
///     .add_step(
///         StepDefinition::new("review", MockStep::returning("review", json!({})))
///             .after(["fetch"]),
///     )?
///     .build()?;
/// assert_eq!(graph.levels().len(), 2);
/// # Ok::<(), engine::BuildError>(())
/// ```
#[derive(Debug)]
pub struct GraphBuilder {
    trigger: Contract,
    steps: HashMap<String, StepDefinition>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            trigger: Contract::Any,
            steps: HashMap::new(),
        }
    }

    /// Contract for the trigger input. Defaults to [`Contract::Any`].
    pub fn trigger_contract(mut self, contract: Contract) -> Self {
        self.trigger = contract;
        self
    }

    /// Register a step.
    ///
    /// # Errors
    /// - [`BuildError::DuplicateStepId`] if the id is already registered.
    /// - [`BuildError::ReservedStepId`] if the id is the trigger key.
    pub fn add_step(mut self, step: StepDefinition) -> Result<Self, BuildError> {
        if step.id() == TRIGGER {
            return Err(BuildError::ReservedStepId(step.id().to_owned()));
        }
        if self.steps.contains_key(step.id()) {
            return Err(BuildError::DuplicateStepId(step.id().to_owned()));
        }
        self.steps.insert(step.id().to_owned(), step);
        Ok(self)
    }

    /// Validate the graph and compute its levels.
    ///
    /// # Errors
    /// - [`BuildError::UnknownDependency`] for a dangling dependency.
    /// - [`BuildError::UndeclaredInput`] for an input contract on a
    ///   non-dependency.
    /// - [`BuildError::ContractMismatch`] when a producer cannot satisfy a
    ///   consumer's input contract.
    /// - [`BuildError::CyclicDependency`] if the graph is not acyclic.
    pub fn build(self) -> Result<Graph, BuildError> {
        // Sorted so the first reported problem is deterministic.
        let mut ids: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        ids.sort_unstable();

        // -------------------------------------------------------------------
        // 1. Dependency endpoints
        // -------------------------------------------------------------------
        for &id in &ids {
            let step = &self.steps[id];
            for dep in step.depends_on() {
                if !self.steps.contains_key(dep) {
                    return Err(BuildError::UnknownDependency {
                        step_id: id.to_owned(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // -------------------------------------------------------------------
        // 2. Input contracts
        // -------------------------------------------------------------------
        for &id in &ids {
            let step = &self.steps[id];
            for (dep, expected) in step.inputs() {
                let produced = if dep == TRIGGER {
                    &self.trigger
                } else if step.depends_on().contains(dep) {
                    self.steps[dep.as_str()].output_contract()
                } else {
                    return Err(BuildError::UndeclaredInput {
                        step_id: id.to_owned(),
                        dependency: dep.clone(),
                    });
                };
                if !expected.accepts(produced) {
                    return Err(BuildError::ContractMismatch {
                        step_id: id.to_owned(),
                        dependency: dep.clone(),
                        expected: expected.to_string(),
                        produced: produced.to_string(),
                    });
                }
            }
        }

        // -------------------------------------------------------------------
        // 3. Leveling (also rejects cycles)
        // -------------------------------------------------------------------
        let dependencies: HashMap<&str, &BTreeSet<String>> = self
            .steps
            .iter()
            .map(|(id, step)| (id.as_str(), step.depends_on()))
            .collect();
        let levels = compute_levels(&dependencies)?;

        Ok(Graph {
            trigger: self.trigger,
            steps: self.steps,
            levels,
        })
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steps::mock::MockStep;

    fn make_step(id: &str, deps: &[&str]) -> StepDefinition {
        StepDefinition::new(id, MockStep::returning(id, json!({}))).after(deps.iter().copied())
    }

    fn build(steps: Vec<StepDefinition>) -> Result<Graph, BuildError> {
        steps
            .into_iter()
            .try_fold(GraphBuilder::new(), GraphBuilder::add_step)?
            .build()
    }

    fn level(ids: &[&str]) -> Level {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn linear_graph_yields_one_step_per_level() {
        // A → B → C
        let graph = build(vec![
            make_step("a", &[]),
            make_step("b", &["a"]),
            make_step("c", &["b"]),
        ])
        .expect("should be valid");

        assert_eq!(graph.levels(), &[level(&["a"]), level(&["b"]), level(&["c"])]);
    }

    #[test]
    fn diamond_graph_groups_independent_steps() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let graph = build(vec![
            make_step("a", &[]),
            make_step("b", &["a"]),
            make_step("c", &["a"]),
            make_step("d", &["b", "c"]),
        ])
        .expect("should be valid");

        assert_eq!(
            graph.levels(),
            &[level(&["a"]), level(&["b", "c"]), level(&["d"])]
        );
        assert_eq!(graph.level_of("c"), Some(1));
    }

    #[test]
    fn step_lands_after_its_deepest_dependency() {
        // a → b → c, and d depends on a and c.
        let graph = build(vec![
            make_step("a", &[]),
            make_step("b", &["a"]),
            make_step("c", &["b"]),
            make_step("d", &["a", "c"]),
        ])
        .unwrap();
        assert_eq!(graph.level_of("d"), Some(3));
    }

    #[test]
    fn every_level_depends_only_on_earlier_levels() {
        let graph = build(vec![
            make_step("fetch", &[]),
            make_step("r1", &["fetch"]),
            make_step("r2", &["fetch"]),
            make_step("r3", &["fetch"]),
            make_step("side", &[]),
            make_step("report", &["fetch", "r1", "r2", "r3", "side"]),
        ])
        .unwrap();

        let mut seen = BTreeSet::new();
        for (k, lvl) in graph.levels().iter().enumerate() {
            for id in lvl {
                let step = graph.step(id).unwrap();
                for dep in step.depends_on() {
                    let dep_level = graph.level_of(dep).unwrap();
                    assert!(dep_level < k, "{id} in level {k} depends on {dep} in {dep_level}");
                }
                assert!(seen.insert(id.clone()), "{id} appears in more than one level");
            }
        }
        assert_eq!(seen.len(), graph.len());
    }

    #[test]
    fn registration_order_does_not_change_levels() {
        let forward = build(vec![
            make_step("a", &[]),
            make_step("b", &["a"]),
            make_step("c", &["a"]),
            make_step("d", &["b", "c"]),
        ])
        .unwrap();
        let backward = build(vec![
            make_step("d", &["b", "c"]),
            make_step("c", &["a"]),
            make_step("b", &["a"]),
            make_step("a", &[]),
        ])
        .unwrap();

        assert_eq!(forward.levels(), backward.levels());
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let result = GraphBuilder::new()
            .add_step(make_step("a", &[]))
            .and_then(|b| b.add_step(make_step("a", &[])));
        assert!(matches!(result, Err(BuildError::DuplicateStepId(id)) if id == "a"));
    }

    #[test]
    fn trigger_id_is_reserved() {
        let result = GraphBuilder::new().add_step(make_step(TRIGGER, &[]));
        assert!(matches!(result, Err(BuildError::ReservedStepId(_))));
    }

    #[test]
    fn dependency_on_missing_step_is_rejected() {
        let result = build(vec![make_step("a", &["ghost"])]); // ghost doesn't exist
        assert!(matches!(
            result,
            Err(BuildError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn two_step_cycle_is_detected() {
        let result = build(vec![make_step("a", &["b"]), make_step("b", &["a"])]);
        assert_eq!(
            result.unwrap_err(),
            BuildError::CyclicDependency {
                steps: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn cycle_below_a_valid_root_is_detected() {
        // root → x → y → z → x (cycle!)
        let result = build(vec![
            make_step("root", &[]),
            make_step("x", &["root", "z"]),
            make_step("y", &["x"]),
            make_step("z", &["y"]),
        ]);
        assert!(matches!(
            result,
            Err(BuildError::CyclicDependency { steps }) if steps == ["x", "y", "z"]
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let result = build(vec![make_step("a", &["a"])]);
        assert!(matches!(result, Err(BuildError::CyclicDependency { .. })));
    }

    #[test]
    fn single_step_no_dependencies_is_valid() {
        let graph = build(vec![make_step("solo", &[])]).expect("single step should be valid");
        assert_eq!(graph.levels(), &[level(&["solo"])]);
    }

    #[test]
    fn input_contract_on_undeclared_dependency_is_rejected() {
        let result = build(vec![
            make_step("a", &[]),
            make_step("b", &[]).expects("a", Contract::Any),
        ]);
        assert!(matches!(result, Err(BuildError::UndeclaredInput { .. })));
    }

    #[test]
    fn incompatible_contracts_are_rejected_at_build_time() {
        let result = build(vec![
            make_step("a", &[]).produces(Contract::object([("text", Contract::String)])),
            make_step("b", &["a"])
                .expects("a", Contract::object([("diff", Contract::String)])),
        ]);
        assert!(matches!(
            result,
            Err(BuildError::ContractMismatch { step_id, dependency, .. })
                if step_id == "b" && dependency == "a"
        ));
    }

    #[test]
    fn trigger_contract_is_checked_against_inputs() {
        let result = GraphBuilder::new()
            .trigger_contract(Contract::object([("url", Contract::String)]))
            .add_step(make_step("a", &[]).expects(TRIGGER, Contract::object([("url", Contract::Url)])))
            .and_then(GraphBuilder::build);
        // A plain string does not guarantee a URL.
        assert!(matches!(result, Err(BuildError::ContractMismatch { .. })));
    }
}
