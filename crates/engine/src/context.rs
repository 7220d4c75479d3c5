//! Shared execution context: the write-once store of step outputs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use steps::{StepContext, TRIGGER};

use crate::error::AlreadyWritten;

/// Outputs of completed steps for a single execution, keyed by step id.
///
/// Created with the trigger entry, grown by exactly one insertion per
/// completed step, and discarded with the execution. Steps never touch it
/// directly: each receives a [`StepContext`] snapshot scoped to its declared
/// dependencies, and only the executor inserts.
#[derive(Debug, Default)]
pub struct SharedContext {
    entries: HashMap<String, Arc<Value>>,
}

impl SharedContext {
    pub fn new(trigger: Value) -> Self {
        let mut entries = HashMap::new();
        entries.insert(TRIGGER.to_owned(), Arc::new(trigger));
        Self { entries }
    }

    /// Record `id`'s output.
    ///
    /// # Errors
    /// [`AlreadyWritten`] if `id` already has an entry; the existing entry is
    /// left untouched.
    pub fn insert(&mut self, id: impl Into<String>, value: Value) -> Result<(), AlreadyWritten> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(AlreadyWritten(id));
        }
        self.entries.insert(id, Arc::new(value));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot for `step_id` exposing the trigger plus whichever of
    /// `dependencies` have entries.
    pub fn scoped(
        &self,
        step_id: &str,
        execution_id: uuid::Uuid,
        dependencies: &BTreeSet<String>,
    ) -> StepContext {
        let entries = self
            .entries
            .iter()
            .filter(|(id, _)| id.as_str() == TRIGGER || dependencies.contains(id.as_str()))
            .map(|(id, value)| (id.clone(), Arc::clone(value)))
            .collect();
        StepContext::new(step_id, execution_id, dependencies.clone(), entries)
    }

    /// Step outputs, trigger excluded.
    pub fn into_outputs(self) -> BTreeMap<String, Value> {
        self.entries
            .into_iter()
            .filter(|(id, _)| id != TRIGGER)
            .map(|(id, value)| {
                let value = Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone());
                (id, value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_are_write_once() {
        let mut ctx = SharedContext::new(json!({}));
        ctx.insert("a", json!(1)).unwrap();
        assert_eq!(ctx.insert("a", json!(2)), Err(AlreadyWritten("a".into())));
        assert_eq!(ctx.get("a"), Some(&json!(1)));
    }

    #[test]
    fn trigger_cannot_be_overwritten() {
        let mut ctx = SharedContext::new(json!({ "url": "x" }));
        assert!(ctx.insert(TRIGGER, json!(null)).is_err());
    }

    #[test]
    fn scoped_view_hides_undeclared_entries() {
        let mut ctx = SharedContext::new(json!({}));
        ctx.insert("a", json!("a")).unwrap();
        ctx.insert("c", json!("c")).unwrap();

        let view = ctx.scoped("b", uuid::Uuid::new_v4(), &BTreeSet::from(["a".to_string()]));
        assert_eq!(
            view.visible_keys(),
            BTreeSet::from([TRIGGER.to_string(), "a".to_string()])
        );
        assert!(view.value("c").is_err());
    }

    #[test]
    fn outputs_exclude_trigger() {
        let mut ctx = SharedContext::new(json!({ "url": "x" }));
        ctx.insert("a", json!(1)).unwrap();
        let outputs = ctx.into_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["a"], json!(1));
    }
}
