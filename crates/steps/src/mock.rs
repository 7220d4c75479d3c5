//! `MockStep`: a test double for `ExecutableStep`.
//!
//! Useful in unit and integration tests where a real step implementation is
//! either unavailable or irrelevant.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ExecutableStep, StepContext, StepError, StepErrorKind};

/// Behaviour injected into `MockStep` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Return the value as-is, without the `step` tag.
    ReturnRaw(Value),
    /// Fail with the given kind and message.
    Fail(StepErrorKind, String),
    /// Panic inside the step body.
    Panic(String),
}

/// Tracks how many mock steps are running at the same time.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Highest number of simultaneously running steps observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A mock step that records every call it receives and returns a
/// programmer-specified result.
pub struct MockStep {
    /// Label used in test assertions.
    pub name: String,
    /// What the step will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// Time to sleep before settling.
    pub delay: Option<Duration>,
    /// Context keys visible to each call (in call order).
    pub calls: Arc<Mutex<Vec<BTreeSet<String>>>>,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl MockStep {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            probe: None,
        }
    }

    /// Create a mock that always succeeds with the given value.
    ///
    /// Object values get a `"step": <name>` field merged in so tests can
    /// trace which step produced an entry.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that returns `value` untouched.
    pub fn returning_raw(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnRaw(value))
    }

    /// Create a mock that always fails with the given kind.
    pub fn failing(name: impl Into<String>, kind: StepErrorKind, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(kind, msg.into()))
    }

    /// Create a mock whose body panics.
    pub fn panicking(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Panic(msg.into()))
    }

    /// Sleep for `delay` before settling.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report entry and exit to `probe`.
    pub fn probed(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Number of times this step has been run.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Context keys the most recent call could see.
    pub fn last_visible_keys(&self) -> Option<BTreeSet<String>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ExecutableStep for MockStep {
    async fn run(&self, ctx: &StepContext) -> Result<Value, StepError> {
        self.calls.lock().unwrap().push(ctx.visible_keys());

        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(probe) = &self.probe {
            probe.exit();
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                let mut out = json!({ "step": self.name });
                match (out.as_object_mut(), v.as_object()) {
                    (Some(out_obj), Some(v_obj)) => {
                        for (k, val) in v_obj {
                            out_obj.insert(k.clone(), val.clone());
                        }
                        Ok(out)
                    }
                    _ => Ok(v.clone()),
                }
            }
            MockBehaviour::ReturnRaw(v) => Ok(v.clone()),
            MockBehaviour::Fail(kind, msg) => Err(StepError::new(*kind, msg.clone())),
            MockBehaviour::Panic(msg) => panic!("{}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_ctx() -> StepContext {
        StepContext::new("m", uuid::Uuid::new_v4(), BTreeSet::new(), HashMap::new())
    }

    #[tokio::test]
    async fn returning_merges_step_tag() {
        let step = MockStep::returning("a", json!({ "n": 1 }));
        let out = step.run(&empty_ctx()).await.unwrap();
        assert_eq!(out, json!({ "step": "a", "n": 1 }));
        assert_eq!(step.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_reports_kind() {
        let step = MockStep::failing("b", StepErrorKind::Timeout, "slow");
        let err = step.run(&empty_ctx()).await.unwrap_err();
        assert_eq!(err.kind(), StepErrorKind::Timeout);
        assert_eq!(err.message(), "slow");
    }
}
