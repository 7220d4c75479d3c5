//! Step bodies of the review workflow and the pure constructors that turn
//! them into [`StepDefinition`]s.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use engine::StepDefinition;
use serde_json::Value;
use steps::{to_output, ExecutableStep, StepContext, StepError, TRIGGER};
use tracing::{info, warn};

use crate::collaborators::{ChangesetFetcher, ReportSink, ReviewGenerator};
use crate::contracts;
use crate::error::FetchError;
use crate::model::{Changeset, GeneratedReport, Review, Trigger};
use crate::roles::Role;
use crate::template::render_report;

pub const FETCH_CHANGESET: &str = "fetch_changeset";
pub const GENERATE_REPORT: &str = "generate_report";

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Back-off for transient fetch failures: attempt `n` waits
/// `base_delay * 2^(n-1)` before trying again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Bound `fut` by `limit`, mapping an elapsed deadline with `on_timeout`.
async fn bounded<T, E>(
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

// ---------------------------------------------------------------------------
// fetch_changeset
// ---------------------------------------------------------------------------

/// Reads the trigger URL and loads its changeset, retrying transient
/// failures.
pub struct FetchStep {
    fetcher: Arc<dyn ChangesetFetcher>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl FetchStep {
    pub fn new(fetcher: Arc<dyn ChangesetFetcher>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            fetcher,
            retry,
            timeout,
        }
    }
}

#[async_trait]
impl ExecutableStep for FetchStep {
    async fn run(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let trigger: Trigger = ctx.trigger()?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = bounded(
                self.timeout,
                self.fetcher.fetch_changeset(&trigger.url),
                FetchError::Timeout,
            )
            .await;

            match result {
                Ok(changeset) => {
                    info!(
                        reference = %changeset.reference,
                        files = changeset.changed_files.len(),
                        attempt,
                        "changeset fetched"
                    );
                    return to_output(&changeset);
                }
                Err(e) if e.is_transient() && attempt <= self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// review_<role>
// ---------------------------------------------------------------------------

/// Asks the generator for one role's review of the fetched changeset.
pub struct ReviewStep {
    role: Role,
    generator: Arc<dyn ReviewGenerator>,
    timeout: Duration,
}

impl ReviewStep {
    pub fn new(role: Role, generator: Arc<dyn ReviewGenerator>, timeout: Duration) -> Self {
        Self {
            role,
            generator,
            timeout,
        }
    }
}

#[async_trait]
impl ExecutableStep for ReviewStep {
    async fn run(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let changeset: Changeset = ctx.get(FETCH_CHANGESET)?;
        let instructions = self.role.instructions();

        let review = bounded(
            self.timeout,
            self.generator.generate_review(&instructions, &changeset),
            crate::error::GenerationError::Timeout,
        )
        .await?;

        if review.text.trim().is_empty() {
            return Err(StepError::collaborator(format!(
                "{} review came back empty",
                self.role
            )));
        }

        info!(role = %self.role, chars = review.text.len(), "review generated");
        to_output(&review)
    }
}

// ---------------------------------------------------------------------------
// generate_report
// ---------------------------------------------------------------------------

/// Joins every role's review by role, renders the report and persists it.
pub struct ReportStep {
    sink: Arc<dyn ReportSink>,
    timeout: Duration,
}

impl ReportStep {
    pub fn new(sink: Arc<dyn ReportSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }
}

#[async_trait]
impl ExecutableStep for ReportStep {
    async fn run(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let changeset: Changeset = ctx.get(FETCH_CHANGESET)?;
        let reviews = Role::ALL
            .into_iter()
            .map(|role| -> Result<(Role, Review), StepError> {
                Ok((role, ctx.get(role.step_id())?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let document = render_report(&changeset, &reviews, Utc::now());
        let location = bounded(
            self.timeout,
            self.sink.persist(&document),
            crate::error::SinkError::Timeout,
        )
        .await?;

        to_output(&GeneratedReport { location })
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

pub fn fetch_step(
    fetcher: Arc<dyn ChangesetFetcher>,
    retry: RetryPolicy,
    timeout: Duration,
) -> StepDefinition {
    StepDefinition::new(FETCH_CHANGESET, FetchStep::new(fetcher, retry, timeout))
        .expects(TRIGGER, contracts::trigger())
        .produces(contracts::changeset())
}

/// The review step for `role`.
pub fn role_to_step(
    role: Role,
    generator: Arc<dyn ReviewGenerator>,
    timeout: Duration,
) -> StepDefinition {
    StepDefinition::new(role.step_id(), ReviewStep::new(role, generator, timeout))
        .after([FETCH_CHANGESET])
        .expects(FETCH_CHANGESET, contracts::changeset())
        .produces(contracts::review())
}

pub fn report_step(sink: Arc<dyn ReportSink>, timeout: Duration) -> StepDefinition {
    let mut def = StepDefinition::new(GENERATE_REPORT, ReportStep::new(sink, timeout))
        .after([FETCH_CHANGESET])
        .after(Role::ALL.map(Role::step_id))
        .expects(FETCH_CHANGESET, contracts::changeset())
        .produces(contracts::report());
    for role in Role::ALL {
        def = def.expects(role.step_id(), contracts::review());
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_changeset, MemorySink, StubFetcher, StubReviewer};
    use std::collections::{BTreeSet, HashMap};
    use steps::StepErrorKind;

    fn context(step: &str, entries: Vec<(&str, Value)>) -> StepContext {
        let declared: BTreeSet<String> = entries
            .iter()
            .map(|(k, _)| k.to_string())
            .filter(|k| k != TRIGGER)
            .collect();
        let entries: HashMap<String, Arc<Value>> = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Arc::new(v)))
            .collect();
        StepContext::new(step, uuid::Uuid::new_v4(), declared, entries)
    }

    fn trigger() -> (&'static str, Value) {
        (TRIGGER, serde_json::json!({ "url": "https://github.com/acme/widgets/pull/42" }))
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn fetch_retries_transient_failures() {
        let fetcher = Arc::new(StubFetcher::new(sample_changeset(3)).fail_first(vec![
            FetchError::Transient("502".into()),
            FetchError::Transient("503".into()),
        ]));
        let step = FetchStep::new(fetcher.clone(), fast_retry(), Duration::from_secs(1));

        let output = step.run(&context(FETCH_CHANGESET, vec![trigger()])).await.unwrap();

        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(output["changed_files"].as_array().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_backs_off_exponentially_between_attempts() {
        let fetcher = Arc::new(StubFetcher::new(sample_changeset(1)).fail_first(vec![
            FetchError::Transient("502".into()),
            FetchError::Transient("502".into()),
        ]));
        let step = FetchStep::new(fetcher.clone(), RetryPolicy::default(), Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        step.run(&context(FETCH_CHANGESET, vec![trigger()])).await.unwrap();

        // 500ms, then 1s.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1500), "waited {waited:?}");
        assert!(waited < Duration::from_secs(2), "waited {waited:?}");
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn fetch_gives_up_after_max_retries() {
        let fetcher = Arc::new(StubFetcher::new(sample_changeset(1)).fail_first(
            (0..5).map(|i| FetchError::Transient(format!("attempt {i}"))).collect(),
        ));
        let step = FetchStep::new(fetcher.clone(), fast_retry(), Duration::from_secs(1));

        let err = step
            .run(&context(FETCH_CHANGESET, vec![trigger()]))
            .await
            .unwrap_err();

        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(err.kind(), StepErrorKind::CollaboratorFailure);
    }

    #[tokio::test]
    async fn fetch_does_not_retry_invalid_references() {
        let fetcher = Arc::new(
            StubFetcher::new(sample_changeset(1))
                .fail_first(vec![FetchError::InvalidReference("x".into())]),
        );
        let step = FetchStep::new(fetcher.clone(), fast_retry(), Duration::from_secs(1));

        let err = step
            .run(&context(FETCH_CHANGESET, vec![trigger()]))
            .await
            .unwrap_err();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(err.kind(), StepErrorKind::InvalidInput);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let fetcher =
            Arc::new(StubFetcher::new(sample_changeset(1)).delayed(Duration::from_secs(5)));
        let step = FetchStep::new(fetcher, fast_retry(), Duration::from_millis(20));

        let err = step
            .run(&context(FETCH_CHANGESET, vec![trigger()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StepErrorKind::Timeout);
    }

    #[tokio::test]
    async fn empty_review_is_a_collaborator_failure() {
        let generator = Arc::new(StubReviewer::new().empty_for(Role::Performance));
        let step = ReviewStep::new(Role::Performance, generator, Duration::from_secs(1));
        let changeset = serde_json::to_value(sample_changeset(1)).unwrap();

        let err = step
            .run(&context("review_performance", vec![trigger(), (FETCH_CHANGESET, changeset)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), StepErrorKind::CollaboratorFailure);
        assert!(err.message().contains("performance"));
    }

    #[tokio::test]
    async fn review_step_passes_role_instructions() {
        let generator = Arc::new(StubReviewer::new());
        let step = ReviewStep::new(Role::Security, generator.clone(), Duration::from_secs(1));
        let changeset = serde_json::to_value(sample_changeset(1)).unwrap();

        let output = step
            .run(&context("review_security", vec![trigger(), (FETCH_CHANGESET, changeset)]))
            .await
            .unwrap();

        assert_eq!(generator.calls(), vec![Role::Security]);
        assert!(output["text"].as_str().unwrap().starts_with("* Security"));
    }

    #[tokio::test]
    async fn report_step_joins_reviews_by_role() {
        let sink = Arc::new(MemorySink::new());
        let step = ReportStep::new(sink.clone(), Duration::from_secs(1));

        let mut entries = vec![
            trigger(),
            (FETCH_CHANGESET, serde_json::to_value(sample_changeset(2)).unwrap()),
        ];
        // Reverse order, to show arrival order does not matter.
        for role in Role::ALL.into_iter().rev() {
            entries.push((
                role.step_id(),
                serde_json::json!({ "text": format!("* {}", role.title()) }),
            ));
        }

        let output = step.run(&context(GENERATE_REPORT, entries)).await.unwrap();

        assert_eq!(output["location"], "memory://report/1");
        let doc = sink.documents().pop().unwrap();
        let positions: Vec<usize> = Role::ALL
            .iter()
            .map(|r| doc.find(&format!("* {}", r.title())).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn report_step_declares_every_review() {
        let def = report_step(Arc::new(MemorySink::new()), Duration::from_secs(1));
        assert_eq!(def.depends_on().len(), Role::ALL.len() + 1);
        assert!(def.inputs().contains_key("review_testing"));
    }
}
