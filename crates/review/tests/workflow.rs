//! End-to-end runs of the review workflow against stub collaborators.

use std::time::Duration;

use engine::{StepStatus, WorkflowError};
use review::mock::{sample_changeset, StubCollaborators, StubFetcher, StubReviewer};
use review::{
    report_location, Changeset, FetchError, Review, ReviewWorkflow, Role, WorkflowSettings,
    FETCH_CHANGESET, GENERATE_REPORT,
};
use serde_json::json;
use steps::StepErrorKind;
use tokio::time::Instant;

fn workflow(stubs: &StubCollaborators) -> ReviewWorkflow {
    ReviewWorkflow::new(&stubs.collaborators(), &WorkflowSettings::default()).unwrap()
}

#[tokio::test]
async fn successful_review_reaches_the_sink() {
    let stubs = StubCollaborators::new(StubFetcher::new(sample_changeset(3)), StubReviewer::new());

    let output = workflow(&stubs)
        .run(json!({ "url": "https://example.com/repo/42" }))
        .await
        .expect("review should succeed");

    assert_eq!(stubs.fetcher.call_count(), 1);
    assert_eq!(stubs.reviewer.call_count(), Role::ALL.len());
    assert_eq!(stubs.sink.call_count(), 1);

    let changeset: Changeset = output.get(FETCH_CHANGESET).unwrap();
    assert_eq!(changeset.changed_files.len(), 3);
    for role in Role::ALL {
        let review: Review = output.get(role.step_id()).unwrap();
        assert!(!review.text.is_empty());
    }

    assert_eq!(report_location(&output).as_deref(), Some("memory://report/1"));
    assert!(output.value(GENERATE_REPORT).is_some());

    let document = stubs.sink.documents().remove(0);
    assert!(document.starts_with("#+TITLE: Pull request review: Add widgets\n"));
    assert!(document.contains("* Changed files (3)"));
    assert!(document.contains("* Security\n** Comments"));
}

#[tokio::test]
async fn failing_security_review_stops_before_the_report() {
    let stubs = StubCollaborators::new(
        StubFetcher::new(sample_changeset(3)),
        StubReviewer::new().failing_for(Role::Security, "model overloaded"),
    );

    let err = workflow(&stubs)
        .run(json!({ "url": "https://example.com/repo/42" }))
        .await
        .unwrap_err();

    let WorkflowError::Failed(failed) = err else {
        panic!("expected a step failure");
    };

    let failures = failed.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].step_id, "review_security");
    assert_eq!(failures[0].kind, StepErrorKind::CollaboratorFailure);
    assert!(failures[0].message.contains("model overloaded"));

    assert!(!failed.completed.contains_key(GENERATE_REPORT));
    for role in [
        Role::Summary,
        Role::Architecture,
        Role::CodeQuality,
        Role::Performance,
        Role::Testing,
    ] {
        assert!(failed.completed.contains_key(role.step_id()));
        let record = failed
            .records
            .iter()
            .find(|r| r.step_id == role.step_id())
            .unwrap();
        assert_eq!(record.status, StepStatus::Succeeded);
    }
    assert_eq!(stubs.sink.call_count(), 0);
}

#[tokio::test]
async fn malformed_trigger_calls_no_collaborator() {
    let stubs = StubCollaborators::new(StubFetcher::new(sample_changeset(3)), StubReviewer::new());

    let err = workflow(&stubs)
        .run(json!({ "url": "not-a-url" }))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::InvalidTrigger(_)));
    assert_eq!(stubs.fetcher.call_count(), 0);
    assert_eq!(stubs.reviewer.call_count(), 0);
    assert_eq!(stubs.sink.call_count(), 0);
}

#[tokio::test]
async fn missing_trigger_field_is_rejected() {
    let stubs = StubCollaborators::new(StubFetcher::new(sample_changeset(1)), StubReviewer::new());

    let err = workflow(&stubs).run(json!({ "link": "x" })).await.unwrap_err();

    let WorkflowError::InvalidTrigger(violation) = err else {
        panic!("expected an invalid trigger");
    };
    assert_eq!(violation.path, "$.url");
}

#[tokio::test]
async fn unrecoverable_fetch_failure_skips_every_review() {
    let stubs = StubCollaborators::new(
        StubFetcher::new(sample_changeset(1))
            .fail_first(vec![FetchError::NotFound("acme/widgets#42".into())]),
        StubReviewer::new(),
    );

    let Err(WorkflowError::Failed(failed)) = workflow(&stubs)
        .review("https://github.com/acme/widgets/pull/42")
        .await
    else {
        panic!("expected a failed workflow");
    };

    assert_eq!(failed.level, 0);
    assert_eq!(failed.failed_step_ids(), vec![FETCH_CHANGESET]);
    assert_eq!(stubs.fetcher.call_count(), 1);
    assert_eq!(stubs.reviewer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reviews_run_concurrently() {
    let delay = Duration::from_millis(200);
    let stubs = StubCollaborators::new(
        StubFetcher::new(sample_changeset(1)),
        StubReviewer::new().delayed(delay),
    );

    let start = Instant::now();
    workflow(&stubs)
        .run(json!({ "url": "https://example.com/repo/42" }))
        .await
        .unwrap();

    // Six sequential reviews would take at least 1.2s.
    assert!(start.elapsed() < delay * 3, "took {:?}", start.elapsed());
}

#[tokio::test]
async fn empty_review_fails_its_step() {
    let stubs = StubCollaborators::new(
        StubFetcher::new(sample_changeset(1)),
        StubReviewer::new().empty_for(Role::Testing),
    );

    let Err(WorkflowError::Failed(failed)) = workflow(&stubs)
        .run(json!({ "url": "https://example.com/repo/42" }))
        .await
    else {
        panic!("expected a failed workflow");
    };

    assert_eq!(failed.failed_step_ids(), vec!["review_testing"]);
    assert_eq!(failed.errors[0].kind(), StepErrorKind::CollaboratorFailure);
}
