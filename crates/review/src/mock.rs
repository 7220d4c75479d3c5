//! Stub collaborators for tests.
//!
//! Each stub counts its calls so tests can assert which collaborators a
//! workflow run reached.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{ChangesetFetcher, Collaborators, ReportSink, ReviewGenerator};
use crate::error::{FetchError, GenerationError, SinkError};
use crate::model::{Changeset, FileDelta, PullRequestRef, Review};
use crate::roles::Role;

/// A changeset for `acme/widgets#42` with `files` changed files.
pub fn sample_changeset(files: usize) -> Changeset {
    Changeset {
        reference: PullRequestRef {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 42,
        },
        url: "https://github.com/acme/widgets/pull/42".into(),
        title: "Add widgets".into(),
        description: Some("Adds the widget module.".into()),
        base_sha: "base123".into(),
        head_sha: "head456".into(),
        changed_files: (0..files)
            .map(|i| {
                let additions = i as u64 + 1;
                FileDelta {
                    filename: format!("src/file_{i}.rs"),
                    status: "modified".into(),
                    additions,
                    deletions: 1,
                    changes: additions + 1,
                }
            })
            .collect(),
        unified_diff: "diff --git a/src/file_0.rs b/src/file_0.rs\n".into(),
    }
}

// ---------------------------------------------------------------------------
// StubFetcher
// ---------------------------------------------------------------------------

/// Returns a fixed changeset, optionally after a scripted run of failures.
pub struct StubFetcher {
    changeset: Changeset,
    failures: Mutex<VecDeque<FetchError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(changeset: Changeset) -> Self {
        Self {
            changeset,
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first calls with `errors`, in order, then succeed.
    pub fn fail_first(self, errors: Vec<FetchError>) -> Self {
        Self {
            failures: Mutex::new(errors.into()),
            ..self
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangesetFetcher for StubFetcher {
    async fn fetch_changeset(&self, _url: &str) -> Result<Changeset, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .failures
            .lock()
            .map_err(|_| FetchError::Transient("stub lock poisoned".into()))?
            .pop_front();
        match scripted {
            Some(e) => Err(e),
            None => Ok(self.changeset.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// StubReviewer
// ---------------------------------------------------------------------------

enum Scripted {
    Fail(String),
    Empty,
}

/// Answers with `* <role title>` for every role unless scripted otherwise.
///
/// The role is recognised from the instructions it is called with.
#[derive(Default)]
pub struct StubReviewer {
    scripted: HashMap<Role, Scripted>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Role>>,
}

impl StubReviewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `role`'s review fail with a request error.
    pub fn failing_for(mut self, role: Role, message: impl Into<String>) -> Self {
        self.scripted.insert(role, Scripted::Fail(message.into()));
        self
    }

    /// Make `role`'s review come back as empty text.
    pub fn empty_for(mut self, role: Role) -> Self {
        self.scripted.insert(role, Scripted::Empty);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Roles reviewed so far, in call order.
    pub fn calls(&self) -> Vec<Role> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl ReviewGenerator for StubReviewer {
    async fn generate_review(
        &self,
        instructions: &str,
        changeset: &Changeset,
    ) -> Result<Review, GenerationError> {
        let role = Role::ALL
            .into_iter()
            .find(|r| r.instructions() == instructions)
            .ok_or_else(|| GenerationError::Request("unrecognised instructions".into()))?;

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(role);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.scripted.get(&role) {
            Some(Scripted::Fail(message)) => Err(GenerationError::Request(message.clone())),
            Some(Scripted::Empty) => Ok(Review {
                text: String::new(),
            }),
            None => Ok(Review {
                text: format!("* {}\n** Comments\n\nReviewed {}.", role.title(), changeset.title),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps reports in memory; locations are `memory://report/<n>`.
#[derive(Default)]
pub struct MemorySink {
    documents: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.documents().len()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn persist(&self, document: &str) -> Result<String, SinkError> {
        let mut documents = self.documents.lock().map_err(|_| SinkError::Io {
            path: "memory://".into(),
            source: std::io::Error::other("stub lock poisoned"),
        })?;
        documents.push(document.to_owned());
        Ok(format!("memory://report/{}", documents.len()))
    }
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Stubs wired together, with handles kept for assertions.
pub struct StubCollaborators {
    pub fetcher: Arc<StubFetcher>,
    pub reviewer: Arc<StubReviewer>,
    pub sink: Arc<MemorySink>,
}

impl StubCollaborators {
    pub fn new(fetcher: StubFetcher, reviewer: StubReviewer) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            reviewer: Arc::new(reviewer),
            sink: Arc::new(MemorySink::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetcher: self.fetcher.clone(),
            generator: self.reviewer.clone(),
            sink: self.sink.clone(),
        }
    }
}
