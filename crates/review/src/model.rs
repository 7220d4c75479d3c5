//! Values that flow between the review workflow's steps.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Trigger input of the review workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub url: String,
}

/// `owner/repo#number` coordinates of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

fn pull_request_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://(?:www\.)?github\.com/([^/\s]+)/([^/\s]+)/pull/(\d+)(?:[/?#]\S*)?$")
            .unwrap_or_else(|e| unreachable!("pull request pattern is valid: {e}"))
    })
}

impl PullRequestRef {
    /// Parse a GitHub pull request URL such as
    /// `https://github.com/rust-lang/rust/pull/12345`.
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        let captures = pull_request_pattern()
            .captures(url.trim())
            .ok_or_else(|| FetchError::InvalidReference(url.to_owned()))?;

        let number = captures[3]
            .parse()
            .map_err(|_| FetchError::InvalidReference(url.to_owned()))?;

        Ok(Self {
            owner: captures[1].to_owned(),
            repo: captures[2].to_owned(),
            number,
        })
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// One changed file of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    pub filename: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
}

/// Everything a reviewer needs to know about a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub reference: PullRequestRef,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub base_sha: String,
    pub head_sha: String,
    pub changed_files: Vec<FileDelta>,
    pub unified_diff: String,
}

/// Review text produced by one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub text: String,
}

/// Output of the report step: where the rendered report was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub location: String,
}
