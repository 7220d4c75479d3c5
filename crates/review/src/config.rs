//! Configuration for the review workflow.
//!
//! Sources (highest priority first):
//! 1. Environment variables (`GITHUB_TOKEN`, `GITHUB_API_URL`, `GEMINI_API_KEY`,
//!    `GEMINI_MODEL`, `GEMINI_API_URL`, `PR_REVIEW_OUTPUT_DIR`)
//! 2. A TOML file (`--config <path>`, else `pr-review.toml` when present)
//! 3. Defaults
//!
//! Credentials are only ever read from the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use engine::ExecutorConfig;
use serde::Deserialize;
use tracing::debug;

use crate::collaborators::Collaborators;
use crate::error::ConfigError;
use crate::gemini::GeminiReviewer;
use crate::github::GitHubFetcher;
use crate::sink::FileSink;
use crate::stages::RetryPolicy;
use crate::workflow::WorkflowSettings;

pub const DEFAULT_CONFIG_FILE: &str = "pr-review.toml";

/// Raw config file schema plus the environment overlay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReviewConfig {
    pub github: GitHubConfig,
    pub gemini: GeminiConfig,
    pub output: OutputConfig,
    pub fetch: FetchConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    pub api_url: String,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiConfig {
    pub api_url: String,
    pub model: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-1.5-flash-latest".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".output"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub fetch_secs: u64,
    pub review_secs: u64,
    pub persist_secs: u64,
    /// Deadline the executor applies to every step. Unset by default.
    pub step_secs: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 30,
            review_secs: 120,
            persist_secs: 10,
            step_secs: None,
        }
    }
}

impl ReviewConfig {
    /// Load from `path` (or the default file, if it exists) and overlay the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        debug!(path = %path.display(), "config file loaded");
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay values from `lookup`; empty values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }
        if let Some(v) = var("GITHUB_API_URL") {
            self.github.api_url = v;
        }
        if let Some(v) = var("GEMINI_API_KEY") {
            self.gemini.api_key = Some(v);
        }
        if let Some(v) = var("GEMINI_MODEL") {
            self.gemini.model = v;
        }
        if let Some(v) = var("GEMINI_API_URL") {
            self.gemini.api_url = v;
        }
        if let Some(v) = var("PR_REVIEW_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        for (key, secs) in [
            ("timeouts.fetch_secs", t.fetch_secs),
            ("timeouts.review_secs", t.review_secs),
            ("timeouts.persist_secs", t.persist_secs),
            ("timeouts.step_secs", t.step_secs.unwrap_or(1)),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: secs.to_string(),
                });
            }
        }
        if self.gemini.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "gemini.model",
                value: self.gemini.model.clone(),
            });
        }
        Ok(())
    }

    pub fn github_token(&self) -> Result<&str, ConfigError> {
        self.github.token.as_deref().ok_or(ConfigError::MissingToken)
    }

    pub fn gemini_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        let t = &self.timeouts;
        WorkflowSettings {
            retry: RetryPolicy {
                max_retries: self.fetch.max_retries,
                base_delay: Duration::from_millis(self.fetch.retry_base_delay_ms),
            },
            fetch_timeout: Duration::from_secs(t.fetch_secs),
            review_timeout: Duration::from_secs(t.review_secs),
            persist_timeout: Duration::from_secs(t.persist_secs),
            executor: ExecutorConfig {
                step_timeout: t.step_secs.map(Duration::from_secs),
            },
        }
    }

    /// Production collaborators: GitHub, Gemini and the filesystem sink.
    pub fn collaborators(&self) -> Result<Collaborators, ConfigError> {
        let t = &self.timeouts;
        let fetcher = GitHubFetcher::new(
            self.github.api_url.as_str(),
            self.github_token()?,
            Duration::from_secs(t.fetch_secs),
        )?;
        let generator = GeminiReviewer::new(
            self.gemini.api_url.as_str(),
            self.gemini_api_key()?,
            self.gemini.model.as_str(),
            Duration::from_secs(t.review_secs),
        )?;
        Ok(Collaborators {
            fetcher: Arc::new(fetcher),
            generator: Arc::new(generator),
            sink: Arc::new(FileSink::new(self.output.dir.clone())),
        })
    }
}
