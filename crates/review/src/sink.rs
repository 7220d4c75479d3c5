//! Filesystem implementation of [`ReportSink`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::collaborators::ReportSink;
use crate::error::SinkError;

/// Writes each report to `<dir>/<YYYYMMDDHHMMSS>_pull_request.org`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        self.dir.join(format!("{stamp}_pull_request.org"))
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn persist(&self, document: &str) -> Result<String, SinkError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.next_path();
        tokio::fs::write(&path, document)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), bytes = document.len(), "report written");
        Ok(path.display().to_string())
    }
}
