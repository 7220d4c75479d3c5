//! Google Gemini implementation of [`ReviewGenerator`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::ReviewGenerator;
use crate::error::{ConfigError, GenerationError};
use crate::model::{Changeset, Review};
use crate::prompt::render_changeset;

/// Calls `models/{model}:generateContent` with the role instructions as the
/// system instruction and the rendered changeset as the user turn.
pub struct GeminiReviewer {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    system_instruction: GeminiContent<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiReviewer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        )
    }

    fn request_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl ReviewGenerator for GeminiReviewer {
    async fn generate_review(
        &self,
        instructions: &str,
        changeset: &Changeset,
    ) -> Result<Review, GenerationError> {
        let prompt = render_changeset(changeset);
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![RequestPart { text: &prompt }],
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![RequestPart { text: instructions }],
            },
            generation_config: GenerationConfig { temperature: 0.2 },
        };

        debug!(model = %self.model, prompt_bytes = prompt.len(), "Gemini request");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let content = parsed
            .candidates
            .into_iter()
            .find_map(|c| c.content)
            .ok_or_else(|| GenerationError::Malformed("response has no candidates".into()))?;

        let text = content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(Review { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::sample_changeset;
    use httpmock::prelude::*;
    use serde_json::json;

    fn reviewer(server: &MockServer) -> GeminiReviewer {
        GeminiReviewer::new(
            server.base_url(),
            "test-key",
            "gemini-1.5-flash-latest",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn joins_candidate_parts_into_review_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-1.5-flash-latest:generateContent")
                    .header("x-goog-api-key", "test-key");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "* Security\n" }, { "text": "** Comments" }] }
                    }]
                }));
            })
            .await;

        let review = reviewer(&server)
            .generate_review("be careful", &sample_changeset(1))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(review.text, "* Security\n** Comments");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(503).body("overloaded");
            })
            .await;

        let err = reviewer(&server)
            .generate_review("x", &sample_changeset(0))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn empty_candidate_list_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let err = reviewer(&server)
            .generate_review("x", &sample_changeset(0))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Malformed(_)));
    }
}
