//! Google Gemini `generateContent` adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    GenerationError, GenerationRequest, TextGenerator, classify_status, classify_transport,
};

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the hosted Gemini API.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Construct a client for `model` authenticated with `api_key`.
    pub fn new(http: Client, api_key: String, model: String) -> Self {
        Self {
            http,
            base_url: DEFAULT_GEMINI_URL.to_string(),
            api_key,
            model,
        }
    }

    /// Point the client at a different base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let endpoint = self.endpoint();
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": { "temperature": request.temperature },
        });

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| classify_transport(error, &endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|error| {
            GenerationError::Transient(format!("failed to decode Gemini response: {error}"))
        })?;

        if let Some(reason) = body
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(GenerationError::Fatal(format!(
                "Gemini blocked the prompt: {reason}"
            )));
        }

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        tracing::debug!(model = %self.model, chars = text.len(), "Gemini response received");
        Ok(text.trim().to_string())
    }
}
