//! Ollama `/api/generate` adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{
    GenerationError, GenerationRequest, TextGenerator, classify_status, classify_transport,
};

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Client for a local Ollama runtime.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Construct a client for `model` against the default local endpoint.
    pub fn new(http: Client, model: String) -> Self {
        Self {
            http,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model,
        }
    }

    /// Point the client at a different base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let endpoint = self.endpoint();
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": request.temperature },
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| classify_transport(error, &endpoint))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GenerationError::Fatal(format!(
                "Ollama endpoint {endpoint} returned 404 (is model '{}' pulled?)",
                self.model
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::Transient(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::Transient(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
