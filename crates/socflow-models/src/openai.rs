//! OpenAI backend.
//!
//! This module provides an implementation of the `AnalysisProvider` trait for
//! OpenAI's chat completions API.

use crate::{extract_json_object, prompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use socflow_abstraction::{AnalysisProvider, ProviderError, StageFields, StageRequest};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI backend implementation.
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    /// The model ID (e.g., "gpt-4-turbo-preview").
    model_id: String,
    /// Identifier reported in events, "openai:<model>".
    provider_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the OpenAI API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with a custom API key.
    ///
    /// # Arguments
    /// * `model_id` - The OpenAI model ID to use
    /// * `api_key` - The API key for authentication
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self {
            provider_id: format!("openai:{model_id}"),
            model_id,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Points the provider at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Returns the configured model ID.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl AnalysisProvider for OpenAIProvider {
    async fn analyze(&self, request: &StageRequest) -> Result<StageFields, ProviderError> {
        debug!(
            model_id = %self.model_id,
            stage = %request.kind,
            variable_count = request.variables.len(),
            "OpenAIProvider analyzing"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let rendered = prompt::render(request);

        let body = OpenAIRequest {
            model: self.model_id.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: rendered.system },
                OpenAIMessage { role: "user".to_string(), content: rendered.user },
            ],
            temperature: request.temperature,
            response_format: OpenAIResponseFormat { format_type: "json_object".to_string() },
        };

        let response =
            self.client.post(&url).bearer_auth(&self.api_key).json(&body).send().await.map_err(
                |e| {
                    error!(error = %e, "Failed to send request to OpenAI API");
                    ProviderError::Transport(format!("Network error: {e}"))
                },
            )?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "OpenAI API returned error status");
            return Err(ProviderError::Api { status: status.as_u16(), message: error_text });
        }

        let parsed: OpenAIResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse OpenAI API response");
            ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::MalformedResponse("No content in API response".to_string())
            })?;

        extract_json_object(&content)
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: OpenAIResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}
