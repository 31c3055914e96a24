//! Google Gemini backend.
//!
//! This module provides an implementation of the `AnalysisProvider` trait for
//! the Gemini `generateContent` API.

use crate::{extract_json_object, prompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use socflow_abstraction::{AnalysisProvider, ProviderError, StageFields, StageRequest};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend implementation.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    /// The model ID (e.g., "gemini-pro").
    model_id: String,
    /// Identifier reported in events, "gemini:<model>".
    provider_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with a custom API key.
    ///
    /// # Arguments
    /// * `model_id` - The Gemini model ID to use
    /// * `api_key` - The API key for authentication
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self {
            provider_id: format!("gemini:{model_id}"),
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
impl AnalysisProvider for GeminiProvider {
    async fn analyze(&self, request: &StageRequest) -> Result<StageFields, ProviderError> {
        debug!(
            model_id = %self.model_id,
            stage = %request.kind,
            variable_count = request.variables.len(),
            "GeminiProvider analyzing"
        );

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model_id);
        let rendered = prompt::render(request);

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: rendered.user }],
            }],
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart { text: rendered.system }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!(error = %e, "Failed to send request to Gemini API");
                ProviderError::Transport(format!("Network error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API returned error status");
            return Err(ProviderError::Api { status: status.as_u16(), message: error_text });
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini API response");
            ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        let content: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| {
                ProviderError::MalformedResponse("No candidates in API response".to_string())
            })?;

        extract_json_object(&content)
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_provider_creation_with_api_key() {
        let provider = GeminiProvider::with_api_key("gemini-pro".to_string(), "k".to_string());
        assert_eq!(provider.model_id(), "gemini-pro");
        assert_eq!(provider.provider_id(), "gemini:gemini-pro");
    }

    #[test]
    fn test_generation_config_is_camel_case() {
        let config = GeminiGenerationConfig {
            temperature: Some(0.3),
            response_mime_type: "application/json".to_string(),
        };
        let serialized = serde_json::to_string(&config).unwrap();
        assert!(serialized.contains("\"responseMimeType\":\"application/json\""));
        assert!(serialized.contains("\"temperature\":0.3"));
    }
}
