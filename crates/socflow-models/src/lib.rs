//! Analysis backends for socflow.
//!
//! This crate provides concrete implementations of the `AnalysisProvider` trait.
//!
//! # Supported Providers
//!
//! - **OpenAI**: chat completions in JSON mode (API key required)
//! - **Gemini**: `generateContent` with a JSON response type (API key required)
//! - **Synthetic**: credential-free generator, also the fallback backend

pub mod factory;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod synthetic;

use serde_json::Value;
use socflow_abstraction::{ProviderError, StageFields};

pub use factory::{
    BackendConfig, DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, ProviderChoice, ProviderConfig,
    ProviderFactory, ProviderType, StageTemperatures,
};
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;
pub use synthetic::SyntheticProvider;

/// Extracts the outermost JSON object from free-form model text.
///
/// Models sometimes wrap their JSON in prose or code fences; everything
/// between the first `{` and the last `}` is parsed.
///
/// # Errors
/// Returns `ProviderError::MalformedResponse` when no object can be parsed.
pub fn extract_json_object(text: &str) -> Result<StageFields, ProviderError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ProviderError::MalformedResponse("no JSON object in reply".to_string()));
    };
    if end < start {
        return Err(ProviderError::MalformedResponse("no JSON object in reply".to_string()));
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ProviderError::MalformedResponse("reply is not a JSON object".to_string())),
        Err(e) => Err(ProviderError::MalformedResponse(format!("invalid JSON in reply: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_code_fence() {
        let text = "Here is my analysis:\n```json\n{\"verdict\": \"benign\", \"nested\": {\"a\": 1}}\n```";
        let fields = extract_json_object(text).unwrap();
        assert_eq!(fields["verdict"], "benign");
        assert_eq!(fields["nested"]["a"], 1);
    }

    #[test]
    fn test_extract_json_without_object() {
        let err = extract_json_object("I cannot help with that.").unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn test_extract_json_reversed_braces() {
        assert!(extract_json_object("} nothing {").is_err());
    }

    #[test]
    fn test_extract_json_invalid() {
        let err = extract_json_object("{verdict: benign}").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
