//! Integration tests for the real backends against mock HTTP servers.

use serde_json::{Map, json};
use socflow_abstraction::{AnalysisProvider, ProviderError, StageKind, StageRequest};
use socflow_models::{
    BackendConfig, GeminiProvider, OpenAIProvider, ProviderConfig, ProviderFactory,
};

fn triage_request() -> StageRequest {
    let mut variables = Map::new();
    variables.insert("alert_id".to_string(), json!("ALERT-001"));
    variables.insert("severity".to_string(), json!("High"));
    variables.insert("raw_data".to_string(), json!("{\"logon_type\": 10}"));
    StageRequest::new(StageKind::Triage, variables).with_temperature(0.1)
}

const TRIAGE_JSON: &str = r#"{\"verdict\": \"suspicious\", \"confidence\": 0.8, \"noise_score\": 0.2, \"requires_investigation\": true, \"key_indicators\": [\"Privileged account activity\"], \"reasoning\": \"odd hour\"}"#;

#[tokio::test]
async fn test_openai_analyze_success() {
    let mut server = mockito::Server::new_async().await;
    let base_url = format!("{}/v1", server.url());

    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"model":"gpt-4","temperature":0.1,"response_format":{"type":"json_object"}}"#
                .to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"choices": [{{"message": {{"role": "assistant", "content": "{TRIAGE_JSON}"}}}}]}}"#
        ))
        .create_async()
        .await;

    let provider = OpenAIProvider::with_api_key("gpt-4".to_string(), "test-key".to_string())
        .with_base_url(base_url);
    let fields = provider.analyze(&triage_request()).await.unwrap();

    assert_eq!(fields["verdict"], "suspicious");
    assert_eq!(fields["requires_investigation"], true);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_error_status_maps_to_api_error() {
    let mut server = mockito::Server::new_async().await;
    let base_url = format!("{}/v1", server.url());

    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("upstream overloaded")
        .create_async()
        .await;

    let provider = OpenAIProvider::with_api_key("gpt-4".to_string(), "test-key".to_string())
        .with_base_url(base_url);
    let err = provider.analyze(&triage_request()).await.unwrap_err();

    match err {
        ProviderError::Api { status, message } => {
            assert_eq!(status, 503);
            assert!(message.contains("overloaded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_prose_reply_is_schema_error() {
    let mut server = mockito::Server::new_async().await;
    let base_url = format!("{}/v1", server.url());

    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "I am unable to analyze this alert."}}]}"#)
        .create_async()
        .await;

    let provider = OpenAIProvider::with_api_key("gpt-4".to_string(), "test-key".to_string())
        .with_base_url(base_url);
    let err = provider.analyze(&triage_request()).await.unwrap_err();
    assert!(err.is_schema());
}

#[tokio::test]
async fn test_openai_unreachable_is_transport_error() {
    let provider = OpenAIProvider::with_api_key("gpt-4".to_string(), "test-key".to_string())
        .with_base_url("http://127.0.0.1:1/v1");
    let err = provider.analyze(&triage_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
}

#[tokio::test]
async fn test_gemini_analyze_success() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/models/gemini-pro:generateContent")
        .match_header("x-goog-api-key", "test-key")
        .match_body(mockito::Matcher::PartialJson(json!({
            "generationConfig": {"responseMimeType": "application/json"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"candidates": [{{"content": {{"role": "model", "parts": [{{"text": "{TRIAGE_JSON}"}}]}}}}]}}"#
        ))
        .create_async()
        .await;

    let provider = GeminiProvider::with_api_key("gemini-pro".to_string(), "test-key".to_string())
        .with_base_url(server.url());
    let fields = provider.analyze(&triage_request()).await.unwrap();

    assert_eq!(fields["noise_score"], 0.2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_transport_error_does_not_expose_api_key() {
    let provider =
        GeminiProvider::with_api_key("gemini-pro".to_string(), "SUPERSECRETKEY".to_string())
            .with_base_url("http://127.0.0.1:1");
    let err = provider.analyze(&triage_request()).await.unwrap_err();

    assert!(matches!(err, ProviderError::Transport(_)));
    assert!(!err.to_string().contains("SUPERSECRETKEY"));
}

#[tokio::test]
async fn test_gemini_empty_candidates_is_schema_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/models/gemini-pro:generateContent")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"candidates": []}"#)
        .create_async()
        .await;

    let provider = GeminiProvider::with_api_key("gemini-pro".to_string(), "test-key".to_string())
        .with_base_url(server.url());
    let err = provider.analyze(&triage_request()).await.unwrap_err();
    assert!(err.is_schema());
}

#[tokio::test]
async fn test_factory_honours_base_url_override() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"choices": [{{"message": {{"role": "assistant", "content": "{TRIAGE_JSON}"}}}}]}}"#
        ))
        .create_async()
        .await;

    let config = ProviderConfig {
        provider: "openai".to_string(),
        openai: BackendConfig {
            model: Some("gpt-4o".to_string()),
            api_key: Some("k".to_string()),
            base_url: Some(server.url()),
        },
        ..Default::default()
    };
    let choice = ProviderFactory::create(&config);
    assert_eq!(choice.provider.provider_id(), "openai:gpt-4o");

    let fields = choice.provider.analyze(&triage_request()).await.unwrap();
    assert_eq!(fields["verdict"], "suspicious");
    mock.assert_async().await;
}
