use serde::Deserialize;
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use snowbrain::config::LlmConfig;
use snowbrain::error::BrainError;
use snowbrain::llm::{LlmBackend, LlmProvider, PriorExchange};

fn llm_config(model: &str) -> LlmConfig {
    LlmConfig {
        model: model.to_string(),
        api_key: Some("test-key".to_string()),
        base_url: None,
        timeout_secs: 30,
        temperature: None,
    }
}

fn llm_config_with_base_url(model: &str, base_url: String) -> LlmConfig {
    LlmConfig {
        base_url: Some(base_url),
        timeout_secs: 5,
        ..llm_config(model)
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-5-nano",
        "choices": [
            {
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": content
                },
                "finish_reason": "stop"
            }
        ],
        "usage": {
            "prompt_tokens": 1,
            "completion_tokens": 1,
            "total_tokens": 2
        }
    })
}

fn api_error_body(message: &str, error_type: &str, code: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": error_type,
            "param": serde_json::Value::Null,
            "code": code
        }
    })
}

async fn provider_for(server: &MockServer) -> LlmProvider {
    let config = llm_config_with_base_url("openai/gpt-5-nano", format!("{}/v1", server.uri()));
    match LlmProvider::new(&config) {
        Ok(provider) => provider,
        Err(error) => panic!("Expected provider creation to succeed, got: {error}"),
    }
}

#[test]
fn test_provider_detection() {
    let cases = [
        ("openai/gpt-5-nano", LlmBackend::OpenAI),
        ("openrouter/openai/gpt-4o", LlmBackend::OpenRouter),
        ("ollama/llama3.2", LlmBackend::Ollama),
        ("lmstudio/qwen3", LlmBackend::LmStudio),
        ("cohere/command-a-03-2025", LlmBackend::Cohere),
    ];

    for (model, expected) in cases {
        let provider = LlmProvider::new(&llm_config(model)).unwrap();
        assert_eq!(provider.backend(), &expected, "model {model}");
    }
}

#[test]
fn test_unknown_provider_needs_base_url() {
    let result = LlmProvider::new(&llm_config("acme/turbo"));
    assert!(matches!(result, Err(BrainError::Config(_))));

    let config = LlmConfig {
        base_url: Some("http://localhost:9000/v1".to_string()),
        ..llm_config("acme/turbo")
    };
    let provider = LlmProvider::new(&config).unwrap();
    assert!(matches!(
        provider.backend(),
        LlmBackend::OpenAICompatible { .. }
    ));
}

#[test]
fn test_hosted_provider_without_key_is_rejected() {
    let config = LlmConfig {
        api_key: None,
        ..llm_config("openai/gpt-5-nano")
    };
    assert!(matches!(
        LlmProvider::new(&config),
        Err(BrainError::Config(_))
    ));

    let local = LlmConfig {
        api_key: None,
        ..llm_config("ollama/llama3.2")
    };
    assert!(LlmProvider::new(&local).is_ok());
}

#[tokio::test]
async fn test_complete_returns_response_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello from mock")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Hello", None).await;

    match result {
        Ok(value) => assert_eq!(value, "Hello from mock"),
        Err(error) => panic!("Expected completion to succeed, got: {error}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transient_and_not_retried() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_for_mock = Arc::clone(&attempts);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |_request: &Request| {
            attempts_for_mock.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(503).set_body_string("upstream temporary failure")
        })
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Retry test", None).await;

    match result {
        Err(error @ BrainError::Transient(_)) => assert!(error.is_transient()),
        other => panic!("Expected Transient error, got: {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rate_limit_handling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(api_error_body(
            "Rate limit reached for requests",
            "requests",
            "rate_limit_exceeded",
        )))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Rate limit test", None).await;

    assert!(matches!(result, Err(BrainError::LlmRateLimit { .. })));
}

#[tokio::test]
async fn test_auth_error_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(api_error_body(
            "Invalid API key",
            "invalid_request_error",
            "invalid_api_key",
        )))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Auth test", None).await;

    match result {
        Err(error @ BrainError::Auth(_)) => assert!(!error.is_transient()),
        other => panic!("Expected Auth error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_model_is_permanent_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "The model `gpt-nope` does not exist" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Missing model test", None).await;

    match result {
        Err(error @ BrainError::Llm(_)) => {
            assert!(!error.is_transient());
            assert!(error.to_string().contains("gpt-nope"));
        }
        other => panic!("Expected permanent Llm error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_request_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(api_error_body(
            "Unsupported parameter: 'temperature'",
            "invalid_request_error",
            "unsupported_parameter",
        )))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Bad request test", None).await;

    match result {
        Err(error) => assert!(!error.is_transient(), "got transient {error:?}"),
        Ok(value) => panic!("Expected an error, got: {value}"),
    }
}

#[tokio::test]
async fn test_garbage_body_is_malformed_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Garbage test", None).await;

    assert!(matches!(result, Err(BrainError::MalformedOutput(_))));
}

#[tokio::test]
async fn test_empty_content_is_malformed_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("   ")))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result = provider.complete("Empty test", None).await;

    assert!(matches!(result, Err(BrainError::MalformedOutput(_))));
}

#[tokio::test]
async fn test_empty_prompt_validation() {
    let provider = LlmProvider::new(&llm_config("openai/gpt-5-nano")).unwrap();

    let result = provider.complete("   ", None).await;

    match result {
        Err(BrainError::Validation(message)) => {
            assert!(message.contains("Prompt cannot be empty"));
        }
        other => panic!("Expected Validation error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_complete_json_strips_code_fences() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "```json\n{\"name\": \"Léa Gagnon\", \"age\": 29}\n```",
        )))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let value = provider.complete_json("persona", None).await.unwrap();

    assert_eq!(value["name"], "Léa Gagnon");
    assert_eq!(value["age"], 29);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Budget {
    min: u32,
    max: u32,
}

#[tokio::test]
async fn test_complete_structured_rejects_wrong_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("{\"min\": \"cheap\"}")),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let result: Result<Budget, BrainError> = provider.complete_structured("budget", None).await;

    assert!(matches!(result, Err(BrainError::MalformedOutput(_))));
}

#[tokio::test]
async fn test_conversation_history_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Where can I buy a toque?"))
        .and(body_string_contains("Try Roots or a local knitter."))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Sure thing.")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let history = vec![PriorExchange {
        question: "Where can I buy a toque?".to_string(),
        answer: "Try Roots or a local knitter.".to_string(),
    }];

    let answer = provider
        .complete_conversation("You are Snowman.", &history, "What about mitts?")
        .await
        .unwrap();

    assert_eq!(answer, "Sure thing.");
}
