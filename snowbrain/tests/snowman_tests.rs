use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snowbrain::config::{ContentConfig, LlmConfig};
use snowbrain::error::BrainError;
use snowbrain::llm::LlmProvider;
use snowbrain::snowman::{Conversation, SnowmanAgent};
use snowbrain::web::ContentClient;

// ── Test Helpers ──────────────────────────────────────────────────────────

fn llm_response(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-5-nano",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn llm_provider(server: &MockServer) -> LlmProvider {
    LlmProvider::new(&LlmConfig {
        model: "openai/gpt-5-nano".to_string(),
        api_key: Some("test-key".to_string()),
        base_url: Some(format!("{}/v1", server.uri())),
        timeout_secs: 5,
        temperature: None,
    })
    .unwrap()
}

fn content_config(server: &MockServer) -> ContentConfig {
    ContentConfig {
        base_url: server.uri(),
        api_key: Some("puremd-test".to_string()),
        timeout_secs: 5,
        max_chars_per_result: 12,
        ..ContentConfig::default()
    }
}

// ── Snowman ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_answer_uses_web_results() {
    let content = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param(
            "q",
            "Canadian owned or made in Canada: warm toque for my dad",
        ))
        .and(header("x-puremd-api-token", "puremd-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Roots toque"))
        .expect(1)
        .mount(&content)
        .await;

    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Roots toque"))
        .and(body_string_contains("The current date is"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_response("Get the Roots toque.")))
        .expect(1)
        .mount(&llm)
        .await;

    let client = ContentClient::new(&content_config(&content)).unwrap();
    let agent = SnowmanAgent::new(llm_provider(&llm), Some(client));
    assert!(agent.has_web_search());

    let answer = agent.answer("warm toque for my dad", &[]).await.unwrap();
    assert_eq!(answer, "Get the Roots toque.");
}

#[tokio::test]
async fn test_answer_fetches_linked_page() {
    let content = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/https:/+www\.roots\.com/ca/en/toque\.html$"))
        .and(header("x-puremd-api-token", "puremd-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Cabin toque, made in Cornwall"))
        .expect(1)
        .mount(&content)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Roots toque"))
        .mount(&content)
        .await;

    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Cabin toque"))
        .and(body_string_contains("Roots toque"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_response("Yes, it's Canadian.")))
        .expect(1)
        .mount(&llm)
        .await;

    let client = ContentClient::new(&content_config(&content)).unwrap();
    let agent = SnowmanAgent::new(llm_provider(&llm), Some(client));

    let answer = agent
        .answer(
            "Is this a good gift for my dad? https://www.roots.com/ca/en/toque.html",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(answer, "Yes, it's Canadian.");
}

#[tokio::test]
async fn test_unreachable_linked_page_still_answers() {
    let content = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/https:/+shop\.example\.ca/mitts$"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&content)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&content)
        .await;

    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_response("Try Kombi mitts.")))
        .mount(&llm)
        .await;

    let client = ContentClient::new(&content_config(&content)).unwrap();
    let agent = SnowmanAgent::new(llm_provider(&llm), Some(client));

    let answer = agent
        .answer("What about https://shop.example.ca/mitts?", &[])
        .await
        .unwrap();
    assert_eq!(answer, "Try Kombi mitts.");
}

#[tokio::test]
async fn test_failed_search_still_answers() {
    let content = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&content)
        .await;

    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_response("Try Kombi mitts.")))
        .mount(&llm)
        .await;

    let client = ContentClient::new(&content_config(&content)).unwrap();
    let agent = SnowmanAgent::new(llm_provider(&llm), Some(client));

    let answer = agent.answer("mitts for skating", &[]).await.unwrap();
    assert_eq!(answer, "Try Kombi mitts.");
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let llm = MockServer::start().await;
    let agent = SnowmanAgent::new(llm_provider(&llm), None);

    let result = agent.answer("  \n", &[]).await;
    assert!(matches!(result, Err(BrainError::Validation(_))));
}

#[tokio::test]
async fn test_conversation_replays_previous_exchange() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Maple syrup from Quebec."))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_response("Second answer.")))
        .mount(&llm)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(llm_response("Maple syrup from Quebec.")),
        )
        .mount(&llm)
        .await;

    let agent = SnowmanAgent::new(llm_provider(&llm), None);
    let mut conversation = Conversation::new(5);

    let first = conversation.ask(&agent, "Gift for my boss?").await.unwrap();
    assert_eq!(first, "Maple syrup from Quebec.");

    let second = conversation.ask(&agent, "Something cheaper?").await.unwrap();
    assert_eq!(second, "Second answer.");
    assert_eq!(conversation.len(), 2);
}

// ── Content client ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_urls_dedups_truncates_and_caches() {
    let content = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/example.ca/toque"))
        .respond_with(ResponseTemplate::new(200).set_body_string("A very warm wool toque"))
        .expect(1)
        .mount(&content)
        .await;
    Mock::given(method("GET"))
        .and(path("/example.ca/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&content)
        .await;

    let client = ContentClient::new(&content_config(&content)).unwrap();
    let urls = vec![
        "example.ca/toque".to_string(),
        "example.ca/gone".to_string(),
        "example.ca/toque".to_string(),
    ];

    let results = client.fetch_urls(&urls).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results["example.ca/toque"], "A very warm ");
    assert_eq!(results["example.ca/gone"], "");

    // served from cache; the mock expects a single hit
    let again = client.fetch_url("example.ca/toque").await.unwrap();
    assert_eq!(again, "A very warm wool toque");
}

#[tokio::test]
async fn test_search_multi_caps_queries() {
    let content = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .expect(3)
        .mount(&content)
        .await;

    let client = ContentClient::new(&content_config(&content)).unwrap();
    let queries: Vec<String> = ["a", "b", "c", "d"].iter().map(|q| q.to_string()).collect();

    let results = client.search_multi(&queries).await;
    assert_eq!(results.len(), 3);
    assert!(!results.contains_key("d"));
}
