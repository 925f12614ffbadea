use std::time::Duration;

use promptgate_common::Error;
use promptgate_llm::{AzureOpenAiClient, ChatMessage, CompletionClient, ModelArgs, format_reply};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEPLOYMENT_PATH: &str = "/openai/deployments/gpt-4o/chat/completions";

fn client_for(server: &MockServer) -> AzureOpenAiClient {
    AzureOpenAiClient::new(
        server.uri(),
        Some("test-key".to_string()),
        "2024-05-01-preview",
        Duration::from_secs(5),
    )
    .unwrap()
}

fn args(stream: bool) -> ModelArgs {
    ModelArgs {
        messages: vec![
            ChatMessage::system("You are an expert IT assistant."),
            ChatMessage::user("My VPN keeps dropping"),
        ],
        temperature: 0.0,
        max_tokens: 1000,
        top_p: 1.0,
        stop: None,
        stream,
        model: "gpt-4o".to_string(),
    }
}

#[tokio::test]
async fn test_azure_completion() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-2024-05-13",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Try reinstalling the client.",
            },
            "finish_reason": "stop"
        }]
    });

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .and(query_param("api-version", "2024-05-01-preview"))
        .and(header("api-key", "test-key"))
        .and(body_partial_json(json!({
            "max_tokens": 1000,
            "stream": false,
            "model": "gpt-4o"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("apim-request-id", "apim-42")
                .set_body_json(response_body),
        )
        .mount(&mock_server)
        .await;

    let completion = client_for(&mock_server).complete(&args(false)).await.unwrap();

    assert_eq!(completion.request_id.as_deref(), Some("apim-42"));
    let reply = format_reply(&completion.body, json!({}), completion.request_id).unwrap();
    assert_eq!(reply.id, "chatcmpl-123");
    assert_eq!(reply.assistant_content(), Some("Try reinstalling the client."));
}

#[tokio::test]
async fn test_azure_error_carries_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": "429", "message": "Requests to the deployment have exceeded the rate limit."}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .complete(&args(false))
        .await
        .unwrap_err();

    match err {
        Error::Upstream { status, message } => {
            assert_eq!(status, Some(429));
            assert!(message.contains("rate limit"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_azure_missing_request_id_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })))
        .mount(&mock_server)
        .await;

    let completion = client_for(&mock_server).complete(&args(false)).await.unwrap();
    assert!(completion.request_id.is_none());
}

#[tokio::test]
async fn test_azure_invalid_body_is_format_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .complete(&args(false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[tokio::test]
async fn test_azure_stream_is_aggregated() {
    let mock_server = MockServer::start().await;

    let chunk1 = json!({
        "id": "chatcmpl-9",
        "object": "chat.completion.chunk",
        "created": 1677652288,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hello"}, "finish_reason": null}]
    });
    let chunk2 = json!({
        "id": "chatcmpl-9",
        "object": "chat.completion.chunk",
        "created": 1677652288,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": " World"}, "finish_reason": "stop"}]
    });
    let body = format!("data: {chunk1}\n\ndata: {chunk2}\n\ndata: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .insert_header("apim-request-id", "apim-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let completion = client_for(&mock_server).complete(&args(true)).await.unwrap();
    let reply = format_reply(&completion.body, json!({"foo": 1}), completion.request_id).unwrap();

    assert_eq!(reply.id, "chatcmpl-9");
    assert_eq!(reply.object, "chat.completion");
    assert_eq!(reply.assistant_content(), Some("Hello World"));
    assert_eq!(reply.apim_request_id.as_deref(), Some("apim-stream"));
}

#[tokio::test]
async fn test_azure_stream_skips_prompt_filter_placeholder() {
    let mock_server = MockServer::start().await;

    let filter_chunk = json!({
        "choices": [],
        "created": 0,
        "id": "",
        "model": "",
        "object": "",
        "prompt_filter_results": [{"prompt_index": 0, "content_filter_results": {}}]
    });
    let chunk1 = json!({
        "id": "chatcmpl-9",
        "object": "chat.completion.chunk",
        "created": 1700000000,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Restart"}, "finish_reason": null}]
    });
    let chunk2 = json!({
        "id": "chatcmpl-9",
        "object": "chat.completion.chunk",
        "created": 1700000000,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": " the router."}, "finish_reason": "stop"}]
    });
    let body = format!("data: {filter_chunk}\n\ndata: {chunk1}\n\ndata: {chunk2}\n\ndata: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let completion = client_for(&mock_server).complete(&args(true)).await.unwrap();
    let reply = format_reply(&completion.body, json!({}), completion.request_id).unwrap();

    assert_eq!(reply.id, "chatcmpl-9");
    assert_eq!(reply.model, "gpt-4o");
    assert_eq!(reply.created, 1700000000);
    assert_eq!(reply.assistant_content(), Some("Restart the router."));
}

#[tokio::test]
async fn test_azure_stream_error_event_fails() {
    let mock_server = MockServer::start().await;

    let chunk = json!({
        "id": "chatcmpl-9",
        "created": 1700000000,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": "Par"}}]
    });
    let error = json!({"error": {"code": "server_error", "message": "The server had an error"}});
    let body = format!("data: {chunk}\n\ndata: {error}\n\n");

    Mock::given(method("POST"))
        .and(path(DEPLOYMENT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).complete(&args(true)).await;

    match result {
        Err(Error::Upstream { status, message }) => {
            assert_eq!(status, None);
            assert_eq!(message, "The server had an error");
        }
        other => panic!("expected upstream error, got {:?}", other.map(|c| c.body)),
    }
}
