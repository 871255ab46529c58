//! Chat round trips through a real proxy in front of a mocked Ollama

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use ullama::client::ProxyClient;
use ullama::config::Config;
use ullama::events::{AppEvent, ChatMessage, ConversationRole};
use ullama::server::create_app;
use ullama::session::SessionState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Serve the proxy on an ephemeral port and return its base URL
async fn spawn_proxy(ollama_url: &str) -> String {
    let mut config = Config::default();
    config.ollama.base_url = ollama_url.to_string();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(&config);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn send(session: &mut SessionState, client: &ProxyClient, text: &str) {
    let pending = session.begin_send(text).unwrap();
    let conversation_id = pending.conversation_id;
    let event = match client.chat(pending.messages, pending.model).await {
        Ok(content) => AppEvent::ReplyReceived {
            conversation_id,
            content,
        },
        Err(e) => AppEvent::ReplyFailed {
            conversation_id,
            error: e.to_string(),
        },
    };
    session.complete_send(event);
}

fn upstream_body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

#[tokio::test]
async fn test_round_trip_appends_reply_and_forwards_transcript() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gemma",
            "created_at": "2024-05-01T12:00:00Z",
            "message": { "role": "assistant", "content": "AI is the study of..." },
            "done": true
        })))
        .expect(2)
        .mount(&ollama)
        .await;

    let proxy_url = spawn_proxy(&ollama.uri()).await;
    let client = ProxyClient::new(&proxy_url);
    let mut session = SessionState::new("gemma");

    send(&mut session, &client, "What is AI?").await;
    send(&mut session, &client, "Tell me more").await;

    let conversation = session.active();
    assert_eq!(conversation.name, "What is AI?");
    assert_eq!(conversation.messages.len(), 4);
    assert_eq!(conversation.messages[1], ChatMessage::assistant("AI is the study of..."));
    assert!(!session.is_awaiting_reply());
    assert_eq!(session.last_error(), None);

    let received = ollama.received_requests().await.unwrap();
    assert_eq!(
        upstream_body(&received[0]),
        json!({
            "model": "gemma",
            "messages": [{ "role": "user", "content": "What is AI?" }],
            "stream": false
        })
    );

    // The second request carries the whole transcript so far
    let second = upstream_body(&received[1]);
    let roles: Vec<&str> = second["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
}

#[tokio::test]
async fn test_upstream_failure_leaves_transcript_and_records_error() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "model \"nope\" not found, try pulling it first"
        })))
        .mount(&ollama)
        .await;

    let proxy_url = spawn_proxy(&ollama.uri()).await;
    let client = ProxyClient::new(&proxy_url);
    let mut session = SessionState::new("nope");

    send(&mut session, &client, "hello").await;

    let conversation = session.active();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].role, ConversationRole::User);
    assert!(!session.is_awaiting_reply());

    let error = session.last_error().unwrap();
    assert!(error.contains("500"));
    assert!(error.contains("Failed to process the chat request"));
    // Upstream details stay in the proxy log
    assert!(!error.contains("not found"));
}

#[tokio::test]
async fn test_unreachable_upstream_is_generic_500() {
    // Nothing listens on the discard port
    let proxy_url = spawn_proxy("http://127.0.0.1:9").await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/ollama", proxy_url))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }], "model": "phi3" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({ "error": "Failed to process the chat request" })
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let proxy_url = spawn_proxy("http://127.0.0.1:9").await;
    let body = reqwest::get(format!("{}/health", proxy_url))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_tool_messages_reach_upstream_verbatim() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "The answer is 42." }
        })))
        .expect(1)
        .mount(&ollama)
        .await;

    let proxy_url = spawn_proxy(&ollama.uri()).await;
    let messages = json!([
        { "role": "user", "content": "what is 6 * 7?" },
        { "role": "tool", "content": "42" }
    ]);

    let response = reqwest::Client::new()
        .post(format!("{}/api/ollama", proxy_url))
        .json(&json!({ "messages": messages.clone(), "model": "llama3.2:latest" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let received = ollama.received_requests().await.unwrap();
    assert_eq!(upstream_body(&received[0])["messages"], messages);
}
