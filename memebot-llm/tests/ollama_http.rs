use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use memebot_dispatch::RequestError;
use memebot_llm::{
    BackendError, BackendRequest, ChatMessage, ChatOptions, ChatRequest, ChatResponse,
    GenerateOptions, GenerateRequest, GenerateResponse, InferenceBackend, OllamaClient,
    OllamaQueue, OllamaQueueOptions,
};
use serde_json::json;

#[derive(Clone, Default)]
struct Seen {
    chat: Arc<Mutex<Vec<ChatRequest>>>,
    generate: Arc<Mutex<Vec<GenerateRequest>>>,
}

async fn chat(State(seen): State<Seen>, Json(body): Json<ChatRequest>) -> Json<ChatResponse> {
    let reply = format!("{} messages", body.messages.len());
    let model = body.model.clone();
    seen.chat.lock().unwrap().push(body);
    Json(ChatResponse {
        model,
        created_at: "2024-05-01T00:00:00Z".into(),
        message: ChatMessage::assistant(reply),
        done: true,
        done_reason: Some("stop".into()),
        total_duration: Some(1_000),
        load_duration: None,
        prompt_eval_count: Some(4),
        eval_count: Some(2),
        eval_duration: None,
    })
}

async fn generate(State(seen): State<Seen>, Json(body): Json<GenerateRequest>) -> Response {
    if body.model == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "model 'missing' not found, try pulling it first" })),
        )
            .into_response();
    }
    if body.prompt == "garbage" {
        return (StatusCode::OK, "not json").into_response();
    }
    let response = GenerateResponse {
        model: body.model.clone(),
        created_at: String::new(),
        response: format!("re: {}", body.prompt),
        done: true,
        done_reason: Some("stop".into()),
        context: Some(vec![7, 8]),
        total_duration: None,
        load_duration: None,
        prompt_eval_count: None,
        eval_count: None,
        eval_duration: None,
    };
    seen.generate.lock().unwrap().push(body);
    Json(response).into_response()
}

async fn spawn_fake_ollama() -> (SocketAddr, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/generate", post(generate))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

#[tokio::test]
async fn chat_round_trip_over_http() {
    let (addr, seen) = spawn_fake_ollama().await;
    let queue = OllamaQueue::new(OllamaQueueOptions {
        model: "llama3".into(),
        api_url: format!("http://{addr}/"),
        keep_alive: Some("5m".into()),
        ..OllamaQueueOptions::default()
    })
    .unwrap();

    let reply = queue
        .chat(ChatOptions::new(vec![
            ChatMessage::system("you are a meme bot"),
            ChatMessage::user("hi"),
        ]))
        .await
        .unwrap();
    assert_eq!(reply.message.content, "2 messages");
    assert_eq!(reply.eval_count, Some(2));

    let requests = seen.chat.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "llama3");
    assert!(!requests[0].stream);
    assert_eq!(requests[0].keep_alive, Some("5m".into()));
}

#[tokio::test]
async fn generate_round_trip_over_http() {
    let (addr, seen) = spawn_fake_ollama().await;
    let client = OllamaClient::new(format!("http://{addr}")).unwrap();

    let response = client
        .call(BackendRequest::Generate(GenerateRequest {
            model: "llama3".into(),
            prompt: "caption this".into(),
            system: Some("be funny".into()),
            template: None,
            context: None,
            format: None,
            options: Some(json!({ "temperature": 0.9 })),
            stream: false,
            keep_alive: None,
        }))
        .await
        .unwrap()
        .into_generate()
        .unwrap();
    assert_eq!(response.response, "re: caption this");
    assert_eq!(response.context, Some(vec![7, 8]));

    let requests = seen.generate.lock().unwrap();
    assert_eq!(requests[0].system.as_deref(), Some("be funny"));
    assert_eq!(requests[0].options, Some(json!({ "temperature": 0.9 })));
}

#[tokio::test]
async fn api_error_carries_status_and_message() {
    let (addr, _) = spawn_fake_ollama().await;
    let queue = OllamaQueue::new(OllamaQueueOptions {
        model: "missing".into(),
        api_url: format!("http://{addr}"),
        ..OllamaQueueOptions::default()
    })
    .unwrap();

    match queue.generate(GenerateOptions::new("hello")).await {
        Err(RequestError::Work(BackendError::Api { status, message })) => {
            assert_eq!(status, 404);
            assert_eq!(message, "model 'missing' not found, try pulling it first");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // The queue keeps going after a failed call.
    let queue = OllamaQueue::new(OllamaQueueOptions {
        api_url: format!("http://{addr}"),
        ..OllamaQueueOptions::default()
    })
    .unwrap();
    assert!(queue.generate(GenerateOptions::new("again")).await.is_ok());
}

#[tokio::test]
async fn undecodable_body_is_a_parse_error() {
    let (addr, _) = spawn_fake_ollama().await;
    let client = OllamaClient::new(format!("http://{addr}")).unwrap();

    let err = client
        .call(BackendRequest::Generate(GenerateRequest {
            model: "llama3".into(),
            prompt: "garbage".into(),
            system: None,
            template: None,
            context: None,
            format: None,
            options: None,
            stream: false,
            keep_alive: None,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Parse(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Bind and drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        OllamaClient::with_timeout(format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    let err = client
        .call(BackendRequest::Chat(ChatRequest {
            model: "llama3".into(),
            messages: vec![ChatMessage::user("anyone there?")],
            format: None,
            options: None,
            stream: false,
            keep_alive: None,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));
}
