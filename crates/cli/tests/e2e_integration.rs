//! End-to-end integration tests for the mathtutor pipeline.
//!
//! These tests exercise the full path from an HTTP request through topic
//! resolution, cached retrieval, prompt assembly, and the streamed reply,
//! down to what ends up in session history.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mathtutor_core::error::ProviderError;
use mathtutor_core::message::{Message, Role};
use mathtutor_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use mathtutor_core::retrieval::Passage;
use mathtutor_gateway::api::HistoryResponse;
use mathtutor_gateway::{GatewayState, build_router};
use mathtutor_retrieval::InMemoryRetriever;
use mathtutor_tutor::orchestrator::{NO_DOCUMENTS, TECHNICAL_DIFFICULTIES};
use mathtutor_tutor::{
    ChatReply, ChatRequest, PromptTemplate, RequestOrchestrator, TopicFilterRegistry,
    TutorSettings,
};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that streams the same scripted chunks for every request
/// and keeps every request it was sent.
struct ScriptedProvider {
    chunks: Vec<String>,
    fail_after: Option<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail_after: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing_after(chunks: &[&str], n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new(chunks)
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant(self.chunks.concat()),
            usage: None,
            model: request.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = tokio::sync::mpsc::channel(self.chunks.len() + 1);
        for (i, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(i) {
                let _ = tx.try_send(Err(ProviderError::Network("connection reset".into())));
                return Ok(rx);
            }
            let _ = tx.try_send(Ok(StreamChunk::text(chunk.clone())));
        }
        let _ = tx.try_send(Ok(StreamChunk::finished()));
        Ok(rx)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

const FUNDAMENTALS: &str = "fundamentals-of-mathematics.pdf";
const ALGEBRA: &str = "Beginning_and_Intermediate_Algebra.pdf";

fn corpus() -> InMemoryRetriever {
    InMemoryRetriever::from_passages(vec![
        Passage::located(
            "To find a percent of a number, write the percent as a decimal and multiply.",
            FUNDAMENTALS,
            860,
        ),
        Passage::located(
            "Percents outside the chapter should never be returned.",
            FUNDAMENTALS,
            10,
        ),
        Passage::located(
            "To solve a linear equation, isolate the variable by undoing each operation.",
            ALGEBRA,
            60,
        ),
    ])
}

fn settings() -> TutorSettings {
    TutorSettings {
        model: "e2e-model".into(),
        similarity_threshold: 0.0,
        ..TutorSettings::default()
    }
}

fn tutor(provider: Arc<ScriptedProvider>) -> Arc<RequestOrchestrator> {
    Arc::new(RequestOrchestrator::new(
        provider,
        Arc::new(corpus()),
        TopicFilterRegistry::builtin(),
        PromptTemplate::default(),
        settings(),
    ))
}

fn app(tutor: Arc<RequestOrchestrator>) -> axum::Router {
    build_router(Arc::new(GatewayState::new(tutor)), "http://localhost:8080")
}

async fn fetch(app: &axum::Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_scoped_question_over_http() {
    let provider = Arc::new(ScriptedProvider::new(&["Write 25% as 0.25, ", "then 0.25 × 80 = 20."]));
    let app = app(tutor(provider.clone()));

    let (status, body) = fetch(
        &app,
        "/chat?topic=percents&usermessage=what%20is%2025%25%20of%2080%3F&sessionId=s1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Write 25% as 0.25, then 0.25 × 80 = 20.");

    // Only the in-scope percents passage reached the prompt.
    let request = provider.request(0);
    assert_eq!(request.model, "e2e-model");
    assert!(request.stream);
    let context = &request.messages[1].content;
    assert!(context.contains("[1] To find a percent of a number"));
    assert!(!context.contains("never be returned"));
    assert!(!context.contains("linear equation"));

    let (status, body) = fetch(&app, "/history/s1").await;
    assert_eq!(status, StatusCode::OK);
    let history: HistoryResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(history.turns.len(), 2);
    assert_eq!(history.turns[0].role(), Role::User);
    assert_eq!(history.turns[0].content(), "what is 25% of 80?");
    assert_eq!(history.turns[1].role(), Role::Assistant);
    assert_eq!(history.turns[1].content(), "Write 25% as 0.25, then 0.25 × 80 = 20.");
}

#[tokio::test]
async fn e2e_follow_up_carries_history() {
    let provider = Arc::new(ScriptedProvider::new(&["Add 5 to both sides."]));
    let tutor = tutor(provider.clone());

    let first = tutor
        .handle(ChatRequest::new("linear equations", "how do i solve 2x + 3 = 7", "s2"))
        .await;
    first.into_text().await.unwrap();

    let second = tutor
        .handle(ChatRequest::new("linear equations", "and what about 3x - 5 = 10?", "s2"))
        .await;
    assert_eq!(second.into_text().await.unwrap(), "Add 5 to both sides.");

    let request = provider.request(1);
    let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(request.messages[2].content, "how do i solve 2x + 3 = 7");
    assert_eq!(request.messages[4].content, "and what about 3x - 5 = 10?");
    assert_eq!(tutor.history().snapshot("s2").len(), 4);
}

#[tokio::test]
async fn e2e_drift_redirects_without_calling_the_model() {
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let tutor = tutor(provider.clone());

    let reply = tutor
        .handle(ChatRequest::new("percents", "i want to learn about fractoins", "s3"))
        .await;
    match reply {
        ChatReply::Redirected { mentioned, message } => {
            assert_eq!(mentioned, "fractions");
            assert!(message.contains("Your current topic is percents."));
        }
        _ => panic!("expected a redirect"),
    }

    assert_eq!(provider.calls(), 0);
    assert!(tutor.history().snapshot("s3").is_empty());
}

#[tokio::test]
async fn e2e_same_question_in_two_sessions_retrieves_once() {
    let provider = Arc::new(ScriptedProvider::new(&["20"]));
    let tutor = tutor(provider.clone());

    for session in ["a", "b"] {
        tutor
            .handle(ChatRequest::new("percents", "what is 25% of 80?", session))
            .await
            .into_text()
            .await
            .unwrap();
    }

    assert_eq!(provider.calls(), 2);
    assert_eq!(tutor.cache().len(), 1);
    assert_eq!(tutor.history().session_count(), 2);
}

#[tokio::test]
async fn e2e_no_matching_excerpts_still_answers() {
    let provider = Arc::new(ScriptedProvider::new(&["Let's think it through."]));
    let tutor = tutor(provider.clone());

    let text = tutor
        .handle(ChatRequest::new("polynomials", "explain the first step again", "s4"))
        .await
        .into_text()
        .await
        .unwrap();
    assert_eq!(text, "Let's think it through.");
    assert!(provider.request(0).messages[1].content.contains(NO_DOCUMENTS));
}

#[tokio::test]
async fn e2e_failed_stream_over_sse_keeps_only_user_turn() {
    let provider = Arc::new(ScriptedProvider::failing_after(&["Half ", "an ", "answer"], 2));
    let tutor = tutor(provider);
    let app = app(tutor.clone());

    let (status, body) = fetch(
        &app,
        "/chat/stream?topic=percents&usermessage=how%20many%20percent%20is%203%20out%20of%2012%3F&sessionId=s5",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: chunk"));
    assert!(body.contains("Half "));
    assert!(body.contains("event: error"));
    assert!(body.contains(TECHNICAL_DIFFICULTIES));
    assert!(!body.contains("event: done"));

    let turns = tutor.history().snapshot("s5");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role(), Role::User);
}

#[tokio::test]
async fn e2e_missing_topic_is_rejected_over_http() {
    let provider = Arc::new(ScriptedProvider::new(&["unused"]));
    let app = app(tutor(provider.clone()));

    let (status, body) = fetch(&app, "/chat?topic=%20%20&usermessage=hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Please select a topic"));
    assert_eq!(provider.calls(), 0);
}
