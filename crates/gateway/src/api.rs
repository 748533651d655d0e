//! Tutoring API.
//!
//! Endpoints:
//!
//! - `GET /chat`                  — Ask a question, get the whole reply as text
//! - `GET /chat/stream`           — Ask a question, get an SSE stream of events
//! - `GET /topics`                — List topics in registry order
//! - `GET /topics/{name}`         — One topic's definition and textbook scopes
//! - `GET /history/{session_id}`  — A session's current turn window
//!
//! Chat query parameters: `topic` (default `linear equations`),
//! `usermessage` (default `" "`), `sessionId` (default `default`).

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use mathtutor_core::message::Turn;
use mathtutor_core::retrieval::DocumentScope;
use mathtutor_tutor::orchestrator::TECHNICAL_DIFFICULTIES;
use mathtutor_tutor::{ChatReply, ChatRequest, StreamAssembler, Topic, TutorStreamEvent};

use crate::SharedState;

/// Build the tutoring routes.
pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/chat", get(chat_handler))
        .route("/chat/stream", get(chat_stream_handler))
        .route("/topics", get(list_topics_handler))
        .route("/topics/{name}", get(get_topic_handler))
        .route("/history/{session_id}", get(history_handler))
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_usermessage")]
    pub usermessage: String,

    #[serde(default = "default_session", rename = "sessionId")]
    pub session_id: String,
}

fn default_topic() -> String {
    "linear equations".into()
}
fn default_usermessage() -> String {
    " ".into()
}
fn default_session() -> String {
    "default".into()
}

impl From<ChatParams> for ChatRequest {
    fn from(p: ChatParams) -> Self {
        ChatRequest::new(p.topic, p.usermessage, p.session_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicSummary {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicListResponse {
    pub topics: Vec<TopicSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicDetailResponse {
    pub name: String,
    pub definition: String,
    pub scopes: Vec<DocumentScope>,
}

impl From<&Topic> for TopicDetailResponse {
    fn from(t: &Topic) -> Self {
        Self {
            name: t.name.clone(),
            definition: t.definition.clone(),
            scopes: t.scopes.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
    pub capacity: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Chat ──────────────────────────────────────────────────────────────────

/// `GET /chat`: the reply as a single text payload.
async fn chat_handler(State(state): State<SharedState>, Query(params): Query<ChatParams>) -> Response {
    let request = ChatRequest::from(params);
    info!(session = %request.session_id, topic = %request.topic, "chat request");

    match state.tutor.handle(request).await {
        ChatReply::Rejected(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        ChatReply::Redirected { message, .. } => (StatusCode::OK, message).into_response(),
        ChatReply::Unavailable(message) => {
            (StatusCode::SERVICE_UNAVAILABLE, message).into_response()
        }
        ChatReply::Streaming(stream) => match stream.collect_text().await {
            Ok(text) => (StatusCode::OK, text).into_response(),
            Err(e) => {
                warn!(error = %e, "Reply stream failed");
                (StatusCode::BAD_GATEWAY, TECHNICAL_DIFFICULTIES.to_string()).into_response()
            }
        },
    }
}

/// `GET /chat/stream`: SSE events: `chunk`*, then `done` or `error`.
///
/// Fixed replies (redirects, failures before streaming) arrive as a single
/// `chunk` + `done` pair or a single `error`. A blank topic is rejected with
/// 400 before any stream opens.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Query(params): Query<ChatParams>,
) -> Result<
    Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>,
    (StatusCode, Json<ErrorResponse>),
> {
    let request = ChatRequest::from(params);
    let session_id = request.session_id.clone();
    info!(session = %session_id, topic = %request.topic, "chat/stream SSE request");

    let (tx, rx) = mpsc::channel::<TutorStreamEvent>(32);
    match state.tutor.handle(request).await {
        ChatReply::Rejected(message) => {
            return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })));
        }
        ChatReply::Redirected { message, .. } => {
            let length = message.len();
            let _ = tx.try_send(TutorStreamEvent::Chunk { content: message });
            let _ = tx.try_send(TutorStreamEvent::Done { session_id, length });
        }
        ChatReply::Unavailable(message) => {
            let _ = tx.try_send(TutorStreamEvent::Error { message });
        }
        ChatReply::Streaming(stream) => {
            tokio::spawn(forward_events(stream, tx));
        }
    }

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type().to_string();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream))
}

/// Pump assembler output into SSE events.
///
/// The client channel is watched alongside the model stream. Once the
/// client is gone the assembler is cancelled right away, so the model
/// stream is dropped and nothing is committed, even if the reply was
/// about to complete.
async fn forward_events(mut stream: StreamAssembler, tx: mpsc::Sender<TutorStreamEvent>) {
    let session_id = stream.session_id().to_string();
    let mut length = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => None,
            item = stream.next() => Some(item),
        };
        let Some(item) = next else {
            let reason = stream.cancel();
            info!(session = %session_id, reason = %reason, "Client disconnected mid-stream");
            return;
        };

        match item {
            Some(Ok(content)) => {
                length += content.len();
                if tx.send(TutorStreamEvent::Chunk { content }).await.is_err() {
                    let reason = stream.cancel();
                    info!(session = %session_id, reason = %reason, "Client disconnected mid-stream");
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(session = %session_id, error = %e, "Reply stream failed");
                let _ = tx
                    .send(TutorStreamEvent::Error {
                        message: TECHNICAL_DIFFICULTIES.into(),
                    })
                    .await;
                return;
            }
            None => break,
        }
    }
    let _ = tx.send(TutorStreamEvent::Done { session_id, length }).await;
}

// ── Topics & history ──────────────────────────────────────────────────────

/// `GET /topics`
async fn list_topics_handler(State(state): State<SharedState>) -> Json<TopicListResponse> {
    let topics: Vec<TopicSummary> = state
        .tutor
        .topics()
        .topics()
        .iter()
        .map(|t| TopicSummary {
            name: t.name.clone(),
            definition: t.definition.clone(),
        })
        .collect();
    let count = topics.len();
    Json(TopicListResponse { topics, count })
}

/// `GET /topics/{name}`
async fn get_topic_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<TopicDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .tutor
        .topics()
        .get(&name)
        .map(|t| Json(TopicDetailResponse::from(t)))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Unknown topic: {name}"),
                }),
            )
        })
}

/// `GET /history/{session_id}`
async fn history_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    let history = state.tutor.history();
    Json(HistoryResponse {
        turns: history.snapshot(&session_id),
        capacity: history.capacity(),
        session_id,
    })
}
