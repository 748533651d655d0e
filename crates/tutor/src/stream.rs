//! Stream assembly: forward model chunks, commit the reply on success.
//!
//! ```text
//! STREAMING ──completion──▶ COMPLETED   (one ASSISTANT turn committed)
//!     │
//!     └──error / end without completion / dropped──▶ FAILED   (nothing committed)
//! ```
//!
//! Chunks are forwarded as they arrive. The commit happens on the poll that
//! follows the completion signal, just before the stream reports its end,
//! so a consumer that stops early never causes a commit. Dropping the
//! assembler drops the upstream receiver, which cancels the model stream.

use futures::Stream;
use mathtutor_core::error::ProviderError;
use mathtutor_core::message::Turn;
use mathtutor_core::provider::ChunkReceiver;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::history::SessionHistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Completed,
    Failed,
}

/// Forwards a model stream and commits its text to session history.
pub struct StreamAssembler {
    upstream: ChunkReceiver,
    history: Arc<SessionHistoryStore>,
    session_id: String,
    buffer: String,
    chunks: usize,
    state: StreamState,
    upstream_done: bool,
}

impl StreamAssembler {
    pub fn new(
        upstream: ChunkReceiver,
        history: Arc<SessionHistoryStore>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            upstream,
            history,
            session_id: session_id.into(),
            buffer: String::new(),
            chunks: 0,
            state: StreamState::Streaming,
            upstream_done: false,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Drain the stream and return the full reply.
    pub async fn collect_text(mut self) -> Result<String, ProviderError> {
        use futures::StreamExt;
        while let Some(chunk) = self.next().await {
            chunk?;
        }
        Ok(std::mem::take(&mut self.buffer))
    }

    /// Abandon the reply: nothing is committed, and the upstream model
    /// stream is cancelled when the assembler is dropped on return.
    pub fn cancel(mut self) -> ProviderError {
        if self.state == StreamState::Streaming {
            self.state = StreamState::Failed;
            debug!(
                session = %self.session_id,
                chunks = self.chunks,
                "Stream cancelled by the caller, reply discarded"
            );
        }
        ProviderError::Cancelled
    }

    fn complete(&mut self) {
        self.state = StreamState::Completed;
        self.history
            .append(&self.session_id, Turn::assistant(self.buffer.clone()));
        debug!(
            session = %self.session_id,
            chunks = self.chunks,
            length = self.buffer.len(),
            "Assistant turn committed"
        );
    }

    fn fail(&mut self, error: &ProviderError) {
        self.state = StreamState::Failed;
        warn!(
            session = %self.session_id,
            chunks = self.chunks,
            error = %error,
            "Model stream failed, reply discarded"
        );
    }
}

impl Stream for StreamAssembler {
    type Item = Result<String, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }
        if this.upstream_done {
            this.complete();
            return Poll::Ready(None);
        }

        loop {
            match this.upstream.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    let text = chunk.content.filter(|t| !t.is_empty());
                    if chunk.done {
                        this.upstream_done = true;
                    }
                    if let Some(text) = text {
                        this.buffer.push_str(&text);
                        this.chunks += 1;
                        return Poll::Ready(Some(Ok(text)));
                    }
                    if this.upstream_done {
                        this.complete();
                        return Poll::Ready(None);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.fail(&e);
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    let e = ProviderError::StreamInterrupted(
                        "model stream ended without a completion signal".into(),
                    );
                    this.fail(&e);
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}

impl Drop for StreamAssembler {
    fn drop(&mut self) {
        if self.state == StreamState::Streaming {
            self.state = StreamState::Failed;
            debug!(
                session = %self.session_id,
                chunks = self.chunks,
                "Stream dropped before completion, reply discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{chunk_channel, feed};
    use futures::StreamExt;
    use mathtutor_core::message::Role;
    use mathtutor_core::provider::StreamChunk;

    fn assembler(rx: ChunkReceiver, history: &Arc<SessionHistoryStore>) -> StreamAssembler {
        StreamAssembler::new(rx, history.clone(), "s1")
    }

    #[tokio::test]
    async fn completed_stream_commits_concatenation() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let rx = feed(
            vec![
                Ok(StreamChunk::text("To ")),
                Ok(StreamChunk::text("find ")),
                Ok(StreamChunk::text("25% ")),
                Ok(StreamChunk::text("of 80, ")),
                Ok(StreamChunk::text("multiply.")),
                Ok(StreamChunk::finished()),
            ],
        );

        let mut stream = assembler(rx, &history);
        let mut forwarded = Vec::new();
        while let Some(chunk) = stream.next().await {
            forwarded.push(chunk.unwrap());
        }

        assert_eq!(forwarded.len(), 5);
        assert_eq!(stream.state(), StreamState::Completed);
        let turns = history.snapshot("s1");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role(), Role::Assistant);
        assert_eq!(turns[0].content(), "To find 25% of 80, multiply.");
    }

    #[tokio::test]
    async fn error_after_two_of_five_chunks_commits_nothing() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let rx = feed(vec![
            Ok(StreamChunk::text("one ")),
            Ok(StreamChunk::text("two ")),
            Err(ProviderError::Network("connection reset".into())),
            Ok(StreamChunk::text("four ")),
            Ok(StreamChunk::text("five")),
            Ok(StreamChunk::finished()),
        ]);

        let mut stream = assembler(rx, &history);
        assert_eq!(stream.next().await.unwrap().unwrap(), "one ");
        assert_eq!(stream.next().await.unwrap().unwrap(), "two ");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
        assert!(stream.next().await.is_none());

        assert_eq!(stream.state(), StreamState::Failed);
        assert!(history.snapshot("s1").is_empty());
    }

    #[tokio::test]
    async fn end_without_completion_is_a_failure() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let rx = feed(vec![Ok(StreamChunk::text("partial"))]);

        let result = assembler(rx, &history).collect_text().await;
        assert!(matches!(result, Err(ProviderError::StreamInterrupted(_))));
        assert!(history.snapshot("s1").is_empty());
    }

    #[tokio::test]
    async fn final_chunk_with_content_is_forwarded_then_committed() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let rx = feed(vec![
            Ok(StreamChunk::text("Hello ")),
            Ok(StreamChunk {
                content: Some("world".into()),
                done: true,
                usage: None,
            }),
        ]);

        let mut stream = assembler(rx, &history);
        assert_eq!(stream.next().await.unwrap().unwrap(), "Hello ");
        assert_eq!(stream.next().await.unwrap().unwrap(), "world");
        assert!(history.snapshot("s1").is_empty());
        assert!(stream.next().await.is_none());
        assert_eq!(history.snapshot("s1")[0].content(), "Hello world");
    }

    #[tokio::test]
    async fn dropping_mid_stream_cancels_without_commit() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let (tx, rx) = chunk_channel();
        tx.send(Ok(StreamChunk::text("half"))).await.unwrap();

        let mut stream = assembler(rx, &history);
        assert_eq!(stream.next().await.unwrap().unwrap(), "half");
        drop(stream);

        assert!(tx.is_closed());
        assert!(tx.send(Ok(StreamChunk::finished())).await.is_err());
        assert!(history.snapshot("s1").is_empty());
    }

    #[tokio::test]
    async fn cancel_before_completion_closes_upstream_without_commit() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let (tx, rx) = chunk_channel();
        tx.send(Ok(StreamChunk::text("partial "))).await.unwrap();
        tx.send(Ok(StreamChunk::finished())).await.unwrap();

        let mut stream = assembler(rx, &history);
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial ");
        let reason = stream.cancel();

        assert!(matches!(reason, ProviderError::Cancelled));
        assert!(tx.is_closed());
        assert!(history.snapshot("s1").is_empty());
    }

    #[tokio::test]
    async fn empty_deltas_are_skipped() {
        let history = Arc::new(SessionHistoryStore::new(5));
        let rx = feed(vec![
            Ok(StreamChunk::default()),
            Ok(StreamChunk::text("")),
            Ok(StreamChunk::text("x")),
            Ok(StreamChunk::finished()),
        ]);

        let text = assembler(rx, &history).collect_text().await.unwrap();
        assert_eq!(text, "x");
        assert_eq!(history.snapshot("s1").len(), 1);
    }
}
