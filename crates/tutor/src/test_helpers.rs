//! Shared test helpers: scripted model streams and instrumented retrievers.

use async_trait::async_trait;
use mathtutor_core::error::{ProviderError, RetrievalError};
use mathtutor_core::message::Message;
use mathtutor_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use mathtutor_core::retrieval::{Passage, Retriever, SearchRequest};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub type ChunkItem = Result<StreamChunk, ProviderError>;

pub fn chunk_channel() -> (mpsc::Sender<ChunkItem>, ChunkReceiver) {
    mpsc::channel(16)
}

/// A receiver pre-loaded with `items`, whose sender is already gone.
pub fn feed(items: Vec<ChunkItem>) -> ChunkReceiver {
    let (tx, rx) = mpsc::channel(items.len().max(1));
    for item in items {
        tx.try_send(item).unwrap();
    }
    rx
}

/// A provider that streams scripted chunks and records each request.
///
/// `fail_after` makes the stream error after that many chunks instead of
/// completing. `refuse` makes `stream()` itself fail.
pub struct ScriptedProvider {
    chunks: Vec<String>,
    fail_after: Option<usize>,
    refuse: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail_after: None,
            refuse: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(chunks: &[&str], fail_after: usize) -> Self {
        Self {
            fail_after: Some(fail_after),
            ..Self::new(chunks)
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(&[])
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: Message::assistant(self.chunks.concat()),
            usage: None,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if self.refuse {
            return Err(ProviderError::Network("connection refused".into()));
        }

        let mut items: Vec<ChunkItem> = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(ProviderError::StreamInterrupted("scripted failure".into())));
                return Ok(feed(items));
            }
            items.push(Ok(StreamChunk::text(chunk.clone())));
        }
        items.push(Ok(StreamChunk::finished()));
        Ok(feed(items))
    }
}

/// A retriever returning fixed passages and recording every request.
pub struct CountingRetriever {
    passages: Vec<Passage>,
    fail: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

impl CountingRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<SearchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Retriever for CountingRetriever {
    fn name(&self) -> &str {
        "counting"
    }

    async fn similarity_search(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<Passage>, RetrievalError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(RetrievalError::Unavailable("vector store offline".into()));
        }
        Ok(self.passages.clone())
    }
}
