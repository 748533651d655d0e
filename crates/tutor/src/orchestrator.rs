//! Per-request orchestration: validate → drift → scope → retrieve → prompt → stream.

use mathtutor_config::AppConfig;
use mathtutor_core::error::ProviderError;
use mathtutor_core::message::{Message, Turn};
use mathtutor_core::provider::{GenerationOptions, Provider, ProviderRequest};
use mathtutor_core::retrieval::{DocumentScope, Passage, Retriever, SearchRequest};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, RetrievalCache};
use crate::drift::DriftDetector;
use crate::error::TutorError;
use crate::history::SessionHistoryStore;
use crate::prompt::PromptTemplate;
use crate::stream::StreamAssembler;
use crate::topics::TopicFilterRegistry;

pub const VALIDATION_MESSAGE: &str = "Please select a topic before asking a question.";

pub const TECHNICAL_DIFFICULTIES: &str =
    "I'm sorry, I'm experiencing technical difficulties right now. Please try again later.";

pub const NO_DOCUMENTS: &str = "No relevant textbook excerpts were found for this question.";

/// The fixed reply sent when the student drifts to another topic.
pub fn redirect_message(active_topic: &str) -> String {
    format!(
        "Your current topic is {active_topic}. If you would like a definition and example \
         of another topic, please select another topic."
    )
}

/// Number the passages into one context block.
pub fn format_context(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return NO_DOCUMENTS.to_string();
    }
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fixed per-deployment parameters.
#[derive(Debug, Clone)]
pub struct TutorSettings {
    pub model: String,
    pub generation: GenerationOptions,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub query_prefix: String,
    pub max_turns: usize,
}

impl Default for TutorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl TutorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());
        Self {
            model,
            generation: config.generation.options(),
            top_k: config.retrieval.top_k,
            similarity_threshold: config.retrieval.similarity_threshold,
            query_prefix: config.retrieval.query_prefix.clone(),
            max_turns: config.history.max_turns,
        }
    }
}

/// One inbound chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub topic: String,
    pub utterance: String,
    pub session_id: String,
}

impl ChatRequest {
    pub fn new(
        topic: impl Into<String>,
        utterance: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            utterance: utterance.into(),
            session_id: session_id.into(),
        }
    }
}

/// Outcome of a chat request.
pub enum ChatReply {
    /// The request was invalid; the message explains why.
    Rejected(String),

    /// The student mentioned another topic.
    Redirected { mentioned: String, message: String },

    /// Something failed before the model stream began.
    Unavailable(String),

    /// The model reply, forwarded as it arrives.
    Streaming(StreamAssembler),
}

impl ChatReply {
    /// The fixed message for non-streaming replies.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Rejected(m) | Self::Unavailable(m) => Some(m),
            Self::Redirected { message, .. } => Some(message),
            Self::Streaming(_) => None,
        }
    }

    /// Whole reply text, draining the stream if there is one.
    pub async fn into_text(self) -> Result<String, ProviderError> {
        match self {
            Self::Streaming(stream) => stream.collect_text().await,
            Self::Rejected(m) | Self::Unavailable(m) => Ok(m),
            Self::Redirected { message, .. } => Ok(message),
        }
    }
}

/// Composes topics, drift detection, cached retrieval, history, and the
/// model stream for each chat request.
pub struct RequestOrchestrator {
    provider: Arc<dyn Provider>,
    retriever: Arc<dyn Retriever>,
    topics: Arc<TopicFilterRegistry>,
    drift: DriftDetector,
    cache: Arc<RetrievalCache>,
    history: Arc<SessionHistoryStore>,
    prompt: PromptTemplate,
    settings: TutorSettings,
}

impl RequestOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
        topics: TopicFilterRegistry,
        prompt: PromptTemplate,
        settings: TutorSettings,
    ) -> Self {
        Self {
            provider,
            retriever,
            topics: Arc::new(topics),
            drift: DriftDetector::new(),
            cache: Arc::new(RetrievalCache::new()),
            history: Arc::new(SessionHistoryStore::new(settings.max_turns)),
            prompt,
            settings,
        }
    }

    /// Wire an orchestrator from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
    ) -> Result<Self, TutorError> {
        let prompt = PromptTemplate::load(config.prompt.template_path.as_deref())?;
        let topics = TopicFilterRegistry::from_config(&config.topics);
        info!(
            provider = provider.name(),
            retriever = retriever.name(),
            topics = topics.len(),
            "Tutor ready"
        );
        Ok(Self::new(
            provider,
            retriever,
            topics,
            prompt,
            TutorSettings::from_config(config),
        ))
    }

    pub fn topics(&self) -> &TopicFilterRegistry {
        &self.topics
    }

    pub fn history(&self) -> &Arc<SessionHistoryStore> {
        &self.history
    }

    pub fn cache(&self) -> &Arc<RetrievalCache> {
        &self.cache
    }

    pub fn settings(&self) -> &TutorSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Whether the model backend answers its health check.
    pub async fn provider_healthy(&self) -> bool {
        match self.provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Provider health check failed");
                false
            }
        }
    }

    /// Handle one chat request. Never fails: every error becomes a reply.
    pub async fn handle(&self, request: ChatRequest) -> ChatReply {
        match self.prepare(&request).await {
            Ok(reply) => reply,
            Err(TutorError::Validation(message)) => {
                debug!(session = %request.session_id, "Rejected chat request: {message}");
                ChatReply::Rejected(message)
            }
            Err(e) => {
                error!(
                    session = %request.session_id,
                    topic = %request.topic,
                    error = %e,
                    "Chat request failed before streaming"
                );
                ChatReply::Unavailable(TECHNICAL_DIFFICULTIES.to_string())
            }
        }
    }

    async fn prepare(&self, request: &ChatRequest) -> Result<ChatReply, TutorError> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(TutorError::Validation(VALIDATION_MESSAGE.into()));
        }

        if let Some(mentioned) = self
            .drift
            .detect(&request.utterance, topic, self.topics.names())
        {
            info!(session = %request.session_id, topic, mentioned, "Topic drift, redirecting");
            return Ok(ChatReply::Redirected {
                mentioned: mentioned.to_string(),
                message: redirect_message(topic),
            });
        }

        let scopes = self.topics.resolve(topic);
        let passages = match self.retrieve(topic, &request.utterance, scopes).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!(session = %request.session_id, topic, error = %e, "Retrieval failed, continuing without excerpts");
                Vec::new()
            }
        };

        let snapshot = self.history.snapshot(&request.session_id);
        self.history
            .append(&request.session_id, Turn::user(request.utterance.clone()));

        let messages = self.build_messages(topic, &passages, &snapshot, &request.utterance);
        debug!(
            session = %request.session_id,
            passages = passages.len(),
            history = snapshot.len(),
            "Streaming tutor reply"
        );

        let upstream = self
            .provider
            .stream(ProviderRequest {
                model: self.settings.model.clone(),
                messages,
                options: self.settings.generation.clone(),
                stream: true,
            })
            .await?;

        Ok(ChatReply::Streaming(StreamAssembler::new(
            upstream,
            self.history.clone(),
            request.session_id.clone(),
        )))
    }

    async fn retrieve(
        &self,
        topic: &str,
        utterance: &str,
        scopes: &[DocumentScope],
    ) -> Result<Vec<Passage>, TutorError> {
        let key = CacheKey::new(topic, utterance);
        let search = SearchRequest {
            query: format!("{}{} {}", self.settings.query_prefix, topic, utterance),
            top_k: self.settings.top_k,
            similarity_threshold: self.settings.similarity_threshold,
            filter: scopes.to_vec(),
        };
        let retriever = self.retriever.clone();

        let passages = self
            .cache
            .get_or_compute(key, || async move { retriever.similarity_search(&search).await })
            .await?;
        Ok(passages)
    }

    fn build_messages(
        &self,
        topic: &str,
        passages: &[Passage],
        history: &[Turn],
        utterance: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(self.prompt.render_topic(topic)));
        messages.push(Message::system(format!(
            "Textbook excerpts:\n\n{}",
            format_context(passages)
        )));
        messages.extend(history.iter().map(Message::from));
        messages.push(Message::user(utterance));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CountingRetriever, ScriptedProvider};
    use futures::StreamExt;
    use mathtutor_core::message::Role;

    fn orchestrator(
        provider: Arc<ScriptedProvider>,
        retriever: Arc<CountingRetriever>,
    ) -> RequestOrchestrator {
        RequestOrchestrator::new(
            provider,
            retriever,
            TopicFilterRegistry::builtin(),
            PromptTemplate::new("Tutor for {topic}."),
            TutorSettings::default(),
        )
    }

    fn excerpts() -> Vec<Passage> {
        vec![
            Passage::located("A percent is a ratio out of 100.", "fundamentals-of-mathematics.pdf", 850),
            Passage::located("25% of 80 is 0.25 × 80 = 20.", "fundamentals-of-mathematics.pdf", 862),
        ]
    }

    #[tokio::test]
    async fn blank_topic_is_rejected_without_collaborator_calls() {
        let provider = Arc::new(ScriptedProvider::new(&["x"]));
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider.clone(), retriever.clone());

        let reply = tutor.handle(ChatRequest::new("  ", "what is 25% of 80", "s")).await;
        assert!(matches!(reply, ChatReply::Rejected(_)));
        assert_eq!(reply.message(), Some(VALIDATION_MESSAGE));
        assert_eq!(retriever.call_count(), 0);
        assert_eq!(provider.call_count(), 0);
        assert!(tutor.history().snapshot("s").is_empty());
    }

    #[tokio::test]
    async fn drift_short_circuits() {
        let provider = Arc::new(ScriptedProvider::new(&["x"]));
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider.clone(), retriever.clone());

        let reply = tutor
            .handle(ChatRequest::new("linear equations", "i want too lern fractoins", "s"))
            .await;
        match &reply {
            ChatReply::Redirected { mentioned, message } => {
                assert_eq!(mentioned, "fractions");
                assert_eq!(message, &redirect_message("linear equations"));
            }
            _ => panic!("expected a redirect"),
        }
        assert_eq!(retriever.call_count(), 0);
        assert_eq!(provider.call_count(), 0);
        assert!(tutor.history().snapshot("s").is_empty());
        assert!(tutor.cache().is_empty());
    }

    #[tokio::test]
    async fn percents_first_request_end_to_end() {
        let provider = Arc::new(ScriptedProvider::new(&["Multiply ", "0.25 ", "by 80."]));
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider.clone(), retriever.clone());

        let reply = tutor
            .handle(ChatRequest::new("percents", "what is 25% of 80", "student-1"))
            .await;
        let ChatReply::Streaming(mut stream) = reply else {
            panic!("expected a stream");
        };

        // Retrieval ran once with the registered scope.
        assert_eq!(retriever.call_count(), 1);
        let search = retriever.last_request().unwrap();
        assert_eq!(
            search.filter,
            vec![DocumentScope::new("fundamentals-of-mathematics.pdf", 848, 920)]
        );
        assert_eq!(
            search.query,
            "Steps to find the solution. How to Solve. percents what is 25% of 80"
        );
        assert_eq!(search.top_k, 3);
        assert!((search.similarity_threshold - 0.6).abs() < f32::EPSILON);

        // The user turn is recorded before the reply streams.
        let before = tutor.history().snapshot("student-1");
        assert_eq!(before, vec![Turn::user("what is 25% of 80")]);

        let mut forwarded = String::new();
        while let Some(chunk) = stream.next().await {
            forwarded.push_str(&chunk.unwrap());
        }
        assert_eq!(forwarded, "Multiply 0.25 by 80.");

        let after = tutor.history().snapshot("student-1");
        assert_eq!(
            after,
            vec![
                Turn::user("what is 25% of 80"),
                Turn::assistant("Multiply 0.25 by 80."),
            ]
        );
    }

    #[tokio::test]
    async fn message_sequence_layout() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider.clone(), retriever.clone());

        tutor
            .handle(ChatRequest::new("percents", "first question", "s"))
            .await
            .into_text()
            .await
            .unwrap();
        tutor
            .handle(ChatRequest::new("percents", "second question", "s"))
            .await
            .into_text()
            .await
            .unwrap();

        let request = provider.last_request().unwrap();
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(request.messages[0].content, "Tutor for percents.");
        assert!(request.messages[1].content.contains("[1] A percent is a ratio out of 100."));
        assert!(request.messages[1].content.contains("[2] 25% of 80"));
        assert_eq!(request.messages[2].content, "first question");
        assert_eq!(request.messages[4].content, "second question");
        assert!(request.stream);
        assert_eq!(request.options, TutorSettings::default().generation);
    }

    #[tokio::test]
    async fn repeated_question_hits_cache_across_sessions() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider.clone(), retriever.clone());

        for session in ["a", "b", "c"] {
            tutor
                .handle(ChatRequest::new("Percents", " What is 25% of 80 ", session))
                .await
                .into_text()
                .await
                .unwrap();
        }
        assert_eq!(retriever.call_count(), 1);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(tutor.cache().len(), 1);
    }

    #[tokio::test]
    async fn retrieval_failure_falls_back_to_no_documents() {
        let provider = Arc::new(ScriptedProvider::new(&["answer"]));
        let retriever = Arc::new(CountingRetriever::failing());
        let tutor = orchestrator(provider.clone(), retriever.clone());

        let text = tutor
            .handle(ChatRequest::new("decimals", "round 0.45", "s"))
            .await
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, "answer");
        let request = provider.last_request().unwrap();
        assert!(request.messages[1].content.contains(NO_DOCUMENTS));

        // Not cached: the next request retries.
        tutor
            .handle(ChatRequest::new("decimals", "round 0.45", "s"))
            .await
            .into_text()
            .await
            .unwrap();
        assert_eq!(retriever.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_retrieval_uses_marker() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let retriever = Arc::new(CountingRetriever::new(vec![]));
        let tutor = orchestrator(provider.clone(), retriever);

        tutor
            .handle(ChatRequest::new("integers", "what is -3 + 5", "s"))
            .await
            .into_text()
            .await
            .unwrap();
        assert!(provider.last_request().unwrap().messages[1]
            .content
            .ends_with(NO_DOCUMENTS));
    }

    #[tokio::test]
    async fn unknown_topic_retrieves_unrestricted() {
        let provider = Arc::new(ScriptedProvider::new(&["ok"]));
        let retriever = Arc::new(CountingRetriever::new(vec![]));
        let tutor = orchestrator(provider, retriever.clone());

        tutor
            .handle(ChatRequest::new("geometry", "area of a circle", "s"))
            .await
            .into_text()
            .await
            .unwrap();
        assert!(retriever.last_request().unwrap().filter.is_empty());
    }

    #[tokio::test]
    async fn stream_failure_commits_only_the_user_turn() {
        let provider = Arc::new(ScriptedProvider::failing_after(&["a", "b", "c", "d", "e"], 2));
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider, retriever);

        let result = tutor
            .handle(ChatRequest::new("percents", "what is 10% of 50", "s"))
            .await
            .into_text()
            .await;
        assert!(matches!(result, Err(ProviderError::StreamInterrupted(_))));
        assert_eq!(
            tutor.history().snapshot("s"),
            vec![Turn::user("what is 10% of 50")]
        );
    }

    #[tokio::test]
    async fn model_unreachable_becomes_technical_difficulties() {
        let provider = Arc::new(ScriptedProvider::refusing());
        let retriever = Arc::new(CountingRetriever::new(excerpts()));
        let tutor = orchestrator(provider, retriever);

        let reply = tutor
            .handle(ChatRequest::new("percents", "what is 10% of 50", "s"))
            .await;
        assert!(matches!(reply, ChatReply::Unavailable(_)));
        assert_eq!(reply.message(), Some(TECHNICAL_DIFFICULTIES));
    }

    #[test]
    fn context_formatting() {
        assert_eq!(format_context(&[]), NO_DOCUMENTS);
        assert_eq!(
            format_context(&[Passage::new(" one "), Passage::new("two")]),
            "[1] one\n\n[2] two"
        );
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 7;
        config.history.max_turns = 2;
        let settings = TutorSettings::from_config(&config);
        assert_eq!(settings.model, "llama3.1");
        assert_eq!(settings.top_k, 7);
        assert_eq!(settings.max_turns, 2);
        assert_eq!(settings.generation.max_tokens, Some(1024));
    }
}
