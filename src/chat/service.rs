//! Chat service: the application context shared by every request

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::{AskEvent, AskRequest, ChatError, ChatResult};
use crate::config::AppConfig;
use crate::embed::{CachedEmbedder, Embedder, EmbeddingClient};
use crate::graph::{GraphClient, Neo4jHttpClient};
use crate::history::{ChatMessage, ChatStore, GraphChatStore};
use crate::ingest::Ingestion;
use crate::llm::{ChatModelClient, LlmClient, PromptMessage};
use crate::prompt::{build_messages, DEFAULT_SYSTEM_PROMPT};
use crate::retrieval::queries::retrieval_query_for;
use crate::retrieval::{EnsembleRetriever, GraphSearchSource, HttpReranker, SearchSource};
use crate::stream::{StreamEvent, TagSplitter, Transcript};

/// Events buffered between the pipeline task and the client
const EVENT_BUFFER: usize = 64;

/// Per-turn behaviour
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub system_prompt: String,
    /// Abort the answer when the model is silent for this long
    pub idle_timeout: Duration,
    /// Abort the answer when it is still streaming after this long
    pub total_timeout: Duration,
    /// Most recent history messages included in the prompt
    pub history_window: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            idle_timeout: Duration::from_secs(120),
            total_timeout: Duration::from_secs(600),
            history_window: 20,
        }
    }
}

/// Deployment details reported by `GET /api/v1/config`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub ollama_model: String,
    pub neo4j_url: String,
    pub container_name: Option<String>,
    pub neo4j_user: String,
}

pub struct ChatService {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<EnsembleRetriever>,
    llm: Arc<dyn LlmClient>,
    history: Option<Arc<dyn ChatStore>>,
    ingest: Option<Arc<Ingestion>>,
    settings: ChatSettings,
    info: ServiceInfo,
}

impl ChatService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<EnsembleRetriever>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let info = ServiceInfo {
            ollama_model: llm.model().to_string(),
            ..ServiceInfo::default()
        };
        Self {
            embedder,
            retriever,
            llm,
            history: None,
            ingest: None,
            settings: ChatSettings::default(),
            info,
        }
    }

    pub fn with_history(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn with_ingest(mut self, ingest: Arc<Ingestion>) -> Self {
        self.ingest = Some(ingest);
        self
    }

    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_info(mut self, info: ServiceInfo) -> Self {
        self.info = info;
        self
    }

    /// Wire every component from configuration
    pub fn from_config(config: &AppConfig) -> ChatResult<Self> {
        config.validate()?;

        let graph: Arc<dyn GraphClient> = Arc::new(Neo4jHttpClient::new(&config.graph)?);

        let embedder = CachedEmbedder::new(
            EmbeddingClient::new(&config.embedding)?,
            config.embedding.cache_size,
        );

        let retrieval_query = retrieval_query_for(config.retrieval.preset);
        let sources: Vec<Arc<dyn SearchSource>> = config
            .retrieval
            .sources
            .iter()
            .map(|source| {
                Arc::new(GraphSearchSource::new(graph.clone(), source.clone(), retrieval_query))
                    as Arc<dyn SearchSource>
            })
            .collect();

        let mut retriever = EnsembleRetriever::from_config(&config.retrieval, sources);
        if let Some(reranker) = &config.retrieval.reranker {
            info!("Reranking enabled via {}", reranker.url);
            retriever = retriever.with_reranker(Arc::new(HttpReranker::new(reranker)?));
        }

        let ingest = Ingestion::new(
            graph.clone(),
            Arc::new(EmbeddingClient::new(&config.embedding)?),
            config.retrieval.clone(),
            &config.ingest,
        )?;

        let llm = ChatModelClient::new(&config.llm)?;

        let settings = ChatSettings {
            system_prompt: config
                .llm
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            idle_timeout: Duration::from_secs(config.llm.idle_timeout_secs),
            total_timeout: Duration::from_secs(config.llm.total_timeout_secs),
            ..ChatSettings::default()
        };

        let info = ServiceInfo {
            ollama_model: config.llm.model.clone(),
            neo4j_url: config.graph.url.clone(),
            container_name: config.graph.container_name.clone(),
            neo4j_user: config.graph.username.clone(),
        };

        let mut service = Self::new(Arc::new(embedder), Arc::new(retriever), Arc::new(llm))
            .with_settings(settings)
            .with_info(info)
            .with_ingest(Arc::new(ingest));
        if config.history.enabled {
            service = service.with_history(Arc::new(GraphChatStore::new(graph)));
        }
        Ok(service)
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn history(&self) -> Option<&Arc<dyn ChatStore>> {
        self.history.as_ref()
    }

    /// The history store, or [`ChatError::HistoryDisabled`]
    pub fn require_history(&self) -> ChatResult<&Arc<dyn ChatStore>> {
        self.history.as_ref().ok_or(ChatError::HistoryDisabled)
    }

    /// The graph loader, or [`ChatError::IngestDisabled`]
    pub fn require_ingest(&self) -> ChatResult<&Arc<Ingestion>> {
        self.ingest.as_ref().ok_or(ChatError::IngestDisabled)
    }

    pub fn source_count(&self) -> usize {
        self.retriever.source_count()
    }

    /// Start answering `request`.
    ///
    /// Validation errors are returned directly; everything after that is
    /// reported in-band as an [`AskEvent::Error`]. Dropping the returned
    /// stream cancels the upstream model request.
    pub fn ask(self: &Arc<Self>, request: AskRequest) -> ChatResult<ReceiverStream<AskEvent>> {
        let request = request.validated()?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_turn(request, tx).await });

        Ok(ReceiverStream::new(rx))
    }

    async fn run_turn(self: Arc<Self>, request: AskRequest, tx: mpsc::Sender<AskEvent>) {
        info!("Answering question for session {:?}", request.session_id);

        let history = self.load_history(&request).await;
        self.record_question(&request).await;

        let context = match self
            .retriever
            .retrieve_question(self.embedder.as_ref(), &request.question)
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Retrieval failed, answering without context: {}", e);
                Vec::new()
            }
        };
        debug!("{} context documents", context.len());

        let messages = build_messages(&self.settings.system_prompt, &request.question, &context, &history);

        match self.stream_answer(&messages, &tx).await {
            Ok(Some(transcript)) => self.commit_answer(request.session_id, transcript),
            Ok(None) => debug!("Client went away before the answer completed"),
            Err(e) => {
                error!("Answer stream failed: {}", e);
                let _ = tx.send(AskEvent::Error(e.to_string())).await;
            }
        }
    }

    /// Client-supplied history wins over stored history
    async fn load_history(&self, request: &AskRequest) -> Vec<ChatMessage> {
        let mut history: Vec<ChatMessage> = if !request.chat_history.is_empty() {
            request.chat_history.iter().filter_map(|e| e.to_message()).collect()
        } else {
            match (&self.history, &request.session_id) {
                (Some(store), Some(session_id)) => match store.get_messages(session_id).await {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!("Could not load history for session {}: {}", session_id, e);
                        Vec::new()
                    }
                },
                _ => Vec::new(),
            }
        };

        let excess = history.len().saturating_sub(self.settings.history_window);
        history.drain(..excess);
        history
    }

    async fn record_question(&self, request: &AskRequest) {
        let (Some(store), Some(session_id)) = (&self.history, &request.session_id) else {
            return;
        };

        if let Err(e) = store.add_user_message(session_id, &request.question).await {
            error!("Failed to save question for session {}: {}", session_id, e);
        }
        if let Some(user_id) = &request.user_id {
            if let Err(e) = store.link_session_to_user(session_id, user_id).await {
                error!("Failed to link session {} to user {}: {}", session_id, user_id, e);
            }
        }
    }

    /// Forward the model output; `Ok(None)` when the client disconnected
    async fn stream_answer(
        &self,
        messages: &[PromptMessage],
        tx: &mpsc::Sender<AskEvent>,
    ) -> ChatResult<Option<Transcript>> {
        let total = self.settings.total_timeout;
        let deadline = Instant::now() + total;
        let idle = self.settings.idle_timeout;

        let mut stream = tokio::select! {
            _ = tx.closed() => return Ok(None),
            _ = tokio::time::sleep_until(deadline) => return Err(ChatError::AnswerTimeout(total.as_secs())),
            stream = self.llm.stream_chat(messages) => stream?,
        };
        let mut splitter = TagSplitter::new();
        let mut transcript = Transcript::new();

        loop {
            let next = tokio::select! {
                _ = tx.closed() => return Ok(None),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ChatError::AnswerTimeout(total.as_secs()));
                }
                next = tokio::time::timeout(idle, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => return Err(ChatError::IdleTimeout(idle.as_secs())),
                Ok(None) => break,
                Ok(Some(chunk)) => chunk?,
            };

            let mut events = Vec::new();
            if !chunk.reasoning.is_empty() {
                events.push(StreamEvent::Thought(chunk.reasoning));
            }
            events.extend(splitter.push(&chunk.content));
            if !forward(&mut transcript, events, tx).await {
                return Ok(None);
            }
        }

        if !forward(&mut transcript, splitter.finish(), tx).await {
            return Ok(None);
        }
        Ok(Some(transcript))
    }

    /// Persist the assistant message without holding up the response
    fn commit_answer(&self, session_id: Option<String>, transcript: Transcript) {
        let (Some(store), Some(session_id)) = (self.history.clone(), session_id) else {
            return;
        };
        let (answer, thought) = transcript.finalize();

        tokio::spawn(async move {
            match store.add_ai_message(&session_id, &answer, thought.as_deref()).await {
                Ok(()) => debug!("Answer saved to session {}", session_id),
                Err(e) => error!("Failed to save answer for session {}: {}", session_id, e),
            }
        });
    }
}

/// Record and send events; false once the receiver is gone
async fn forward(
    transcript: &mut Transcript,
    events: Vec<StreamEvent>,
    tx: &mpsc::Sender<AskEvent>,
) -> bool {
    for event in events {
        transcript.record(&event);
        if tx.send(AskEvent::from(event)).await.is_err() {
            return false;
        }
    }
    true
}
