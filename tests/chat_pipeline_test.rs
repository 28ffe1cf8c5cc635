use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use graphrag_chat::chat::{ChatSettings, HistoryEntry};
use graphrag_chat::config::{EmbeddingConfig, LlmConfig, LlmProvider};
use graphrag_chat::embed::EmbeddingClient;
use graphrag_chat::llm::{ChatModelClient, LlmChunk, LlmClient, LlmError, LlmResult, LlmStream, PromptMessage};
use graphrag_chat::retrieval::MemorySearchSource;
use graphrag_chat::{
    AskEvent, AskRequest, ChatError, ChatMessage, ChatService, ChatStore, EnsembleRetriever,
    MemoryChatStore, Role, SearchParams,
};

/// Replays fixed chunks and records the prompt it was given
struct ScriptedLlm {
    chunks: Vec<LlmResult<LlmChunk>>,
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedLlm {
    fn new(chunks: Vec<LlmResult<LlmChunk>>) -> Arc<Self> {
        Arc::new(Self { chunks, prompts: Mutex::new(Vec::new()) })
    }

    fn last_prompt(&self) -> String {
        let prompts = self.prompts.lock().unwrap();
        prompts.last().map(|m| m[3].content.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, messages: &[PromptMessage]) -> LlmResult<LlmStream> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let chunks: Vec<LlmResult<LlmChunk>> = self
            .chunks
            .iter()
            .map(|c| match c {
                Ok(chunk) => Ok(chunk.clone()),
                Err(e) => Err(LlmError::ApiError(e.to_string())),
            })
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

/// Never yields anything
struct SilentLlm;

#[async_trait]
impl LlmClient for SilentLlm {
    fn model(&self) -> &str {
        "silent"
    }

    async fn stream_chat(&self, _: &[PromptMessage]) -> LlmResult<LlmStream> {
        Ok(stream::pending().boxed())
    }
}

/// Endless slow stream counting how many chunks were pulled
struct EndlessLlm {
    pulled: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmClient for EndlessLlm {
    fn model(&self) -> &str {
        "endless"
    }

    async fn stream_chat(&self, _: &[PromptMessage]) -> LlmResult<LlmStream> {
        let pulled = Arc::clone(&self.pulled);
        Ok(stream::unfold(pulled, |pulled| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            pulled.fetch_add(1, Ordering::SeqCst);
            Some((Ok(LlmChunk::content("tok ")), pulled))
        })
        .boxed())
    }
}

fn chunk(text: &str) -> LlmResult<LlmChunk> {
    Ok(LlmChunk::content(text))
}

async fn service_with(llm: Arc<dyn LlmClient>, store: Arc<MemoryChatStore>) -> Arc<ChatService> {
    Arc::new(build_service(llm, store).await)
}

async fn build_service(llm: Arc<dyn LlmClient>, store: Arc<MemoryChatStore>) -> ChatService {
    let embedder = Arc::new(
        EmbeddingClient::new(&EmbeddingConfig {
            provider: LlmProvider::Mock,
            dimensions: 128,
            ..EmbeddingConfig::default()
        })
        .unwrap(),
    );
    let meta = |id: i64| -> Map<String, Value> { json!({ "id": id }).as_object().cloned().unwrap() };
    let source = MemorySearchSource::from_documents(
        "Question",
        embedder.as_ref(),
        vec![("Flask is a lightweight Python web framework".to_string(), meta(1))],
    )
    .await
    .unwrap();
    let retriever = EnsembleRetriever::new(
        vec![Arc::new(source)],
        SearchParams { score_threshold: 0.0, ..SearchParams::default() },
    );

    ChatService::new(embedder, Arc::new(retriever), llm).with_history(store)
}

async fn collect(service: &Arc<ChatService>, request: AskRequest) -> Vec<AskEvent> {
    service.ask(request).unwrap().collect().await
}

async fn wait_for_messages(store: &MemoryChatStore, session_id: &str, count: usize) -> Vec<ChatMessage> {
    for _ in 0..50 {
        let messages = store.get_messages(session_id).await.unwrap();
        if messages.len() >= count {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {} never reached {} messages", session_id, count);
}

fn text_of(events: &[AskEvent]) -> (String, String) {
    let mut answer = String::new();
    let mut thought = String::new();
    for event in events {
        match event {
            AskEvent::Answer(t) => answer.push_str(t),
            AskEvent::Thought(t) => thought.push_str(t),
            _ => {}
        }
    }
    (answer, thought)
}

#[tokio::test]
async fn test_mock_model_answer_is_split_and_persisted() {
    let store = Arc::new(MemoryChatStore::new());
    let llm = ChatModelClient::new(&LlmConfig { provider: LlmProvider::Mock, ..LlmConfig::default() }).unwrap();
    let service = service_with(Arc::new(llm), store.clone()).await;

    let events = collect(&service, AskRequest::new("What is Flask?").with_session("s1").with_user("u1")).await;

    assert_eq!(events.first(), Some(&AskEvent::ThinkingStarted));
    let (answer, thought) = text_of(&events);
    assert_eq!(answer, "Based on the context, this is a mock answer.");
    assert_eq!(thought, "Looking at the retrieved context first.");

    let messages = wait_for_messages(&store, "s1", 2).await;
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "What is Flask?");
    assert_eq!(messages[0].thought, None);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, answer);
    assert_eq!(messages[1].thought.as_deref(), Some("Looking at the retrieved context first."));

    assert_eq!(store.list_users().await.unwrap(), vec!["u1".to_string()]);
}

#[tokio::test]
async fn test_out_of_band_reasoning_goes_to_thought_channel() {
    let llm = ScriptedLlm::new(vec![
        Ok(LlmChunk { content: String::new(), reasoning: "checking docs".to_string() }),
        chunk("Use "),
        chunk("Flask."),
    ]);
    let service = service_with(llm, Arc::new(MemoryChatStore::new())).await;

    let events = collect(&service, AskRequest::new("How?")).await;
    assert_eq!(
        events,
        vec![
            AskEvent::Thought("checking docs".to_string()),
            AskEvent::Answer("Use ".to_string()),
            AskEvent::Answer("Flask.".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_prompt_contains_context_and_history() {
    let store = Arc::new(MemoryChatStore::new());
    store.add_user_message("s1", "Earlier question").await.unwrap();
    store.add_ai_message("s1", "Earlier answer", None).await.unwrap();

    let llm = ScriptedLlm::new(vec![chunk("ok")]);
    let service = service_with(llm.clone(), store.clone()).await;
    collect(&service, AskRequest::new("What is Flask?").with_session("s1")).await;

    let prompt = llm.last_prompt();
    assert!(prompt.contains("Flask is a lightweight Python web framework"));
    assert!(prompt.contains("User: Earlier question\nAssistant: Earlier answer"));
    assert!(prompt.ends_with("### QUESTION:\nWhat is Flask?\n"));
}

#[tokio::test]
async fn test_client_history_overrides_stored_history() {
    let store = Arc::new(MemoryChatStore::new());
    store.add_user_message("s1", "stored question").await.unwrap();

    let llm = ScriptedLlm::new(vec![chunk("ok")]);
    let service = service_with(llm.clone(), store).await;

    let mut request = AskRequest::new("follow up").with_session("s1");
    request.chat_history = vec![
        HistoryEntry { role: "user".to_string(), content: "client question".to_string() },
        HistoryEntry { role: "assistant".to_string(), content: "client answer".to_string() },
    ];
    collect(&service, request).await;

    let prompt = llm.last_prompt();
    assert!(prompt.contains("User: client question\nAssistant: client answer"));
    assert!(!prompt.contains("stored question"));
}

#[tokio::test]
async fn test_history_is_windowed() {
    let store = Arc::new(MemoryChatStore::new());
    for i in 0..30 {
        store.add_user_message("s1", &format!("message {:02}", i)).await.unwrap();
    }

    let llm = ScriptedLlm::new(vec![chunk("ok")]);
    let service = service_with(llm.clone(), store).await;
    collect(&service, AskRequest::new("latest").with_session("s1")).await;

    let prompt = llm.last_prompt();
    assert!(!prompt.contains("message 09"));
    assert!(prompt.contains("message 10"));
    assert!(prompt.contains("message 29"));
}

#[tokio::test]
async fn test_model_failure_ends_with_error_event() {
    let store = Arc::new(MemoryChatStore::new());
    let llm = ScriptedLlm::new(vec![chunk("partial "), Err(LlmError::NetworkError("reset".to_string()))]);
    let service = service_with(llm, store.clone()).await;

    let events = collect(&service, AskRequest::new("q").with_session("s1")).await;
    assert_eq!(events[0], AskEvent::Answer("partial ".to_string()));
    assert!(matches!(events.last(), Some(AskEvent::Error(m)) if m.contains("reset")));

    // Only the question is stored
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get_messages("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_silent_model_hits_idle_timeout() {
    let service = build_service(Arc::new(SilentLlm), Arc::new(MemoryChatStore::new()))
        .await
        .with_settings(ChatSettings { idle_timeout: Duration::from_millis(50), ..ChatSettings::default() });
    let service = Arc::new(service);

    let events = collect(&service, AskRequest::new("q")).await;
    assert!(matches!(events.as_slice(), [AskEvent::Error(m)] if m.contains("No output")));
}

#[tokio::test]
async fn test_endless_model_hits_total_timeout() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let llm = Arc::new(EndlessLlm { pulled: pulled.clone() });
    let service = build_service(llm, Arc::new(MemoryChatStore::new()))
        .await
        .with_settings(ChatSettings { total_timeout: Duration::from_millis(200), ..ChatSettings::default() });
    let service = Arc::new(service);

    let events = tokio::time::timeout(Duration::from_secs(5), collect(&service, AskRequest::new("q")))
        .await
        .expect("stream should end at the deadline");
    assert!(events.len() > 1);
    assert!(matches!(events.last(), Some(AskEvent::Error(m)) if m.contains("not finished")));

    let stopped_at = pulled.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pulled.load(Ordering::SeqCst), stopped_at);
}

#[tokio::test]
async fn test_dropping_the_stream_stops_the_model() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let llm = Arc::new(EndlessLlm { pulled: pulled.clone() });
    let service = service_with(llm, Arc::new(MemoryChatStore::new())).await;

    let mut events = service.ask(AskRequest::new("q")).unwrap();
    for _ in 0..3 {
        events.next().await;
    }
    drop(events);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_drop = pulled.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pulled.load(Ordering::SeqCst), after_drop);
}

#[tokio::test]
async fn test_blank_question_is_rejected() {
    let service = service_with(ScriptedLlm::new(vec![]), Arc::new(MemoryChatStore::new())).await;
    assert!(matches!(service.ask(AskRequest::new("  ")), Err(ChatError::InvalidRequest(_))));
}
