//! Application configuration
//!
//! Built once at start-up from defaults, an optional YAML file and a small set
//! of environment overrides, then shared read-only.

use crate::retrieval::SearchParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid YAML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// LLM and embedding provider options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    /// Offline provider replaying canned output
    Mock,
}

impl LlmProvider {
    /// Default API base URL for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Mock => "",
        }
    }
}

/// Corpus presets shipped with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Tag, User, Question and Answer indexes
    StackOverflow,
    /// Movie, Person, Category, Country and Type indexes
    Movies,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Connection to the external graph store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Store URL; `bolt://` and `neo4j://` URLs are mapped to the HTTP endpoint
    pub url: String,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
    /// Display name of the container hosting the store, reported by `/api/v1/config`
    pub container_name: Option<String>,
    /// Create constraints and indexes and embed unembedded nodes at start-up
    pub bootstrap: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            username: "neo4j".to_string(),
            password: None,
            database: "neo4j".to_string(),
            container_name: None,
            bootstrap: true,
        }
    }
}

/// Answer model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// The LLM provider to use
    pub provider: LlmProvider,
    /// Model name (e.g., "qwen3:1.7b", "gpt-4o")
    pub model: String,
    /// API Key (required for OpenAI)
    pub api_key: Option<String>,
    /// API Base URL (defaults per provider)
    pub api_base_url: Option<String>,
    /// Overrides the built-in analyst system prompt
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    /// Context window requested from Ollama
    pub num_ctx: Option<u32>,
    /// Abort the stream when no token arrives for this long
    pub idle_timeout_secs: u64,
    /// Abort the stream when the whole answer takes longer than this
    pub total_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "qwen3:1.7b".to_string(),
            api_key: None,
            api_base_url: None,
            system_prompt: None,
            temperature: None,
            num_ctx: Some(40968),
            idle_timeout_secs: 120,
            total_timeout_secs: 600,
        }
    }
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: LlmProvider,
    /// Model name (e.g., "bge-m3", "text-embedding-3-small")
    pub model: String,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    /// Dimension of the vectors produced by the mock provider
    pub dimensions: usize,
    /// Number of question embeddings kept in the LRU cache (0 disables it)
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "bge-m3".to_string(),
            api_key: None,
            api_base_url: None,
            dimensions: 384,
            cache_size: 256,
        }
    }
}

/// One indexed node category queried by the retriever
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Node label (e.g., "Question")
    pub label: String,
    /// Vector index name
    pub index_name: String,
    /// Full-text index name
    pub keyword_index_name: String,
    /// Node properties concatenated into the embedded and full-text indexed `text`
    #[serde(default)]
    pub text_properties: Vec<String>,
}

impl SourceConfig {
    /// Source using the `<Label>_index` / `<Label>_keyword_index` naming scheme
    pub fn for_label(label: &str) -> Self {
        Self {
            label: label.to_string(),
            index_name: format!("{}_index", label),
            keyword_index_name: format!("{}_keyword_index", label),
            text_properties: default_text_properties(label),
        }
    }

    /// Configured text properties, or the label's defaults
    pub fn text_properties(&self) -> Vec<String> {
        if self.text_properties.is_empty() {
            default_text_properties(&self.label)
        } else {
            self.text_properties.clone()
        }
    }
}

fn default_text_properties(label: &str) -> Vec<String> {
    let properties: &[&str] = match label {
        "Tag" | "Person" | "Category" | "Country" => &["name"],
        "User" => &["reputation", "display_name"],
        "Question" => &["score", "link", "favorite_count", "id", "creation_date", "body", "title"],
        "Answer" => &["score", "is_accepted", "id", "body", "creation_date"],
        "Movie" => &["title", "description", "release_year"],
        "Type" => &["type"],
        _ => &["name"],
    };
    properties.iter().map(|p| p.to_string()).collect()
}

/// Cross-encoder reranking service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL of a `/rerank` endpoint
    pub url: String,
    pub model: Option<String>,
}

/// Retrieval pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub preset: Preset,
    pub search: SearchParams,
    /// Documents kept after the merge (and rerank, when enabled)
    pub top_n: usize,
    /// Drop hits whose community does not overlap the routed entity's
    pub community_filter: bool,
    /// Deadline for the whole multi-source retrieval
    pub timeout_secs: u64,
    pub sources: Vec<SourceConfig>,
    pub reranker: Option<RerankerConfig>,
}

impl RetrievalConfig {
    /// Retrieval defaults for a corpus preset
    pub fn for_preset(preset: Preset) -> Self {
        let (labels, threshold): (&[&str], f32) = match preset {
            Preset::StackOverflow => (&["Tag", "User", "Question", "Answer"], 0.85),
            Preset::Movies => (&["Movie", "Person", "Category", "Country", "Type"], 0.6),
        };

        Self {
            preset,
            search: SearchParams {
                score_threshold: threshold,
                ..SearchParams::default()
            },
            top_n: 10,
            community_filter: true,
            timeout_secs: 30,
            sources: labels.iter().map(|l| SourceConfig::for_label(l)).collect(),
            reranker: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::for_preset(Preset::StackOverflow)
    }
}

/// Chat history persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// StackExchange import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// StackExchange API base URL
    pub api_base_url: String,
    pub site: String,
    /// Raises the API's request quota
    pub api_key: Option<String>,
    /// Pages fetched and imported at the same time
    pub concurrency: usize,
    /// Nodes embedded per backfill round
    pub backfill_batch: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stackexchange.com/2.3".to_string(),
            site: "stackoverflow".to_string(),
            api_key: None,
            concurrency: 4,
            backfill_batch: 500,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub graph: GraphConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub history: HistoryConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Load configuration: defaults, then `path` (if any), then the environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_yaml(&std::fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; missing sections fall back to defaults
    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Replace the retrieval section with a preset's defaults, keeping the reranker
    pub fn with_preset(mut self, preset: Preset) -> Self {
        let reranker = self.retrieval.reranker.take();
        self.retrieval = RetrievalConfig::for_preset(preset);
        self.retrieval.reranker = reranker;
        self
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NEO4J_URL") {
            self.graph.url = url;
        }
        if let Some(user) = lookup("NEO4J_USERNAME") {
            self.graph.username = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.graph.password = Some(password);
        }
        if let Some(container) = lookup("NEO4J_CONTAINER") {
            self.graph.container_name = Some(container);
        }
        if let Some(base) = lookup("OLLAMA_BASE_URL") {
            if self.llm.provider == LlmProvider::Ollama {
                self.llm.api_base_url = Some(base.clone());
            }
            if self.embedding.provider == LlmProvider::Ollama {
                self.embedding.api_base_url = Some(base);
            }
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key.get_or_insert(key.clone());
            self.embedding.api_key.get_or_insert(key);
        }
        if let Some(key) = lookup("STACKEXCHANGE_API_KEY") {
            self.ingest.api_key = Some(key);
        }
        if let Some(url) = lookup("RERANKER_URL") {
            self.retrieval.reranker = Some(RerankerConfig { url, model: None });
        }
        debug!("Environment overrides applied");
    }

    /// Reject inconsistent settings before anything is constructed
    pub fn validate(&self) -> ConfigResult<()> {
        self.retrieval
            .search
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.retrieval.top_n == 0 {
            return Err(ConfigError::Invalid("retrieval.top_n must be at least 1".to_string()));
        }
        if self.retrieval.sources.is_empty() {
            return Err(ConfigError::Invalid("retrieval.sources must not be empty".to_string()));
        }
        if self.llm.provider == LlmProvider::OpenAI && self.llm.api_key.is_none() {
            return Err(ConfigError::Invalid("OpenAI requires an API key".to_string()));
        }
        if self.llm.idle_timeout_secs == 0 || self.llm.total_timeout_secs == 0 {
            return Err(ConfigError::Invalid("LLM timeouts must be at least 1s".to_string()));
        }
        if self.ingest.concurrency == 0 || self.ingest.backfill_batch == 0 {
            return Err(ConfigError::Invalid(
                "ingest.concurrency and ingest.backfill_batch must be at least 1".to_string(),
            ));
        }
        if self.embedding.provider == LlmProvider::Mock && self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid("embedding.dimensions must be at least 1".to_string()));
        }
        Ok(())
    }
}
