//! Streaming chat client for the configured provider

use crate::config::{LlmConfig, LlmProvider};
use crate::llm::ndjson::ndjson_lines;
use crate::llm::{LlmChunk, LlmClient, LlmError, LlmResult, LlmStream, PromptMessage};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::future;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

/// Output replayed by the mock provider, tags split across chunks
const MOCK_SCRIPT: &[&str] = &[
    "<thi",
    "nk>Looking at the retrieved ",
    "context first.</th",
    "ink>",
    "Based on the context, ",
    "this is a mock answer.",
];

pub struct ChatModelClient {
    client: Client,
    config: LlmConfig,
    api_base_url: String,
}

impl ChatModelClient {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        // No overall timeout: answers stream for as long as the model talks
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        if config.provider == LlmProvider::OpenAI && config.api_key.is_none() {
            return Err(LlmError::ConfigError("OpenAI requires API key".to_string()));
        }

        let api_base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            config: config.clone(),
            api_base_url,
        })
    }

    async fn ollama_stream(&self, messages: &[PromptMessage]) -> LlmResult<LlmStream> {
        #[derive(Serialize)]
        struct Options {
            #[serde(skip_serializing_if = "Option::is_none")]
            temperature: Option<f32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            num_ctx: Option<u32>,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [PromptMessage],
            stream: bool,
            options: Options,
        }

        let url = format!("{}/api/chat", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.config.model,
                messages,
                stream: true,
                options: Options {
                    temperature: self.config.temperature,
                    num_ctx: self.config.num_ctx,
                },
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("Ollama returned {}: {}", status, error_text)));
        }

        debug!("Ollama stream opened for model {}", self.config.model);
        let lines = ndjson_lines(Box::pin(resp.bytes_stream()));
        Ok(lines
            .map(|line| line.and_then(|l| parse_ollama_line(&l)))
            .boxed())
    }

    async fn openai_stream(&self, messages: &[PromptMessage]) -> LlmResult<LlmStream> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [PromptMessage],
            stream: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            temperature: Option<f32>,
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::ConfigError("OpenAI requires API key".to_string()))?;

        let url = format!("{}/chat/completions", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request {
                model: &self.config.model,
                messages,
                stream: true,
                temperature: self.config.temperature,
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("OpenAI returned {}: {}", status, error_text)));
        }

        debug!("OpenAI stream opened for model {}", self.config.model);
        let events = Box::pin(resp.bytes_stream().eventsource());
        Ok(events
            .map(|event| match event {
                Ok(event) => parse_openai_data(&event.data),
                Err(e) => Err(LlmError::NetworkError(e.to_string())),
            })
            .take_while(|item| future::ready(!matches!(item, Ok(None))))
            .filter_map(|item| future::ready(item.transpose()))
            .boxed())
    }

    fn mock_stream(&self) -> LlmStream {
        stream::iter(MOCK_SCRIPT.iter().map(|s| Ok(LlmChunk::content(*s)))).boxed()
    }
}

#[async_trait]
impl LlmClient for ChatModelClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_chat(&self, messages: &[PromptMessage]) -> LlmResult<LlmStream> {
        match self.config.provider {
            LlmProvider::Ollama => self.ollama_stream(messages).await,
            LlmProvider::OpenAI => self.openai_stream(messages).await,
            LlmProvider::Mock => Ok(self.mock_stream()),
        }
    }
}

/// Decode one Ollama `/api/chat` stream line
fn parse_ollama_line(line: &str) -> LlmResult<LlmChunk> {
    #[derive(Deserialize)]
    struct Line {
        #[serde(default)]
        message: Option<Message>,
        #[serde(default)]
        error: Option<String>,
    }

    #[derive(Deserialize)]
    struct Message {
        #[serde(default)]
        content: String,
        #[serde(default)]
        thinking: Option<String>,
    }

    trace!("Ollama line: {}", line);
    let parsed: Line =
        serde_json::from_str(line).map_err(|e| LlmError::SerializationError(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(LlmError::ApiError(error));
    }

    Ok(parsed
        .message
        .map(|m| LlmChunk {
            content: m.content,
            reasoning: m.thinking.unwrap_or_default(),
        })
        .unwrap_or_default())
}

/// Decode one OpenAI SSE payload; `Ok(None)` marks the end of the stream
fn parse_openai_data(data: &str) -> LlmResult<Option<LlmChunk>> {
    trace!("OpenAI SSE: {}", data);
    if data.trim() == "[DONE]" {
        return Ok(None);
    }

    let event: Value =
        serde_json::from_str(data).map_err(|e| LlmError::SerializationError(e.to_string()))?;

    if let Some(error) = event.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("An error occurred during streaming");
        return Err(LlmError::ApiError(message.to_string()));
    }

    let delta = event.pointer("/choices/0/delta");
    let text = |key: &str| {
        delta
            .and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(Some(LlmChunk {
        content: text("content"),
        reasoning: text("reasoning_content"),
    }))
}
