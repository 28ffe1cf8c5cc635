//! StackExchange `search/advanced` client

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{IngestError, IngestResult};
use crate::config::IngestConfig;

/// Response filter that adds `body_markdown` and the answers to each question
const QUESTION_FILTER: &str = "!*236eb_eL9rai)MOSNZ-6D3Q6ZKb0buI*IVotWaTb";

pub const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: Option<i64>,
    pub display_name: Option<String>,
    pub reputation: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer_id: i64,
    #[serde(default)]
    pub is_accepted: bool,
    #[serde(default)]
    pub score: i64,
    /// Unix seconds
    pub creation_date: i64,
    #[serde(default)]
    pub body_markdown: String,
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: i64,
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub score: i64,
    pub favorite_count: Option<i64>,
    /// Unix seconds
    pub creation_date: i64,
    #[serde(default)]
    pub body_markdown: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub owner: Option<Owner>,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<Question>,
    /// Seconds to wait before the next request
    backoff: Option<u64>,
    error_name: Option<String>,
    error_message: Option<String>,
}

/// Fetches answered questions for a tag, newest first
pub struct StackExchangeClient {
    client: Client,
    search_url: String,
    site: String,
    api_key: Option<String>,
}

impl StackExchangeClient {
    pub fn new(config: &IngestConfig) -> IngestResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            search_url: format!("{}/search/advanced", config.api_base_url.trim_end_matches('/')),
            site: config.site.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn page_url(&self, tag: &str, page: u32) -> IngestResult<Url> {
        let page = page.to_string();
        let page_size = PAGE_SIZE.to_string();
        let mut params = vec![
            ("pagesize", page_size.as_str()),
            ("page", page.as_str()),
            ("order", "desc"),
            ("sort", "creation"),
            ("answers", "1"),
            ("tagged", tag),
            ("site", self.site.as_str()),
            ("filter", QUESTION_FILTER),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }
        Url::parse_with_params(&self.search_url, &params)
            .map_err(|e| IngestError::InvalidRequest(format!("bad StackExchange URL: {}", e)))
    }

    /// One page of up to [`PAGE_SIZE`] questions that have at least one answer.
    ///
    /// A `backoff` in the response is honoured before returning.
    pub async fn fetch_page(&self, tag: &str, page: u32) -> IngestResult<Vec<Question>> {
        let url = self.page_url(tag, page)?;
        debug!("Fetching {} page {}", tag, page);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let parsed: SearchPage = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(IngestError::Api {
                    name: status.to_string(),
                    message: String::from_utf8_lossy(&body).into_owned(),
                })
            }
            Err(e) => return Err(IngestError::Malformed(e.to_string())),
        };

        if let Some(name) = parsed.error_name {
            return Err(IngestError::Api {
                name,
                message: parsed.error_message.unwrap_or_default(),
            });
        }

        if let Some(seconds) = parsed.backoff {
            warn!("StackExchange asked for a {}s backoff", seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }

        Ok(parsed.items)
    }
}
