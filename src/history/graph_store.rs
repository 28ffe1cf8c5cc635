//! Chat store persisted in the graph
//!
//! Layout: `(:AppUser {id})-[:HAS_SESSION]->(:Session {id})`, with
//! `(:Session)-[:HAS_MESSAGE]->(:Message)` for every message, a `NEXT` chain
//! between consecutive messages and a single `LAST_MESSAGE` pointer.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    require_id, ChatMessage, ChatStore, HistoryError, HistoryResult, Role, SessionSummary,
    MAX_SESSIONS, MAX_USERS,
};
use crate::graph::{GraphClient, Row};

const ADD_MESSAGE: &str = r#"
MERGE (s:Session {id: $session_id})
CREATE (m:Message {type: $type, content: $content, thought: $thought, created_at: $created_at})
WITH s, m
OPTIONAL MATCH (s)-[last:LAST_MESSAGE]->(prev:Message)
DELETE last
WITH s, m, prev
FOREACH (_ IN CASE WHEN prev IS NULL THEN [] ELSE [1] END | MERGE (prev)-[:NEXT]->(m))
MERGE (s)-[:LAST_MESSAGE]->(m)
MERGE (s)-[:HAS_MESSAGE]->(m)
"#;

const LINK_SESSION: &str = r#"
MERGE (u:AppUser {id: $user_id})
MERGE (s:Session {id: $session_id})
MERGE (u)-[:HAS_SESSION]->(s)
"#;

const ALL_SESSIONS: &str = r#"
MATCH (s:Session)
OPTIONAL MATCH (s)-[:LAST_MESSAGE]->(m:Message)
RETURN s.id AS session_id, m.content AS last_message
ORDER BY m.created_at DESC
LIMIT $limit
"#;

const USER_SESSIONS: &str = r#"
MATCH (:AppUser {id: $user_id})-[:HAS_SESSION]->(s:Session)
OPTIONAL MATCH (s)-[:LAST_MESSAGE]->(m:Message)
RETURN s.id AS session_id, m.content AS last_message
ORDER BY m.created_at DESC
LIMIT $limit
"#;

const ALL_USERS: &str = "MATCH (u:AppUser) RETURN u.id AS user_id ORDER BY u.id LIMIT $limit";

const SESSION_MESSAGES: &str = r#"
MATCH (:Session {id: $session_id})-[:HAS_MESSAGE]->(m:Message)
RETURN m.type AS type, m.content AS content, m.thought AS thought, m.created_at AS created_at
ORDER BY m.created_at ASC, id(m) ASC
"#;

const DELETE_SESSION: &str = r#"
MATCH (s:Session {id: $session_id})
OPTIONAL MATCH (s)-[:HAS_MESSAGE]->(m:Message)
DETACH DELETE m, s
"#;

const DELETE_USER: &str = r#"
MATCH (u:AppUser {id: $user_id})
OPTIONAL MATCH (u)-[:HAS_SESSION]->(s:Session)
OPTIONAL MATCH (s)-[:HAS_MESSAGE]->(m:Message)
DETACH DELETE m, s, u
"#;

pub struct GraphChatStore {
    client: Arc<dyn GraphClient>,
}

impl GraphChatStore {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        Self { client }
    }

    async fn add_message(&self, session_id: &str, message: ChatMessage) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        let params = json!({
            "session_id": session_id,
            "type": message.role.as_str(),
            "content": message.content,
            "thought": message.thought,
            "created_at": message.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        });
        self.client.run(ADD_MESSAGE, params).await?;
        debug!("{} message added to session {}", message.role.as_str(), session_id);
        Ok(())
    }
}

fn string_column(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

fn summary_from_row(row: &Row) -> HistoryResult<SessionSummary> {
    let session_id = string_column(row, "session_id")
        .ok_or_else(|| HistoryError::MalformedRecord("session without id".to_string()))?;
    Ok(SessionSummary {
        session_id,
        last_message: string_column(row, "last_message"),
    })
}

fn message_from_row(row: &Row) -> HistoryResult<ChatMessage> {
    let kind = string_column(row, "type").unwrap_or_default();
    let role = Role::from_stored(&kind)
        .ok_or_else(|| HistoryError::MalformedRecord(format!("unknown message type '{}'", kind)))?;

    let created_at = string_column(row, "created_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default();

    let thought = match role {
        Role::Assistant => string_column(row, "thought").filter(|t| !t.is_empty()),
        Role::User => None,
    };

    Ok(ChatMessage {
        role,
        content: string_column(row, "content").unwrap_or_default(),
        thought,
        created_at,
    })
}

#[async_trait]
impl ChatStore for GraphChatStore {
    async fn add_user_message(&self, session_id: &str, content: &str) -> HistoryResult<()> {
        self.add_message(session_id, ChatMessage::user(content)).await
    }

    async fn add_ai_message(
        &self,
        session_id: &str,
        content: &str,
        thought: Option<&str>,
    ) -> HistoryResult<()> {
        self.add_message(session_id, ChatMessage::assistant(content, thought.map(str::to_string)))
            .await
    }

    async fn link_session_to_user(&self, session_id: &str, user_id: &str) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        let user_id = require_id("user_id", user_id)?;
        self.client
            .run(LINK_SESSION, json!({"session_id": session_id, "user_id": user_id}))
            .await?;
        debug!("Linked session {} to user {}", session_id, user_id);
        Ok(())
    }

    async fn list_sessions(&self, user_id: Option<&str>) -> HistoryResult<Vec<SessionSummary>> {
        let rows = match user_id {
            Some(user_id) => {
                let user_id = require_id("user_id", user_id)?;
                self.client
                    .run(USER_SESSIONS, json!({"user_id": user_id, "limit": MAX_SESSIONS}))
                    .await?
            }
            None => self.client.run(ALL_SESSIONS, json!({"limit": MAX_SESSIONS})).await?,
        };
        rows.iter().map(summary_from_row).collect()
    }

    async fn list_users(&self) -> HistoryResult<Vec<String>> {
        let rows = self.client.run(ALL_USERS, json!({"limit": MAX_USERS})).await?;
        Ok(rows.iter().filter_map(|r| string_column(r, "user_id")).collect())
    }

    async fn get_messages(&self, session_id: &str) -> HistoryResult<Vec<ChatMessage>> {
        let session_id = require_id("session_id", session_id)?;
        let rows = self
            .client
            .run(SESSION_MESSAGES, json!({"session_id": session_id}))
            .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn delete_session(&self, session_id: &str) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        self.client
            .run(DELETE_SESSION, json!({"session_id": session_id}))
            .await?;
        info!("Session {} deleted", session_id);
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> HistoryResult<()> {
        let user_id = require_id("user_id", user_id)?;
        self.client.run(DELETE_USER, json!({"user_id": user_id})).await?;
        info!("User {} and all their data deleted", user_id);
        Ok(())
    }
}
