//! HTTP handlers for the chat API

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::chat::{AskEvent, AskRequest, ChatError, ChatService};
use crate::history::{ChatStore, HistoryError};
use crate::ingest::{catalog::DEFAULT_HISTORY_LIMIT, ImportRequest, IngestError, Ingestion};

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "status": "error", "message": message.to_string() }))).into_response()
}

/// Listing failures degrade to an empty list under `field`
fn empty_list_response(err: &HistoryError, field: &str) -> Response {
    let status = match err {
        HistoryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        HistoryError::Store(_) | HistoryError::MalformedRecord(_) => StatusCode::OK,
    };
    let mut body = json!({ "status": "error", "message": err.to_string() });
    body[field] = json!([]);
    (status, Json(body)).into_response()
}

fn history_status(err: &HistoryError) -> StatusCode {
    match err {
        HistoryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        HistoryError::Store(_) | HistoryError::MalformedRecord(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn history_store(service: &ChatService) -> Result<&Arc<dyn ChatStore>, Response> {
    service
        .require_history()
        .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, e))
}

fn ingestion(service: &ChatService) -> Result<&Arc<Ingestion>, Response> {
    service
        .require_ingest()
        .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, e))
}

fn ingest_status(err: &IngestError) -> StatusCode {
    match err {
        IngestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        IngestError::Http(_) | IngestError::Api { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn sse_event(event: AskEvent) -> Result<Event, axum::Error> {
    let sse = Event::default().json_data(event.payload())?;
    Ok(match event.event_name() {
        Some(name) => sse.event(name),
        None => sse,
    })
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({ "message": "GraphRAG chat API", "version": crate::VERSION }))
}

pub async fn health_handler(State(service): State<Arc<ChatService>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
        "sources": service.source_count(),
        "history": service.history().is_some(),
    }))
}

pub async fn config_handler(State(service): State<Arc<ChatService>>) -> impl IntoResponse {
    let mut body = serde_json::to_value(service.info()).unwrap_or_else(|_| json!({}));
    body["status"] = Value::from("success");
    Json(body)
}

/// Stream an answer as SSE
pub async fn stream_ask_handler(
    State(service): State<Arc<ChatService>>,
    Json(request): Json<AskRequest>,
) -> Response {
    match service.ask(request) {
        Ok(events) => Sse::new(events.map(sse_event))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(ChatError::InvalidRequest(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_users_handler(State(service): State<Arc<ChatService>>) -> Response {
    let store = match history_store(&service) {
        Ok(store) => store,
        Err(response) => return response,
    };
    match store.list_users().await {
        Ok(users) => Json(json!({ "status": "success", "users": users })).into_response(),
        Err(e) => {
            error!("Error listing users: {}", e);
            empty_list_response(&e, "users")
        }
    }
}

async fn sessions_response(service: &ChatService, user_id: Option<&str>) -> Response {
    let store = match history_store(service) {
        Ok(store) => store,
        Err(response) => return response,
    };
    match store.list_sessions(user_id).await {
        Ok(sessions) => Json(json!({ "status": "success", "sessions": sessions })).into_response(),
        Err(e) => {
            error!("Error listing sessions: {}", e);
            empty_list_response(&e, "sessions")
        }
    }
}

pub async fn list_sessions_handler(State(service): State<Arc<ChatService>>) -> Response {
    sessions_response(&service, None).await
}

pub async fn user_sessions_handler(
    State(service): State<Arc<ChatService>>,
    Path(user_id): Path<String>,
) -> Response {
    sessions_response(&service, Some(&user_id)).await
}

pub async fn session_messages_handler(
    State(service): State<Arc<ChatService>>,
    Path(session_id): Path<String>,
) -> Response {
    let store = match history_store(&service) {
        Ok(store) => store,
        Err(response) => return response,
    };
    match store.get_messages(&session_id).await {
        Ok(messages) => Json(json!({
            "status": "success",
            "session_id": session_id,
            "messages": messages,
        }))
        .into_response(),
        Err(e) => {
            error!("Error loading messages for session {}: {}", session_id, e);
            empty_list_response(&e, "messages")
        }
    }
}

pub async fn delete_session_handler(
    State(service): State<Arc<ChatService>>,
    Path(session_id): Path<String>,
) -> Response {
    let store = match history_store(&service) {
        Ok(store) => store,
        Err(response) => return response,
    };
    match store.delete_session(&session_id).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": format!("Session {} deleted", session_id),
        }))
        .into_response(),
        Err(e) => {
            error!("Error deleting session {}: {}", session_id, e);
            error_response(history_status(&e), e)
        }
    }
}

pub async fn delete_user_handler(
    State(service): State<Arc<ChatService>>,
    Path(user_id): Path<String>,
) -> Response {
    let store = match history_store(&service) {
        Ok(store) => store,
        Err(response) => return response,
    };
    match store.delete_user(&user_id).await {
        Ok(()) => Json(json!({
            "status": "success",
            "message": format!("User {} and all their data deleted", user_id),
        }))
        .into_response(),
        Err(e) => {
            error!("Error deleting user {}: {}", user_id, e);
            error_response(history_status(&e), e)
        }
    }
}

pub async fn summary_handler(State(service): State<Arc<ChatService>>) -> Response {
    let ingest = match ingestion(&service) {
        Ok(ingest) => ingest,
        Err(response) => return response,
    };
    match ingest.summary().await {
        Ok(summary) => Json(json!({ "status": "success", "summary": summary })).into_response(),
        Err(e) => {
            error!("Error reading database summary: {}", e);
            error_response(ingest_status(&e), e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportsQuery {
    pub limit: Option<usize>,
}

pub async fn import_history_handler(
    State(service): State<Arc<ChatService>>,
    Query(query): Query<ImportsQuery>,
) -> Response {
    let ingest = match ingestion(&service) {
        Ok(ingest) => ingest,
        Err(response) => return response,
    };
    match ingest.import_history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)).await {
        Ok(imports) => Json(json!({ "status": "success", "imports": imports })).into_response(),
        Err(e) => {
            error!("Error listing imports: {}", e);
            error_response(ingest_status(&e), e)
        }
    }
}

/// Load StackOverflow pages; responds once every page is done
pub async fn import_handler(
    State(service): State<Arc<ChatService>>,
    Json(request): Json<ImportRequest>,
) -> Response {
    let ingest = match ingestion(&service) {
        Ok(ingest) => ingest,
        Err(response) => return response,
    };
    match ingest.import(&request).await {
        Ok(report) => Json(json!({ "status": "success", "report": report })).into_response(),
        Err(e) => {
            error!("Import failed: {}", e);
            error_response(ingest_status(&e), e)
        }
    }
}

/// Create missing constraints and indexes and embed unembedded nodes
pub async fn schema_handler(State(service): State<Arc<ChatService>>) -> Response {
    let ingest = match ingestion(&service) {
        Ok(ingest) => ingest,
        Err(response) => return response,
    };
    match ingest.ensure_schema().await {
        Ok(report) => Json(json!({ "status": "success", "schema": report })).into_response(),
        Err(e) => {
            error!("Schema bootstrap failed: {}", e);
            error_response(ingest_status(&e), e)
        }
    }
}
