//! HTTP server wiring

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handler::{
    config_handler, delete_session_handler, delete_user_handler, health_handler,
    import_handler, import_history_handler, list_sessions_handler, list_users_handler,
    root_handler, schema_handler, session_messages_handler, stream_ask_handler, summary_handler,
    user_sessions_handler,
};
use crate::chat::ChatService;
use crate::config::ServerConfig;

/// Routes of the chat API
pub fn router(service: Arc<ChatService>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/stream-ask", post(stream_ask_handler))
        .route("/api/v1/config", get(config_handler))
        .route("/api/v1/users", get(list_users_handler))
        .route("/api/v1/users/:user_id", delete(delete_user_handler))
        .route("/api/v1/users/:user_id/sessions", get(user_sessions_handler))
        .route("/api/v1/sessions", get(list_sessions_handler))
        .route("/api/v1/sessions/:session_id", delete(delete_session_handler))
        .route("/api/v1/sessions/:session_id/messages", get(session_messages_handler))
        .route("/api/v1/summary", get(summary_handler))
        .route("/api/v1/imports", get(import_history_handler).post(import_handler))
        .route("/api/v1/schema", post(schema_handler))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// HTTP server exposing the chat API
pub struct HttpServer {
    service: Arc<ChatService>,
    host: String,
    port: u16,
}

impl HttpServer {
    pub fn new(service: Arc<ChatService>, config: &ServerConfig) -> Self {
        Self {
            service,
            host: config.host.clone(),
            port: config.port,
        }
    }

    /// Serve until Ctrl-C
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let app = router(Arc::clone(&self.service));

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("Chat API listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await?;

        Ok(())
    }
}
