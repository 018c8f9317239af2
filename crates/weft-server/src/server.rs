use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use weft_core::invalidate::{BroadcastInvalidator, InvalidatedPath};
use weft_store::Database;

use crate::handlers::{self, HandlerState};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub default_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9095,
            default_page_size: 20,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(handlers::upsert_user).get(handlers::fetch_users))
        .route("/users/{id}/activity", get(handlers::get_activity))
        .route("/threads", post(handlers::create_thread).get(handlers::fetch_posts))
        .route("/threads/{id}", get(handlers::fetch_thread))
        .route("/threads/{id}/comments", post(handlers::add_comment))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(
    config: ServerConfig,
    db: Database,
    invalidation_tx: broadcast::Sender<InvalidatedPath>,
) -> Result<ServerHandle, std::io::Error> {
    let invalidator = Arc::new(BroadcastInvalidator::new(invalidation_tx));
    let handler_state = Arc::new(HandlerState::new(db, invalidator, config.default_page_size));

    let app_state = AppState { handler_state };
    let router = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "weft server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

async fn health_handler(State(_state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::invalidate::NoopInvalidator;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9095);
        assert_eq!(config.default_page_size, 20);
    }

    #[test]
    fn router_builds() {
        let db = Database::in_memory().unwrap();
        let state = AppState {
            handler_state: Arc::new(HandlerState::new(db, Arc::new(NoopInvalidator), 20)),
        };
        let _router = build_router(state);
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let db = Database::in_memory().unwrap();
        let (tx, _) = broadcast::channel(16);
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, db, tx).await.unwrap();
        assert_ne!(handle.port, 0);
    }
}
